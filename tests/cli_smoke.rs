//! Behavioural smoke tests for the CLI entrypoint.

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

const VOLUME: &str = "/subscriptions/sub-1/resourceGroups/rg-storage/providers/Microsoft.NetApp/netAppAccounts/acct/capacityPools/pool/volumes/data";

#[test]
fn cli_without_arguments_prints_help() {
    let mut cmd = cargo_bin_cmd!("strata");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn invalid_volume_id_fails_before_configuration_is_loaded() {
    let mut cmd = cargo_bin_cmd!("strata");
    cmd.env_remove("STRATA_BEARER_TOKEN")
        .args(["show", "--volume", "/subscriptions/sub-1/resourceGroups"]);
    cmd.assert()
        .code(1)
        .stderr(predicate::str::contains("invalid argument: --volume"))
        .stderr(predicate::str::contains("configuration").not());
}

#[test]
fn malformed_tag_is_rejected() {
    let mut cmd = cargo_bin_cmd!("strata");
    cmd.args(["update", "--volume", VOLUME, "--tag", "missing-separator"]);
    cmd.assert()
        .code(1)
        .stderr(predicate::str::contains("expected KEY=VALUE"));
}

#[test]
fn endpoint_type_requires_remote_volume() {
    let mut cmd = cargo_bin_cmd!("strata");
    cmd.args([
        "create",
        "--volume",
        VOLUME,
        "--location",
        "westeurope",
        "--creation-token",
        "data",
        "--service-level",
        "Premium",
        "--subnet-id",
        "subnet",
        "--quota-gb",
        "100",
        "--endpoint-type",
        "dst",
    ]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("--remote-volume"));
}

#[test]
fn missing_token_is_reported_with_remedy() {
    let mut cmd = cargo_bin_cmd!("strata");
    cmd.env_remove("STRATA_BEARER_TOKEN")
        .env_remove("STRATA_CONFIG_PATH")
        .env("HOME", env!("CARGO_TARGET_TMPDIR"))
        .env("XDG_CONFIG_HOME", env!("CARGO_TARGET_TMPDIR"))
        .current_dir(env!("CARGO_TARGET_TMPDIR"))
        .args(["show", "--volume", VOLUME]);
    cmd.assert()
        .code(1)
        .stderr(predicate::str::contains("configuration error"));
}
