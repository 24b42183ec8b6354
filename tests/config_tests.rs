//! Unit tests for configuration loading and validation.

use std::time::Duration;

use rstest::*;
use strata::config::{ConfigError, DEFAULT_API_ENDPOINT, DEFAULT_API_VERSION};
use strata::test_support::EnvGuard;
use strata::{ArmClient, ArmClientError, PollTiming, StrataConfig};

const STRATA_VARS: [&str; 9] = [
    "STRATA_CONFIG_PATH",
    "STRATA_API_ENDPOINT",
    "STRATA_API_VERSION",
    "STRATA_POLL_INTERVAL_SECS",
    "STRATA_MIN_SETTLE_SECS",
    "STRATA_CONTINUOUS_OCCURRENCES",
    "STRATA_CREATE_TIMEOUT_MINS",
    "STRATA_DELETE_TIMEOUT_MINS",
    "STRATA_PREVENT_VOLUME_DESTRUCTION",
];

#[fixture]
fn valid_config() -> StrataConfig {
    StrataConfig {
        api_endpoint: String::from(DEFAULT_API_ENDPOINT),
        api_version: String::from(DEFAULT_API_VERSION),
        bearer_token: String::from("token-value"),
        poll_interval_secs: 10,
        min_settle_secs: 10,
        continuous_occurrences: 5,
        create_timeout_mins: 90,
        delete_timeout_mins: 60,
        prevent_volume_destruction: true,
    }
}

#[rstest]
fn config_validation_rejects_missing_token_with_actionable_error(valid_config: StrataConfig) {
    let cfg = StrataConfig {
        bearer_token: String::from("  "),
        ..valid_config
    };

    let error = cfg.validate().expect_err("token is required");
    let ConfigError::MissingField(ref message) = error else {
        panic!("expected MissingField error, got {error:?}");
    };
    assert!(
        message.contains("STRATA_BEARER_TOKEN"),
        "error should mention env var: {message}"
    );
    assert!(
        message.contains("strata.toml"),
        "error should mention config file: {message}"
    );
    assert!(
        message.contains("bearer_token"),
        "error should mention TOML key: {message}"
    );
}

#[rstest]
#[case::poll_interval(|cfg: &mut StrataConfig| cfg.poll_interval_secs = 0, "STRATA_POLL_INTERVAL_SECS")]
#[case::occurrences(|cfg: &mut StrataConfig| cfg.continuous_occurrences = 0, "STRATA_CONTINUOUS_OCCURRENCES")]
#[case::create_timeout(|cfg: &mut StrataConfig| cfg.create_timeout_mins = 0, "STRATA_CREATE_TIMEOUT_MINS")]
#[case::delete_timeout(|cfg: &mut StrataConfig| cfg.delete_timeout_mins = 0, "STRATA_DELETE_TIMEOUT_MINS")]
fn config_validation_rejects_zero_settings(
    valid_config: StrataConfig,
    #[case] mutate: fn(&mut StrataConfig),
    #[case] env_var: &str,
) {
    let mut cfg = valid_config;
    mutate(&mut cfg);

    let error = cfg.validate().expect_err("zero is out of range");
    assert!(
        matches!(error, ConfigError::InvalidValue(ref message) if message.contains(env_var)),
        "unexpected error: {error:?}"
    );
}

#[rstest]
fn config_derives_timing_and_budgets(valid_config: StrataConfig) {
    assert_eq!(
        valid_config.poll_timing(),
        PollTiming {
            interval: Duration::from_secs(10),
            min_settle: Duration::from_secs(10),
            continuous_occurrences: 5,
        }
    );
    assert_eq!(valid_config.create_timeout(), Duration::from_secs(90 * 60));
    assert_eq!(valid_config.delete_timeout(), Duration::from_secs(60 * 60));
}

#[rstest]
fn arm_client_refuses_invalid_config(valid_config: StrataConfig) {
    let cfg = StrataConfig {
        bearer_token: String::new(),
        ..valid_config
    };

    let error = ArmClient::new(&cfg).expect_err("blank token is rejected");
    assert!(matches!(error, ArmClientError::Config(ref message) if message.contains("STRATA_BEARER_TOKEN")));
}

#[tokio::test]
async fn config_loads_defaults_and_environment_overrides() {
    let _guard = EnvGuard::set_vars(
        &[
            ("STRATA_BEARER_TOKEN", "env-token"),
            ("STRATA_POLL_INTERVAL_SECS", "3"),
            ("STRATA_PREVENT_VOLUME_DESTRUCTION", "false"),
        ],
        &STRATA_VARS
            .iter()
            .copied()
            .filter(|key| !matches!(*key, "STRATA_POLL_INTERVAL_SECS" | "STRATA_PREVENT_VOLUME_DESTRUCTION"))
            .collect::<Vec<_>>(),
    )
    .await;

    let cfg = StrataConfig::load_without_cli_args().expect("config should load from env");

    assert_eq!(cfg.bearer_token, "env-token");
    assert_eq!(cfg.poll_interval_secs, 3);
    assert!(!cfg.prevent_volume_destruction);
    assert_eq!(cfg.api_endpoint, DEFAULT_API_ENDPOINT);
    assert_eq!(cfg.api_version, DEFAULT_API_VERSION);
    assert_eq!(cfg.continuous_occurrences, 5);
    cfg.validate().expect("loaded config should validate");
}
