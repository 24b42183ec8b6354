//! Binary entry point for the Strata CLI.

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::process;
use std::str::FromStr;

use clap::Parser;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use strata::{
    ArmClient, DeletionOutcome, EndpointType, LifecycleError, ReplicationSettings, ResourceHandle,
    StrataConfig, VolumeLifecycle, VolumePatch, VolumeRequest,
};

mod cli;

use cli::{Cli, CreateCommand, TargetArgs, UpdateCommand};

#[derive(Debug, Error)]
enum CliError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("client error: {0}")]
    Client(String),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error("failed to write output: {0}")]
    Output(String),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("strata=info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

/// Parsed invocation, validated before any configuration is loaded.
enum Action {
    Create(ResourceHandle, VolumeRequest),
    Update(ResourceHandle, VolumePatch),
    Delete(ResourceHandle),
    Show(ResourceHandle),
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    let action = match cli {
        Cli::Create(command) => {
            let (handle, request) = create_request(command)?;
            Action::Create(handle, request)
        }
        Cli::Update(command) => {
            let (handle, patch) = update_patch(command)?;
            Action::Update(handle, patch)
        }
        Cli::Delete(target) => Action::Delete(parse_volume(&target)?),
        Cli::Show(target) => Action::Show(parse_volume(&target)?),
    };

    let config =
        StrataConfig::load_without_cli_args().map_err(|err| CliError::Config(err.to_string()))?;
    let client = ArmClient::new(&config).map_err(|err| CliError::Client(err.to_string()))?;
    let lifecycle = VolumeLifecycle::new(client)
        .with_timing(config.poll_timing())
        .with_destruction_guard(config.prevent_volume_destruction);

    match action {
        Action::Create(handle, request) => {
            let created = lifecycle
                .create(&handle, &request, config.create_timeout())
                .await?;
            info!(volume = %created, "volume created");
            write_line(&created.to_string())
        }
        Action::Update(handle, patch) => {
            let volume = lifecycle
                .update(&handle, &patch, config.create_timeout())
                .await?;
            write_json(&volume)
        }
        Action::Delete(handle) => {
            let outcome = lifecycle.delete(&handle, config.delete_timeout()).await?;
            let message = match outcome {
                DeletionOutcome::AlreadyAbsent => "already absent",
                DeletionOutcome::Deleted => "deleted",
            };
            write_line(&format!("{handle}: {message}"))
        }
        Action::Show(handle) => {
            let volume = lifecycle.read(&handle).await?;
            write_json(&volume)
        }
    }
}

fn parse_volume(target: &TargetArgs) -> Result<ResourceHandle, CliError> {
    parse_handle(&target.volume, "--volume")
}

fn parse_handle(value: &str, flag: &str) -> Result<ResourceHandle, CliError> {
    let handle = ResourceHandle::from_str(value)
        .map_err(|err| CliError::InvalidArgument(format!("{flag}: {err}")))?;
    if handle.volume_name().is_none() || handle.snapshot_name().is_some() {
        return Err(CliError::InvalidArgument(format!(
            "{flag}: expected a volume id, got {value}"
        )));
    }
    Ok(handle)
}

fn parse_tags(pairs: &[String]) -> Result<BTreeMap<String, String>, CliError> {
    pairs
        .iter()
        .map(|pair| {
            pair.split_once('=')
                .filter(|(key, _)| !key.trim().is_empty())
                .map(|(key, value)| (key.trim().to_owned(), value.to_owned()))
                .ok_or_else(|| {
                    CliError::InvalidArgument(format!("--tag: expected KEY=VALUE, got '{pair}'"))
                })
        })
        .collect()
}

fn create_request(command: CreateCommand) -> Result<(ResourceHandle, VolumeRequest), CliError> {
    let handle = parse_volume(&command.target)?;
    let replication = match (command.endpoint_type, command.remote_volume) {
        (Some(endpoint), Some(remote)) => Some(ReplicationSettings {
            endpoint_type: EndpointType::from_label(&endpoint).ok_or_else(|| {
                CliError::InvalidArgument(format!(
                    "--endpoint-type: expected 'src' or 'dst', got '{endpoint}'"
                ))
            })?,
            remote_volume: parse_handle(&remote, "--remote-volume")?,
            schedule: command.replication_schedule,
        }),
        _ => None,
    };

    let mut builder = VolumeRequest::builder()
        .location(command.location)
        .creation_token(command.creation_token)
        .service_level(command.service_level)
        .subnet_id(command.subnet_id)
        .quota_gb(command.quota_gb)
        .replication(replication)
        .snapshot_policy_id(command.snapshot_policy_id);
    for protocol in command.protocols {
        builder = builder.protocol(protocol);
    }
    for (key, value) in parse_tags(&command.tags)? {
        builder = builder.tag(key, value);
    }
    let request = builder
        .build()
        .map_err(|err| CliError::InvalidArgument(err.to_string()))?;
    Ok((handle, request))
}

fn update_patch(command: UpdateCommand) -> Result<(ResourceHandle, VolumePatch), CliError> {
    let handle = parse_volume(&command.target)?;
    let tags = if command.tags.is_empty() {
        None
    } else {
        Some(parse_tags(&command.tags)?)
    };
    let patch = VolumePatch {
        quota_gb: command.quota_gb,
        snapshot_policy_id: command.snapshot_policy_id,
        tags,
        ..VolumePatch::default()
    };
    Ok((handle, patch))
}

fn write_json(value: &impl serde::Serialize) -> Result<(), CliError> {
    let rendered =
        serde_json::to_string_pretty(value).map_err(|err| CliError::Output(err.to_string()))?;
    write_line(&rendered)
}

fn write_line(line: &str) -> Result<(), CliError> {
    writeln!(io::stdout(), "{line}").map_err(|err| CliError::Output(err.to_string()))
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}
