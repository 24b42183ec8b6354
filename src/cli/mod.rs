//! Command-line interface definitions for the `strata` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page. It
//! only depends on clap; resource ids stay strings until the binary parses
//! them.

use clap::{Args, Parser};

/// Top-level CLI for the `strata` binary.
#[derive(Debug, Parser)]
#[command(
    name = "strata",
    about = "Provision, update and tear down replicated NetApp volumes",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Create a volume and wait until it is ready.
    #[command(name = "create", about = "Create a volume and wait until it is ready")]
    Create(CreateCommand),
    /// Patch a volume and wait until it settles.
    #[command(name = "update", about = "Patch a volume and wait until it settles")]
    Update(UpdateCommand),
    /// Tear down replication and delete a volume.
    #[command(name = "delete", about = "Tear down replication and delete a volume")]
    Delete(TargetArgs),
    /// Print a volume as JSON.
    #[command(name = "show", about = "Print a volume as JSON")]
    Show(TargetArgs),
}

/// Identifies the volume a subcommand acts on.
#[derive(Debug, Args)]
pub(crate) struct TargetArgs {
    /// Full resource id of the volume
    /// (`/subscriptions/.../capacityPools/{pool}/volumes/{volume}`).
    #[arg(long = "volume", value_name = "ID")]
    pub(crate) volume: String,
}

/// Arguments for the `strata create` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct CreateCommand {
    #[command(flatten)]
    pub(crate) target: TargetArgs,
    /// Region to create the volume in.
    #[arg(long, value_name = "REGION")]
    pub(crate) location: String,
    /// Unique export path for the volume.
    #[arg(long, value_name = "PATH")]
    pub(crate) creation_token: String,
    /// Service level (`Standard`, `Premium` or `Ultra`).
    #[arg(long, value_name = "LEVEL")]
    pub(crate) service_level: String,
    /// Delegated subnet id.
    #[arg(long, value_name = "ID")]
    pub(crate) subnet_id: String,
    /// Quota in GiB.
    #[arg(long, value_name = "GIB")]
    pub(crate) quota_gb: u64,
    /// Enabled protocol; repeat for several. Defaults to `NFSv3`.
    #[arg(long = "protocol", value_name = "PROTOCOL")]
    pub(crate) protocols: Vec<String>,
    /// Replication endpoint type of this volume (`src` or `dst`).
    #[arg(long, value_name = "TYPE", requires = "remote_volume")]
    pub(crate) endpoint_type: Option<String>,
    /// Resource id of the volume on the other side of the relationship.
    #[arg(long, value_name = "ID", requires = "endpoint_type")]
    pub(crate) remote_volume: Option<String>,
    /// Replication schedule (for example `hourly`).
    #[arg(long, value_name = "SCHEDULE")]
    pub(crate) replication_schedule: Option<String>,
    /// Snapshot policy to associate with the volume.
    #[arg(long, value_name = "ID")]
    pub(crate) snapshot_policy_id: Option<String>,
    /// Tag as `key=value`; repeat for several.
    #[arg(long = "tag", value_name = "KEY=VALUE")]
    pub(crate) tags: Vec<String>,
}

/// Arguments for the `strata update` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct UpdateCommand {
    #[command(flatten)]
    pub(crate) target: TargetArgs,
    /// New quota in GiB.
    #[arg(long, value_name = "GIB")]
    pub(crate) quota_gb: Option<u64>,
    /// New snapshot policy; pass an empty string to dissociate it.
    #[arg(long, value_name = "ID")]
    pub(crate) snapshot_policy_id: Option<String>,
    /// Replacement tag as `key=value`; repeat for several.
    #[arg(long = "tag", value_name = "KEY=VALUE")]
    pub(crate) tags: Vec<String>,
}
