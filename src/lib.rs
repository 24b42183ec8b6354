//! Core library for the Strata volume provisioning tool.
//!
//! The crate drives long-running operations against a remote storage control
//! plane: it creates volumes and waits for them to settle, authorizes
//! cross-region replication, tears replication down in the order the
//! provider accepts, and deletes volumes once nothing depends on them. Every
//! wait goes through the debounced [`poller`] so stale reads from the control
//! plane cannot end a wait early.

pub mod arm;
pub mod client;
pub mod config;
pub mod defect;
pub mod deletion;
pub mod error;
pub mod handle;
pub mod lifecycle;
pub mod poller;
pub mod provision;
pub mod replication;
pub mod status;
pub mod test_support;
pub mod volume;
mod waits;

pub use arm::{ArmClient, ArmClientError};
pub use client::{ClientError, ClientFuture, Operation, RemoteResourceClient};
pub use config::{ConfigError, StrataConfig};
pub use defect::BackendDefect;
pub use deletion::{DeletionOutcome, Deprovisioner};
pub use error::LifecycleError;
pub use handle::{HandleError, ResourceHandle, ResourceKind};
pub use lifecycle::VolumeLifecycle;
pub use poller::{Deadline, Observation, PollError, PollSpec, PollSpecError, PollTiming, poll};
pub use provision::Provisioner;
pub use replication::{ReplicationTeardown, TeardownStage};
pub use status::{
    Direction, EndpointType, MirrorState, ProvisioningStatus, RawStatus, RelationshipStatus,
};
pub use volume::{
    BackupSettings, BackupStatusReport, DataProtection, ReplicationSettings,
    ReplicationStatusReport, RequestError, ResourceSnapshot, Volume, VolumePatch, VolumeRequest,
    VolumeRequestBuilder,
};
