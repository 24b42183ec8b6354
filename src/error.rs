//! Errors surfaced by the lifecycle orchestrators.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::client::ClientError;
use crate::poller::{PollError, PollSpecError};
use crate::volume::RequestError;

/// Errors raised while creating, updating or deleting a volume.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum LifecycleError {
    /// Raised when the volume already exists and must be imported instead.
    #[error("{handle} already exists and must be imported to be managed")]
    AlreadyExists {
        /// Address of the existing volume.
        handle: String,
    },
    /// Raised when an operation expected the volume to exist.
    #[error("{handle} was not found")]
    ResourceMissing {
        /// Address of the missing volume.
        handle: String,
    },
    /// Raised when the create request fails validation.
    #[error("invalid volume request: {0}")]
    InvalidRequest(#[from] RequestError),
    /// Raised when a remote call fails outright.
    #[error(transparent)]
    Request(#[from] ClientError),
    /// Raised when a poll exhausts the deadline.
    #[error("timed out after {waited:?} waiting for {label} (last status: {})", display_status(.last_status.as_deref()))]
    PollTimeout {
        /// Poll label.
        label: &'static str,
        /// Time spent polling.
        waited: Duration,
        /// Last status observed.
        last_status: Option<String>,
    },
    /// Raised when a poll observes a status it cannot classify.
    #[error("unexpected status '{status}' while waiting for {label}")]
    UnexpectedStatus {
        /// Poll label.
        label: &'static str,
        /// Observed status.
        status: String,
    },
    /// Raised when a poll is configured inconsistently.
    #[error(transparent)]
    InvalidPoll(#[from] PollSpecError),
    /// Raised when a teardown step runs from the wrong stage.
    #[error("cannot {step} while the replication teardown is {stage}")]
    Precondition {
        /// Step that was attempted.
        step: &'static str,
        /// Stage the teardown was in.
        stage: String,
    },
    /// Raised when the volume was created but replication authorization failed.
    ///
    /// The volume must not be re-created; authorization can be retried.
    #[error("{handle} was created but replication authorization failed: {source}")]
    PartiallyProvisioned {
        /// Address of the created volume.
        handle: String,
        /// Authorization failure.
        #[source]
        source: Box<LifecycleError>,
    },
    /// Raised when replication teardown fails before deletion.
    #[error("replication teardown for {handle} failed: {source}")]
    ReplicationTeardown {
        /// Destination endpoint the teardown ran against.
        handle: String,
        /// Teardown failure.
        #[source]
        source: Box<LifecycleError>,
    },
    /// Raised when the delete request is refused.
    #[error("delete of {handle} was rejected: {source}")]
    DeleteRejected {
        /// Address of the volume.
        handle: String,
        /// Client failure.
        #[source]
        source: ClientError,
    },
    /// Raised when the delete request was accepted but the volume never
    /// disappeared.
    #[error("{handle} still present after {waited:?} (last status: {})", display_status(.last_status.as_deref()))]
    DeleteNotConverged {
        /// Address of the volume.
        handle: String,
        /// Time spent polling.
        waited: Duration,
        /// Last status observed.
        last_status: Option<String>,
    },
    /// Raised when destruction is disabled by configuration.
    #[error(
        "refusing to delete {handle}: prevent_volume_destruction is enabled (set STRATA_PREVENT_VOLUME_DESTRUCTION=false to allow it)"
    )]
    DestructionPrevented {
        /// Address of the volume.
        handle: String,
    },
}

fn display_status(status: Option<&str>) -> &str {
    status.unwrap_or("none observed")
}

impl<S> From<PollError<S>> for LifecycleError
where
    S: fmt::Debug + fmt::Display,
{
    fn from(value: PollError<S>) -> Self {
        match value {
            PollError::Timeout {
                label,
                waited,
                last_status,
            } => Self::PollTimeout {
                label,
                waited,
                last_status: last_status.map(|status| status.to_string()),
            },
            PollError::UnexpectedStatus { label, status } => Self::UnexpectedStatus {
                label,
                status: status.to_string(),
            },
            PollError::Fetch { source, .. } => Self::Request(source),
        }
    }
}
