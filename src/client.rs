//! Interface to the remote control plane.
//!
//! Every state change on the control plane is asynchronous: mutating calls
//! return once the request is accepted, and callers poll for the outcome.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::defect::BackendDefect;
use crate::handle::ResourceHandle;
use crate::status::RawStatus;
use crate::volume::{
    BackupStatusReport, ReplicationStatusReport, ResourceSnapshot, VolumePatch, VolumeRequest,
};

/// Remote operation names used in errors and logs.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Operation {
    /// Fetch a resource.
    Get,
    /// Create or replace a resource.
    Create,
    /// Patch a resource.
    Update,
    /// Delete a resource.
    Delete,
    /// Probe a replication relationship.
    ReplicationStatus,
    /// Authorize replication from the primary side.
    AuthorizeReplication,
    /// Break a replication relationship.
    BreakReplication,
    /// Remove a replication relationship record.
    DeleteReplication,
    /// Probe the backup relationship.
    BackupStatus,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Get => "get",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::ReplicationStatus => "replication status",
            Self::AuthorizeReplication => "authorize replication",
            Self::BreakReplication => "break replication",
            Self::DeleteReplication => "delete replication",
            Self::BackupStatus => "backup status",
        };
        f.write_str(label)
    }
}

/// Failure reported by a [`RemoteResourceClient`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("{operation} on {target} failed ({status}): {message}")]
pub struct ClientError {
    /// Operation that failed.
    pub operation: Operation,
    /// Resource the operation addressed.
    pub target: String,
    /// Transport status of the failed call.
    pub status: RawStatus,
    /// Provider error code, when supplied.
    pub code: Option<String>,
    /// Provider error message.
    pub message: String,
}

impl ClientError {
    /// Builds an error for `operation` against `target`.
    #[must_use]
    pub fn new(
        operation: Operation,
        target: &ResourceHandle,
        status: RawStatus,
        message: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            target: target.to_string(),
            status,
            code: None,
            message: message.into(),
        }
    }

    /// Attaches the provider error code.
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Returns `true` when the call failed because the resource is absent.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        self.status.is_not_found()
    }

    /// Returns `true` when the call failed because the resource is absent or
    /// gone.
    #[must_use]
    pub const fn is_gone(&self) -> bool {
        self.status.is_gone()
    }

    /// Returns the known backend defect this error is an instance of.
    #[must_use]
    pub fn defect(&self) -> Option<BackendDefect> {
        BackendDefect::recognise(self)
    }
}

/// Future returned by client operations.
pub type ClientFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ClientError>> + Send + 'a>>;

/// Narrow interface to the asynchronous control plane.
pub trait RemoteResourceClient: Send + Sync {
    /// Fetches a volume. A missing volume is reported as a snapshot with a
    /// not-found status rather than an error.
    fn get<'a>(&'a self, handle: &'a ResourceHandle) -> ClientFuture<'a, ResourceSnapshot>;

    /// Submits a create request and returns the accepted status.
    fn create<'a>(
        &'a self,
        handle: &'a ResourceHandle,
        request: &'a VolumeRequest,
    ) -> ClientFuture<'a, RawStatus>;

    /// Submits a patch and returns the accepted status.
    fn update<'a>(
        &'a self,
        handle: &'a ResourceHandle,
        patch: &'a VolumePatch,
    ) -> ClientFuture<'a, RawStatus>;

    /// Submits a delete request and returns the accepted status.
    fn delete<'a>(&'a self, handle: &'a ResourceHandle) -> ClientFuture<'a, RawStatus>;

    /// Probes the replication relationship of a volume. A missing
    /// relationship is reported as an absent report rather than an error.
    fn replication_status<'a>(
        &'a self,
        handle: &'a ResourceHandle,
    ) -> ClientFuture<'a, ReplicationStatusReport>;

    /// Authorizes replication on `primary` towards `secondary`.
    fn authorize_replication<'a>(
        &'a self,
        primary: &'a ResourceHandle,
        secondary: &'a ResourceHandle,
    ) -> ClientFuture<'a, RawStatus>;

    /// Breaks the relationship, issued from the destination endpoint.
    fn break_replication<'a>(
        &'a self,
        secondary: &'a ResourceHandle,
        force: bool,
    ) -> ClientFuture<'a, ()>;

    /// Deletes the relationship record, issued from the destination endpoint.
    fn delete_replication<'a>(&'a self, secondary: &'a ResourceHandle) -> ClientFuture<'a, ()>;

    /// Probes the backup relationship of a volume.
    fn backup_status<'a>(
        &'a self,
        handle: &'a ResourceHandle,
    ) -> ClientFuture<'a, BackupStatusReport>;
}
