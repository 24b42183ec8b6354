//! Entry points used by the CLI and embedding callers.

use std::time::Duration;

use crate::client::RemoteResourceClient;
use crate::deletion::{DeletionOutcome, Deprovisioner};
use crate::error::LifecycleError;
use crate::handle::ResourceHandle;
use crate::poller::{Deadline, PollTiming};
use crate::provision::Provisioner;
use crate::volume::{Volume, VolumePatch, VolumeRequest};
use crate::waits::fetch_volume;

/// Create, read, update and delete operations over one control plane.
///
/// Each mutating call takes a timeout that bounds every poll it performs.
#[derive(Debug)]
pub struct VolumeLifecycle<C> {
    client: C,
    timing: PollTiming,
    prevent_volume_destruction: bool,
}

impl<C> VolumeLifecycle<C>
where
    C: RemoteResourceClient,
{
    /// Wraps `client` with default timing and destruction allowed.
    #[must_use]
    pub fn new(client: C) -> Self {
        Self {
            client,
            timing: PollTiming::default(),
            prevent_volume_destruction: false,
        }
    }

    /// Overrides the poll timing.
    #[must_use]
    pub const fn with_timing(mut self, timing: PollTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Refuses to delete existing volumes when `prevent` is set.
    #[must_use]
    pub const fn with_destruction_guard(mut self, prevent: bool) -> Self {
        self.prevent_volume_destruction = prevent;
        self
    }

    /// Underlying client.
    #[must_use]
    pub const fn client(&self) -> &C {
        &self.client
    }

    /// Creates a volume and waits for it (and any replication authorization)
    /// to settle.
    ///
    /// # Errors
    ///
    /// See [`Provisioner::provision`].
    pub async fn create(
        &self,
        handle: &ResourceHandle,
        request: &VolumeRequest,
        timeout: Duration,
    ) -> Result<ResourceHandle, LifecycleError> {
        Provisioner::new(&self.client)
            .with_timing(self.timing)
            .provision(handle, request, Deadline::after(timeout))
            .await
    }

    /// Patches a volume and waits for it to settle.
    ///
    /// # Errors
    ///
    /// See [`Provisioner::update`].
    pub async fn update(
        &self,
        handle: &ResourceHandle,
        patch: &VolumePatch,
        timeout: Duration,
    ) -> Result<Volume, LifecycleError> {
        Provisioner::new(&self.client)
            .with_timing(self.timing)
            .update(handle, patch, Deadline::after(timeout))
            .await
    }

    /// Reads a volume.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::ResourceMissing`] when the volume does not
    /// exist, or the client failure.
    pub async fn read(&self, handle: &ResourceHandle) -> Result<Volume, LifecycleError> {
        fetch_volume(&self.client, handle)
            .await?
            .volume
            .ok_or_else(|| LifecycleError::ResourceMissing {
                handle: handle.to_string(),
            })
    }

    /// Deletes a volume, tearing down replication first.
    ///
    /// # Errors
    ///
    /// See [`Deprovisioner::delete`].
    pub async fn delete(
        &self,
        handle: &ResourceHandle,
        timeout: Duration,
    ) -> Result<DeletionOutcome, LifecycleError> {
        Deprovisioner::new(&self.client)
            .with_timing(self.timing)
            .with_destruction_guard(self.prevent_volume_destruction)
            .delete(handle, Deadline::after(timeout))
            .await
    }
}
