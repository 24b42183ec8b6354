//! Creation and update of volumes.
//!
//! Creation is check-then-create: an existing volume is reported as
//! [`LifecycleError::AlreadyExists`] and never overwritten. A destination
//! volume additionally authorizes replication on its primary and waits for
//! the relationship to appear there.

use tracing::{info, instrument};

use crate::client::{ClientError, RemoteResourceClient};
use crate::defect::BackendDefect;
use crate::error::LifecycleError;
use crate::handle::ResourceHandle;
use crate::poller::{Deadline, Observation, PollSpec, PollTiming, poll};
use crate::status::{Direction, ProvisioningStatus};
use crate::volume::{ReplicationSettings, Volume, VolumePatch, VolumeRequest};
use crate::waits::{apply_patch, await_volume, fetch_volume};

const AUTHORIZATION_DEFECTS: [BackendDefect; 2] = [
    BackendDefect::InterimBadRequest,
    BackendDefect::StatusWhileDeleting,
];

/// Drives volume creation and updates against a control plane.
#[derive(Debug)]
pub struct Provisioner<'a, C: ?Sized> {
    client: &'a C,
    timing: PollTiming,
}

impl<'a, C> Provisioner<'a, C>
where
    C: RemoteResourceClient + ?Sized,
{
    /// Creates a provisioner using default poll timing.
    #[must_use]
    pub fn new(client: &'a C) -> Self {
        Self {
            client,
            timing: PollTiming::default(),
        }
    }

    /// Overrides the poll timing.
    #[must_use]
    pub const fn with_timing(mut self, timing: PollTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Creates the volume at `handle` and waits until it is ready.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::AlreadyExists`] when the volume exists,
    /// [`LifecycleError::Request`] or a poll error when creation fails, and
    /// [`LifecycleError::PartiallyProvisioned`] when the volume was created
    /// but replication could not be authorized.
    #[instrument(skip_all, fields(volume = %handle))]
    pub async fn provision(
        &self,
        handle: &ResourceHandle,
        request: &VolumeRequest,
        deadline: Deadline,
    ) -> Result<ResourceHandle, LifecycleError> {
        request.validate()?;

        let existing = fetch_volume(self.client, handle).await?;
        if existing.volume.is_some() {
            return Err(LifecycleError::AlreadyExists {
                handle: handle.to_string(),
            });
        }

        let accepted = self.client.create(handle, request).await?;
        info!(status = %accepted, "create accepted");

        await_volume(
            self.client,
            handle,
            Direction::Appearing,
            "volume creation",
            self.timing,
            deadline,
            &[],
        )
        .await?;
        info!("volume ready");

        if let Some(replication) = request.destination_replication() {
            self.authorize(handle, replication, deadline)
                .await
                .map_err(|source| LifecycleError::PartiallyProvisioned {
                    handle: handle.to_string(),
                    source: Box::new(source),
                })?;
        }

        Ok(handle.clone())
    }

    async fn authorize(
        &self,
        secondary: &ResourceHandle,
        replication: &ReplicationSettings,
        deadline: Deadline,
    ) -> Result<(), LifecycleError> {
        let primary = &replication.remote_volume;
        info!(%primary, "authorizing replication on primary");
        self.client.authorize_replication(primary, secondary).await?;

        let spec = PollSpec::new(
            "replication authorization",
            Direction::Appearing.pending(),
            vec![ProvisioningStatus::Succeeded],
        )?
        .with_timing(self.timing)
        .with_timeout(deadline.remaining())
        .tolerating(&AUTHORIZATION_DEFECTS);

        let client = self.client;
        poll(&spec, || async move {
            let report = client.replication_status(primary).await?;
            let status = Direction::Appearing.classify(report.raw);
            Ok::<_, ClientError>(Observation::new(status, ()))
        })
        .await?;
        info!(%primary, "replication authorized");
        Ok(())
    }

    /// Applies `patch` to an existing volume and waits until it settles.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::ResourceMissing`] when the volume does not
    /// exist, or the failure of the update or its poll.
    #[instrument(skip_all, fields(volume = %handle))]
    pub async fn update(
        &self,
        handle: &ResourceHandle,
        patch: &VolumePatch,
        deadline: Deadline,
    ) -> Result<Volume, LifecycleError> {
        let missing = || LifecycleError::ResourceMissing {
            handle: handle.to_string(),
        };
        let existing = fetch_volume(self.client, handle)
            .await?
            .volume
            .ok_or_else(missing)?;
        if patch.is_empty() {
            info!("patch is empty; nothing to update");
            return Ok(existing);
        }

        let snapshot = apply_patch(self.client, handle, patch, self.timing, deadline).await?;
        snapshot.volume.ok_or_else(missing)
    }
}
