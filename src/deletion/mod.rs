//! Volume deletion.
//!
//! Deleting a replicated volume first tears the relationship down from the
//! destination endpoint, then strips backup and snapshot policies, and only
//! then deletes the volume and waits for it to disappear.

use tracing::{info, instrument};

use crate::client::RemoteResourceClient;
use crate::error::LifecycleError;
use crate::handle::ResourceHandle;
use crate::poller::{Deadline, PollTiming};
use crate::replication::ReplicationTeardown;
use crate::status::Direction;
use crate::volume::{Volume, VolumePatch};
use crate::waits::{apply_patch, await_backup_idle, await_volume, fetch_volume};

/// What a successful delete actually did.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeletionOutcome {
    /// The volume did not exist; nothing was touched.
    AlreadyAbsent,
    /// The volume was deleted.
    Deleted,
}

/// Drives volume deletion against a control plane.
#[derive(Debug)]
pub struct Deprovisioner<'a, C: ?Sized> {
    client: &'a C,
    timing: PollTiming,
    prevent_destruction: bool,
}

impl<'a, C> Deprovisioner<'a, C>
where
    C: RemoteResourceClient + ?Sized,
{
    /// Creates a deprovisioner with default timing and destruction allowed.
    #[must_use]
    pub fn new(client: &'a C) -> Self {
        Self {
            client,
            timing: PollTiming::default(),
            prevent_destruction: false,
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
        self.prevent_destruction = prevent;
        self
    }

    /// Deletes the volume at `handle` and waits until it is gone.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::DestructionPrevented`] when the guard is
    /// set, [`LifecycleError::ReplicationTeardown`] when the relationship
    /// cannot be removed, [`LifecycleError::DeleteRejected`] when the delete
    /// call fails, and [`LifecycleError::DeleteNotConverged`] when the volume
    /// does not disappear before the deadline.
    #[instrument(skip_all, fields(volume = %handle))]
    pub async fn delete(
        &self,
        handle: &ResourceHandle,
        deadline: Deadline,
    ) -> Result<DeletionOutcome, LifecycleError> {
        let Some(volume) = fetch_volume(self.client, handle).await?.volume else {
            info!("volume already absent");
            return Ok(DeletionOutcome::AlreadyAbsent);
        };

        if self.prevent_destruction {
            return Err(LifecycleError::DestructionPrevented {
                handle: handle.to_string(),
            });
        }

        if let Some(secondary) = volume.replication_destination() {
            info!(%secondary, "tearing down replication");
            ReplicationTeardown::new(self.client, &secondary, deadline)
                .with_timing(self.timing)
                .run()
                .await
                .map_err(|source| LifecycleError::ReplicationTeardown {
                    handle: secondary.to_string(),
                    source: Box::new(source),
                })?;
        }

        self.release_backup(handle, &volume, deadline).await?;
        self.release_snapshot_policy(handle, &volume, deadline).await?;

        match self.client.delete(handle).await {
            Ok(raw) if raw.is_gone() => {
                info!("volume vanished before delete");
                return Ok(DeletionOutcome::Deleted);
            }
            Ok(raw) => info!(status = %raw, "delete accepted"),
            Err(err) if err.is_gone() => {
                info!("volume vanished before delete");
                return Ok(DeletionOutcome::Deleted);
            }
            Err(source) => {
                return Err(LifecycleError::DeleteRejected {
                    handle: handle.to_string(),
                    source,
                });
            }
        }

        await_volume(
            self.client,
            handle,
            Direction::Disappearing,
            "volume deletion",
            self.timing,
            deadline,
            &[],
        )
        .await
        .map_err(|err| match err {
            LifecycleError::PollTimeout {
                waited,
                last_status,
                ..
            } => LifecycleError::DeleteNotConverged {
                handle: handle.to_string(),
                waited,
                last_status,
            },
            other => other,
        })?;
        info!("volume deleted");
        Ok(DeletionOutcome::Deleted)
    }

    async fn release_backup(
        &self,
        handle: &ResourceHandle,
        volume: &Volume,
        deadline: Deadline,
    ) -> Result<(), LifecycleError> {
        if volume.data_protection.backup.is_none() {
            return Ok(());
        }

        info!("releasing backup policy");
        await_backup_idle(self.client, handle, self.timing, deadline).await?;
        // Enforcement and the policy id cannot change in one request.
        apply_patch(
            self.client,
            handle,
            &VolumePatch::disable_backup_enforcement(),
            self.timing,
            deadline,
        )
        .await?;
        await_backup_idle(self.client, handle, self.timing, deadline).await?;
        apply_patch(
            self.client,
            handle,
            &VolumePatch::clear_backup_policy(),
            self.timing,
            deadline,
        )
        .await?;
        Ok(())
    }

    async fn release_snapshot_policy(
        &self,
        handle: &ResourceHandle,
        volume: &Volume,
        deadline: Deadline,
    ) -> Result<(), LifecycleError> {
        let Some(policy) = volume.data_protection.active_snapshot_policy() else {
            return Ok(());
        };
        info!(%policy, "dissociating snapshot policy");
        apply_patch(
            self.client,
            handle,
            &VolumePatch::clear_snapshot_policy(),
            self.timing,
            deadline,
        )
        .await?;
        Ok(())
    }
}
