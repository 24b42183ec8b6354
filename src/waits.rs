//! Poll recipes shared by the orchestrators.

use std::fmt;

use tracing::info;

use crate::client::{ClientError, RemoteResourceClient};
use crate::defect::BackendDefect;
use crate::error::LifecycleError;
use crate::handle::ResourceHandle;
use crate::poller::{Deadline, Observation, PollSpec, PollTiming, poll};
use crate::status::{Direction, RelationshipStatus};
use crate::volume::{ReplicationStatusReport, ResourceSnapshot, VolumePatch};

/// Whether a backup transfer is running.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum BackupActivity {
    Transferring,
    Idle,
}

impl fmt::Display for BackupActivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transferring => f.write_str("transferring"),
            Self::Idle => f.write_str("idle"),
        }
    }
}

/// Fetches a volume, folding a not-found or gone error into a snapshot
/// without a volume that keeps the reported status.
pub(crate) async fn fetch_volume<C>(
    client: &C,
    handle: &ResourceHandle,
) -> Result<ResourceSnapshot, ClientError>
where
    C: RemoteResourceClient + ?Sized,
{
    match client.get(handle).await {
        Ok(snapshot) => Ok(snapshot),
        Err(err) if err.is_gone() => Ok(ResourceSnapshot {
            raw: err.status,
            volume: None,
        }),
        Err(err) => Err(err),
    }
}

/// Polls the volume until it settles in `direction`.
pub(crate) async fn await_volume<C>(
    client: &C,
    handle: &ResourceHandle,
    direction: Direction,
    label: &'static str,
    timing: PollTiming,
    deadline: Deadline,
    tolerated: &[BackendDefect],
) -> Result<ResourceSnapshot, LifecycleError>
where
    C: RemoteResourceClient + ?Sized,
{
    let spec = PollSpec::new(label, direction.pending(), direction.target())?
        .with_timing(timing)
        .with_timeout(deadline.remaining())
        .tolerating(tolerated);

    let snapshot = poll(&spec, || async move {
        let snapshot = fetch_volume(client, handle).await?;
        Ok::<_, ClientError>(Observation::new(direction.classify(snapshot.raw), snapshot))
    })
    .await?;
    Ok(snapshot)
}

/// Polls the replication relationship of `handle` until `spec` is met.
pub(crate) async fn await_relationship<C>(
    client: &C,
    handle: &ResourceHandle,
    spec: &PollSpec<RelationshipStatus>,
) -> Result<ReplicationStatusReport, LifecycleError>
where
    C: RemoteResourceClient + ?Sized,
{
    let report = poll(spec, || async move {
        let report = client.replication_status(handle).await?;
        Ok::<_, ClientError>(Observation::new(report.relationship(), report))
    })
    .await?;
    Ok(report)
}

/// Polls the backup relationship until no transfer is running.
pub(crate) async fn await_backup_idle<C>(
    client: &C,
    handle: &ResourceHandle,
    timing: PollTiming,
    deadline: Deadline,
) -> Result<(), LifecycleError>
where
    C: RemoteResourceClient + ?Sized,
{
    let spec = PollSpec::new(
        "backup transfer to finish",
        vec![BackupActivity::Transferring],
        vec![BackupActivity::Idle],
    )?
    .with_timing(timing)
    .with_timeout(deadline.remaining());

    poll(&spec, || async move {
        let activity = match client.backup_status(handle).await {
            Ok(report) if report.is_transferring() => BackupActivity::Transferring,
            Ok(_) => BackupActivity::Idle,
            Err(err) if err.is_not_found() => BackupActivity::Idle,
            Err(err) => return Err(err),
        };
        Ok::<_, ClientError>(Observation::new(activity, ()))
    })
    .await?;
    Ok(())
}

/// Submits `patch` and waits until the volume settles again.
pub(crate) async fn apply_patch<C>(
    client: &C,
    handle: &ResourceHandle,
    patch: &VolumePatch,
    timing: PollTiming,
    deadline: Deadline,
) -> Result<ResourceSnapshot, LifecycleError>
where
    C: RemoteResourceClient + ?Sized,
{
    let accepted = client.update(handle, patch).await?;
    info!(volume = %handle, status = %accepted, "update accepted");
    let snapshot = await_volume(
        client,
        handle,
        Direction::Appearing,
        "volume update to settle",
        timing,
        deadline,
        &[],
    )
    .await?;
    Ok(snapshot)
}
