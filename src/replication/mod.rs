//! Replication teardown state machine.
//!
//! A relationship can only be removed in order: it must be observed
//! `Mirrored` before it is broken, observed `Broken` before the record is
//! deleted, and observed absent before the volume itself may go. Every step
//! is a method that refuses to run from the wrong [`TeardownStage`], and
//! [`ReplicationTeardown::run`] drives them in sequence.
//!
//! All calls are issued against the destination endpoint.

use std::fmt;

use tracing::{debug, info, instrument};

use crate::client::RemoteResourceClient;
use crate::defect::BackendDefect;
use crate::error::LifecycleError;
use crate::handle::ResourceHandle;
use crate::poller::{Deadline, PollSpec, PollTiming};
use crate::status::{MirrorState, RelationshipStatus};
use crate::waits::await_relationship;

const REMOVAL_DEFECTS: [BackendDefect; 2] = [
    BackendDefect::StatusWhileDeleting,
    BackendDefect::InterimBadRequest,
];

/// Progress of a replication teardown.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TeardownStage {
    /// The relationship has not been probed yet.
    Unobserved,
    /// The relationship was probed in the given state.
    Observed(MirrorState),
    /// A break was submitted.
    BreakRequested,
    /// The relationship is broken.
    Broken,
    /// Deletion of the relationship record was submitted.
    DeletionRequested,
    /// No relationship record remains.
    Removed,
}

impl fmt::Display for TeardownStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unobserved => f.write_str("unobserved"),
            Self::Observed(state) => write!(f, "observed {state}"),
            Self::BreakRequested => f.write_str("break requested"),
            Self::Broken => f.write_str("broken"),
            Self::DeletionRequested => f.write_str("deletion requested"),
            Self::Removed => f.write_str("removed"),
        }
    }
}

/// Tears down the replication relationship of one destination volume.
#[derive(Debug)]
pub struct ReplicationTeardown<'a, C: ?Sized> {
    client: &'a C,
    secondary: &'a ResourceHandle,
    timing: PollTiming,
    deadline: Deadline,
    stage: TeardownStage,
}

impl<'a, C> ReplicationTeardown<'a, C>
where
    C: RemoteResourceClient + ?Sized,
{
    /// Prepares a teardown of the relationship held by `secondary`.
    #[must_use]
    pub fn new(client: &'a C, secondary: &'a ResourceHandle, deadline: Deadline) -> Self {
        Self {
            client,
            secondary,
            timing: PollTiming::default(),
            deadline,
            stage: TeardownStage::Unobserved,
        }
    }

    /// Overrides the poll timing.
    #[must_use]
    pub const fn with_timing(mut self, timing: PollTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Current stage.
    #[must_use]
    pub const fn stage(&self) -> TeardownStage {
        self.stage
    }

    fn precondition(&self, step: &'static str) -> LifecycleError {
        LifecycleError::Precondition {
            step,
            stage: self.stage.to_string(),
        }
    }

    fn advance(&mut self, next: TeardownStage) {
        info!(secondary = %self.secondary, from = %self.stage, to = %next, "replication teardown advanced");
        self.stage = next;
    }

    fn spec(
        &self,
        label: &'static str,
        pending: Vec<RelationshipStatus>,
        target: Vec<RelationshipStatus>,
    ) -> Result<PollSpec<RelationshipStatus>, LifecycleError> {
        Ok(PollSpec::new(label, pending, target)?
            .with_timing(self.timing)
            .with_timeout(self.deadline.remaining()))
    }

    /// Probes the relationship once.
    ///
    /// An absent relationship ends the teardown. An initial `Broken` state
    /// skips ahead to deletion, and a probe that reports the record as
    /// already deleting skips ahead to the removal wait.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Precondition`] unless the teardown is
    /// unobserved, or the probe failure.
    pub async fn observe(&mut self) -> Result<TeardownStage, LifecycleError> {
        if self.stage != TeardownStage::Unobserved {
            return Err(self.precondition("observe the relationship"));
        }
        let next = match self.client.replication_status(self.secondary).await {
            Ok(report) => match report.relationship() {
                RelationshipStatus::Absent => TeardownStage::Removed,
                RelationshipStatus::Present(MirrorState::Broken) => TeardownStage::Broken,
                RelationshipStatus::Present(state) => TeardownStage::Observed(state),
                RelationshipStatus::Unreported => {
                    debug!(secondary = %self.secondary, "mirror state unreported; treating as uninitialized");
                    TeardownStage::Observed(MirrorState::Uninitialized)
                }
            },
            Err(err) if err.is_not_found() => TeardownStage::Removed,
            Err(err) if err.defect() == Some(BackendDefect::StatusWhileDeleting) => {
                TeardownStage::DeletionRequested
            }
            Err(err) => return Err(err.into()),
        };
        self.advance(next);
        Ok(next)
    }

    /// Waits for a freshly authorized relationship to reach `Mirrored`.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Precondition`] unless the relationship was
    /// observed `Uninitialized`, or the poll failure.
    pub async fn await_mirrored(&mut self) -> Result<(), LifecycleError> {
        if self.stage != TeardownStage::Observed(MirrorState::Uninitialized) {
            return Err(self.precondition("wait for mirroring"));
        }
        let spec = self.spec(
            "replication to reach mirrored",
            vec![
                RelationshipStatus::Present(MirrorState::Uninitialized),
                RelationshipStatus::Unreported,
            ],
            vec![RelationshipStatus::Present(MirrorState::Mirrored)],
        )?;
        await_relationship(self.client, self.secondary, &spec).await?;
        self.advance(TeardownStage::Observed(MirrorState::Mirrored));
        Ok(())
    }

    /// Submits a forced break from the destination endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Precondition`] unless `Mirrored` was
    /// observed, or the request failure.
    pub async fn break_relationship(&mut self) -> Result<(), LifecycleError> {
        if self.stage != TeardownStage::Observed(MirrorState::Mirrored) {
            return Err(self.precondition("break the relationship"));
        }
        self.client.break_replication(self.secondary, true).await?;
        self.advance(TeardownStage::BreakRequested);
        Ok(())
    }

    /// Waits until the relationship reports `Broken`.
    ///
    /// A relationship that disappears meanwhile also satisfies the wait and
    /// ends the teardown.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Precondition`] unless a break was requested,
    /// or the poll failure.
    pub async fn await_broken(&mut self) -> Result<(), LifecycleError> {
        if self.stage != TeardownStage::BreakRequested {
            return Err(self.precondition("wait for the break"));
        }
        let spec = self.spec(
            "replication to break",
            vec![
                RelationshipStatus::Present(MirrorState::Mirrored),
                RelationshipStatus::Present(MirrorState::Uninitialized),
                RelationshipStatus::Unreported,
            ],
            vec![
                RelationshipStatus::Present(MirrorState::Broken),
                RelationshipStatus::Absent,
            ],
        )?;
        let report = await_relationship(self.client, self.secondary, &spec).await?;
        let next = if report.relationship() == RelationshipStatus::Absent {
            TeardownStage::Removed
        } else {
            TeardownStage::Broken
        };
        self.advance(next);
        Ok(())
    }

    /// Submits deletion of the relationship record.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Precondition`] unless `Broken` was observed,
    /// or the request failure.
    pub async fn delete_relationship(&mut self) -> Result<(), LifecycleError> {
        if self.stage != TeardownStage::Broken {
            return Err(self.precondition("delete the relationship"));
        }
        match self.client.delete_replication(self.secondary).await {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {
                self.advance(TeardownStage::Removed);
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        }
        self.advance(TeardownStage::DeletionRequested);
        Ok(())
    }

    /// Waits until no relationship record remains.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Precondition`] unless deletion was
    /// requested, or the poll failure.
    pub async fn await_removal(&mut self) -> Result<(), LifecycleError> {
        if self.stage != TeardownStage::DeletionRequested {
            return Err(self.precondition("wait for relationship removal"));
        }
        let spec = self
            .spec(
                "replication record removal",
                RelationshipStatus::any_present(),
                vec![RelationshipStatus::Absent],
            )?
            .tolerating(&REMOVAL_DEFECTS);
        await_relationship(self.client, self.secondary, &spec).await?;
        self.advance(TeardownStage::Removed);
        Ok(())
    }

    /// Drives the teardown from its current stage until the relationship is
    /// removed.
    ///
    /// # Errors
    ///
    /// Returns the first failing step's error.
    #[instrument(skip_all, fields(secondary = %self.secondary))]
    pub async fn run(&mut self) -> Result<(), LifecycleError> {
        loop {
            match self.stage {
                TeardownStage::Unobserved => {
                    self.observe().await?;
                }
                TeardownStage::Observed(MirrorState::Uninitialized) => self.await_mirrored().await?,
                TeardownStage::Observed(MirrorState::Mirrored) => {
                    self.break_relationship().await?;
                }
                TeardownStage::Observed(MirrorState::Broken) => self.stage = TeardownStage::Broken,
                TeardownStage::BreakRequested => self.await_broken().await?,
                TeardownStage::Broken => self.delete_relationship().await?,
                TeardownStage::DeletionRequested => self.await_removal().await?,
                TeardownStage::Removed => return Ok(()),
            }
        }
    }
}

#[cfg(test)]
mod tests;
