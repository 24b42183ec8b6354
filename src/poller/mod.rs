//! Generic "wait until the remote side settles" primitive.
//!
//! A [`PollSpec`] names the statuses that keep a poll running and the ones
//! that end it. The poller calls a fetch closure until a target status has
//! been observed `continuous_occurrences` times in a row, which absorbs the
//! single stale reads the control plane is known to produce.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{Instant, sleep, timeout_at};
use tracing::{debug, warn};

use crate::client::ClientError;
use crate::defect::BackendDefect;

const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);
const DEFAULT_MIN_SETTLE: Duration = Duration::from_secs(10);
const DEFAULT_CONTINUOUS_OCCURRENCES: u32 = 5;

/// Cadence shared by every poll of one orchestrated operation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PollTiming {
    /// Wait between two fetches.
    pub interval: Duration,
    /// Wait before the first fetch.
    pub min_settle: Duration,
    /// Consecutive target observations required to finish.
    pub continuous_occurrences: u32,
}

impl Default for PollTiming {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            min_settle: DEFAULT_MIN_SETTLE,
            continuous_occurrences: DEFAULT_CONTINUOUS_OCCURRENCES,
        }
    }
}

/// Point in time by which an orchestrated operation must finish.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Deadline(Instant);

impl Deadline {
    /// Deadline `timeout` from now.
    #[must_use]
    pub fn after(timeout: Duration) -> Self {
        Self(Instant::now() + timeout)
    }

    /// Budget left before the deadline, zero once it has passed.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.0.saturating_duration_since(Instant::now())
    }
}

/// Raised when a [`PollSpec`] is internally inconsistent.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum PollSpecError {
    /// The target set is empty, so the poll could never finish.
    #[error("poll '{0}' has no target statuses")]
    EmptyTarget(&'static str),
    /// A status appears in both sets.
    #[error("poll '{label}' lists {status} as both pending and target")]
    Overlap {
        /// Poll label.
        label: &'static str,
        /// The offending status.
        status: String,
    },
}

/// Parameters of a single poll.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PollSpec<S> {
    label: &'static str,
    pending: Vec<S>,
    target: Vec<S>,
    interval: Duration,
    min_settle: Duration,
    continuous_occurrences: u32,
    timeout: Duration,
    tolerated: Vec<BackendDefect>,
}

impl<S> PollSpec<S>
where
    S: Copy + PartialEq + fmt::Debug,
{
    /// Creates a poll spec with default timing and no timeout budget.
    ///
    /// # Errors
    ///
    /// Returns [`PollSpecError`] when `target` is empty or shares a status
    /// with `pending`.
    pub fn new(label: &'static str, pending: Vec<S>, target: Vec<S>) -> Result<Self, PollSpecError> {
        if target.is_empty() {
            return Err(PollSpecError::EmptyTarget(label));
        }
        if let Some(status) = pending.iter().find(|status| target.contains(status)) {
            return Err(PollSpecError::Overlap {
                label,
                status: format!("{status:?}"),
            });
        }
        let timing = PollTiming::default();
        Ok(Self {
            label,
            pending,
            target,
            interval: timing.interval,
            min_settle: timing.min_settle,
            continuous_occurrences: timing.continuous_occurrences,
            timeout: Duration::ZERO,
            tolerated: Vec::new(),
        })
    }

    /// Applies an interval, settle time and debounce count.
    #[must_use]
    pub const fn with_timing(mut self, timing: PollTiming) -> Self {
        self.interval = timing.interval;
        self.min_settle = timing.min_settle;
        self.continuous_occurrences = timing.continuous_occurrences;
        self
    }

    /// Sets the overall timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the backend defects this poll swallows instead of failing.
    #[must_use]
    pub fn tolerating(mut self, defects: &[BackendDefect]) -> Self {
        self.tolerated = defects.to_vec();
        self
    }

    /// Human-readable name of the poll.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        self.label
    }

    /// Overall timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    const fn required_occurrences(&self) -> u32 {
        if self.continuous_occurrences == 0 {
            1
        } else {
            self.continuous_occurrences
        }
    }
}

/// Classified result of one fetch.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Observation<S, T> {
    /// Classified status.
    pub status: S,
    /// Value fetched alongside the status.
    pub value: T,
}

impl<S, T> Observation<S, T> {
    /// Pairs a status with its value.
    pub const fn new(status: S, value: T) -> Self {
        Self { status, value }
    }
}

/// Errors returned by [`poll`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum PollError<S>
where
    S: fmt::Debug,
{
    /// The target was not reached before the timeout.
    #[error("timed out after {waited:?} waiting for {label} (last status: {last_status:?})")]
    Timeout {
        /// Poll label.
        label: &'static str,
        /// Time spent polling.
        waited: Duration,
        /// Last status observed, if any fetch completed.
        last_status: Option<S>,
    },
    /// A status outside both the pending and the target set was observed.
    #[error("unexpected status {status:?} while waiting for {label}")]
    UnexpectedStatus {
        /// Poll label.
        label: &'static str,
        /// The unclassifiable status.
        status: S,
    },
    /// The fetch failed with an error that is not tolerated.
    #[error("{label}: {source}")]
    Fetch {
        /// Poll label.
        label: &'static str,
        /// Client failure.
        #[source]
        source: ClientError,
    },
}

/// Polls `fetch` until `spec` is satisfied and returns the last value.
///
/// # Errors
///
/// Returns [`PollError::Timeout`] when the budget runs out,
/// [`PollError::UnexpectedStatus`] as soon as a status outside both sets is
/// observed, and [`PollError::Fetch`] for any fetch error that is not one of
/// the spec's tolerated backend defects.
pub async fn poll<S, T, F, Fut>(spec: &PollSpec<S>, mut fetch: F) -> Result<T, PollError<S>>
where
    S: Copy + PartialEq + fmt::Debug,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Observation<S, T>, ClientError>>,
{
    let started = Instant::now();
    let deadline = started + spec.timeout;
    let required = spec.required_occurrences();
    let mut last_status: Option<S> = None;
    let mut consecutive: u32 = 0;

    let timed_out = |last_status: Option<S>| PollError::Timeout {
        label: spec.label,
        waited: started.elapsed(),
        last_status,
    };

    if !spec.min_settle.is_zero() {
        sleep(spec.min_settle.min(deadline.saturating_duration_since(started))).await;
    }

    loop {
        if Instant::now() >= deadline {
            return Err(timed_out(last_status));
        }

        let Ok(outcome) = timeout_at(deadline, fetch()).await else {
            return Err(timed_out(last_status));
        };

        match outcome {
            Ok(observation) => {
                let status = observation.status;
                last_status = Some(status);
                if spec.target.contains(&status) {
                    consecutive += 1;
                    debug!(poll = spec.label, ?status, consecutive, required, "target observed");
                    if consecutive >= required {
                        return Ok(observation.value);
                    }
                } else if spec.pending.contains(&status) {
                    debug!(poll = spec.label, ?status, "still pending");
                    consecutive = 0;
                } else {
                    return Err(PollError::UnexpectedStatus {
                        label: spec.label,
                        status,
                    });
                }
            }
            Err(err) => match err.defect() {
                Some(defect) if spec.tolerated.contains(&defect) => {
                    warn!(poll = spec.label, %defect, error = %err, "ignoring known backend defect");
                    consecutive = 0;
                }
                _ => {
                    return Err(PollError::Fetch {
                        label: spec.label,
                        source: err,
                    });
                }
            },
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        sleep(spec.interval.min(remaining)).await;
    }
}
