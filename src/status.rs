//! Status vocabulary shared by the poller and the orchestrators.
//!
//! Raw HTTP codes never leave this module: call sites pick a [`Direction`] and
//! poll on the classified [`ProvisioningStatus`], or on the
//! [`RelationshipStatus`] of a replication record.

use std::fmt;

use serde::Serialize;

/// Status reported by the transport for a single remote call.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum RawStatus {
    /// An HTTP status code.
    Code(u16),
    /// No response was received.
    DroppedConnection,
}

impl RawStatus {
    /// Returns `true` for the codes that mean "no such resource".
    #[must_use]
    pub const fn is_not_found(self) -> bool {
        matches!(self, Self::Code(204 | 404))
    }

    /// Returns `true` for the codes that mean the resource no longer exists,
    /// including `410 Gone`.
    #[must_use]
    pub const fn is_gone(self) -> bool {
        matches!(self, Self::Code(204 | 404 | 410))
    }
}

impl fmt::Display for RawStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code(code) => write!(f, "{code}"),
            Self::DroppedConnection => f.write_str("dropped connection"),
        }
    }
}

/// Classified lifecycle status of a remote resource.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ProvisioningStatus {
    /// The control plane has not started processing the resource.
    Pending,
    /// A change was accepted and is being applied.
    Accepted,
    /// The resource exists and is settled.
    Succeeded,
    /// The resource does not exist.
    NotFound,
    /// Anything the classifier does not recognise.
    Failed,
}

impl fmt::Display for ProvisioningStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Succeeded => "succeeded",
            Self::NotFound => "not found",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Polarity of a resource poll.
///
/// Creation polls wait for a resource to appear; deletion polls wait for it
/// to disappear. The two directions map raw codes slightly differently.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Direction {
    /// Waiting for a resource to become visible and settled.
    Appearing,
    /// Waiting for a resource to vanish.
    Disappearing,
}

impl Direction {
    /// Maps a raw transport status onto a [`ProvisioningStatus`].
    #[must_use]
    pub const fn classify(self, raw: RawStatus) -> ProvisioningStatus {
        match (self, raw) {
            (_, RawStatus::Code(200)) => ProvisioningStatus::Succeeded,
            (_, RawStatus::Code(202)) => ProvisioningStatus::Accepted,
            (Self::Appearing, RawStatus::Code(201)) => ProvisioningStatus::Accepted,
            (_, RawStatus::Code(204 | 404)) => ProvisioningStatus::NotFound,
            (Self::Disappearing, RawStatus::Code(410)) => ProvisioningStatus::NotFound,
            _ => ProvisioningStatus::Failed,
        }
    }

    /// Statuses that keep a poll in this direction running.
    #[must_use]
    pub fn pending(self) -> Vec<ProvisioningStatus> {
        match self {
            Self::Appearing => vec![ProvisioningStatus::NotFound, ProvisioningStatus::Accepted],
            Self::Disappearing => {
                vec![ProvisioningStatus::Succeeded, ProvisioningStatus::Accepted]
            }
        }
    }

    /// Statuses that end a poll in this direction.
    #[must_use]
    pub fn target(self) -> Vec<ProvisioningStatus> {
        match self {
            Self::Appearing => vec![ProvisioningStatus::Succeeded],
            Self::Disappearing => vec![ProvisioningStatus::NotFound],
        }
    }
}

/// Synchronisation state of a replication relationship.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum MirrorState {
    /// Freshly authorized; not yet breakable.
    Uninitialized,
    /// Data is being mirrored between the endpoints.
    Mirrored,
    /// The relationship has been severed.
    Broken,
}

impl MirrorState {
    /// Parses the provider label, ignoring case.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        [Self::Uninitialized, Self::Mirrored, Self::Broken]
            .into_iter()
            .find(|state| state.label().eq_ignore_ascii_case(label))
    }

    /// Provider label for this state.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Uninitialized => "Uninitialized",
            Self::Mirrored => "Mirrored",
            Self::Broken => "Broken",
        }
    }
}

impl fmt::Display for MirrorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What a replication-status probe says about the relationship record.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum RelationshipStatus {
    /// No relationship record exists.
    Absent,
    /// The record exists but reported no mirror state.
    Unreported,
    /// The record exists in the given state.
    Present(MirrorState),
}

impl RelationshipStatus {
    /// Every status in which a relationship record still exists.
    #[must_use]
    pub fn any_present() -> Vec<Self> {
        vec![
            Self::Unreported,
            Self::Present(MirrorState::Uninitialized),
            Self::Present(MirrorState::Mirrored),
            Self::Present(MirrorState::Broken),
        ]
    }
}

impl fmt::Display for RelationshipStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => f.write_str("absent"),
            Self::Unreported => f.write_str("present (state unreported)"),
            Self::Present(state) => write!(f, "{state}"),
        }
    }
}

/// Which side of a replication relationship a volume is.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointType {
    /// The primary volume.
    Source,
    /// The secondary volume; teardown is issued from this side.
    Destination,
}

impl EndpointType {
    /// Parses the provider label (`src`/`dst`), ignoring case.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        if label.eq_ignore_ascii_case("dst") || label.eq_ignore_ascii_case("destination") {
            Some(Self::Destination)
        } else if label.eq_ignore_ascii_case("src") || label.eq_ignore_ascii_case("source") {
            Some(Self::Source)
        } else {
            None
        }
    }

    /// Provider label for this endpoint type.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Source => "src",
            Self::Destination => "dst",
        }
    }
}
