//! Known control-plane defects that polls are allowed to ride out.
//!
//! The replication-status endpoint reports client errors for states that are
//! really "still in progress". Every such workaround lives here; once the
//! backend is fixed the matching variant can be deleted and the polls that
//! tolerate it fail fast again.

use std::fmt;

use crate::client::{ClientError, Operation};
use crate::status::RawStatus;

const DELETING_MARKERS: [&str; 2] = ["deleting", "missing or deleted"];

/// A recognised transient backend error.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum BackendDefect {
    /// Replication status answers `400` for a while after authorization.
    InterimBadRequest,
    /// Replication status answers `400` while the relationship is being
    /// deleted.
    StatusWhileDeleting,
}

impl BackendDefect {
    /// Classifies an error as a known defect, if it is one.
    ///
    /// Only replication-status failures with a `400` status qualify.
    #[must_use]
    pub fn recognise(error: &ClientError) -> Option<Self> {
        if error.operation != Operation::ReplicationStatus
            || error.status != RawStatus::Code(400)
        {
            return None;
        }
        let message = error.message.to_ascii_lowercase();
        if DELETING_MARKERS
            .iter()
            .any(|marker| message.contains(marker))
        {
            Some(Self::StatusWhileDeleting)
        } else {
            Some(Self::InterimBadRequest)
        }
    }
}

impl fmt::Display for BackendDefect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InterimBadRequest => f.write_str("interim bad request from replication status"),
            Self::StatusWhileDeleting => {
                f.write_str("bad request from replication status while deleting")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::ResourceHandle;
    use rstest::rstest;

    fn error(operation: Operation, status: u16, message: &str) -> ClientError {
        let handle = ResourceHandle::volume("sub", "rg", "acct", "pool", "vol").expect("handle");
        ClientError::new(operation, &handle, RawStatus::Code(status), message)
    }

    #[rstest]
    #[case("Volume replication is Deleting", Some(BackendDefect::StatusWhileDeleting))]
    #[case("Volume replication missing or deleted", Some(BackendDefect::StatusWhileDeleting))]
    #[case("Replication not yet available", Some(BackendDefect::InterimBadRequest))]
    fn replication_status_400_is_a_defect(
        #[case] message: &str,
        #[case] expected: Option<BackendDefect>,
    ) {
        let err = error(Operation::ReplicationStatus, 400, message);
        assert_eq!(BackendDefect::recognise(&err), expected);
    }

    #[rstest]
    #[case(Operation::Get, 400)]
    #[case(Operation::ReplicationStatus, 409)]
    #[case(Operation::ReplicationStatus, 500)]
    fn other_errors_are_not_defects(#[case] operation: Operation, #[case] status: u16) {
        let err = error(operation, status, "deleting");
        assert_eq!(err.defect(), None);
    }
}
