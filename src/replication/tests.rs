//! Unit tests for the replication teardown steps.

use std::time::Duration;

use rstest::{fixture, rstest};

use super::*;
use crate::client::Operation;
use crate::test_support::{ScriptedControlPlane, ScriptedFailure, quick_timing, volume_handle};
use crate::volume::ReplicationStatusReport;

#[fixture]
fn plane() -> ScriptedControlPlane {
    ScriptedControlPlane::new()
}

#[fixture]
fn secondary() -> ResourceHandle {
    volume_handle("pool-dr", "replica")
}

fn teardown<'a>(
    plane: &'a ScriptedControlPlane,
    secondary: &'a ResourceHandle,
) -> ReplicationTeardown<'a, ScriptedControlPlane> {
    ReplicationTeardown::new(plane, secondary, Deadline::after(Duration::from_secs(600)))
        .with_timing(quick_timing())
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn break_is_refused_before_mirrored_is_observed(
    plane: ScriptedControlPlane,
    secondary: ResourceHandle,
) {
    let mut teardown = teardown(&plane, &secondary);

    let err = teardown
        .break_relationship()
        .await
        .expect_err("break must wait for observation");

    assert_eq!(
        err,
        LifecycleError::Precondition {
            step: "break the relationship",
            stage: String::from("unobserved"),
        }
    );
    assert_eq!(plane.count(Operation::BreakReplication), 0);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn delete_is_refused_until_broken_is_observed(
    plane: ScriptedControlPlane,
    secondary: ResourceHandle,
) {
    plane.push_replication_status(Ok(ReplicationStatusReport::in_state(MirrorState::Mirrored)));
    let mut teardown = teardown(&plane, &secondary);

    teardown.observe().await.expect("observe");
    teardown.break_relationship().await.expect("break");
    let err = teardown
        .delete_relationship()
        .await
        .expect_err("delete must wait for broken");

    assert!(matches!(err, LifecycleError::Precondition { .. }));
    assert_eq!(teardown.stage(), TeardownStage::BreakRequested);
    assert_eq!(plane.count(Operation::DeleteReplication), 0);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn observe_twice_is_refused(plane: ScriptedControlPlane, secondary: ResourceHandle) {
    let mut teardown = teardown(&plane, &secondary);
    teardown.observe().await.expect("first observation");

    let err = teardown.observe().await.expect_err("second observation");

    assert!(matches!(err, LifecycleError::Precondition { .. }));
}

#[rstest]
#[case(ReplicationStatusReport::absent(), TeardownStage::Removed)]
#[case(
    ReplicationStatusReport::in_state(MirrorState::Broken),
    TeardownStage::Broken
)]
#[case(
    ReplicationStatusReport::in_state(MirrorState::Mirrored),
    TeardownStage::Observed(MirrorState::Mirrored)
)]
#[case(
    ReplicationStatusReport::in_state(MirrorState::Uninitialized),
    TeardownStage::Observed(MirrorState::Uninitialized)
)]
#[tokio::test(start_paused = true)]
async fn observe_maps_the_initial_report(
    plane: ScriptedControlPlane,
    secondary: ResourceHandle,
    #[case] report: ReplicationStatusReport,
    #[case] expected: TeardownStage,
) {
    plane.push_replication_status(Ok(report));
    let mut teardown = teardown(&plane, &secondary);

    assert_eq!(teardown.observe().await, Ok(expected));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn mid_deletion_probe_skips_to_removal_wait(
    plane: ScriptedControlPlane,
    secondary: ResourceHandle,
) {
    plane.push_replication_status(Err(ScriptedFailure::status(
        400,
        "Volume replication is deleting",
    )));
    plane.push_replication_status(Ok(ReplicationStatusReport::absent()));
    let mut teardown = teardown(&plane, &secondary);

    teardown.run().await.expect("teardown should finish");

    assert_eq!(teardown.stage(), TeardownStage::Removed);
    assert!(plane.mutations().is_empty());
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn uninitialized_relationship_is_mirrored_before_break(
    plane: ScriptedControlPlane,
    secondary: ResourceHandle,
) {
    plane.push_replication_status(Ok(ReplicationStatusReport::in_state(
        MirrorState::Uninitialized,
    )));
    plane.push_replication_status(Ok(ReplicationStatusReport::in_state(
        MirrorState::Uninitialized,
    )));
    plane.push_replication_status(Ok(ReplicationStatusReport::in_state(MirrorState::Mirrored)));
    plane.push_replication_status(Ok(ReplicationStatusReport::in_state(MirrorState::Broken)));
    plane.push_replication_status(Ok(ReplicationStatusReport::absent()));
    let mut teardown = teardown(&plane, &secondary);

    teardown.run().await.expect("teardown should finish");

    assert_eq!(
        plane.mutations(),
        vec![Operation::BreakReplication, Operation::DeleteReplication]
    );
    assert!(plane.calls().iter().all(|call| call.target == secondary));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn relationship_vanishing_during_break_wait_ends_teardown(
    plane: ScriptedControlPlane,
    secondary: ResourceHandle,
) {
    plane.push_replication_status(Ok(ReplicationStatusReport::in_state(MirrorState::Mirrored)));
    plane.push_replication_status(Ok(ReplicationStatusReport::absent()));
    let mut teardown = teardown(&plane, &secondary);

    teardown.run().await.expect("teardown should finish");

    assert_eq!(plane.mutations(), vec![Operation::BreakReplication]);
}
