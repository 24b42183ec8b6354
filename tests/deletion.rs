//! Behavioural tests for volume deletion, including replication teardown and
//! policy cleanup.

use std::time::Duration;

use rstest::{fixture, rstest};
use strata::client::Operation;
use strata::test_support::{
    ScriptedControlPlane, ScriptedFailure, quick_timing, replicated_volume, sample_volume,
    volume_handle,
};
use strata::{
    BackupSettings, DeletionOutcome, EndpointType, LifecycleError, MirrorState,
    ReplicationStatusReport, ResourceHandle, ResourceSnapshot, VolumeLifecycle, VolumePatch,
};

const BUDGET: Duration = Duration::from_secs(600);

struct Pair {
    primary: ResourceHandle,
    secondary: ResourceHandle,
}

#[fixture]
fn pair() -> Pair {
    Pair {
        primary: volume_handle("pool-west", "data"),
        secondary: volume_handle("pool-north", "data-dr"),
    }
}

fn lifecycle(control_plane: &ScriptedControlPlane) -> VolumeLifecycle<ScriptedControlPlane> {
    VolumeLifecycle::new(control_plane.clone()).with_timing(quick_timing())
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn missing_volume_is_already_absent_without_mutations(pair: Pair) {
    let control_plane = ScriptedControlPlane::new();

    let outcome = lifecycle(&control_plane)
        .delete(&pair.primary, BUDGET)
        .await
        .expect("missing volume deletes cleanly");

    assert_eq!(outcome, DeletionOutcome::AlreadyAbsent);
    assert!(control_plane.mutations().is_empty());
    assert_eq!(control_plane.count(Operation::ReplicationStatus), 0);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn destruction_guard_refuses_existing_volume(pair: Pair) {
    let control_plane = ScriptedControlPlane::new();
    control_plane.push_get(Ok(ResourceSnapshot::present(sample_volume(&pair.primary))));

    let err = lifecycle(&control_plane)
        .with_destruction_guard(true)
        .delete(&pair.primary, BUDGET)
        .await
        .expect_err("guard should refuse");

    assert_eq!(
        err,
        LifecycleError::DestructionPrevented {
            handle: pair.primary.to_string()
        }
    );
    assert!(control_plane.mutations().is_empty());
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn primary_deletion_tears_down_from_the_secondary_first(pair: Pair) {
    let control_plane = ScriptedControlPlane::new();
    control_plane.push_get(Ok(ResourceSnapshot::present(replicated_volume(
        &pair.primary,
        EndpointType::Source,
        &pair.secondary,
    ))));
    control_plane.push_get(Ok(ResourceSnapshot::missing()));
    control_plane.push_replication_status(Ok(ReplicationStatusReport::in_state(
        MirrorState::Mirrored,
    )));
    control_plane.push_replication_status(Ok(ReplicationStatusReport::in_state(
        MirrorState::Broken,
    )));
    control_plane.push_replication_status(Ok(ReplicationStatusReport::absent()));

    let outcome = lifecycle(&control_plane)
        .delete(&pair.primary, BUDGET)
        .await
        .expect("deletion should succeed");

    assert_eq!(outcome, DeletionOutcome::Deleted);
    assert_eq!(
        control_plane.mutations(),
        vec![
            Operation::BreakReplication,
            Operation::DeleteReplication,
            Operation::Delete
        ]
    );
    for call in control_plane.calls() {
        let expected = match call.operation {
            Operation::ReplicationStatus
            | Operation::BreakReplication
            | Operation::DeleteReplication => &pair.secondary,
            _ => &pair.primary,
        };
        assert_eq!(&call.target, expected, "{} hit the wrong volume", call.operation);
    }
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn failed_teardown_never_deletes_the_volume(pair: Pair) {
    let control_plane = ScriptedControlPlane::new();
    control_plane.push_get(Ok(ResourceSnapshot::present(replicated_volume(
        &pair.secondary,
        EndpointType::Destination,
        &pair.primary,
    ))));
    control_plane.push_replication_status(Ok(ReplicationStatusReport::in_state(
        MirrorState::Mirrored,
    )));
    control_plane.push_break(Err(ScriptedFailure::status(409, "operation in progress")));

    let err = lifecycle(&control_plane)
        .delete(&pair.secondary, BUDGET)
        .await
        .expect_err("teardown failure should surface");

    assert!(
        matches!(err, LifecycleError::ReplicationTeardown { ref handle, .. } if *handle == pair.secondary.to_string()),
        "unexpected error: {err:?}"
    );
    assert_eq!(control_plane.mutations(), vec![Operation::BreakReplication]);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn policies_are_released_before_delete(pair: Pair) {
    let control_plane = ScriptedControlPlane::new();
    let mut volume = sample_volume(&pair.primary);
    volume.data_protection.snapshot_policy_id = Some(String::from("nightly"));
    volume.data_protection.backup = Some(BackupSettings {
        policy_id: Some(String::from("weekly-backup")),
        policy_enforced: true,
        vault_id: Some(String::from("vault")),
    });
    for _ in 0..4 {
        control_plane.push_get(Ok(ResourceSnapshot::present(volume.clone())));
    }
    control_plane.push_get(Ok(ResourceSnapshot::missing()));

    let outcome = lifecycle(&control_plane)
        .delete(&pair.primary, BUDGET)
        .await
        .expect("deletion should succeed");

    assert_eq!(outcome, DeletionOutcome::Deleted);
    assert_eq!(
        control_plane.patches(),
        vec![
            VolumePatch::disable_backup_enforcement(),
            VolumePatch::clear_backup_policy(),
            VolumePatch::clear_snapshot_policy(),
        ]
    );
    assert_eq!(
        control_plane.mutations(),
        vec![
            Operation::Update,
            Operation::Update,
            Operation::Update,
            Operation::Delete
        ]
    );
    assert_eq!(control_plane.count(Operation::BackupStatus), 2);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn rejected_delete_is_distinct_from_slow_delete(pair: Pair) {
    let rejecting = ScriptedControlPlane::new();
    rejecting.push_get(Ok(ResourceSnapshot::present(sample_volume(&pair.primary))));
    rejecting.push_delete(Err(ScriptedFailure::status(409, "volume has dependents")));

    let rejected = lifecycle(&rejecting)
        .delete(&pair.primary, BUDGET)
        .await
        .expect_err("delete is rejected");
    assert!(
        matches!(rejected, LifecycleError::DeleteRejected { ref source, .. } if source.operation == Operation::Delete),
        "unexpected error: {rejected:?}"
    );

    let lingering = ScriptedControlPlane::new();
    lingering.push_get(Ok(ResourceSnapshot::present(sample_volume(&pair.primary))));

    let slow = lifecycle(&lingering)
        .delete(&pair.primary, Duration::from_secs(30))
        .await
        .expect_err("volume never disappears");
    assert!(
        matches!(
            slow,
            LifecycleError::DeleteNotConverged { last_status: Some(ref status), .. }
                if status == "succeeded"
        ),
        "unexpected error: {slow:?}"
    );
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn volume_reported_gone_after_delete_counts_as_deleted(pair: Pair) {
    let control_plane = ScriptedControlPlane::new();
    control_plane.push_get(Ok(ResourceSnapshot::present(sample_volume(&pair.primary))));
    control_plane.push_get(Err(ScriptedFailure::status(410, "Gone")));

    let outcome = lifecycle(&control_plane)
        .delete(&pair.primary, BUDGET)
        .await
        .expect("a gone volume is deleted");

    assert_eq!(outcome, DeletionOutcome::Deleted);
    assert_eq!(control_plane.mutations(), vec![Operation::Delete]);
    assert_eq!(control_plane.count(Operation::Get), 2);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn delete_answered_with_gone_is_idempotent(pair: Pair) {
    let control_plane = ScriptedControlPlane::new();
    control_plane.push_get(Ok(ResourceSnapshot::present(sample_volume(&pair.primary))));
    control_plane.push_delete(Err(ScriptedFailure::status(410, "Gone")));

    let outcome = lifecycle(&control_plane)
        .delete(&pair.primary, BUDGET)
        .await
        .expect("a gone volume is deleted");

    assert_eq!(outcome, DeletionOutcome::Deleted);
    assert_eq!(control_plane.count(Operation::Get), 1);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn backup_block_without_policy_is_still_released(pair: Pair) {
    let control_plane = ScriptedControlPlane::new();
    let mut volume = sample_volume(&pair.primary);
    volume.data_protection.backup = Some(BackupSettings {
        policy_id: None,
        policy_enforced: false,
        vault_id: Some(String::from("vault")),
    });
    for _ in 0..3 {
        control_plane.push_get(Ok(ResourceSnapshot::present(volume.clone())));
    }
    control_plane.push_get(Ok(ResourceSnapshot::missing()));

    let outcome = lifecycle(&control_plane)
        .delete(&pair.primary, BUDGET)
        .await
        .expect("deletion should succeed");

    assert_eq!(outcome, DeletionOutcome::Deleted);
    assert_eq!(
        control_plane.patches(),
        vec![
            VolumePatch::disable_backup_enforcement(),
            VolumePatch::clear_backup_policy(),
        ]
    );
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn delete_reporting_not_found_counts_as_deleted(pair: Pair) {
    let control_plane = ScriptedControlPlane::new();
    control_plane.push_get(Ok(ResourceSnapshot::present(sample_volume(&pair.primary))));
    control_plane.push_delete(Err(ScriptedFailure::status(404, "not found")));

    let outcome = lifecycle(&control_plane)
        .delete(&pair.primary, BUDGET)
        .await
        .expect("vanished volume counts as deleted");

    assert_eq!(outcome, DeletionOutcome::Deleted);
    assert_eq!(control_plane.count(Operation::Get), 1);
}
