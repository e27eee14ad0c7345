/// Lifecycle orchestrator tests
///
/// Full create → archive → delete runs, partial failures, timeouts and
/// concurrent runs on one role.
/// Run with: cargo test --test lifecycle_tests
mod support;

use clonecell::{
    CloneCellRef, CloneError, CloneState, InstanceState, LifecycleOrchestrator, LifecyclePlan, LifecycleStep,
    Modifiers, RunStatus,
};
use std::sync::Arc;
use std::time::Duration;
use support::{Fault, Harness, ROLE};

fn plan() -> LifecyclePlan {
    LifecyclePlan::new(ROLE, Modifiers::new().network_seed("some_seed"))
}

#[tokio::test]
async fn test_full_run_leaves_no_instances() {
    let harness = Harness::new(4).await;
    let orchestrator = LifecycleOrchestrator::new(Arc::clone(&harness.registry));

    let report = orchestrator.run(plan()).await;

    assert!(report.is_success(), "{}", report.summary());
    assert_eq!(report.reached, InstanceState::Deleted);
    assert_eq!(report.final_view.as_ref().unwrap().clone_count(ROLE), 0);
    assert!(report.finished_at.is_some());

    let created = report.clone.as_ref().unwrap();
    assert_eq!(created.clone_id.as_str(), "clones.0");
    assert_eq!(created.modifiers, plan().modifiers);
}

#[tokio::test]
async fn test_run_records_intermediate_snapshots() {
    let harness = Harness::new(4).await;
    let orchestrator = LifecycleOrchestrator::new(Arc::clone(&harness.registry));

    let report = orchestrator.run(plan()).await;
    let clone_id: CloneCellRef = report.clone.as_ref().unwrap().clone_id.clone().into();

    let baseline = report.snapshot_after(LifecycleStep::Baseline).unwrap();
    assert_eq!(baseline.clone_count(ROLE), 0);

    let created = report.snapshot_after(LifecycleStep::Create).unwrap();
    assert_eq!(created.find(&clone_id).unwrap().state, CloneState::Active);

    let archived = report.snapshot_after(LifecycleStep::Archive).unwrap();
    assert_eq!(archived.find(&clone_id).unwrap().state, CloneState::Archived);

    let deleted = report.snapshot_after(LifecycleStep::Delete).unwrap();
    assert!(deleted.find(&clone_id).is_none());
}

#[tokio::test]
async fn test_second_run_threads_returned_identity() {
    let harness = Harness::new(4).await;
    let orchestrator = LifecycleOrchestrator::new(Arc::clone(&harness.registry));

    let first = orchestrator.run(plan()).await;
    let second = orchestrator.run(plan()).await;

    assert!(first.is_success());
    assert!(second.is_success(), "{}", second.summary());
    assert_eq!(second.clone.unwrap().clone_id.as_str(), "clones.1");
}

#[tokio::test]
async fn test_archive_failure_skips_delete() {
    let harness = Harness::with_app_fault(
        4,
        "archive_clone_cell",
        Fault::Reject(CloneError::Rpc("simulated outage".into())),
    )
    .await;
    let orchestrator = LifecycleOrchestrator::new(Arc::clone(&harness.registry));

    let report = orchestrator.run(plan()).await;

    assert_eq!(report.failed_step(), Some(LifecycleStep::Archive));
    assert_eq!(report.error(), Some(&CloneError::Rpc("simulated outage".into())));
    assert_eq!(report.reached, InstanceState::Active);
    assert!(harness.admin.seen().is_empty());

    let final_view = report.final_view.unwrap();
    let clones = &final_view.role(ROLE).unwrap().clones;
    assert_eq!(clones.len(), 1);
    assert_eq!(clones[0].state, CloneState::Active);
}

#[tokio::test]
async fn test_create_failure_attempts_nothing_further() {
    let harness = Harness::new(0).await;
    let orchestrator = LifecycleOrchestrator::new(Arc::clone(&harness.registry));

    let report = orchestrator.run(plan()).await;

    assert_eq!(report.failed_step(), Some(LifecycleStep::Create));
    assert!(matches!(
        report.error(),
        Some(CloneError::CapacityExceeded { limit: 0, .. })
    ));
    assert_eq!(report.reached, InstanceState::Nonexistent);
    assert!(report.clone.is_none());
    assert!(!harness.app.saw("archive_clone_cell"));
    assert!(harness.admin.seen().is_empty());
}

#[tokio::test]
async fn test_delete_failure_leaves_instance_archived() {
    let harness = Harness::with_admin_fault(
        4,
        "delete_archived_clone",
        Fault::Reject(CloneError::NotFound("clones.0".into())),
    )
    .await;
    let orchestrator = LifecycleOrchestrator::new(Arc::clone(&harness.registry));

    let report = orchestrator.run(plan()).await;

    assert_eq!(report.failed_step(), Some(LifecycleStep::Delete));
    assert_eq!(report.reached, InstanceState::Archived);

    let final_view = report.final_view.unwrap();
    assert_eq!(
        final_view.role(ROLE).unwrap().archived().count(),
        1,
        "instance should remain archived"
    );
}

#[tokio::test]
async fn test_timeout_is_attributed_to_step() {
    let harness =
        Harness::with_app_fault(4, "archive_clone_cell", Fault::Stall(Duration::from_secs(5)))
            .await;
    let orchestrator = LifecycleOrchestrator::new(Arc::clone(&harness.registry));

    let report = orchestrator.run(plan()).await;

    assert_eq!(report.failed_step(), Some(LifecycleStep::Archive));
    match report.error() {
        Some(CloneError::Timeout { operation, .. }) => assert_eq!(operation, "archive_clone_cell"),
        other => panic!("expected timeout, got {:?}", other),
    }
    assert!(harness.admin.seen().is_empty());
}

#[tokio::test]
async fn test_status_subscription_sees_completion() {
    let harness = Harness::new(4).await;
    let orchestrator = LifecycleOrchestrator::new(Arc::clone(&harness.registry));
    let mut status = orchestrator.subscribe();
    assert_eq!(*status.borrow(), RunStatus::Idle);

    let report = orchestrator.run(plan()).await;

    assert!(status.has_changed().unwrap());
    let seen = status.borrow_and_update().clone();
    assert!(!seen.is_loading());
    assert_eq!(seen.report().unwrap().run_id, report.run_id);
}

#[tokio::test]
async fn test_concurrent_runs_on_one_role_are_serialized() {
    // With a limit of one, overlapping runs would trip CapacityExceeded.
    let harness = Harness::new(1).await;
    let orchestrator = LifecycleOrchestrator::new(Arc::clone(&harness.registry));

    let (a, b) = futures::future::join(orchestrator.run(plan()), orchestrator.run(plan())).await;

    assert!(a.is_success(), "{}", a.summary());
    assert!(b.is_success(), "{}", b.summary());

    let mut ids = vec![
        a.clone.unwrap().clone_id.to_string(),
        b.clone.unwrap().clone_id.to_string(),
    ];
    ids.sort();
    assert_eq!(ids, vec!["clones.0".to_string(), "clones.1".to_string()]);
}

#[tokio::test]
async fn test_independent_registries_do_not_interfere() {
    let left = Harness::new(1).await;
    let right = Harness::new(1).await;

    let (a, b) = futures::future::join(
        LifecycleOrchestrator::new(Arc::clone(&left.registry)).run(plan()),
        LifecycleOrchestrator::new(Arc::clone(&right.registry)).run(plan()),
    )
    .await;

    assert!(a.is_success());
    assert!(b.is_success());
    assert_eq!(a.clone.unwrap().clone_id.as_str(), "clones.0");
    assert_eq!(b.clone.unwrap().clone_id.as_str(), "clones.0");
}
