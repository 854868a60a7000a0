//! Admission Gate Integration Tests
//!
//! Single-flight admission with the locking local queue, the advisory race
//! without a lock, and output reset on re-admission.

mod common;

use std::sync::Arc;

use common::{CallLog, FailAt, Fixture, MemoryQueue};
use livepub::core::Worker;
use livepub::{AdmissionGate, JsonlTaskQueue, RunError, TaskQueue, TaskState};
use tokio_test::{assert_err, assert_ok};

fn gate(fixture: &Fixture, queue: Arc<dyn TaskQueue>) -> AdmissionGate {
    AdmissionGate::new(queue, fixture.run_output_dir(), "run_flow")
}

#[tokio::test]
async fn test_second_start_is_rejected_while_active() {
    let fixture = Fixture::new();
    let queue = Arc::new(JsonlTaskQueue::open(&fixture.queue_dir).await.unwrap());
    let gate = gate(&fixture, queue.clone());

    let first = assert_ok!(gate.try_start().await);
    let err = assert_err!(gate.try_start().await);

    match err {
        RunError::AdmissionConflict { task_id } => assert_eq!(task_id, first),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(queue.list_tasks().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_conflict_has_no_side_effects() {
    let fixture = Fixture::new();
    let queue = Arc::new(JsonlTaskQueue::open(&fixture.queue_dir).await.unwrap());
    let gate = gate(&fixture, queue.clone());
    assert_ok!(gate.try_start().await);

    std::fs::create_dir_all(fixture.version_dir()).unwrap();
    assert_err!(gate.try_start().await);

    assert!(fixture.version_dir().exists());
}

#[tokio::test]
async fn test_locked_queue_admits_exactly_one_of_concurrent_starts() {
    let fixture = Fixture::new();

    // Separate queue handles, as separate processes would have
    let mut handles = Vec::new();
    for _ in 0..4 {
        let queue = Arc::new(JsonlTaskQueue::open(&fixture.queue_dir).await.unwrap());
        let gate = gate(&fixture, queue);
        handles.push(tokio::spawn(async move { gate.try_start().await }));
    }

    let mut admitted = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => admitted += 1,
            Err(RunError::AdmissionConflict { .. }) => rejected += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(admitted, 1);
    assert_eq!(rejected, 3);
}

/// Without a queue-level lock the check and the enqueue are not atomic:
/// two callers that both list before either enqueues are both admitted.
#[tokio::test]
async fn test_advisory_admission_race_admits_both() {
    let fixture = Fixture::new();
    let queue = Arc::new(MemoryQueue::racing(2));
    let gate = gate(&fixture, queue.clone());

    let (a, b) = tokio::join!(gate.try_start(), gate.try_start());

    assert!(a.is_ok() && b.is_ok());
    assert_ne!(a.unwrap(), b.unwrap());
    assert_eq!(queue.task_count(), 2);
}

#[tokio::test]
async fn test_terminal_tasks_do_not_block() {
    let fixture = Fixture::new();
    let mut done = livepub::RunTask::pending("old", chrono::Utc::now());
    done.state = TaskState::Failure;
    let queue = Arc::new(MemoryQueue::with_tasks([done]));

    let task_id = assert_ok!(gate(&fixture, queue).try_start().await);
    assert_ne!(task_id, "old");
}

#[tokio::test]
async fn test_readmission_resets_output_before_first_flow_call() {
    let fixture = Fixture::new();
    let queue = Arc::new(JsonlTaskQueue::open(&fixture.queue_dir).await.unwrap());
    let gate = gate(&fixture, queue.clone());
    let log = CallLog::default();
    let orchestrator = Arc::new(fixture.orchestrator_observing(
        &log,
        FailAt::Nowhere,
        Some(&fixture.run_output_dir()),
    ));
    let worker = Worker::new(queue.clone(), orchestrator);

    // First run leaves its version behind
    let first = assert_ok!(gate.try_start().await);
    let processed = worker.run_once().await.unwrap().unwrap();
    assert_eq!(processed.task_id, first);
    assert!(processed.succeeded);
    assert!(fixture.version_dir().exists());
    assert_eq!(
        queue.get_task(&first).await.unwrap().unwrap().state,
        TaskState::Success
    );

    // Terminal run no longer blocks; the old output is gone before the flow starts
    let second = assert_ok!(gate.try_start().await);
    assert!(!fixture.run_output_dir().exists());

    let processed = worker.run_once().await.unwrap().unwrap();
    assert_eq!(processed.task_id, second);
    assert!(processed.succeeded);

    let observations: Vec<_> = log
        .calls()
        .into_iter()
        .filter(|c| c.starts_with("observe"))
        .collect();
    // The first flow saw nothing yet; the second saw the reset directory
    assert_eq!(observations, vec!["observe(exists=false)", "observe(exists=false)"]);
    assert!(fixture.version_dir().exists());
}
