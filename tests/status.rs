//! Status Aggregator Integration Tests
//!
//! Elapsed-time rule, unknown tasks and the admit/status service surface.

mod common;

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use common::{Fixture, MemoryQueue};
use livepub::core::service::{STATUS_ALREADY_RUNNING, STATUS_STARTED};
use livepub::{
    AdmissionGate, QueueError, RunService, RunTask, StatusAggregator, TaskState,
};

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

fn task(id: &str, state: TaskState) -> RunTask {
    RunTask {
        id: id.to_string(),
        state,
        submitted_at: at(100),
        last_update_at: at(200),
        error: None,
    }
}

fn aggregator(tasks: Vec<RunTask>) -> StatusAggregator {
    StatusAggregator::new(Arc::new(MemoryQueue::with_tasks(tasks)))
}

#[tokio::test]
async fn test_terminal_task_elapsed_since_last_update() {
    let status = aggregator(vec![task("t", TaskState::Success)]);

    let result = status.status_at("t", at(300)).await.unwrap();
    assert_eq!(result.state, TaskState::Success);
    assert_eq!(result.elapsed.num_seconds(), 100);
    assert_eq!(result.elapsed_formatted, "0:01:40");
}

#[tokio::test]
async fn test_active_task_elapsed_since_submission() {
    let status = aggregator(vec![task("t", TaskState::Started)]);

    let result = status.status_at("t", at(300)).await.unwrap();
    assert_eq!(result.elapsed.num_seconds(), 200);
    assert_eq!(result.elapsed_formatted, "0:03:20");
}

#[tokio::test]
async fn test_every_terminal_state_uses_last_update() {
    for state in [TaskState::Success, TaskState::Failure, TaskState::Revoked] {
        let status = aggregator(vec![task("t", state)]);
        let result = status.status_at("t", at(300)).await.unwrap();
        assert_eq!(result.elapsed.num_seconds(), 100, "{state}");
    }
    for state in [TaskState::Pending, TaskState::Received, TaskState::Started] {
        let status = aggregator(vec![task("t", state)]);
        let result = status.status_at("t", at(300)).await.unwrap();
        assert_eq!(result.elapsed.num_seconds(), 200, "{state}");
    }
}

#[tokio::test]
async fn test_unknown_task_is_not_found() {
    let status = aggregator(vec![task("t", TaskState::Started)]);

    let err = status.get_status("missing").await.unwrap_err();
    assert!(matches!(err, QueueError::NotFound(id) if id == "missing"));
}

#[tokio::test]
async fn test_elapsed_does_not_decrease_while_running() {
    let status = aggregator(vec![task("t", TaskState::Started)]);

    let earlier = status.status_at("t", at(250)).await.unwrap();
    let later = status.status_at("t", at(251)).await.unwrap();
    assert!(later.elapsed >= earlier.elapsed);
}

#[tokio::test]
async fn test_service_admit_and_status() {
    let fixture = Fixture::new();
    let queue = Arc::new(MemoryQueue::new());
    let service = RunService::new(
        AdmissionGate::new(queue.clone(), fixture.run_output_dir(), "run_flow"),
        StatusAggregator::new(queue),
    );

    let admitted = service.admit_run().await.unwrap();
    assert!(admitted.admitted);
    assert_eq!(admitted.status, STATUS_STARTED);

    let refused = service.admit_run().await.unwrap();
    assert!(!refused.admitted);
    assert_eq!(refused.status, STATUS_ALREADY_RUNNING);
    assert_eq!(refused.task_id, admitted.task_id);

    let status = service
        .get_run_status(&admitted.task_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.status, "PENDING");

    assert!(service.get_run_status("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn test_status_response_serialization() {
    let queue = Arc::new(MemoryQueue::with_tasks([task("t", TaskState::Failure)]));
    let service = RunService::new(
        AdmissionGate::new(queue.clone(), "/nonexistent", "run_flow"),
        StatusAggregator::new(queue),
    );

    let status = service.get_run_status("t").await.unwrap().unwrap();
    let json = serde_json::to_value(&status).unwrap();
    assert_eq!(json["status"], "FAILURE");
    assert!(json["start_time"].is_string());
    assert!(json["time_elapsed"].is_string());
}
