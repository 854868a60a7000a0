//! JSONL-based task queue.
//!
//! Append-only log with task state derived from replay. Each submission and
//! each state change is stored as one JSON line.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{AdmissionLock, TaskQueue};
use crate::domain::{RunTask, TaskState};
use crate::error::QueueError;

/// An entry in the queue log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEvent {
    /// When this event occurred
    pub timestamp: DateTime<Utc>,

    /// The task this event belongs to
    pub task_id: String,

    /// Type of queue event
    pub event_type: QueueEventType,

    /// Additional data (depends on event type)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Types of queue events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueEventType {
    /// Task submitted
    Enqueued,

    /// Worker picked the task up
    Received,

    /// Worker began executing
    Started,

    /// Execution finished successfully
    Succeeded,

    /// Execution failed
    Failed,

    /// Task cancelled
    Revoked,
}

impl QueueEventType {
    fn target_state(&self) -> TaskState {
        match self {
            Self::Enqueued => TaskState::Pending,
            Self::Received => TaskState::Received,
            Self::Started => TaskState::Started,
            Self::Succeeded => TaskState::Success,
            Self::Failed => TaskState::Failure,
            Self::Revoked => TaskState::Revoked,
        }
    }
}

/// File-backed task queue
pub struct JsonlTaskQueue {
    /// Path to the queue JSONL file
    queue_path: PathBuf,

    /// Path to the lock file guarding admission and claims
    lock_path: PathBuf,
}

impl JsonlTaskQueue {
    /// Create a queue stored in `dir` (`tasks.jsonl` + `tasks.lock`)
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            queue_path: dir.join("tasks.jsonl"),
            lock_path: dir.join("tasks.lock"),
        }
    }

    /// Open a queue, creating its directory
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, QueueError> {
        let queue = Self::new(dir);
        if let Some(parent) = queue.queue_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(queue)
    }

    /// Path to the queue log
    pub fn queue_path(&self) -> &std::path::Path {
        &self.queue_path
    }

    /// Append an event to the queue log
    async fn append_event(&self, event: &QueueEvent) -> Result<(), QueueError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.queue_path)
            .await?;

        let json = serde_json::to_string(event)?;
        file.write_all(format!("{}\n", json).as_bytes()).await?;
        file.flush().await?;

        Ok(())
    }

    /// Replay all events to build current state
    pub async fn replay(&self) -> Result<HashMap<String, RunTask>, QueueError> {
        Ok(self.replay_ordered().await?.0)
    }

    /// Replay, also returning task ids in submission order
    async fn replay_ordered(&self) -> Result<(HashMap<String, RunTask>, Vec<String>), QueueError> {
        let mut tasks: HashMap<String, RunTask> = HashMap::new();
        let mut order = Vec::new();

        if !self.queue_path.exists() {
            return Ok((tasks, order));
        }

        let file = File::open(&self.queue_path).await?;
        let reader = BufReader::new(file);
        let mut lines = reader.lines();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            let event: QueueEvent = serde_json::from_str(&line)?;
            if event.event_type == QueueEventType::Enqueued {
                order.push(event.task_id.clone());
            }
            Self::apply_event(&mut tasks, event);
        }

        Ok((tasks, order))
    }

    /// Apply a single event to the state
    fn apply_event(tasks: &mut HashMap<String, RunTask>, event: QueueEvent) {
        match event.event_type {
            QueueEventType::Enqueued => {
                tasks.insert(
                    event.task_id.clone(),
                    RunTask::pending(event.task_id, event.timestamp),
                );
            }
            other => {
                let Some(task) = tasks.get_mut(&event.task_id) else {
                    warn!(task_id = %event.task_id, "Queue event for unknown task, ignoring");
                    return;
                };
                task.state = other.target_state();
                task.last_update_at = event.timestamp;
                if other == QueueEventType::Failed {
                    task.error = event
                        .data
                        .as_ref()
                        .and_then(|d| d.get("error"))
                        .and_then(|e| e.as_str())
                        .map(str::to_string);
                }
            }
        }
    }

    /// Record a reported state change, rejecting illegal transitions.
    ///
    /// Check and append happen under the queue lock, so of two racing
    /// changes only the one that is still legal gets recorded.
    async fn transition(
        &self,
        task_id: &str,
        event_type: QueueEventType,
        data: Option<serde_json::Value>,
    ) -> Result<(), QueueError> {
        let _lock = AdmissionLock::acquire(self.lock_path.clone()).await?;
        self.transition_locked(task_id, event_type, data).await
    }

    /// `transition` for callers already holding the queue lock
    async fn transition_locked(
        &self,
        task_id: &str,
        event_type: QueueEventType,
        data: Option<serde_json::Value>,
    ) -> Result<(), QueueError> {
        let tasks = self.replay().await?;
        let task = tasks
            .get(task_id)
            .ok_or_else(|| QueueError::NotFound(task_id.to_string()))?;

        let to = event_type.target_state();
        if !task.state.can_transition_to(to) {
            return Err(QueueError::InvalidTransition {
                task_id: task_id.to_string(),
                from: task.state,
                to,
            });
        }

        let event = QueueEvent {
            timestamp: Utc::now(),
            task_id: task_id.to_string(),
            event_type,
            data,
        };
        self.append_event(&event).await?;
        debug!(task_id, state = %to, "Task state recorded");

        Ok(())
    }

    /// Claim the oldest pending task (`Pending → Received`).
    ///
    /// Claims are serialized through the queue lock so two workers never
    /// receive the same task.
    pub async fn claim_next(&self) -> Result<Option<RunTask>, QueueError> {
        let _lock = AdmissionLock::acquire(self.lock_path.clone()).await?;

        let (tasks, order) = self.replay_ordered().await?;
        let next = order.into_iter().find(|id| {
            tasks
                .get(id)
                .is_some_and(|task| task.state == TaskState::Pending)
        });

        let Some(task_id) = next else {
            return Ok(None);
        };

        self.transition_locked(&task_id, QueueEventType::Received, None)
            .await?;
        Ok(self.replay().await?.remove(&task_id))
    }

    /// Mark a received task as executing
    pub async fn mark_started(&self, task_id: &str) -> Result<(), QueueError> {
        self.transition(task_id, QueueEventType::Started, None).await
    }

    /// Mark a task as finished successfully
    pub async fn mark_succeeded(&self, task_id: &str) -> Result<(), QueueError> {
        self.transition(task_id, QueueEventType::Succeeded, None).await
    }

    /// Mark a task as failed
    pub async fn mark_failed(&self, task_id: &str, error: &str) -> Result<(), QueueError> {
        self.transition(
            task_id,
            QueueEventType::Failed,
            Some(serde_json::json!({ "error": error })),
        )
        .await
    }

    /// Revoke a task that has not finished.
    ///
    /// This only records the state; an in-flight run is not interrupted.
    pub async fn revoke(&self, task_id: &str) -> Result<(), QueueError> {
        self.transition(task_id, QueueEventType::Revoked, None).await
    }
}

#[async_trait]
impl TaskQueue for JsonlTaskQueue {
    fn name(&self) -> &str {
        "local"
    }

    async fn enqueue(&self, task_name: &str) -> Result<String, QueueError> {
        let task_id = Uuid::new_v4().to_string();
        let event = QueueEvent {
            timestamp: Utc::now(),
            task_id: task_id.clone(),
            event_type: QueueEventType::Enqueued,
            data: Some(serde_json::json!({ "task_name": task_name })),
        };
        self.append_event(&event).await?;

        Ok(task_id)
    }

    async fn list_tasks(&self) -> Result<HashMap<String, RunTask>, QueueError> {
        self.replay().await
    }

    async fn get_task(&self, task_id: &str) -> Result<Option<RunTask>, QueueError> {
        Ok(self.replay().await?.remove(task_id))
    }

    async fn admission_lock(&self) -> Result<Option<AdmissionLock>, QueueError> {
        AdmissionLock::acquire(self.lock_path.clone()).await.map(Some)
    }
}
