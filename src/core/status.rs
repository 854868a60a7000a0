//! Status aggregator.
//!
//! Reads task metadata from the queue and derives a `RunStatus`. It never
//! touches the orchestrator and has no side effects, so it is safe to call
//! concurrently with an in-flight run.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::RunStatus;
use crate::error::QueueError;
use crate::queue::TaskQueue;

#[derive(Clone)]
pub struct StatusAggregator {
    queue: Arc<dyn TaskQueue>,
}

impl StatusAggregator {
    pub fn new(queue: Arc<dyn TaskQueue>) -> Self {
        Self { queue }
    }

    /// Status of `task_id` as of now; `QueueError::NotFound` if unknown
    pub async fn get_status(&self, task_id: &str) -> Result<RunStatus, QueueError> {
        self.status_at(task_id, Utc::now()).await
    }

    /// Status of `task_id` as observed at `now`
    pub async fn status_at(
        &self,
        task_id: &str,
        now: DateTime<Utc>,
    ) -> Result<RunStatus, QueueError> {
        let task = self
            .queue
            .get_task(task_id)
            .await?
            .ok_or_else(|| QueueError::NotFound(task_id.to_string()))?;

        Ok(RunStatus::compute(&task, now))
    }
}
