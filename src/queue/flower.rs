//! Flower HTTP API backend.
//!
//! Reads the task registry of a Celery deployment through its Flower
//! monitoring API and submits work through `async-apply`. Flower offers no
//! way to hold a lock across check and enqueue, so admission through this
//! backend stays advisory.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::warn;

use super::TaskQueue;
use crate::domain::{RunTask, TaskState};
use crate::error::QueueError;

/// Default Flower address
pub const DEFAULT_FLOWER_URL: &str = "http://localhost:5555";

/// Task queue backed by the Flower API
pub struct FlowerTaskQueue {
    /// Base URL, without trailing slash
    base_url: String,

    /// HTTP client
    client: reqwest::Client,
}

/// Task record as returned by Flower (only the fields we read)
#[derive(Debug, Deserialize)]
struct FlowerTask {
    state: String,
    #[serde(default)]
    received: Option<f64>,
    #[serde(default)]
    timestamp: Option<f64>,
}

/// Response to `async-apply`
#[derive(Debug, Deserialize)]
struct ApplyResponse {
    #[serde(rename = "task-id")]
    task_id: String,
}

impl FlowerTaskQueue {
    /// Create a client for the Flower instance at `base_url`
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    /// Build API URL
    fn api_url(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path)
    }
}

/// Convert a Flower epoch (float seconds) into a UTC timestamp
fn from_epoch(secs: f64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_micros((secs * 1_000_000.0).round() as i64)
}

/// Map a Flower record onto a `RunTask`.
///
/// `received` is the submission time and `timestamp` the most recent update;
/// each falls back on the other, then on `fallback`, when Flower has not
/// reported it yet.
fn to_run_task(
    task_id: &str,
    raw: FlowerTask,
    fallback: Option<DateTime<Utc>>,
) -> Result<RunTask, QueueError> {
    let state: TaskState = raw.state.parse().map_err(|state| QueueError::UnknownState {
        task_id: task_id.to_string(),
        state,
    })?;

    let submitted = raw.received.or(raw.timestamp).and_then(from_epoch).or(fallback);
    let updated = raw.timestamp.or(raw.received).and_then(from_epoch).or(fallback);

    match (submitted, updated) {
        (Some(submitted_at), Some(last_update_at)) => Ok(RunTask {
            id: task_id.to_string(),
            state,
            submitted_at,
            last_update_at,
            error: None,
        }),
        _ => Err(QueueError::Api(format!(
            "Task {} has no timestamps yet",
            task_id
        ))),
    }
}

#[async_trait]
impl TaskQueue for FlowerTaskQueue {
    fn name(&self) -> &str {
        "flower"
    }

    async fn enqueue(&self, task_name: &str) -> Result<String, QueueError> {
        let url = self.api_url(&format!("task/async-apply/{}", task_name));

        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({}))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(QueueError::Api(format!(
                "async-apply for '{}' returned {}",
                task_name,
                response.status()
            )));
        }

        let applied: ApplyResponse = response.json().await?;
        Ok(applied.task_id)
    }

    async fn list_tasks(&self) -> Result<HashMap<String, RunTask>, QueueError> {
        let raw: HashMap<String, FlowerTask> = self
            .client
            .get(self.api_url("tasks"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let mut tasks = HashMap::with_capacity(raw.len());
        for (task_id, record) in raw {
            // A task without timestamps still counts for admission.
            match to_run_task(&task_id, record, Some(DateTime::UNIX_EPOCH)) {
                Ok(task) => {
                    tasks.insert(task_id, task);
                }
                Err(e) => {
                    warn!(task_id = %task_id, error = %e, "Skipping task with unrecognised state");
                }
            }
        }

        Ok(tasks)
    }

    async fn get_task(&self, task_id: &str) -> Result<Option<RunTask>, QueueError> {
        let response = self
            .client
            .get(self.api_url(&format!("task/info/{}", task_id)))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let raw: FlowerTask = response.error_for_status()?.json().await?;
        to_run_task(task_id, raw, None).map(Some)
    }
}
