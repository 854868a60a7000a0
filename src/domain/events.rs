//! Journal events for run stages.
//!
//! Every stage transition of a run is recorded as an immutable event in the
//! run's append-only journal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::stage::RunStage;

/// A single entry in a run journal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageEvent {
    /// Unique identifier for this event
    pub id: Uuid,

    /// When this event occurred (ISO 8601)
    pub timestamp: DateTime<Utc>,

    /// The task this event belongs to
    pub task_id: String,

    /// Stage the run moved into
    pub stage: RunStage,

    /// Human-readable summary
    pub summary: String,

    /// Time spent reaching this stage, in milliseconds
    pub duration_ms: Option<u64>,

    /// Error message if the run failed
    pub error: Option<String>,
}

impl StageEvent {
    /// Create a new event with the current timestamp
    pub fn new(task_id: impl Into<String>, stage: RunStage, summary: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            task_id: task_id.into(),
            stage,
            summary: summary.into(),
            duration_ms: None,
            error: None,
        }
    }

    /// Attach how long the stage took
    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Attach an error message
    pub fn with_error(mut self, error: String) -> Self {
        self.error = Some(error);
        self
    }
}
