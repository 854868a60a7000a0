//! Run tasks as reported by the task queue.
//!
//! The queue owns these records. The orchestrator only reads them; state
//! transitions are reported by whoever executes the task.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a queued run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    /// Enqueued, not yet picked up by a worker
    Pending,

    /// Picked up by a worker
    Received,

    /// Executing
    Started,

    /// Finished successfully
    Success,

    /// Finished with an error
    Failure,

    /// Cancelled before it finished
    Revoked,
}

impl TaskState {
    /// States that block a new admission
    pub const ACTIVE: [TaskState; 3] = [Self::Pending, Self::Received, Self::Started];

    /// True for `Success`, `Failure` and `Revoked`
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failure | Self::Revoked)
    }

    /// True while the task still occupies the run slot
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Upper-case name as used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Received => "RECEIVED",
            Self::Started => "STARTED",
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
            Self::Revoked => "REVOKED",
        }
    }

    /// Whether a reported transition from `self` to `next` is legal
    pub fn can_transition_to(&self, next: TaskState) -> bool {
        match (self, next) {
            (Self::Pending, Self::Received) => true,
            (Self::Received, Self::Started) => true,
            (Self::Started, Self::Success | Self::Failure) => true,
            (from, Self::Revoked) => from.is_active(),
            _ => false,
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for TaskState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "RECEIVED" => Ok(Self::Received),
            "STARTED" => Ok(Self::Started),
            "SUCCESS" => Ok(Self::Success),
            "FAILURE" => Ok(Self::Failure),
            "REVOKED" => Ok(Self::Revoked),
            other => Err(other.to_string()),
        }
    }
}

/// One orchestration attempt as seen in the task registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunTask {
    /// Opaque task identifier assigned by the queue
    pub id: String,

    /// Current lifecycle state
    pub state: TaskState,

    /// When the task was submitted
    pub submitted_at: DateTime<Utc>,

    /// When the queue last reported a change for this task
    pub last_update_at: DateTime<Utc>,

    /// Failure message, if the task failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunTask {
    /// Create a freshly submitted task
    pub fn pending(id: impl Into<String>, submitted_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            state: TaskState::Pending,
            submitted_at,
            last_update_at: submitted_at,
            error: None,
        }
    }
}
