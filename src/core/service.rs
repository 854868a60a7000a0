//! Request/response surface consumed by a front end.

use serde::Serialize;
use tracing::debug;

use super::admission::AdmissionGate;
use super::status::StatusAggregator;
use crate::error::{QueueError, RunError};

pub const STATUS_STARTED: &str = "Task started";
pub const STATUS_ALREADY_RUNNING: &str = "Already running";

/// Answer to an admission request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdmitResponse {
    pub admitted: bool,
    pub status: String,
    /// The new task, or the active one that blocked admission
    pub task_id: String,
}

/// Answer to a status request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub start_time: String,
    pub time_elapsed: String,
}

#[derive(Clone)]
pub struct RunService {
    gate: AdmissionGate,
    status: StatusAggregator,
}

impl RunService {
    pub fn new(gate: AdmissionGate, status: StatusAggregator) -> Self {
        Self { gate, status }
    }

    /// Try to start a run. A conflict is an answer, not an error.
    pub async fn admit_run(&self) -> Result<AdmitResponse, RunError> {
        match self.gate.try_start().await {
            Ok(task_id) => Ok(AdmitResponse {
                admitted: true,
                status: STATUS_STARTED.to_string(),
                task_id,
            }),
            Err(RunError::AdmissionConflict { task_id }) => Ok(AdmitResponse {
                admitted: false,
                status: STATUS_ALREADY_RUNNING.to_string(),
                task_id,
            }),
            Err(e) => Err(e),
        }
    }

    /// Status of a run, `None` for an unknown task id
    pub async fn get_run_status(&self, task_id: &str) -> Result<Option<StatusResponse>, QueueError> {
        match self.status.get_status(task_id).await {
            Ok(status) => Ok(Some(StatusResponse {
                status: status.state.to_string(),
                start_time: status.start_time,
                time_elapsed: status.elapsed_formatted,
            })),
            Err(QueueError::NotFound(_)) => {
                debug!(task_id, "Status requested for unknown task");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
