//! Error types for run orchestration.

use std::path::PathBuf;

use thiserror::Error;

use crate::domain::{RunStage, TaskState};

/// Errors reported by a task queue backend
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Task not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Task queue API error: {0}")]
    Api(String),

    #[error("Unknown task state '{state}' for task {task_id}")]
    UnknownState { task_id: String, state: String },

    #[error("Invalid state transition for task {task_id}: {from} → {to}")]
    InvalidTransition {
        task_id: String,
        from: TaskState,
        to: TaskState,
    },
}

/// Errors raised while materializing an output version
#[derive(Debug, Error)]
pub enum MaterializeError {
    #[error("Version directory already exists: {0}")]
    VersionExists(PathBuf),

    #[error("Template resource missing: {0}")]
    MissingTemplate(PathBuf),

    #[error("Orchestration crate missing: {0}")]
    MissingCrate(PathBuf),

    #[error("Manifest entry escapes its root: {0}")]
    InvalidManifestEntry(PathBuf),

    #[error("Run label is not a single directory name: {0:?}")]
    InvalidRunLabel(String),

    #[error("Failed to copy {from} to {to}: {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that end a run (or refuse to start one)
#[derive(Debug, Error)]
pub enum RunError {
    /// Another run is still active; reported to the caller, not fatal
    #[error("A run is already active: {task_id}")]
    AdmissionConflict { task_id: String },

    #[error("Failed to resolve local endpoint: {0}")]
    EndpointResolution(String),

    #[error("Remote workflow failed during {stage}: {message}")]
    RemoteWorkflow { stage: RunStage, message: String },

    #[error("Failed to retrieve orchestration data: {0}")]
    DataRetrieval(String),

    #[error("Failed to build orchestration crate: {0}")]
    CrateBuild(String),

    #[error("Materialization failed: {0}")]
    Materialization(#[from] MaterializeError),

    #[error("Run journal error: {0}")]
    Journal(String),

    #[error("Invalid stage transition: {from} → {to}")]
    InvalidTransition { from: RunStage, to: RunStage },

    #[error("Task queue error: {0}")]
    Queue(#[from] QueueError),
}
