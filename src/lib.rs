//! livepub - Run orchestration for live scientific publications
//!
//! Triggers, supervises and finalizes a long-running, multi-stage data
//! processing run on remote infrastructure and turns its result into a
//! versioned, publishable output directory.
//!
//! # Architecture
//!
//! - An admission gate lets at most one run be active at a time
//! - A worker executes admitted runs through an explicit stage machine,
//!   journaling every transition
//! - Run status is derived from the task queue, never from the worker
//! - The output version is assembled in a staging directory and renamed
//!   into place
//!
//! # Modules
//!
//! - `adapters`: External collaborators (flow driver, crate builder, Quarto, git)
//! - `core`: Orchestration logic (admission, orchestrator, status, materializer)
//! - `domain`: Data structures (RunTask, RunStatus, FlowConfig, StageEvent)
//! - `queue`: Task queue backends (local JSONL, Flower)
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Admit a run and execute it
//! livepub start
//! livepub worker --once
//!
//! # Check run status
//! livepub status <task-id>
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod error;
pub mod queue;

// Re-export main types at crate root for convenience
pub use crate::core::{
    AdmissionGate, AdmitResponse, Collaborators, Materializer, RunOrchestrator, RunOutcome,
    RunService, StatusAggregator, StatusResponse, Worker,
};
pub use domain::{FlowConfig, OrchestrationData, RunStage, RunStatus, RunTask, TaskState};
pub use error::{MaterializeError, QueueError, RunError};
pub use queue::{FlowerTaskQueue, JsonlTaskQueue, TaskQueue};
