//! Domain types for the livepub orchestrator.
//!
//! This module contains the core data structures:
//! - Task: Queue-owned run tasks and their states
//! - Status: Human-facing status derived from a task
//! - Flow: Run configuration and orchestration data
//! - Stage: Named stages of a run and their journal events

pub mod events;
pub mod flow;
pub mod stage;
pub mod status;
pub mod task;

// Re-export commonly used types
pub use events::StageEvent;
pub use flow::{FlowConfig, FlowDescriptor, FlowSettings, OrchestrationData, PublicationConfig};
pub use stage::RunStage;
pub use status::{format_elapsed, RunStatus};
pub use task::{RunTask, TaskState};
