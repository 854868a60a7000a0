//! Core orchestration logic.
//!
//! This module contains:
//! - AdmissionGate: single-flight admission of new runs
//! - RunOrchestrator: stage-by-stage execution of one run
//! - StatusAggregator: status derived from queue metadata
//! - Materializer: versioned output directories
//! - RunJournal / StageMachine: journaled run stages
//! - Worker: local queue consumer
//! - RunService: admit/status surface

pub mod admission;
pub mod journal;
pub mod machine;
pub mod materializer;
pub mod orchestrator;
pub mod service;
pub mod status;
pub mod tree;
pub mod worker;

// Re-export commonly used types
pub use admission::AdmissionGate;
pub use journal::RunJournal;
pub use machine::StageMachine;
pub use materializer::{default_manifest, EntryKind, ManifestEntry, Materializer};
pub use orchestrator::{Collaborators, RunOrchestrator, RunOutcome};
pub use service::{AdmitResponse, RunService, StatusResponse};
pub use status::StatusAggregator;
pub use worker::{ProcessedTask, Worker};
