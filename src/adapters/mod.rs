//! Adapter interfaces for external collaborators.
//!
//! The orchestrator sequences calls to these; it implements none of the
//! remote computation, transfer or rendering itself.
//!
//! - `globus`: local transfer endpoint resolution
//! - `command`: flow driver backed by an external program
//! - `crate_builder`: orchestration crate assembly on disk
//! - `quarto`: rendering of a materialized version
//! - `git`: publishing the rendered output

pub mod command;
pub mod crate_builder;
pub mod git;
pub mod globus;
pub mod quarto;

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::{FlowConfig, FlowDescriptor, OrchestrationData};

pub use command::{CommandFlowDriver, CommandFlowFactory};
pub use crate_builder::{DirCrateBuilder, DirCrateFactory};
pub use git::{GitPublisher, PublishOutcome};
pub use globus::GcpEndpointResolver;
pub use quarto::QuartoRenderer;

/// Identifies the local data-transfer endpoint used as orchestration node
#[async_trait]
pub trait EndpointResolver: Send + Sync {
    async fn resolve_local_endpoint_id(&self) -> Result<String>;
}

/// Drives one remote workflow run through its lifecycle
#[async_trait]
pub trait FlowDriver: Send {
    /// Identity handed to the crate builder
    fn descriptor(&self) -> FlowDescriptor;

    /// Start the remote workflow
    async fn run(&mut self) -> Result<()>;

    /// Block until the remote workflow reports completion
    async fn monitor_run(&mut self) -> Result<()>;

    /// Block until transfers between processing nodes have finished
    async fn monitor_transfer(&mut self) -> Result<()>;

    /// Retrieve the result data of the finished workflow
    async fn get_data(&mut self) -> Result<OrchestrationData>;
}

/// Constructs a flow driver per run
pub trait FlowDriverFactory: Send + Sync {
    fn create(&self, config: &FlowConfig) -> Result<Box<dyn FlowDriver>>;
}

/// Assembles the orchestration crate of one run
#[async_trait]
pub trait CrateBuilder: Send {
    /// Materialize the crate's contents at its destination
    async fn build_crate(&mut self) -> Result<()>;

    /// Remove transient local resources of the run
    fn clean_up(&mut self) -> Result<()>;
}

/// What a crate builder is constructed from
#[derive(Debug, Clone)]
pub struct CrateRequest<'a> {
    pub flow: FlowDescriptor,
    pub data: &'a OrchestrationData,
    pub destination: &'a Path,
    pub run_label: &'a str,
    pub run_tags: &'a [String],
    /// Where remote nodes delivered their sub-crates
    pub subcrate_path: &'a Path,
}

/// Constructs a crate builder per run; the builder may borrow the data
pub trait CrateBuilderFactory: Send + Sync {
    fn create<'a>(&self, request: CrateRequest<'a>) -> Result<Box<dyn CrateBuilder + 'a>>;
}
