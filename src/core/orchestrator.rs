//! Run orchestrator.
//!
//! Drives one admitted run through its stages: resolve the orchestration
//! node, run the remote flow to completion, build the orchestration crate,
//! clean up and materialize the output version. Stages run strictly in
//! order; the first failure ends the run. Local cleanup runs on every exit
//! path through `CleanupGuard`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, instrument, warn};

use super::journal::RunJournal;
use super::machine::StageMachine;
use super::materializer::Materializer;
use super::tree::remove_tree_if_exists;
use crate::adapters::{
    CommandFlowFactory, CrateBuilder, CrateBuilderFactory, CrateRequest, DirCrateFactory,
    EndpointResolver, FlowDriverFactory, GcpEndpointResolver,
};
use crate::config::ResolvedConfig;
use crate::domain::{FlowConfig, FlowSettings, OrchestrationData, RunStage};
use crate::error::RunError;

/// External collaborators of a run
#[derive(Clone)]
pub struct Collaborators {
    pub resolver: Arc<dyn EndpointResolver>,
    pub flows: Arc<dyn FlowDriverFactory>,
    pub crates: Arc<dyn CrateBuilderFactory>,
}

/// Result of a successful run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub task_id: String,
    /// The materialized version directory
    pub version_dir: PathBuf,
    /// Stages the run went through
    pub stages: Vec<RunStage>,
}

/// Executes admitted runs
pub struct RunOrchestrator {
    settings: FlowSettings,
    collaborators: Collaborators,
    materializer: Materializer,
    runs_dir: PathBuf,
}

impl RunOrchestrator {
    pub fn new(
        settings: FlowSettings,
        collaborators: Collaborators,
        materializer: Materializer,
        runs_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            settings,
            collaborators,
            materializer,
            runs_dir: runs_dir.into(),
        }
    }

    /// Wire the concrete collaborators from configuration
    pub fn from_config(config: &ResolvedConfig) -> Result<Self> {
        let collaborators = Collaborators {
            resolver: Arc::new(GcpEndpointResolver::new(config.orchestration_node.clone())),
            flows: Arc::new(CommandFlowFactory::new(&config.driver)?),
            crates: Arc::new(DirCrateFactory),
        };

        Ok(Self::new(
            config.flow.clone(),
            collaborators,
            Materializer::from_config(config),
            config.runs_dir(),
        ))
    }

    pub fn runs_dir(&self) -> &Path {
        &self.runs_dir
    }

    /// Execute the run for `task_id` to its terminal stage
    #[instrument(skip(self))]
    pub async fn execute_run(&self, task_id: &str) -> Result<RunOutcome, RunError> {
        let journal = match RunJournal::open(&self.runs_dir, task_id).await {
            Ok(journal) => journal,
            Err(e) => {
                CleanupGuard::new(task_id, &self.settings.subcrate_path).run();
                return Err(RunError::Journal(format!("{:#}", e)));
            }
        };
        let mut machine = StageMachine::new(task_id, journal);

        match self.drive(&mut machine).await {
            Ok(version_dir) => {
                machine.advance(RunStage::Done, "Run finished").await?;
                info!(task_id, version = %version_dir.display(), "Run completed");
                Ok(RunOutcome {
                    task_id: task_id.to_string(),
                    version_dir,
                    stages: machine.history().to_vec(),
                })
            }
            Err(e) => {
                machine.fail(&e).await;
                Err(e)
            }
        }
    }

    async fn drive(&self, machine: &mut StageMachine) -> Result<PathBuf, RunError> {
        // Declared before the guard: the crate builder borrows them and must
        // be dropped first.
        let config: FlowConfig;
        let data: OrchestrationData;
        let destination = self.materializer.working_crate().to_path_buf();
        let mut guard = CleanupGuard::new(machine.task_id(), &self.settings.subcrate_path);

        let node = self
            .collaborators
            .resolver
            .resolve_local_endpoint_id()
            .await
            .map_err(|e| RunError::EndpointResolution(format!("{:#}", e)))?;
        debug!(node = %node, "Resolved orchestration node");

        config = FlowConfig::for_run(&self.settings, node);
        let mut flow = self
            .collaborators
            .flows
            .create(&config)
            .map_err(|e| remote_failure(RunStage::Initiated, e))?;
        machine
            .advance(RunStage::Initiated, "Flow driver constructed")
            .await?;

        flow.run()
            .await
            .map_err(|e| remote_failure(RunStage::RemoteRunning, e))?;
        machine
            .advance(RunStage::RemoteRunning, "Remote workflow started")
            .await?;

        flow.monitor_run()
            .await
            .map_err(|e| remote_failure(RunStage::RemoteComplete, e))?;
        machine
            .advance(RunStage::RemoteComplete, "Remote workflow complete")
            .await?;

        flow.monitor_transfer()
            .await
            .map_err(|e| remote_failure(RunStage::TransferComplete, e))?;
        machine
            .advance(RunStage::TransferComplete, "Transfers complete")
            .await?;

        data = flow
            .get_data()
            .await
            .map_err(|e| RunError::DataRetrieval(format!("{:#}", e)))?;
        machine
            .advance(RunStage::DataRetrieved, "Orchestration data retrieved")
            .await?;

        let builder = self
            .collaborators
            .crates
            .create(CrateRequest {
                flow: flow.descriptor(),
                data: &data,
                destination: &destination,
                run_label: &config.run_label,
                run_tags: &config.run_tags,
                subcrate_path: &config.publication.subcrate_path,
            })
            .map_err(|e| RunError::CrateBuild(format!("{:#}", e)))?;
        guard
            .install(builder)
            .build_crate()
            .await
            .map_err(|e| RunError::CrateBuild(format!("{:#}", e)))?;
        machine
            .advance(RunStage::CrateBuilt, "Orchestration crate built")
            .await?;

        guard.run();

        let version_dir = self.materializer.materialize(&config.run_label).await?;
        machine
            .advance(RunStage::Materialized, "Output version materialized")
            .await?;

        Ok(version_dir)
    }
}

fn remote_failure(stage: RunStage, e: anyhow::Error) -> RunError {
    RunError::RemoteWorkflow {
        stage,
        message: format!("{:#}", e),
    }
}

/// Runs local cleanup exactly once, on the success path or when dropped.
///
/// With a crate builder installed cleanup is delegated to it; before that
/// the sub-crate staging directory is removed directly. Cleanup failures
/// are logged and never replace the run's outcome.
struct CleanupGuard<'a> {
    task_id: String,
    subcrate_path: &'a Path,
    builder: Option<Box<dyn CrateBuilder + 'a>>,
    done: bool,
}

impl<'a> CleanupGuard<'a> {
    fn new(task_id: &str, subcrate_path: &'a Path) -> Self {
        Self {
            task_id: task_id.to_string(),
            subcrate_path,
            builder: None,
            done: false,
        }
    }

    fn install(&mut self, builder: Box<dyn CrateBuilder + 'a>) -> &mut (dyn CrateBuilder + 'a) {
        let slot = self.builder.insert(builder);
        &mut **slot
    }

    fn run(&mut self) {
        if self.done {
            return;
        }
        self.done = true;

        let result = match self.builder.as_mut() {
            Some(builder) => builder.clean_up(),
            None => remove_tree_if_exists(self.subcrate_path)
                .map(|_| ())
                .map_err(anyhow::Error::from),
        };

        match result {
            Ok(()) => debug!(task_id = %self.task_id, "Local run resources cleaned up"),
            Err(e) => warn!(task_id = %self.task_id, error = %e, "Cleanup failed"),
        }
    }
}

impl Drop for CleanupGuard<'_> {
    fn drop(&mut self) {
        self.run();
    }
}
