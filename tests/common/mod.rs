//! Shared fixtures and recording collaborator mocks.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tempfile::TempDir;
use tokio::sync::Barrier;

use livepub::adapters::{
    CrateBuilder, CrateBuilderFactory, CrateRequest, EndpointResolver, FlowDriver,
    FlowDriverFactory,
};
use livepub::domain::{FlowConfig, FlowDescriptor, FlowSettings, OrchestrationData};
use livepub::queue::AdmissionLock;
use livepub::{Collaborators, Materializer, QueueError, RunOrchestrator, RunTask, TaskQueue};

pub const RUN_LABEL: &str = "LiDFlow run";
pub const TEMPLATE_RESOURCES: [&str; 6] = [
    "_extensions",
    "index_files",
    "_quarto.yml",
    "globus-overview.svg",
    "index.qmd",
    "references.bib",
];

/// Ordered record of collaborator calls
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn record(&self, call: impl Into<String>) {
        self.0.lock().unwrap().push(call.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn position(&self, call: &str) -> Option<usize> {
        self.calls().iter().position(|c| c == call)
    }
}

/// Flow stage to fail at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    Nowhere,
    Resolve,
    Run,
    MonitorRun,
    MonitorTransfer,
    GetData,
    BuildCrate,
}

pub struct MockResolver {
    log: CallLog,
    fail: bool,
}

#[async_trait]
impl EndpointResolver for MockResolver {
    async fn resolve_local_endpoint_id(&self) -> Result<String> {
        self.log.record("resolve");
        if self.fail {
            anyhow::bail!("no client id");
        }
        Ok("ep-local".to_string())
    }
}

pub struct MockFlowFactory {
    log: CallLog,
    fail_at: FailAt,
    /// Reported at `run()` to check what the flow observes on disk
    observe: Option<PathBuf>,
}

impl FlowDriverFactory for MockFlowFactory {
    fn create(&self, config: &FlowConfig) -> Result<Box<dyn FlowDriver>> {
        self.log.record(format!(
            "flow.create({})",
            config.publication.orchestration_node
        ));
        Ok(Box::new(MockFlow {
            log: self.log.clone(),
            fail_at: self.fail_at,
            observe: self.observe.clone(),
        }))
    }
}

struct MockFlow {
    log: CallLog,
    fail_at: FailAt,
    observe: Option<PathBuf>,
}

impl MockFlow {
    fn call(&self, name: &str, stage: FailAt) -> Result<()> {
        self.log.record(format!("flow.{}", name));
        if self.fail_at == stage {
            anyhow::bail!("{} failed", name);
        }
        Ok(())
    }
}

#[async_trait]
impl FlowDriver for MockFlow {
    fn descriptor(&self) -> FlowDescriptor {
        FlowDescriptor {
            name: "mock".to_string(),
            remote_run_id: Some("remote-1".to_string()),
        }
    }

    async fn run(&mut self) -> Result<()> {
        if let Some(path) = &self.observe {
            self.log
                .record(format!("observe(exists={})", path.exists()));
        }
        self.call("run", FailAt::Run)
    }

    async fn monitor_run(&mut self) -> Result<()> {
        self.call("monitor_run", FailAt::MonitorRun)
    }

    async fn monitor_transfer(&mut self) -> Result<()> {
        self.call("monitor_transfer", FailAt::MonitorTransfer)
    }

    async fn get_data(&mut self) -> Result<OrchestrationData> {
        self.call("get_data", FailAt::GetData)?;
        Ok(OrchestrationData::new(json!({ "accuracy": 0.9 })))
    }
}

pub struct MockCrateFactory {
    log: CallLog,
    fail: bool,
}

impl CrateBuilderFactory for MockCrateFactory {
    fn create<'a>(&self, request: CrateRequest<'a>) -> Result<Box<dyn CrateBuilder + 'a>> {
        self.log.record(format!("crate.create({})", request.run_label));
        Ok(Box::new(MockCrate {
            log: self.log.clone(),
            fail: self.fail,
            destination: request.destination.to_path_buf(),
        }))
    }
}

struct MockCrate {
    log: CallLog,
    fail: bool,
    destination: PathBuf,
}

#[async_trait]
impl CrateBuilder for MockCrate {
    async fn build_crate(&mut self) -> Result<()> {
        self.log.record("crate.build");
        if self.fail {
            anyhow::bail!("crate build failed");
        }
        std::fs::create_dir_all(&self.destination)?;
        std::fs::write(self.destination.join("ro-crate-metadata.json"), "{}")?;
        Ok(())
    }

    fn clean_up(&mut self) -> Result<()> {
        self.log.record("crate.clean_up");
        Ok(())
    }
}

/// Temporary project layout with templates in place
pub struct Fixture {
    pub temp: TempDir,
    pub templates: PathBuf,
    pub output: PathBuf,
    pub working_crate: PathBuf,
    pub subcrates: PathBuf,
    pub runs: PathBuf,
    pub queue_dir: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let root = temp.path().to_path_buf();
        let templates = root.join("templates");

        std::fs::create_dir_all(templates.join("_extensions/quarto")).unwrap();
        std::fs::create_dir_all(templates.join("index_files/libs")).unwrap();
        std::fs::write(templates.join("_extensions/quarto/ext.lua"), "-- ext").unwrap();
        std::fs::write(templates.join("index_files/libs/site.js"), "// js").unwrap();
        for file in ["_quarto.yml", "globus-overview.svg", "index.qmd", "references.bib"] {
            std::fs::write(templates.join(file), file).unwrap();
        }

        Self {
            templates,
            output: root.join("generated_versions"),
            working_crate: root.join("orchestration_crate"),
            subcrates: root.join("sub_crates"),
            runs: root.join("home/runs"),
            queue_dir: root.join("home/queue"),
            temp,
        }
    }

    /// Output directory of the run label (what admission resets)
    pub fn run_output_dir(&self) -> PathBuf {
        self.output.join(RUN_LABEL)
    }

    pub fn version_dir(&self) -> PathBuf {
        self.run_output_dir().join("New_version")
    }

    pub fn settings(&self) -> FlowSettings {
        FlowSettings {
            subcrate_path: self.subcrates.clone(),
            run_label: RUN_LABEL.to_string(),
            run_tags: vec!["LID".to_string()],
            ..Default::default()
        }
    }

    pub fn materializer(&self) -> Materializer {
        Materializer::new(&self.templates, &self.output, &self.working_crate)
    }

    pub fn orchestrator(&self, log: &CallLog, fail_at: FailAt) -> RunOrchestrator {
        self.orchestrator_observing(log, fail_at, None)
    }

    pub fn orchestrator_observing(
        &self,
        log: &CallLog,
        fail_at: FailAt,
        observe: Option<&Path>,
    ) -> RunOrchestrator {
        let collaborators = Collaborators {
            resolver: Arc::new(MockResolver {
                log: log.clone(),
                fail: fail_at == FailAt::Resolve,
            }),
            flows: Arc::new(MockFlowFactory {
                log: log.clone(),
                fail_at,
                observe: observe.map(Path::to_path_buf),
            }),
            crates: Arc::new(MockCrateFactory {
                log: log.clone(),
                fail: fail_at == FailAt::BuildCrate,
            }),
        };

        RunOrchestrator::new(self.settings(), collaborators, self.materializer(), &self.runs)
    }
}

/// In-memory queue without an admission lock.
///
/// With a barrier, every `list_tasks` caller waits until all of them have
/// taken their snapshot, which reproduces the check-then-enqueue race.
pub struct MemoryQueue {
    tasks: Mutex<HashMap<String, RunTask>>,
    barrier: Option<Barrier>,
    next_id: Mutex<u32>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
            barrier: None,
            next_id: Mutex::new(0),
        }
    }

    pub fn racing(callers: usize) -> Self {
        Self {
            barrier: Some(Barrier::new(callers)),
            ..Self::new()
        }
    }

    pub fn with_tasks(tasks: impl IntoIterator<Item = RunTask>) -> Self {
        let queue = Self::new();
        {
            let mut map = queue.tasks.lock().unwrap();
            for task in tasks {
                map.insert(task.id.clone(), task);
            }
        }
        queue
    }

    /// Number of tasks, read without going through the barrier
    pub fn task_count(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }
}

#[async_trait]
impl TaskQueue for MemoryQueue {
    fn name(&self) -> &str {
        "memory"
    }

    async fn enqueue(&self, _task_name: &str) -> Result<String, QueueError> {
        let id = {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            format!("task-{}", next)
        };
        self.tasks
            .lock()
            .unwrap()
            .insert(id.clone(), RunTask::pending(&id, Utc::now()));
        Ok(id)
    }

    async fn list_tasks(&self) -> Result<HashMap<String, RunTask>, QueueError> {
        let snapshot = self.tasks.lock().unwrap().clone();
        if let Some(barrier) = &self.barrier {
            barrier.wait().await;
        }
        Ok(snapshot)
    }

    async fn get_task(&self, task_id: &str) -> Result<Option<RunTask>, QueueError> {
        Ok(self.tasks.lock().unwrap().get(task_id).cloned())
    }

    async fn admission_lock(&self) -> Result<Option<AdmissionLock>, QueueError> {
        Ok(None)
    }
}
