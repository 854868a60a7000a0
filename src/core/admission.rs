//! Admission gate: at most one active run at a time.
//!
//! The gate refuses to enqueue while any task is pending, received or
//! started. Before enqueueing it resets the run's output directory so a new
//! run never sees the previous run's output.
//!
//! When the queue backend provides an admission lock, check, reset and
//! enqueue happen under it and admission is single-flight. Otherwise
//! (Flower) two near-simultaneous callers can both pass the check before
//! either has enqueued.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::tree::remove_tree_if_exists;
use crate::config::ResolvedConfig;
use crate::domain::RunTask;
use crate::error::RunError;
use crate::queue::TaskQueue;

/// Front door of the pipeline
#[derive(Clone)]
pub struct AdmissionGate {
    queue: Arc<dyn TaskQueue>,
    /// Output working directory removed before each new run
    reset_dir: PathBuf,
    task_name: String,
}

impl AdmissionGate {
    pub fn new(
        queue: Arc<dyn TaskQueue>,
        reset_dir: impl Into<PathBuf>,
        task_name: impl Into<String>,
    ) -> Self {
        Self {
            queue,
            reset_dir: reset_dir.into(),
            task_name: task_name.into(),
        }
    }

    pub fn from_config(config: &ResolvedConfig, queue: Arc<dyn TaskQueue>) -> Self {
        Self::new(queue, config.run_output_dir(), &config.queue.task_name)
    }

    pub fn reset_dir(&self) -> &Path {
        &self.reset_dir
    }

    /// Admit a new run, returning its task id, or report the active run
    /// that blocks it as `RunError::AdmissionConflict`.
    pub async fn try_start(&self) -> Result<String, RunError> {
        let lock = self.queue.admission_lock().await?;
        if lock.is_none() {
            debug!(backend = self.queue.name(), "Admission is advisory for this queue");
        }

        let tasks = self.queue.list_tasks().await?;
        if let Some(active) = first_active(tasks.values()) {
            info!(task_id = %active.id, state = %active.state, "Run already active, not admitting");
            return Err(RunError::AdmissionConflict {
                task_id: active.id.clone(),
            });
        }

        self.reset_output().await;

        let task_id = self.queue.enqueue(&self.task_name).await?;
        info!(task_id = %task_id, backend = self.queue.name(), "Run admitted");

        drop(lock);
        Ok(task_id)
    }

    /// Remove the output working directory. Best-effort: a missing
    /// directory is fine and failures are only logged.
    async fn reset_output(&self) {
        let dir = self.reset_dir.clone();
        let result = tokio::task::spawn_blocking(move || remove_tree_if_exists(&dir)).await;

        match result {
            Ok(Ok(true)) => info!(dir = %self.reset_dir.display(), "Reset output directory"),
            Ok(Ok(false)) => debug!(dir = %self.reset_dir.display(), "No output to reset"),
            Ok(Err(e)) => {
                warn!(dir = %self.reset_dir.display(), error = %e, "Failed to reset output directory")
            }
            Err(e) => warn!(error = %e, "Output reset task panicked"),
        }
    }
}

/// Earliest submitted task that is not terminal
fn first_active<'a>(tasks: impl Iterator<Item = &'a RunTask>) -> Option<&'a RunTask> {
    tasks
        .filter(|task| task.state.is_active())
        .min_by(|a, b| {
            a.submitted_at
                .cmp(&b.submitted_at)
                .then_with(|| a.id.cmp(&b.id))
        })
}
