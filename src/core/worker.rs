//! Worker consuming the local task queue.
//!
//! Claims pending tasks one at a time and executes them with the run
//! orchestrator, reporting the outcome back to the queue. A run in flight is
//! always finished before the worker stops.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;
use tracing::{error, info, warn};

use super::orchestrator::RunOrchestrator;
use crate::queue::JsonlTaskQueue;

/// Outcome of one processed task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedTask {
    pub task_id: String,
    pub succeeded: bool,
}

pub struct Worker {
    queue: Arc<JsonlTaskQueue>,
    orchestrator: Arc<RunOrchestrator>,
}

impl Worker {
    pub fn new(queue: Arc<JsonlTaskQueue>, orchestrator: Arc<RunOrchestrator>) -> Self {
        Self {
            queue,
            orchestrator,
        }
    }

    /// Process the oldest pending task, if any
    pub async fn run_once(&self) -> Result<Option<ProcessedTask>> {
        let Some(task) = self.queue.claim_next().await? else {
            return Ok(None);
        };

        info!(task_id = %task.id, "Claimed task");
        self.queue.mark_started(&task.id).await?;

        let succeeded = match self.orchestrator.execute_run(&task.id).await {
            Ok(_) => {
                self.queue.mark_succeeded(&task.id).await?;
                true
            }
            Err(e) => {
                self.queue.mark_failed(&task.id, &e.to_string()).await?;
                false
            }
        };

        Ok(Some(ProcessedTask {
            task_id: task.id,
            succeeded,
        }))
    }

    /// Poll the queue until Ctrl-C
    pub async fn run(&self, poll_interval: Duration) -> Result<()> {
        let (tx, rx) = watch::channel(false);
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Shutdown requested, finishing current task");
                    let _ = tx.send(true);
                }
                Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C"),
            }
        });

        self.run_until(poll_interval, rx).await
    }

    /// Poll the queue until `shutdown` turns true
    pub async fn run_until(
        &self,
        poll_interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        info!(queue = %self.queue.queue_path().display(), "Worker started");

        while !*shutdown.borrow() {
            match self.run_once().await {
                // Drain the queue before sleeping
                Ok(Some(_)) => continue,
                Ok(None) => {}
                Err(e) => error!(error = %format!("{:#}", e), "Worker iteration failed"),
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }

        info!("Worker stopped");
        Ok(())
    }
}
