//! Task queue interface and backends.
//!
//! The queue owns run tasks: it assigns identifiers, stores their state and
//! serves as the status side-channel that the status aggregator reads.
//!
//! - `local`: append-only JSONL queue consumed by the bundled worker
//! - `flower`: HTTP client for a Celery deployment's Flower API

pub mod flower;
pub mod local;

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::PathBuf;

use async_trait::async_trait;
use fs2::FileExt;

use crate::domain::RunTask;
use crate::error::QueueError;

pub use flower::FlowerTaskQueue;
pub use local::{JsonlTaskQueue, QueueEvent, QueueEventType};

/// Task queue as seen by the orchestrator
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Human-readable backend name
    fn name(&self) -> &str;

    /// Submit a unit of work, returning its task id
    async fn enqueue(&self, task_name: &str) -> Result<String, QueueError>;

    /// All tasks the queue knows about
    async fn list_tasks(&self) -> Result<HashMap<String, RunTask>, QueueError>;

    /// A single task, or `None` if the id is unknown
    async fn get_task(&self, task_id: &str) -> Result<Option<RunTask>, QueueError>;

    /// Exclusive admission lock, for backends that can provide one.
    ///
    /// Held across check, reset and enqueue it makes admission atomic with
    /// respect to other holders. `None` means admission is advisory only.
    async fn admission_lock(&self) -> Result<Option<AdmissionLock>, QueueError> {
        Ok(None)
    }
}

/// Exclusive advisory file lock, released on drop
#[derive(Debug)]
pub struct AdmissionLock {
    file: File,
    path: PathBuf,
}

impl AdmissionLock {
    /// Block (off the async runtime) until the lock at `path` is held
    pub async fn acquire(path: PathBuf) -> Result<Self, QueueError> {
        let lock_path = path.clone();
        let file = tokio::task::spawn_blocking(move || -> std::io::Result<File> {
            if let Some(parent) = lock_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&lock_path)?;
            file.lock_exclusive()?;
            Ok(file)
        })
        .await
        .map_err(std::io::Error::other)??;

        Ok(Self { file, path })
    }

    /// Path of the lock file
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl Drop for AdmissionLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to release admission lock");
        }
    }
}
