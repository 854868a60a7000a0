//! Append-only run journal with file-based persistence.
//!
//! Each task gets `<runs_dir>/<task_id>/journal.jsonl`, one `StageEvent` per
//! line, written as the run moves through its stages.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::domain::{RunStage, StageEvent};

pub const JOURNAL_FILE: &str = "journal.jsonl";

/// File-based journal of one run
#[derive(Debug, Clone)]
pub struct RunJournal {
    /// Directory containing the run
    run_dir: PathBuf,

    /// Path to the journal.jsonl file
    journal_path: PathBuf,
}

impl RunJournal {
    /// Create or open the journal of `task_id`
    pub async fn open(runs_dir: &Path, task_id: &str) -> Result<Self> {
        let run_dir = runs_dir.join(task_id);

        fs::create_dir_all(&run_dir)
            .await
            .with_context(|| format!("Failed to create run directory: {}", run_dir.display()))?;

        Ok(Self::at(run_dir))
    }

    /// Journal of `task_id` without creating anything on disk
    pub fn existing(runs_dir: &Path, task_id: &str) -> Self {
        Self::at(runs_dir.join(task_id))
    }

    fn at(run_dir: PathBuf) -> Self {
        let journal_path = run_dir.join(JOURNAL_FILE);
        Self {
            run_dir,
            journal_path,
        }
    }

    pub fn journal_path(&self) -> &Path {
        &self.journal_path
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Append an event to the journal
    pub async fn append(&self, event: &StageEvent) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.journal_path)
            .await
            .with_context(|| {
                format!("Failed to open journal: {}", self.journal_path.display())
            })?;

        let json = serde_json::to_string(event).context("Failed to serialize event")?;
        file.write_all(format!("{}\n", json).as_bytes())
            .await
            .context("Failed to write event")?;
        file.flush().await.context("Failed to flush event")?;

        Ok(())
    }

    /// Replay all events in order
    pub async fn replay(&self) -> Result<Vec<StageEvent>> {
        if !self.journal_path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.journal_path)
            .await
            .with_context(|| format!("Failed to open journal: {}", self.journal_path.display()))?;

        let reader = BufReader::new(file);
        let mut lines = reader.lines();
        let mut events = Vec::new();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let event: StageEvent = serde_json::from_str(&line)
                .with_context(|| format!("Failed to parse event: {}", line))?;
            events.push(event);
        }

        Ok(events)
    }

    /// Stage of the most recent event, if any
    pub async fn last_stage(&self) -> Result<Option<RunStage>> {
        let events = self.replay().await?;
        Ok(events.last().map(|e| e.stage))
    }
}
