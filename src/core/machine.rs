//! Explicit stage machine for one run.
//!
//! Every transition is checked against `RunStage::can_advance_to`, logged
//! and appended to the run's journal together with the time spent in the
//! previous stage.

use std::time::Instant;

use tracing::{error, info, warn};

use super::journal::RunJournal;
use crate::domain::{RunStage, StageEvent};
use crate::error::RunError;

/// Tracks and records the stage of a single run
pub struct StageMachine {
    task_id: String,
    journal: RunJournal,
    /// `None` until the run is initiated
    stage: Option<RunStage>,
    history: Vec<RunStage>,
    entered_at: Instant,
}

impl StageMachine {
    pub fn new(task_id: impl Into<String>, journal: RunJournal) -> Self {
        Self {
            task_id: task_id.into(),
            journal,
            stage: None,
            history: Vec::new(),
            entered_at: Instant::now(),
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Current stage, `None` before initiation
    pub fn stage(&self) -> Option<RunStage> {
        self.stage
    }

    /// Stages entered so far, in order
    pub fn history(&self) -> &[RunStage] {
        &self.history
    }

    fn allows(&self, to: RunStage) -> bool {
        match self.stage {
            None => matches!(to, RunStage::Initiated | RunStage::Failed),
            Some(from) => from.can_advance_to(to),
        }
    }

    /// Move to `to`, journaling the transition
    pub async fn advance(&mut self, to: RunStage, summary: &str) -> Result<(), RunError> {
        if !self.allows(to) {
            return Err(RunError::InvalidTransition {
                from: self.stage.unwrap_or(RunStage::Initiated),
                to,
            });
        }

        let duration_ms = self.entered_at.elapsed().as_millis() as u64;
        let event = StageEvent::new(&self.task_id, to, summary).with_duration(duration_ms);
        self.journal
            .append(&event)
            .await
            .map_err(|e| RunError::Journal(format!("{:#}", e)))?;

        info!(task_id = %self.task_id, stage = %to, duration_ms, "{}", summary);

        self.stage = Some(to);
        self.history.push(to);
        self.entered_at = Instant::now();
        Ok(())
    }

    /// Record the run as failed. Journal errors are logged, not returned,
    /// so the triggering failure stays the run's outcome.
    pub async fn fail(&mut self, cause: &RunError) {
        if self.stage.is_some_and(|s| s.is_final()) {
            return;
        }

        let message = cause.to_string();
        error!(task_id = %self.task_id, stage = ?self.stage, error = %message, "Run failed");

        let duration_ms = self.entered_at.elapsed().as_millis() as u64;
        let event = StageEvent::new(&self.task_id, RunStage::Failed, "Run failed")
            .with_duration(duration_ms)
            .with_error(message);
        if let Err(e) = self.journal.append(&event).await {
            warn!(task_id = %self.task_id, error = %e, "Failed to journal run failure");
        }

        self.stage = Some(RunStage::Failed);
        self.history.push(RunStage::Failed);
    }
}
