//! Human-facing run status derived from raw task metadata.
//!
//! Computed fresh on every query. The elapsed-time rule depends on the task
//! state: a finished task reports the time since its last update (how long it
//! has been idle), an unfinished one the time since submission.

use chrono::{DateTime, Duration, Local, Utc};
use serde::Serialize;

use super::task::{RunTask, TaskState};

/// Format used for the start time (locale time, then locale date)
pub const START_TIME_FORMAT: &str = "%X %x";

/// Derived status of a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunStatus {
    /// Mirrors the task state
    pub state: TaskState,

    /// Submission time, formatted in local time
    pub start_time: String,

    /// Elapsed time by the state-dependent rule (never negative)
    #[serde(skip)]
    pub elapsed: Duration,

    /// `elapsed`, formatted for display
    pub elapsed_formatted: String,
}

impl RunStatus {
    /// Derive the status of `task` as observed at `now`
    pub fn compute(task: &RunTask, now: DateTime<Utc>) -> Self {
        let elapsed = elapsed_since(task, now);

        Self {
            state: task.state,
            start_time: task
                .submitted_at
                .with_timezone(&Local)
                .format(START_TIME_FORMAT)
                .to_string(),
            elapsed,
            elapsed_formatted: format_elapsed(elapsed),
        }
    }
}

/// Elapsed time for a task: `now - last_update_at` once terminal,
/// `now - submitted_at` otherwise. Clamped at zero.
pub fn elapsed_since(task: &RunTask, now: DateTime<Utc>) -> Duration {
    let reference = if task.state.is_terminal() {
        task.last_update_at
    } else {
        task.submitted_at
    };

    let elapsed = now - reference;
    if elapsed < Duration::zero() {
        Duration::zero()
    } else {
        elapsed
    }
}

/// Format a duration as `H:MM:SS`, with `.ffffff` when there are
/// sub-second parts and an `N day(s), ` prefix from one day up.
pub fn format_elapsed(elapsed: Duration) -> String {
    let total_micros = elapsed.num_microseconds().unwrap_or(i64::MAX).max(0);
    let micros = total_micros % 1_000_000;
    let total_seconds = total_micros / 1_000_000;

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3_600;
    let minutes = (total_seconds % 3_600) / 60;
    let seconds = total_seconds % 60;

    let mut out = String::new();
    if days > 0 {
        let unit = if days == 1 { "day" } else { "days" };
        out.push_str(&format!("{} {}, ", days, unit));
    }
    out.push_str(&format!("{}:{:02}:{:02}", hours, minutes, seconds));
    if micros > 0 {
        out.push_str(&format!(".{:06}", micros));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn task(state: TaskState) -> RunTask {
        RunTask {
            id: "task-1".to_string(),
            state,
            submitted_at: at(100),
            last_update_at: at(200),
            error: None,
        }
    }

    #[test]
    fn test_terminal_task_measures_from_last_update() {
        for state in [TaskState::Success, TaskState::Failure, TaskState::Revoked] {
            let status = RunStatus::compute(&task(state), at(300));
            assert_eq!(status.elapsed, Duration::seconds(100), "{state}");
        }
    }

    #[test]
    fn test_active_task_measures_from_submission() {
        for state in TaskState::ACTIVE {
            let status = RunStatus::compute(&task(state), at(300));
            assert_eq!(status.elapsed, Duration::seconds(200), "{state}");
        }
    }

    #[test]
    fn test_elapsed_never_negative() {
        let status = RunStatus::compute(&task(TaskState::Started), at(50));
        assert_eq!(status.elapsed, Duration::zero());
        assert_eq!(status.elapsed_formatted, "0:00:00");
    }

    #[test]
    fn test_elapsed_monotonic_while_running() {
        let running = task(TaskState::Started);
        let first = RunStatus::compute(&running, at(250));
        let second = RunStatus::compute(&running, at(260));
        assert!(second.elapsed >= first.elapsed);
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::seconds(100)), "0:01:40");
        assert_eq!(format_elapsed(Duration::seconds(3_725)), "1:02:05");
        assert_eq!(format_elapsed(Duration::milliseconds(1_500)), "0:00:01.500000");
        assert_eq!(format_elapsed(Duration::seconds(86_400 + 61)), "1 day, 0:01:01");
        assert_eq!(format_elapsed(Duration::days(3)), "3 days, 0:00:00");
    }

    #[test]
    fn test_formatting_does_not_change_state() {
        let status = RunStatus::compute(&task(TaskState::Success), at(300));
        assert_eq!(status.state, TaskState::Success);
        assert!(!status.start_time.is_empty());
    }
}
