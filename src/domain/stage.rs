//! Named stages of a single run.
//!
//! A run moves forward one stage at a time:
//! `Initiated → RemoteRunning → RemoteComplete → TransferComplete →
//! DataRetrieved → CrateBuilt → Materialized → Done`, or drops to `Failed`
//! from any stage before `Done`.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    /// Execution context resolved, flow driver constructed
    Initiated,

    /// Remote workflow started
    RemoteRunning,

    /// Remote workflow reported completion
    RemoteComplete,

    /// All transfers between processing nodes finished
    TransferComplete,

    /// Orchestration data retrieved
    DataRetrieved,

    /// Orchestration crate built
    CrateBuilt,

    /// Versioned output directory in place
    Materialized,

    /// Run finished successfully
    Done,

    /// Run aborted
    Failed,
}

impl RunStage {
    /// The stage that follows on success, if any
    pub fn next(&self) -> Option<RunStage> {
        match self {
            Self::Initiated => Some(Self::RemoteRunning),
            Self::RemoteRunning => Some(Self::RemoteComplete),
            Self::RemoteComplete => Some(Self::TransferComplete),
            Self::TransferComplete => Some(Self::DataRetrieved),
            Self::DataRetrieved => Some(Self::CrateBuilt),
            Self::CrateBuilt => Some(Self::Materialized),
            Self::Materialized => Some(Self::Done),
            Self::Done | Self::Failed => None,
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Whether moving from `self` to `to` is allowed
    pub fn can_advance_to(&self, to: RunStage) -> bool {
        match to {
            Self::Failed => !self.is_final(),
            _ => self.next() == Some(to),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initiated => "initiated",
            Self::RemoteRunning => "remote_running",
            Self::RemoteComplete => "remote_complete",
            Self::TransferComplete => "transfer_complete",
            Self::DataRetrieved => "data_retrieved",
            Self::CrateBuilt => "crate_built",
            Self::Materialized => "materialized",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}
