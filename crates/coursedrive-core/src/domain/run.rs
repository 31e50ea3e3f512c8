//! Run-history entities
//!
//! A `RunRecord` is created in `Running` state when a sync run starts and
//! finalized exactly once with the terminal outcome and counts. Records are
//! append-only; a run that dies without finalizing is detected on the next
//! startup and retroactively marked `Interrupted` so history queries never
//! show a run as live forever.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::RunId;

/// Terminal (or live) state of a sync run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Run is in progress (or crashed before finalizing)
    Running,
    /// Run finished normally
    Completed,
    /// Run observed a cancellation signal and drained
    Interrupted,
    /// Run hit a fatal error (discovery failure, dead store)
    Failed,
}

impl RunOutcome {
    /// Stable string form used by the state store
    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Running => "running",
            RunOutcome::Completed => "completed",
            RunOutcome::Interrupted => "interrupted",
            RunOutcome::Failed => "failed",
        }
    }

    /// Parse the stored string form
    pub fn parse(s: &str) -> Result<Self, DomainError> {
        match s {
            "running" => Ok(RunOutcome::Running),
            "completed" => Ok(RunOutcome::Completed),
            "interrupted" => Ok(RunOutcome::Interrupted),
            "failed" => Ok(RunOutcome::Failed),
            other => Err(DomainError::UnknownValue(format!("run outcome '{other}'"))),
        }
    }
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-run tallies, updated as outcomes arrive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    /// Files downloaded for the first time
    pub new_files: u64,
    /// Files re-downloaded because the remote fingerprint changed
    pub updated: u64,
    /// Files left untouched (fingerprint match)
    pub unchanged: u64,
    /// Files rejected by the filter engine this run
    pub skipped: u64,
    /// Files whose download or commit failed
    pub failed: u64,
}

impl RunCounts {
    /// Total files that went through classification
    pub fn total(&self) -> u64 {
        self.new_files + self.updated + self.unchanged + self.skipped + self.failed
    }
}

/// One row of run history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    id: RunId,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    outcome: RunOutcome,
    counts: RunCounts,
}

impl RunRecord {
    /// Reconstructs a record with every field specified (used by the store)
    pub fn from_parts(
        id: RunId,
        started_at: DateTime<Utc>,
        finished_at: Option<DateTime<Utc>>,
        outcome: RunOutcome,
        counts: RunCounts,
    ) -> Self {
        Self {
            id,
            started_at,
            finished_at,
            outcome,
            counts,
        }
    }

    /// A freshly started run
    pub fn started(id: RunId, started_at: DateTime<Utc>) -> Self {
        Self {
            id,
            started_at,
            finished_at: None,
            outcome: RunOutcome::Running,
            counts: RunCounts::default(),
        }
    }

    pub fn id(&self) -> RunId {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    pub fn outcome(&self) -> RunOutcome {
        self.outcome
    }

    pub fn counts(&self) -> &RunCounts {
        &self.counts
    }

    /// Returns true if the record was never finalized
    pub fn is_live(&self) -> bool {
        matches!(self.outcome, RunOutcome::Running)
    }
}
