//! State store port (driven/secondary port)
//!
//! Interface for the durable record of every file ever processed and the
//! append-only run history. The store exclusively owns its on-disk
//! representation; all mutation goes through these methods, and each
//! `upsert` is atomic per row regardless of how many workers commit
//! concurrently.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage errors are adapter-specific
//!   (SQLite, filesystem) and don't need domain-level classification.
//! - `ping` exists so the orchestrator can tell a failed row commit apart
//!   from a store that has died entirely (the former skips one file, the
//!   latter fails the run).

use chrono::{DateTime, Utc};

use crate::domain::{FileId, RunCounts, RunId, RunOutcome, RunRecord, TrackedFile};

/// Port trait for persistent sync state
#[async_trait::async_trait]
pub trait IStateStore: Send + Sync {
    // --- Tracked files ---

    /// Returns the row for a remote identity, if one exists
    async fn lookup(&self, id: FileId) -> anyhow::Result<Option<TrackedFile>>;

    /// Writes a whole row atomically (insert or replace)
    async fn upsert(&self, file: &TrackedFile) -> anyhow::Result<()>;

    /// Marks an existing row as seen by the given run without other changes
    async fn touch_last_seen(&self, id: FileId, run: RunId) -> anyhow::Result<()>;

    // --- Run history ---

    /// Creates a run record in `Running` state and returns it
    async fn create_run(&self, started_at: DateTime<Utc>) -> anyhow::Result<RunRecord>;

    /// Finalizes a run exactly once with its terminal outcome and counts
    async fn finalize_run(
        &self,
        id: RunId,
        outcome: RunOutcome,
        counts: &RunCounts,
        finished_at: DateTime<Utc>,
    ) -> anyhow::Result<()>;

    /// Marks dangling `Running` records `Interrupted`; returns how many
    ///
    /// Called at startup so a crash can never leave a run "live" forever.
    async fn recover_stale_runs(&self) -> anyhow::Result<u64>;

    /// The most recent run record, if any
    async fn last_run(&self) -> anyhow::Result<Option<RunRecord>>;

    /// Recent run records, newest first
    async fn recent_runs(&self, limit: u32) -> anyhow::Result<Vec<RunRecord>>;

    // --- Liveness ---

    /// Cheap probe that fails only when the store is unreachable
    async fn ping(&self) -> anyhow::Result<()>;
}
