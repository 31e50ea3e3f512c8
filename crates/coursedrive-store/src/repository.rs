//! SQLite implementation of IStateStore
//!
//! Concrete SQLite-based implementation of the state store port defined in
//! coursedrive-core. Handles domain type serialization and SQL query
//! construction.
//!
//! ## Type Mapping
//!
//! | Domain Type     | SQL Type | Strategy                               |
//! |-----------------|----------|----------------------------------------|
//! | FileId/CourseId | INTEGER  | raw i64                                |
//! | RunId           | INTEGER  | raw i64 (AUTOINCREMENT row id)         |
//! | DateTime<Utc>   | TEXT     | RFC 3339 via `to_rfc3339()`            |
//! | FileStatus      | TEXT     | `as_str()` / `parse()`                 |
//! | RunOutcome      | TEXT     | `as_str()` / `parse()`                 |
//!
//! Every write is a single statement, so each commit is atomic per row
//! without explicit transactions; concurrent workers serialize on SQLite's
//! write lock with the pool's busy timeout absorbing contention.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use coursedrive_core::domain::{
    CourseId, FileId, FileStatus, RunCounts, RunId, RunOutcome, RunRecord, TrackedFile,
};
use coursedrive_core::ports::IStateStore;

use crate::StoreError;

/// SQLite-based implementation of the state store port
pub struct SqliteStateStore {
    pool: SqlitePool,
}

impl SqliteStateStore {
    /// Creates a new store instance with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

// ============================================================================
// Helper functions for type conversion
// ============================================================================

/// Parse a DateTime<Utc> from an RFC 3339 string
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            StoreError::SerializationError(format!("Failed to parse datetime '{}': {}", s, e))
        })
}

/// Parse an optional DateTime<Utc> from an optional string
fn parse_optional_datetime(s: Option<String>) -> Result<Option<DateTime<Utc>>, StoreError> {
    match s {
        Some(ref val) if !val.is_empty() => parse_datetime(val).map(Some),
        _ => Ok(None),
    }
}

// ============================================================================
// Row mapping functions
// ============================================================================

/// Reconstruct a TrackedFile from a database row
fn tracked_file_from_row(row: &SqliteRow) -> Result<TrackedFile, StoreError> {
    let file_id: i64 = row.get("file_id");
    let course_id: i64 = row.get("course_id");
    let file_name: String = row.get("file_name");
    let local_path: String = row.get("local_path");
    let size_bytes: i64 = row.get("size_bytes");
    let remote_modified_at: String = row.get("remote_modified_at");
    let checksum: Option<String> = row.get("checksum");
    let status_str: String = row.get("status");
    let skip_reason: Option<String> = row.get("skip_reason");
    let first_seen_at: String = row.get("first_seen_at");
    let last_seen_run: i64 = row.get("last_seen_run");

    let status = FileStatus::parse(&status_str)
        .map_err(|e| StoreError::SerializationError(e.to_string()))?;

    Ok(TrackedFile::from_parts(
        FileId::new(file_id),
        CourseId::new(course_id),
        file_name,
        local_path,
        size_bytes as u64,
        parse_datetime(&remote_modified_at)?,
        checksum,
        status,
        skip_reason,
        parse_datetime(&first_seen_at)?,
        RunId::new(last_seen_run),
    ))
}

/// Reconstruct a RunRecord from a database row
fn run_record_from_row(row: &SqliteRow) -> Result<RunRecord, StoreError> {
    let id: i64 = row.get("id");
    let started_at: String = row.get("started_at");
    let finished_at: Option<String> = row.get("finished_at");
    let outcome_str: String = row.get("outcome");
    let files_new: i64 = row.get("files_new");
    let files_updated: i64 = row.get("files_updated");
    let files_unchanged: i64 = row.get("files_unchanged");
    let files_skipped: i64 = row.get("files_skipped");
    let files_failed: i64 = row.get("files_failed");

    let outcome = RunOutcome::parse(&outcome_str)
        .map_err(|e| StoreError::SerializationError(e.to_string()))?;

    let counts = RunCounts {
        new_files: files_new as u64,
        updated: files_updated as u64,
        unchanged: files_unchanged as u64,
        skipped: files_skipped as u64,
        failed: files_failed as u64,
    };

    Ok(RunRecord::from_parts(
        RunId::new(id),
        parse_datetime(&started_at)?,
        parse_optional_datetime(finished_at)?,
        outcome,
        counts,
    ))
}

// ============================================================================
// IStateStore implementation
// ============================================================================

#[async_trait::async_trait]
impl IStateStore for SqliteStateStore {
    // --- Tracked files ---

    async fn lookup(&self, id: FileId) -> anyhow::Result<Option<TrackedFile>> {
        let row = sqlx::query("SELECT * FROM tracked_files WHERE file_id = ?")
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(tracked_file_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn upsert(&self, file: &TrackedFile) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO tracked_files \
             (file_id, course_id, file_name, local_path, size_bytes, \
              remote_modified_at, checksum, status, skip_reason, \
              first_seen_at, last_seen_run) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(file.file_id().as_i64())
        .bind(file.course_id().as_i64())
        .bind(file.file_name())
        .bind(file.local_path())
        .bind(file.size_bytes() as i64)
        .bind(file.remote_modified_at().to_rfc3339())
        .bind(file.checksum())
        .bind(file.status().as_str())
        .bind(file.skip_reason())
        .bind(file.first_seen_at().to_rfc3339())
        .bind(file.last_seen_run().as_i64())
        .execute(&self.pool)
        .await?;

        tracing::trace!(file_id = %file.file_id(), status = file.status().as_str(), "Upserted tracked file");
        Ok(())
    }

    async fn touch_last_seen(&self, id: FileId, run: RunId) -> anyhow::Result<()> {
        sqlx::query("UPDATE tracked_files SET last_seen_run = ? WHERE file_id = ?")
            .bind(run.as_i64())
            .bind(id.as_i64())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // --- Run history ---

    async fn create_run(&self, started_at: DateTime<Utc>) -> anyhow::Result<RunRecord> {
        let result = sqlx::query("INSERT INTO runs (started_at, outcome) VALUES (?, ?)")
            .bind(started_at.to_rfc3339())
            .bind(RunOutcome::Running.as_str())
            .execute(&self.pool)
            .await?;

        let id = RunId::new(result.last_insert_rowid());
        tracing::debug!(run_id = %id, "Created run record");

        Ok(RunRecord::started(id, started_at))
    }

    async fn finalize_run(
        &self,
        id: RunId,
        outcome: RunOutcome,
        counts: &RunCounts,
        finished_at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE runs SET finished_at = ?, outcome = ?, \
             files_new = ?, files_updated = ?, files_unchanged = ?, \
             files_skipped = ?, files_failed = ? \
             WHERE id = ?",
        )
        .bind(finished_at.to_rfc3339())
        .bind(outcome.as_str())
        .bind(counts.new_files as i64)
        .bind(counts.updated as i64)
        .bind(counts.unchanged as i64)
        .bind(counts.skipped as i64)
        .bind(counts.failed as i64)
        .bind(id.as_i64())
        .execute(&self.pool)
        .await?;

        tracing::debug!(run_id = %id, outcome = %outcome, "Finalized run record");
        Ok(())
    }

    async fn recover_stale_runs(&self) -> anyhow::Result<u64> {
        let result = sqlx::query(
            "UPDATE runs SET outcome = ?, finished_at = ? WHERE outcome = ?",
        )
        .bind(RunOutcome::Interrupted.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(RunOutcome::Running.as_str())
        .execute(&self.pool)
        .await?;

        let recovered = result.rows_affected();
        if recovered > 0 {
            tracing::warn!(count = recovered, "Marked stale runs as interrupted");
        }

        Ok(recovered)
    }

    async fn last_run(&self) -> anyhow::Result<Option<RunRecord>> {
        let row = sqlx::query("SELECT * FROM runs ORDER BY id DESC LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(run_record_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn recent_runs(&self, limit: u32) -> anyhow::Result<Vec<RunRecord>> {
        let rows = sqlx::query("SELECT * FROM runs ORDER BY id DESC LIMIT ?")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        let mut runs = Vec::with_capacity(rows.len());
        for row in &rows {
            runs.push(run_record_from_row(row)?);
        }

        Ok(runs)
    }

    // --- Liveness ---

    async fn ping(&self) -> anyhow::Result<()> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}
