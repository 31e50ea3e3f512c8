//! TrackedFile domain entity
//!
//! One `TrackedFile` row exists per remote file identity ever seen, updated
//! in place on subsequent runs. A `Downloaded` row asserts that the bytes at
//! `local_path` match the recorded fingerprint; a `Skipped` row records why
//! no bytes exist (filter rejection or exhausted download retries).
//!
//! Rows are never deleted by the engine itself: a missing row means the user
//! wiped local history, and reconciliation handles locally-deleted files by
//! ignoring the stale row for the current run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{CourseId, FileId, RunId};

/// Persistent status of a tracked file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    /// Bytes were fetched and live at the recorded local path
    Downloaded,
    /// No bytes on disk; `skip_reason` says why
    Skipped,
}

impl FileStatus {
    /// Stable string form used by the state store
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Downloaded => "downloaded",
            FileStatus::Skipped => "skipped",
        }
    }

    /// Parse the stored string form
    pub fn parse(s: &str) -> Result<Self, DomainError> {
        match s {
            "downloaded" => Ok(FileStatus::Downloaded),
            "skipped" => Ok(FileStatus::Skipped),
            other => Err(DomainError::UnknownValue(format!(
                "file status '{other}'"
            ))),
        }
    }
}

/// Durable record of a remote file identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedFile {
    file_id: FileId,
    course_id: CourseId,
    file_name: String,
    /// Local path relative to the download root ("" for skipped files)
    local_path: String,
    size_bytes: u64,
    remote_modified_at: DateTime<Utc>,
    /// SHA-256 of the downloaded bytes, hex-encoded (best effort)
    checksum: Option<String>,
    status: FileStatus,
    skip_reason: Option<String>,
    first_seen_at: DateTime<Utc>,
    last_seen_run: RunId,
}

impl TrackedFile {
    /// Reconstructs a row with every field specified (used by the store)
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        file_id: FileId,
        course_id: CourseId,
        file_name: String,
        local_path: String,
        size_bytes: u64,
        remote_modified_at: DateTime<Utc>,
        checksum: Option<String>,
        status: FileStatus,
        skip_reason: Option<String>,
        first_seen_at: DateTime<Utc>,
        last_seen_run: RunId,
    ) -> Self {
        Self {
            file_id,
            course_id,
            file_name,
            local_path,
            size_bytes,
            remote_modified_at,
            checksum,
            status,
            skip_reason,
            first_seen_at,
            last_seen_run,
        }
    }

    /// Record for a successfully downloaded file
    #[allow(clippy::too_many_arguments)]
    pub fn downloaded(
        file_id: FileId,
        course_id: CourseId,
        file_name: String,
        local_path: String,
        size_bytes: u64,
        remote_modified_at: DateTime<Utc>,
        checksum: Option<String>,
        run: RunId,
    ) -> Self {
        let now = Utc::now();
        Self {
            file_id,
            course_id,
            file_name,
            local_path,
            size_bytes,
            remote_modified_at,
            checksum,
            status: FileStatus::Downloaded,
            skip_reason: None,
            first_seen_at: now,
            last_seen_run: run,
        }
    }

    /// Record for a file that was seen but not downloaded
    pub fn skipped(
        file_id: FileId,
        course_id: CourseId,
        file_name: String,
        size_bytes: u64,
        remote_modified_at: DateTime<Utc>,
        reason: String,
        run: RunId,
    ) -> Self {
        let now = Utc::now();
        Self {
            file_id,
            course_id,
            file_name,
            local_path: String::new(),
            size_bytes,
            remote_modified_at,
            checksum: None,
            status: FileStatus::Skipped,
            skip_reason: Some(reason),
            first_seen_at: now,
            last_seen_run: run,
        }
    }

    // --- Getters ---

    pub fn file_id(&self) -> FileId {
        self.file_id
    }

    pub fn course_id(&self) -> CourseId {
        self.course_id
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn local_path(&self) -> &str {
        &self.local_path
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn remote_modified_at(&self) -> DateTime<Utc> {
        self.remote_modified_at
    }

    pub fn checksum(&self) -> Option<&str> {
        self.checksum.as_deref()
    }

    pub fn status(&self) -> FileStatus {
        self.status
    }

    pub fn skip_reason(&self) -> Option<&str> {
        self.skip_reason.as_deref()
    }

    pub fn first_seen_at(&self) -> DateTime<Utc> {
        self.first_seen_at
    }

    pub fn last_seen_run(&self) -> RunId {
        self.last_seen_run
    }

    /// Returns true if this row claims bytes exist on disk
    pub fn is_downloaded(&self) -> bool {
        matches!(self.status, FileStatus::Downloaded)
    }

    /// Preserves the original first-seen timestamp when a row is rewritten
    ///
    /// Upserts replace the whole row, so a caller that already holds the
    /// previous row carries its `first_seen_at` forward through this.
    pub fn with_first_seen(mut self, first_seen_at: DateTime<Utc>) -> Self {
        self.first_seen_at = first_seen_at;
        self
    }
}
