//! Change detector
//!
//! Compares a remote descriptor's fingerprint (size, last-modified) against
//! the tracked row for the same identity. Timestamps are compared at second
//! granularity because the remote reports them that way; sub-second drift
//! from datetime round-trips must not look like a change.
//!
//! Size is authoritative over timestamp rollback: some remote systems
//! report an older timestamp after a file is replaced, so a size mismatch
//! classifies as updated even when the remote timestamp is not newer.

use crate::domain::{RemoteFile, TrackedFile};

/// Classification of an admitted file against durable state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// Never seen (or previously skipped and now eligible again)
    New,
    /// Seen and downloaded before, remote fingerprint changed
    Updated,
    /// Downloaded before and unchanged; no fetch, no write
    Unchanged,
}

impl ChangeKind {
    pub fn needs_download(&self) -> bool {
        !matches!(self, ChangeKind::Unchanged)
    }
}

/// Classify one admitted descriptor
///
/// `tracked` must already be reconciled against the local disk: a row whose
/// bytes were deleted out-of-band is passed as `None` to force re-download.
pub fn detect(remote: &RemoteFile, tracked: Option<&TrackedFile>) -> ChangeKind {
    let Some(tracked) = tracked else {
        return ChangeKind::New;
    };

    // A previously-filtered file becoming eligible is re-evaluated as new.
    if !tracked.is_downloaded() {
        return ChangeKind::New;
    }

    if tracked.size_bytes() != remote.size_bytes {
        return ChangeKind::Updated;
    }

    if tracked.remote_modified_at().timestamp() != remote.modified_at.timestamp() {
        return ChangeKind::Updated;
    }

    ChangeKind::Unchanged
}
