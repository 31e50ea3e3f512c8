//! Reconciliation of durable state against on-disk reality
//!
//! A `Downloaded` row asserts that the bytes at its recorded path still
//! exist with the recorded size. When the user deletes or replaces the
//! local copy out-of-band, the row is stale and must not be trusted as
//! "unchanged": for the current run it is treated as if no row existed,
//! which forces a re-download. The row itself is left alone; the commit
//! after the re-download rewrites it.

use std::path::Path;

use tracing::debug;

use coursedrive_core::domain::TrackedFile;

/// Returns true if the row's local claim matches the filesystem
pub fn verify_local(tracked: &TrackedFile, root: &Path) -> bool {
    if !tracked.is_downloaded() {
        // Skipped rows claim no bytes; nothing to verify
        return true;
    }

    let path = root.join(tracked.local_path());
    match std::fs::metadata(&path) {
        Ok(meta) => meta.is_file() && meta.len() == tracked.size_bytes(),
        Err(_) => false,
    }
}

/// Drops a stale row from consideration for this run
///
/// The change detector receives the result: `None` for a missing or stale
/// row classifies the file as new and re-downloads it.
pub fn effective<'a>(tracked: Option<&'a TrackedFile>, root: &Path) -> Option<&'a TrackedFile> {
    let tracked = tracked?;
    if verify_local(tracked, root) {
        Some(tracked)
    } else {
        debug!(
            file_id = %tracked.file_id(),
            path = tracked.local_path(),
            "Local copy missing or stale, forcing re-download"
        );
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use coursedrive_core::domain::{CourseId, FileId, RunId};

    fn downloaded(path: &str, size: u64) -> TrackedFile {
        TrackedFile::downloaded(
            FileId::new(1),
            CourseId::new(101),
            "notes.pdf".to_string(),
            path.to_string(),
            size,
            Utc::now(),
            None,
            RunId::new(1),
        )
    }

    #[test]
    fn test_intact_file_is_trusted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.pdf"), b"12345").unwrap();

        let tracked = downloaded("notes.pdf", 5);
        assert!(verify_local(&tracked, dir.path()));
        assert!(effective(Some(&tracked), dir.path()).is_some());
    }

    #[test]
    fn test_missing_file_forces_redownload() {
        let dir = tempfile::tempdir().unwrap();
        let tracked = downloaded("notes.pdf", 5);
        assert!(!verify_local(&tracked, dir.path()));
        assert!(effective(Some(&tracked), dir.path()).is_none());
    }

    #[test]
    fn test_size_mismatch_forces_redownload() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.pdf"), b"1234567890").unwrap();

        let tracked = downloaded("notes.pdf", 5);
        assert!(!verify_local(&tracked, dir.path()));
    }

    #[test]
    fn test_skipped_row_passes_through() {
        let dir = tempfile::tempdir().unwrap();
        let tracked = TrackedFile::skipped(
            FileId::new(1),
            CourseId::new(101),
            "lecture.mp4".to_string(),
            100,
            Utc::now(),
            "video".to_string(),
            RunId::new(1),
        );
        assert!(verify_local(&tracked, dir.path()));
        assert!(effective(Some(&tracked), dir.path()).is_some());
    }

    #[test]
    fn test_none_stays_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(effective(None, dir.path()).is_none());
    }
}
