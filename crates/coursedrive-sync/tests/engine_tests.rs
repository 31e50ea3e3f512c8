//! End-to-end tests for the sync orchestrator
//!
//! Runs the full engine against a scripted in-process provider and an
//! in-memory SQLite store, covering the idempotence, reconciliation,
//! failure-retry, dry-run and interruption behaviors.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use futures_util::{stream, StreamExt};
use tokio_util::sync::CancellationToken;

use coursedrive_core::config::Config;
use coursedrive_core::domain::{
    CourseId, CourseInfo, FileId, FileStatus, RemoteFile, RunOutcome,
};
use coursedrive_core::errors::FetchError;
use coursedrive_core::filter::SkipReason;
use coursedrive_core::ports::{ByteStream, ICourseProvider, IStateStore};
use coursedrive_store::{DatabasePool, SqliteStateStore};
use coursedrive_sync::SyncEngine;

// ============================================================================
// Scripted provider
// ============================================================================

/// Provider with a fixed listing, per-file bodies and injectable failures
struct TestProvider {
    course: CourseInfo,
    files: Mutex<Vec<RemoteFile>>,
    bodies: Mutex<HashMap<i64, Vec<u8>>>,
    /// Errors consumed (one per fetch) before the body is served
    fail_queue: Mutex<HashMap<i64, VecDeque<FetchError>>>,
    fetch_calls: AtomicU32,
}

impl TestProvider {
    fn new() -> Self {
        Self {
            course: CourseInfo {
                id: CourseId::new(101),
                code: "CS2106".to_string(),
                name: "Operating Systems".to_string(),
                term: "Sem 1".to_string(),
            },
            files: Mutex::new(Vec::new()),
            bodies: Mutex::new(HashMap::new()),
            fail_queue: Mutex::new(HashMap::new()),
            fetch_calls: AtomicU32::new(0),
        }
    }

    fn add_file(&self, id: i64, name: &str, body: &[u8], modified: DateTime<Utc>) {
        self.files.lock().unwrap().push(RemoteFile {
            id: FileId::new(id),
            course_id: self.course.id,
            display_name: name.to_string(),
            size_bytes: body.len() as u64,
            modified_at: modified,
            folder_path: String::new(),
            download_url: format!("https://canvas.test/files/{id}/download"),
            web_url: format!("https://canvas.test/courses/101/files/{id}"),
        });
        self.bodies.lock().unwrap().insert(id, body.to_vec());
    }

    fn replace_file(&self, id: i64, body: &[u8], modified: DateTime<Utc>) {
        let mut files = self.files.lock().unwrap();
        let file = files
            .iter_mut()
            .find(|f| f.id == FileId::new(id))
            .expect("unknown file id");
        file.size_bytes = body.len() as u64;
        file.modified_at = modified;
        self.bodies.lock().unwrap().insert(id, body.to_vec());
    }

    fn fail_next_fetch(&self, id: i64, error: FetchError) {
        self.fail_queue
            .lock()
            .unwrap()
            .entry(id)
            .or_default()
            .push_back(error);
    }

    fn fetch_calls(&self) -> u32 {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    fn reset_fetch_calls(&self) {
        self.fetch_calls.store(0, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl ICourseProvider for TestProvider {
    async fn list_courses(&self) -> anyhow::Result<Vec<CourseInfo>> {
        Ok(vec![self.course.clone()])
    }

    async fn list_course_files(&self, _course: &CourseInfo) -> anyhow::Result<Vec<RemoteFile>> {
        Ok(self.files.lock().unwrap().clone())
    }

    async fn fetch(&self, file: &RemoteFile) -> Result<ByteStream, FetchError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);

        let queued = self
            .fail_queue
            .lock()
            .unwrap()
            .get_mut(&file.id.as_i64())
            .and_then(|q| q.pop_front());
        if let Some(error) = queued {
            return Err(error);
        }

        let body = self
            .bodies
            .lock()
            .unwrap()
            .get(&file.id.as_i64())
            .cloned()
            .expect("no body scripted for file");
        Ok(stream::iter(vec![Ok(Bytes::from(body))]).boxed())
    }
}

// ============================================================================
// Fixture
// ============================================================================

struct Fixture {
    provider: Arc<TestProvider>,
    engine: SyncEngine,
    store: SqliteStateStore,
    _pool: DatabasePool,
    root: tempfile::TempDir,
}

async fn setup() -> Fixture {
    let root = tempfile::tempdir().unwrap();
    let pool = DatabasePool::in_memory().await.unwrap();

    let provider = Arc::new(TestProvider::new());
    let store_for_engine: Arc<dyn IStateStore> =
        Arc::new(SqliteStateStore::new(pool.pool().clone()));
    let store = SqliteStateStore::new(pool.pool().clone());

    let mut config = Config::default();
    config.canvas.base_url = "https://canvas.test".to_string();
    config.download.root = root.path().to_path_buf();
    config.download.concurrency = 2;

    let engine = SyncEngine::new(provider.clone(), store_for_engine, &config);

    Fixture {
        provider,
        engine,
        store,
        _pool: pool,
        root,
    }
}

fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_750_000_000 + secs, 0).unwrap()
}

/// Every Downloaded row must have matching bytes on disk
async fn assert_store_consistent(store: &SqliteStateStore, root: &Path, ids: &[i64]) {
    for id in ids {
        if let Some(row) = store.lookup(FileId::new(*id)).await.unwrap() {
            if row.status() == FileStatus::Downloaded {
                let path = root.join(row.local_path());
                let meta = std::fs::metadata(&path)
                    .unwrap_or_else(|_| panic!("downloaded row without bytes: {}", row.local_path()));
                assert_eq!(meta.len(), row.size_bytes(), "row/disk size mismatch");
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_first_run_downloads_and_records() {
    let fx = setup().await;
    fx.provider.add_file(1, "syllabus.pdf", b"pdf-bytes", ts(0));
    fx.provider.add_file(2, "notes.txt", b"text-bytes", ts(0));
    fx.provider
        .add_file(3, "Week6_Recording.mp4", b"video", ts(0));

    let summary = fx
        .engine
        .sync(false, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert_eq!(summary.counts.new_files, 2);
    assert_eq!(summary.counts.skipped, 1);
    assert_eq!(summary.counts.failed, 0);

    // Bytes on disk under the course directory
    let course_dir = fx.root.path().join("CS2106 - Operating Systems (Sem 1)");
    assert_eq!(
        std::fs::read(course_dir.join("syllabus.pdf")).unwrap(),
        b"pdf-bytes"
    );
    assert_eq!(
        std::fs::read(course_dir.join("notes.txt")).unwrap(),
        b"text-bytes"
    );

    // Durable rows
    let row = fx.store.lookup(FileId::new(1)).await.unwrap().unwrap();
    assert_eq!(row.status(), FileStatus::Downloaded);
    assert!(row.checksum().is_some());

    let rejected = fx.store.lookup(FileId::new(3)).await.unwrap().unwrap();
    assert_eq!(rejected.status(), FileStatus::Skipped);
    assert!(rejected.skip_reason().unwrap().contains("video"));

    // Rejected entry annotated in the summary
    assert_eq!(summary.rejected.len(), 1);
    assert_eq!(summary.rejected[0].reason, SkipReason::VideoExt);
    assert_eq!(
        summary.rejected[0].web_url,
        "https://canvas.test/courses/101/files/3"
    );

    // Run record finalized with counts
    let run = fx.store.last_run().await.unwrap().unwrap();
    assert_eq!(run.outcome(), RunOutcome::Completed);
    assert_eq!(run.counts().new_files, 2);
    assert_eq!(run.counts().skipped, 1);

    assert_store_consistent(&fx.store, fx.root.path(), &[1, 2, 3]).await;
}

#[tokio::test]
async fn test_second_run_is_idempotent_with_zero_fetches() {
    let fx = setup().await;
    fx.provider.add_file(1, "syllabus.pdf", b"pdf-bytes", ts(0));
    fx.provider.add_file(2, "notes.txt", b"text-bytes", ts(0));

    fx.engine
        .sync(false, CancellationToken::new())
        .await
        .unwrap();
    fx.provider.reset_fetch_calls();

    let summary = fx
        .engine
        .sync(false, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.counts.unchanged, 2);
    assert_eq!(summary.counts.new_files, 0);
    assert_eq!(summary.counts.updated, 0);
    assert_eq!(fx.provider.fetch_calls(), 0, "no fetch for unchanged files");
}

#[tokio::test]
async fn test_remote_update_triggers_redownload() {
    let fx = setup().await;
    fx.provider.add_file(1, "syllabus.pdf", b"version-1", ts(0));

    fx.engine
        .sync(false, CancellationToken::new())
        .await
        .unwrap();

    // Remote content replaced: newer timestamp, different bytes
    fx.provider.replace_file(1, b"version-2!", ts(60));
    fx.provider.reset_fetch_calls();

    let summary = fx
        .engine
        .sync(false, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.counts.updated, 1);
    assert_eq!(summary.counts.new_files, 0);
    assert_eq!(fx.provider.fetch_calls(), 1);

    let path = fx
        .root
        .path()
        .join("CS2106 - Operating Systems (Sem 1)/syllabus.pdf");
    assert_eq!(std::fs::read(&path).unwrap(), b"version-2!");

    let row = fx.store.lookup(FileId::new(1)).await.unwrap().unwrap();
    assert_eq!(row.size_bytes(), 10);
    assert_eq!(row.remote_modified_at(), ts(60));
}

#[tokio::test]
async fn test_locally_deleted_file_is_redownloaded() {
    let fx = setup().await;
    fx.provider.add_file(1, "syllabus.pdf", b"pdf-bytes", ts(0));

    fx.engine
        .sync(false, CancellationToken::new())
        .await
        .unwrap();

    let path = fx
        .root
        .path()
        .join("CS2106 - Operating Systems (Sem 1)/syllabus.pdf");
    std::fs::remove_file(&path).unwrap();
    fx.provider.reset_fetch_calls();

    let summary = fx
        .engine
        .sync(false, CancellationToken::new())
        .await
        .unwrap();

    // The stale row is ignored for the run and the file comes back
    assert_eq!(summary.counts.new_files, 1);
    assert_eq!(fx.provider.fetch_calls(), 1);
    assert_eq!(std::fs::read(&path).unwrap(), b"pdf-bytes");
}

#[tokio::test]
async fn test_failed_download_recorded_and_retried_next_run() {
    let fx = setup().await;
    fx.provider.add_file(1, "syllabus.pdf", b"pdf-bytes", ts(0));
    // Non-retryable failure: fails once without consuming more attempts
    fx.provider.fail_next_fetch(1, FetchError::Gone);

    let summary = fx
        .engine
        .sync(false, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert_eq!(summary.counts.failed, 1);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].attempts, 1);

    let row = fx.store.lookup(FileId::new(1)).await.unwrap().unwrap();
    assert_eq!(row.status(), FileStatus::Skipped);
    assert!(row.skip_reason().unwrap().contains("download failed"));

    assert_store_consistent(&fx.store, fx.root.path(), &[1]).await;

    // Next run reclassifies the skipped row as new and succeeds
    let summary = fx
        .engine
        .sync(false, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(summary.counts.new_files, 1);

    let row = fx.store.lookup(FileId::new(1)).await.unwrap().unwrap();
    assert_eq!(row.status(), FileStatus::Downloaded);
}

#[tokio::test]
async fn test_dry_run_classifies_without_mutating_anything() {
    let fx = setup().await;
    fx.provider.add_file(1, "syllabus.pdf", b"pdf-bytes", ts(0));
    fx.provider.add_file(2, "notes.txt", b"text-bytes", ts(0));
    fx.provider
        .add_file(3, "Week6_Recording.mp4", b"video", ts(0));

    let summary = fx.engine.sync(true, CancellationToken::new()).await.unwrap();

    // Full summary is produced
    assert!(summary.dry_run);
    assert_eq!(summary.counts.new_files, 2);
    assert_eq!(summary.counts.skipped, 1);
    assert_eq!(summary.rejected.len(), 1);

    // But nothing was fetched and nothing was written
    assert_eq!(fx.provider.fetch_calls(), 0);
    assert!(fx.store.lookup(FileId::new(1)).await.unwrap().is_none());
    assert!(fx.store.lookup(FileId::new(3)).await.unwrap().is_none());
    assert!(fx.store.last_run().await.unwrap().is_none());

    let course_dir = fx.root.path().join("CS2106 - Operating Systems (Sem 1)");
    assert!(!course_dir.exists());
}

#[tokio::test]
async fn test_precancelled_run_finalizes_interrupted() {
    let fx = setup().await;
    fx.provider.add_file(1, "syllabus.pdf", b"pdf-bytes", ts(0));

    let cancel = CancellationToken::new();
    cancel.cancel();

    let summary = fx.engine.sync(false, cancel).await.unwrap();

    assert_eq!(summary.outcome, RunOutcome::Interrupted);
    assert_eq!(summary.counts.new_files, 0);
    assert_eq!(fx.provider.fetch_calls(), 0);

    let run = fx.store.last_run().await.unwrap().unwrap();
    assert_eq!(run.outcome(), RunOutcome::Interrupted);
    assert!(run.finished_at().is_some());

    assert_store_consistent(&fx.store, fx.root.path(), &[1]).await;
}

#[tokio::test]
async fn test_stale_run_recovered_on_next_start() {
    let fx = setup().await;
    fx.provider.add_file(1, "syllabus.pdf", b"pdf-bytes", ts(0));

    // Simulate a crashed run: record created but never finalized
    let crashed = fx.store.create_run(Utc::now()).await.unwrap();

    fx.engine
        .sync(false, CancellationToken::new())
        .await
        .unwrap();

    let runs = fx.store.recent_runs(10).await.unwrap();
    let crashed_row = runs.iter().find(|r| r.id() == crashed.id()).unwrap();
    assert_eq!(crashed_row.outcome(), RunOutcome::Interrupted);
}

#[tokio::test]
async fn test_previously_rejected_file_downloads_after_config_change() {
    // A file skipped by one run's rules is re-evaluated as new when the
    // rules admit it (the skipped row does not pin it forever).
    let root = tempfile::tempdir().unwrap();
    let pool = DatabasePool::in_memory().await.unwrap();
    let provider = Arc::new(TestProvider::new());
    let store = SqliteStateStore::new(pool.pool().clone());

    let body = vec![0u8; 1024];
    provider.add_file(1, "huge-notes.pdf", &body, ts(0));

    let mut config = Config::default();
    config.canvas.base_url = "https://canvas.test".to_string();
    config.download.root = root.path().to_path_buf();
    // First pass: everything this size is rejected
    config.filters.max_file_size_mb = 50;
    config.filters.pdf_max_size_mb = 30;
    let mut strict = config.clone();
    strict.filters.extension_blacklist.push(".pdf".to_string());

    let engine = SyncEngine::new(
        provider.clone(),
        Arc::new(SqliteStateStore::new(pool.pool().clone())),
        &strict,
    );
    engine.sync(false, CancellationToken::new()).await.unwrap();
    assert_eq!(
        store.lookup(FileId::new(1)).await.unwrap().unwrap().status(),
        FileStatus::Skipped
    );

    // Second pass with the default rules admits it
    let engine = SyncEngine::new(
        provider.clone(),
        Arc::new(SqliteStateStore::new(pool.pool().clone())),
        &config,
    );
    let summary = engine.sync(false, CancellationToken::new()).await.unwrap();

    assert_eq!(summary.counts.new_files, 1);
    assert_eq!(
        store.lookup(FileId::new(1)).await.unwrap().unwrap().status(),
        FileStatus::Downloaded
    );
}

#[tokio::test]
async fn test_colliding_names_get_stable_distinct_paths() {
    let fx = setup().await;
    fx.provider.add_file(10, "notes.pdf", b"first", ts(0));
    fx.provider.add_file(20, "notes.pdf", b"second", ts(0));

    let summary = fx
        .engine
        .sync(false, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(summary.counts.new_files, 2);

    let course_dir = fx.root.path().join("CS2106 - Operating Systems (Sem 1)");
    assert_eq!(
        std::fs::read(course_dir.join("notes_10.pdf")).unwrap(),
        b"first"
    );
    assert_eq!(
        std::fs::read(course_dir.join("notes_20.pdf")).unwrap(),
        b"second"
    );

    // Paths are stable across runs: second run sees both unchanged
    let summary = fx
        .engine
        .sync(false, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(summary.counts.unchanged, 2);
}
