//! Download manager
//!
//! Fetches admitted files under bounded concurrency with retry/backoff and
//! safe partial-file handling. Workers pull tasks from a shared queue, so no
//! two workers ever fetch the same file, and stream outcomes back through a
//! channel so the orchestrator can commit each one as it arrives.
//!
//! ## Atomic-rename discipline
//!
//! Every transfer writes to a hidden temp name in the destination directory
//! and renames to the final path only after the full byte stream arrived and
//! the byte count matched the expected size. A file visible at its final
//! path is therefore always complete; a crash mid-download leaves only an
//! orphaned temp file, never a truncated real one.
//!
//! ## Cancellation
//!
//! The shared token is observed between queue pulls, between body chunks and
//! during backoff sleeps. On cancellation workers stop dequeuing, abort
//! in-flight transfers, delete their temp files and report `Cancelled` for
//! everything that never completed.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::StreamExt;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use coursedrive_core::detect::ChangeKind;
use coursedrive_core::domain::{FileId, RemoteFile};
use coursedrive_core::errors::FetchError;
use coursedrive_core::ports::ICourseProvider;
use coursedrive_core::retry::RetryPolicy;

/// One unit of download work
#[derive(Debug, Clone)]
pub struct DownloadTask {
    /// The remote descriptor to fetch
    pub file: RemoteFile,
    /// Absolute final path for the bytes
    pub dest: PathBuf,
    /// Why this file is being fetched (new vs updated)
    pub kind: ChangeKind,
}

/// Terminal result of one task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// Bytes are at the final path, complete and verified
    Success {
        bytes_written: u64,
        /// SHA-256 of the written bytes, hex-encoded
        checksum: String,
        attempts: u32,
    },
    /// Every allowed attempt failed (or the first non-retryable one did)
    RetriesExhausted { error: FetchError, attempts: u32 },
    /// The task never completed because the run was cancelled
    Cancelled,
}

/// Result of a single fetch attempt
enum AttemptOutcome {
    Complete { bytes: u64, checksum: String },
    Cancelled,
    Failed(FetchError),
}

/// Bounded-concurrency download executor
pub struct DownloadManager {
    provider: Arc<dyn ICourseProvider>,
    policy: RetryPolicy,
    concurrency: usize,
    fetch_timeout: Duration,
}

impl DownloadManager {
    pub fn new(
        provider: Arc<dyn ICourseProvider>,
        policy: RetryPolicy,
        concurrency: usize,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            provider,
            policy,
            concurrency: concurrency.max(1),
            fetch_timeout,
        }
    }

    /// Starts the worker pool over `tasks` and returns the outcome stream
    ///
    /// The receiver yields one `(task, outcome)` pair per input task, in
    /// completion order, and closes when all workers are done.
    pub fn run(
        &self,
        tasks: Vec<DownloadTask>,
        cancel: CancellationToken,
    ) -> mpsc::Receiver<(DownloadTask, DownloadOutcome)> {
        let (tx, rx) = mpsc::channel(64);

        let workers = self.concurrency.min(tasks.len().max(1));
        let queue = Arc::new(Mutex::new(VecDeque::from(tasks)));

        info!(workers, "Starting download workers");

        for worker in 0..workers {
            let queue = Arc::clone(&queue);
            let tx = tx.clone();
            let cancel = cancel.clone();
            let provider = Arc::clone(&self.provider);
            let policy = self.policy.clone();
            let fetch_timeout = self.fetch_timeout;

            tokio::spawn(async move {
                loop {
                    let task = queue.lock().expect("download queue poisoned").pop_front();
                    let Some(task) = task else { break };

                    if cancel.is_cancelled() {
                        // Drain: everything still queued reports Cancelled
                        if tx.send((task, DownloadOutcome::Cancelled)).await.is_err() {
                            break;
                        }
                        continue;
                    }

                    debug!(worker, file = %task.file.display_name, "Worker picked up task");
                    let outcome =
                        download_one(provider.as_ref(), &policy, fetch_timeout, &task, &cancel)
                            .await;

                    if tx.send((task, outcome)).await.is_err() {
                        break;
                    }
                }
            });
        }

        rx
    }
}

/// Temp path for a transfer: hidden name in the destination directory
///
/// Carries the remote identity so concurrent transfers that collide on a
/// display name can never share a temp file.
fn temp_path(dest: &Path, id: FileId) -> PathBuf {
    let name = dest
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("download");
    dest.with_file_name(format!(".{name}.{id}.part"))
}

/// Best-effort removal of an orphaned temp file
async fn remove_temp(temp: &Path) {
    if let Err(e) = tokio::fs::remove_file(temp).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %temp.display(), error = %e, "Failed to remove temp file");
        }
    }
}

/// Downloads one file with retry, backoff and cancellation
async fn download_one(
    provider: &dyn ICourseProvider,
    policy: &RetryPolicy,
    fetch_timeout: Duration,
    task: &DownloadTask,
    cancel: &CancellationToken,
) -> DownloadOutcome {
    let temp = temp_path(&task.dest, task.file.id);
    let mut last_error = None;

    for attempt in 1..=policy.max_attempts() {
        let result = tokio::time::timeout(
            fetch_timeout,
            attempt_fetch(provider, task, &temp, cancel),
        )
        .await;

        let error = match result {
            Ok(AttemptOutcome::Complete { bytes, checksum }) => {
                if attempt > 1 {
                    info!(
                        file = %task.file.display_name,
                        attempt,
                        "Download succeeded after retry"
                    );
                }
                return DownloadOutcome::Success {
                    bytes_written: bytes,
                    checksum,
                    attempts: attempt,
                };
            }
            Ok(AttemptOutcome::Cancelled) => {
                remove_temp(&temp).await;
                debug!(file = %task.file.display_name, "Download cancelled mid-transfer");
                return DownloadOutcome::Cancelled;
            }
            Ok(AttemptOutcome::Failed(e)) => e,
            Err(_elapsed) => FetchError::Timeout,
        };

        remove_temp(&temp).await;

        if error.is_retryable() && attempt < policy.max_attempts() {
            let delay = policy.delay_for(attempt);
            warn!(
                file = %task.file.display_name,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Download attempt failed, retrying"
            );
            last_error = Some(error);

            tokio::select! {
                _ = cancel.cancelled() => return DownloadOutcome::Cancelled,
                _ = tokio::time::sleep(delay) => {}
            }
        } else {
            return DownloadOutcome::RetriesExhausted {
                error,
                attempts: attempt,
            };
        }
    }

    // The loop always returns from its last iteration
    DownloadOutcome::RetriesExhausted {
        error: last_error
            .unwrap_or_else(|| FetchError::Interrupted("retry loop exhausted".to_string())),
        attempts: policy.max_attempts(),
    }
}

/// One fetch attempt: stream to temp, verify, rename
async fn attempt_fetch(
    provider: &dyn ICourseProvider,
    task: &DownloadTask,
    temp: &Path,
    cancel: &CancellationToken,
) -> AttemptOutcome {
    if let Some(parent) = task.dest.parent() {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            return AttemptOutcome::Failed(FetchError::Io(format!(
                "create_dir_all {}: {e}",
                parent.display()
            )));
        }
    }

    let mut stream = match provider.fetch(&task.file).await {
        Ok(s) => s,
        Err(e) => return AttemptOutcome::Failed(e),
    };

    let mut file = match tokio::fs::File::create(temp).await {
        Ok(f) => f,
        Err(e) => {
            return AttemptOutcome::Failed(FetchError::Io(format!(
                "create {}: {e}",
                temp.display()
            )))
        }
    };

    let mut hasher = Sha256::new();
    let mut written: u64 = 0;

    while let Some(chunk) = stream.next().await {
        if cancel.is_cancelled() {
            return AttemptOutcome::Cancelled;
        }

        let chunk = match chunk {
            Ok(c) => c,
            Err(e) => return AttemptOutcome::Failed(e),
        };

        if let Err(e) = file.write_all(&chunk).await {
            return AttemptOutcome::Failed(FetchError::Io(format!("write: {e}")));
        }
        hasher.update(&chunk);
        written += chunk.len() as u64;
    }

    if let Err(e) = file.sync_all().await {
        return AttemptOutcome::Failed(FetchError::Io(format!("fsync: {e}")));
    }
    drop(file);

    // When the remote declared a size, a shorter body is a broken transfer,
    // not a complete file.
    if task.file.size_bytes > 0 && written != task.file.size_bytes {
        return AttemptOutcome::Failed(FetchError::Interrupted(format!(
            "short body: {written} of {} bytes",
            task.file.size_bytes
        )));
    }

    if let Err(e) = tokio::fs::rename(temp, &task.dest).await {
        return AttemptOutcome::Failed(FetchError::Io(format!(
            "rename to {}: {e}",
            task.dest.display()
        )));
    }

    AttemptOutcome::Complete {
        bytes: written,
        checksum: hex_digest(hasher),
    }
}

/// Hex-encodes a finished SHA-256 digest
fn hex_digest(hasher: Sha256) -> String {
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}
