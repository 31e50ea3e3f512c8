//! Sync orchestrator
//!
//! The [`SyncEngine`] drives one run through its phases:
//!
//! ```text
//! INIT -> DISCOVER -> FILTER -> DETECT_CHANGES -> DOWNLOAD -> FINALIZE
//!                                                              |
//!                                   {completed, interrupted, failed}
//! ```
//!
//! Per-file errors never abort the run; run-level errors (discovery failure,
//! unreachable store) do. Download outcomes are committed to the state store
//! one by one as they arrive, which bounds data loss on interruption to the
//! in-flight files. A cancellation observed in any phase stops new work,
//! drains in-flight transfers and finalizes the run as interrupted within a
//! bounded drain window.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use coursedrive_core::config::Config;
use coursedrive_core::detect::{detect, ChangeKind};
use coursedrive_core::domain::{
    CourseId, CourseInfo, FileId, RemoteFile, RunCounts, RunId, RunOutcome, TrackedFile,
};
use coursedrive_core::filter::{FilterDecision, FilterEngine, SkipReason};
use coursedrive_core::ports::{ICourseProvider, IStateStore};
use coursedrive_core::retry::RetryPolicy;

use crate::download::{DownloadManager, DownloadOutcome, DownloadTask};
use crate::{layout, reconcile};

// ============================================================================
// Run summary (consumed by the report collaborator)
// ============================================================================

/// A file the filter engine rejected this run
#[derive(Debug, Clone, Serialize)]
pub struct RejectedFile {
    pub file_id: FileId,
    pub name: String,
    pub course: String,
    pub reason: SkipReason,
    pub detail: String,
    pub size_bytes: u64,
    pub web_url: String,
}

/// A file downloaded this run
#[derive(Debug, Clone, Serialize)]
pub struct DownloadedFile {
    pub file_id: FileId,
    pub name: String,
    pub course: String,
    pub local_path: PathBuf,
    pub size_bytes: u64,
    /// True when this replaced an earlier download
    pub updated: bool,
}

/// A file whose download failed this run
#[derive(Debug, Clone, Serialize)]
pub struct FailedFile {
    pub file_id: FileId,
    pub name: String,
    pub course: String,
    pub error: String,
    pub attempts: u32,
}

/// Plain data summary of one run, no behavior
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    pub counts: RunCounts,
    pub rejected: Vec<RejectedFile>,
    pub downloaded: Vec<DownloadedFile>,
    pub failed: Vec<FailedFile>,
    pub dry_run: bool,
    pub duration_ms: u64,
}

impl RunSummary {
    fn empty(dry_run: bool) -> Self {
        Self {
            outcome: RunOutcome::Completed,
            counts: RunCounts::default(),
            rejected: Vec::new(),
            downloaded: Vec::new(),
            failed: Vec::new(),
            dry_run,
            duration_ms: 0,
        }
    }
}

// ============================================================================
// Run context
// ============================================================================

/// Per-run state threaded through every phase
///
/// There is deliberately no ambient "current run" singleton; the context is
/// created at INIT and dropped at FINALIZE.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Run record id; `None` in dry-run mode (no record is created)
    pub run_id: Option<RunId>,
    /// Cooperative cancellation signal
    pub cancel: CancellationToken,
    /// Classify only; never download, never mutate the store
    pub dry_run: bool,
}

impl RunContext {
    /// Run id used for row commits; dry runs never commit
    fn commit_run_id(&self) -> RunId {
        self.run_id.unwrap_or(RunId::new(0))
    }
}

// ============================================================================
// SyncEngine
// ============================================================================

/// Top-level driver for one mirror run
pub struct SyncEngine {
    provider: Arc<dyn ICourseProvider>,
    store: Arc<dyn IStateStore>,
    filter: FilterEngine,
    downloads: DownloadManager,
    root: PathBuf,
    course_ids: Vec<CourseId>,
}

impl SyncEngine {
    /// Creates an engine from validated configuration
    pub fn new(
        provider: Arc<dyn ICourseProvider>,
        store: Arc<dyn IStateStore>,
        config: &Config,
    ) -> Self {
        let downloads = DownloadManager::new(
            Arc::clone(&provider),
            RetryPolicy::default(),
            config.download.concurrency as usize,
            Duration::from_secs(config.download.fetch_timeout_secs),
        );

        Self {
            provider,
            store,
            filter: FilterEngine::new(&config.filters),
            downloads,
            root: config.download.root.clone(),
            course_ids: config.courses.ids.iter().map(|i| CourseId::new(*i)).collect(),
        }
    }

    /// Performs one full sync run
    ///
    /// Returns the run summary on completion or interruption; returns an
    /// error only for run-level failures (discovery, unreachable store).
    #[tracing::instrument(skip(self, cancel))]
    pub async fn sync(&self, dry_run: bool, cancel: CancellationToken) -> Result<RunSummary> {
        let start = std::time::Instant::now();
        let mut summary = RunSummary::empty(dry_run);

        // --- INIT ---
        let ctx = if dry_run {
            RunContext {
                run_id: None,
                cancel,
                dry_run,
            }
        } else {
            self.store
                .recover_stale_runs()
                .await
                .context("Failed to recover stale runs")?;
            let run = self
                .store
                .create_run(Utc::now())
                .await
                .context("Failed to create run record")?;
            RunContext {
                run_id: Some(run.id()),
                cancel,
                dry_run,
            }
        };

        info!(
            run_id = ?ctx.run_id,
            dry_run,
            root = %self.root.display(),
            "Starting sync run"
        );

        // --- DISCOVER ---
        let listings = match self.discover(&ctx).await {
            Ok(listings) => listings,
            Err(err) => {
                error!(error = %err, "Discovery failed, aborting run");
                self.finalize(&ctx, &mut summary, RunOutcome::Failed, start).await;
                return Err(err.context("Discovery failed"));
            }
        };

        if ctx.cancel.is_cancelled() {
            self.finalize(&ctx, &mut summary, RunOutcome::Interrupted, start)
                .await;
            return Ok(summary);
        }

        let total_files: usize = listings.iter().map(|(_, files)| files.len()).sum();
        info!(
            courses = listings.len(),
            files = total_files,
            "Discovery complete"
        );

        // --- FILTER ---
        let admitted = match self.filter_files(&ctx, &listings, &mut summary).await {
            Ok(admitted) => admitted,
            Err(err) => {
                error!(error = %err, "State store unreachable, aborting run");
                self.finalize(&ctx, &mut summary, RunOutcome::Failed, start).await;
                return Err(err);
            }
        };

        // --- DETECT_CHANGES ---
        let (to_download, first_seen) = match self.detect_changes(&ctx, admitted, &mut summary).await
        {
            Ok(pair) => pair,
            Err(err) => {
                error!(error = %err, "State store unreadable, aborting run");
                self.finalize(&ctx, &mut summary, RunOutcome::Failed, start).await;
                return Err(err);
            }
        };

        info!(
            new = summary.counts.new_files,
            updated = summary.counts.updated,
            unchanged = summary.counts.unchanged,
            skipped = summary.counts.skipped,
            pending_downloads = to_download.len(),
            "Change detection complete"
        );

        // --- DOWNLOAD ---
        if !ctx.dry_run && !to_download.is_empty() && !ctx.cancel.is_cancelled() {
            if let Err(err) = self
                .download_all(&ctx, to_download, first_seen, &mut summary)
                .await
            {
                error!(error = %err, "State store unreachable, aborting run");
                self.finalize(&ctx, &mut summary, RunOutcome::Failed, start).await;
                return Err(err);
            }
        }

        // --- FINALIZE ---
        let outcome = if ctx.cancel.is_cancelled() {
            RunOutcome::Interrupted
        } else {
            RunOutcome::Completed
        };
        self.finalize(&ctx, &mut summary, outcome, start).await;

        info!(
            outcome = %summary.outcome,
            new = summary.counts.new_files,
            updated = summary.counts.updated,
            unchanged = summary.counts.unchanged,
            skipped = summary.counts.skipped,
            failed = summary.counts.failed,
            duration_ms = summary.duration_ms,
            "Sync run finished"
        );

        Ok(summary)
    }

    // ========================================================================
    // DISCOVER
    // ========================================================================

    /// Materializes the remote file list for every selected course
    async fn discover(&self, ctx: &RunContext) -> Result<Vec<(CourseInfo, Vec<RemoteFile>)>> {
        let courses = self
            .provider
            .list_courses()
            .await
            .context("Failed to list courses")?;

        let selected: Vec<CourseInfo> = if self.course_ids.is_empty() {
            courses
        } else {
            courses
                .into_iter()
                .filter(|c| self.course_ids.contains(&c.id))
                .collect()
        };

        let mut listings = Vec::with_capacity(selected.len());
        for course in selected {
            if ctx.cancel.is_cancelled() {
                break;
            }
            let files = self
                .provider
                .list_course_files(&course)
                .await
                .with_context(|| format!("Failed to list files for {}", course.label()))?;
            debug!(course = %course.label(), files = files.len(), "Listed course");
            listings.push((course, files));
        }

        Ok(listings)
    }

    // ========================================================================
    // FILTER
    // ========================================================================

    /// Classifies every descriptor; commits rejections, returns admissions
    async fn filter_files(
        &self,
        ctx: &RunContext,
        listings: &[(CourseInfo, Vec<RemoteFile>)],
        summary: &mut RunSummary,
    ) -> Result<Vec<(CourseInfo, RemoteFile)>> {
        let mut admitted = Vec::new();

        for (course, files) in listings {
            for file in files {
                match self.filter.classify(file) {
                    FilterDecision::Admit => {
                        admitted.push((course.clone(), file.clone()));
                    }
                    FilterDecision::Reject { reason, detail } => {
                        debug!(
                            file = %file.display_name,
                            reason = %reason,
                            detail = %detail,
                            "File rejected"
                        );
                        summary.counts.skipped += 1;
                        summary.rejected.push(RejectedFile {
                            file_id: file.id,
                            name: file.display_name.clone(),
                            course: course.label(),
                            reason,
                            detail: detail.clone(),
                            size_bytes: file.size_bytes,
                            web_url: file.web_url.clone(),
                        });

                        if !ctx.dry_run {
                            if let Err(err) =
                                self.commit_rejection(ctx, course, file, &detail).await
                            {
                                warn!(
                                    file = %file.display_name,
                                    error = %err,
                                    "Failed to record rejection"
                                );
                                self.bail_if_store_dead().await?;
                            }
                        }
                    }
                }
            }
        }

        Ok(admitted)
    }

    /// Writes or refreshes the skipped-row for a rejected file
    ///
    /// A row that is currently `Downloaded` stays that way: the engine never
    /// deletes local bytes, so flipping the row to skipped would break the
    /// "skipped rows have no bytes on disk" invariant.
    async fn commit_rejection(
        &self,
        ctx: &RunContext,
        course: &CourseInfo,
        file: &RemoteFile,
        detail: &str,
    ) -> Result<()> {
        let existing = self.store.lookup(file.id).await?;

        match existing {
            Some(ref tracked) if tracked.is_downloaded() => {
                self.store
                    .touch_last_seen(file.id, ctx.commit_run_id())
                    .await
            }
            existing => {
                let mut row = TrackedFile::skipped(
                    file.id,
                    course.id,
                    file.display_name.clone(),
                    file.size_bytes,
                    file.modified_at,
                    detail.to_string(),
                    ctx.commit_run_id(),
                );
                if let Some(prior) = existing {
                    row = row.with_first_seen(prior.first_seen_at());
                }
                self.store.upsert(&row).await
            }
        }
    }

    // ========================================================================
    // DETECT_CHANGES
    // ========================================================================

    /// Classifies admitted files against reconciled durable state
    ///
    /// Returns the download work list plus the first-seen timestamps of
    /// already-known identities (carried into the commit after download).
    #[allow(clippy::type_complexity)]
    async fn detect_changes(
        &self,
        ctx: &RunContext,
        admitted: Vec<(CourseInfo, RemoteFile)>,
        summary: &mut RunSummary,
    ) -> Result<(
        Vec<(CourseInfo, RemoteFile, ChangeKind)>,
        HashMap<FileId, DateTime<Utc>>,
    )> {
        let mut to_download = Vec::new();
        let mut first_seen = HashMap::new();

        for (course, file) in admitted {
            if ctx.cancel.is_cancelled() {
                break;
            }

            let tracked = self
                .store
                .lookup(file.id)
                .await
                .with_context(|| format!("Failed to look up file {}", file.id))?;

            if let Some(ref t) = tracked {
                first_seen.insert(file.id, t.first_seen_at());
            }

            let effective = reconcile::effective(tracked.as_ref(), &self.root);
            match detect(&file, effective) {
                ChangeKind::Unchanged => {
                    summary.counts.unchanged += 1;
                    if !ctx.dry_run {
                        if let Err(err) = self
                            .store
                            .touch_last_seen(file.id, ctx.commit_run_id())
                            .await
                        {
                            warn!(file = %file.display_name, error = %err, "Failed to touch row");
                            self.bail_if_store_dead().await?;
                        }
                    }
                }
                kind => {
                    if ctx.dry_run {
                        // The manager never runs in dry-run mode; count the
                        // classification as the would-be outcome.
                        match kind {
                            ChangeKind::New => summary.counts.new_files += 1,
                            ChangeKind::Updated => summary.counts.updated += 1,
                            ChangeKind::Unchanged => unreachable!(),
                        }
                    }
                    to_download.push((course, file, kind));
                }
            }
        }

        Ok((to_download, first_seen))
    }

    // ========================================================================
    // DOWNLOAD
    // ========================================================================

    /// Runs the download manager and commits every outcome as it arrives
    async fn download_all(
        &self,
        ctx: &RunContext,
        to_download: Vec<(CourseInfo, RemoteFile, ChangeKind)>,
        first_seen: HashMap<FileId, DateTime<Utc>>,
        summary: &mut RunSummary,
    ) -> Result<()> {
        // Plan destination paths per course so name collisions resolve to
        // stable identity-suffixed paths.
        let mut dest_map: HashMap<FileId, PathBuf> = HashMap::new();
        let mut course_labels: HashMap<FileId, String> = HashMap::new();
        {
            let mut per_course: HashMap<CourseId, (CourseInfo, Vec<&RemoteFile>)> = HashMap::new();
            for (course, file, _) in &to_download {
                per_course
                    .entry(course.id)
                    .or_insert_with(|| (course.clone(), Vec::new()))
                    .1
                    .push(file);
                course_labels.insert(file.id, course.label());
            }
            for (course, files) in per_course.values() {
                dest_map.extend(layout::plan_paths(course, files));
            }
        }

        let tasks: Vec<DownloadTask> = to_download
            .iter()
            .map(|(_, file, kind)| DownloadTask {
                file: file.clone(),
                dest: self.root.join(&dest_map[&file.id]),
                kind: *kind,
            })
            .collect();

        info!(count = tasks.len(), "Starting downloads");

        let mut rx = self.downloads.run(tasks, ctx.cancel.clone());

        while let Some((task, outcome)) = rx.recv().await {
            let course_label = course_labels
                .get(&task.file.id)
                .cloned()
                .unwrap_or_default();

            match outcome {
                DownloadOutcome::Success {
                    bytes_written,
                    checksum,
                    attempts,
                } => {
                    let rel_path = dest_map[&task.file.id].clone();
                    let mut row = TrackedFile::downloaded(
                        task.file.id,
                        task.file.course_id,
                        task.file.display_name.clone(),
                        rel_path.to_string_lossy().into_owned(),
                        bytes_written,
                        task.file.modified_at,
                        Some(checksum),
                        ctx.commit_run_id(),
                    );
                    if let Some(seen) = first_seen.get(&task.file.id) {
                        row = row.with_first_seen(*seen);
                    }

                    match self.store.upsert(&row).await {
                        Ok(()) => {
                            let updated = matches!(task.kind, ChangeKind::Updated);
                            if updated {
                                summary.counts.updated += 1;
                            } else {
                                summary.counts.new_files += 1;
                            }
                            info!(
                                file = %task.file.display_name,
                                bytes = bytes_written,
                                attempts,
                                updated,
                                "Downloaded"
                            );
                            summary.downloaded.push(DownloadedFile {
                                file_id: task.file.id,
                                name: task.file.display_name.clone(),
                                course: course_label,
                                local_path: rel_path,
                                size_bytes: bytes_written,
                                updated,
                            });
                        }
                        Err(err) => {
                            error!(
                                file = %task.file.display_name,
                                error = %err,
                                "Failed to commit download outcome"
                            );
                            summary.counts.failed += 1;
                            self.bail_if_store_dead().await?;
                        }
                    }
                }
                DownloadOutcome::RetriesExhausted { error, attempts } => {
                    warn!(
                        file = %task.file.display_name,
                        error = %error,
                        attempts,
                        "Download failed"
                    );
                    summary.counts.failed += 1;
                    summary.failed.push(FailedFile {
                        file_id: task.file.id,
                        name: task.file.display_name.clone(),
                        course: course_label,
                        error: error.to_string(),
                        attempts,
                    });

                    // Recorded as skipped-with-reason so the next run can
                    // reclassify it as new and retry.
                    let mut row = TrackedFile::skipped(
                        task.file.id,
                        task.file.course_id,
                        task.file.display_name.clone(),
                        task.file.size_bytes,
                        task.file.modified_at,
                        format!("download failed after {attempts} attempts: {error}"),
                        ctx.commit_run_id(),
                    );
                    if let Some(seen) = first_seen.get(&task.file.id) {
                        row = row.with_first_seen(*seen);
                    }

                    if let Err(err) = self.store.upsert(&row).await {
                        error!(
                            file = %task.file.display_name,
                            error = %err,
                            "Failed to commit failure outcome"
                        );
                        self.bail_if_store_dead().await?;
                    }
                }
                DownloadOutcome::Cancelled => {
                    debug!(file = %task.file.display_name, "Download cancelled");
                }
            }
        }

        Ok(())
    }

    // ========================================================================
    // FINALIZE & helpers
    // ========================================================================

    /// Finalizes the run record (best effort) and stamps the summary
    async fn finalize(
        &self,
        ctx: &RunContext,
        summary: &mut RunSummary,
        outcome: RunOutcome,
        start: std::time::Instant,
    ) {
        summary.outcome = outcome;
        summary.duration_ms = start.elapsed().as_millis() as u64;

        if let Some(run_id) = ctx.run_id {
            if let Err(err) = self
                .store
                .finalize_run(run_id, outcome, &summary.counts, Utc::now())
                .await
            {
                error!(run_id = %run_id, error = %err, "Failed to finalize run record");
            }
        }
    }

    /// Escalates a commit failure to a run failure when the store is dead
    ///
    /// One failed row commit skips that file; a store that no longer answers
    /// at all would silently lose every subsequent commit, so the run aborts.
    async fn bail_if_store_dead(&self) -> Result<()> {
        self.store
            .ping()
            .await
            .context("State store is unreachable")
    }
}
