//! Sync command - run one mirror pass against Canvas
//!
//! Wires the adapters together (Canvas client, SQLite store), installs the
//! termination-signal handler and runs the sync engine. Ctrl-C (or SIGTERM)
//! triggers the cooperative drain: in-flight transfers finish or abort,
//! outcomes committed so far stay committed, and the run finalizes as
//! interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::info;

use coursedrive_store::{DatabasePool, SqliteStateStore};
use coursedrive_sync::{RunSummary, SyncEngine};

#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Classify and report only; no downloads, no state changes
    #[arg(long)]
    pub dry_run: bool,
}

impl SyncCommand {
    pub async fn execute(&self, config_path: Option<PathBuf>, json: bool) -> Result<()> {
        let config = super::load_config(config_path)?;
        let provider = Arc::new(super::build_provider(&config)?);

        let db_path = super::default_db_path();
        let pool = DatabasePool::new(&db_path)
            .await
            .context("Failed to open state database")?;
        let store = Arc::new(SqliteStateStore::new(pool.pool().clone()));

        let engine = SyncEngine::new(provider, store, &config);

        // Termination signals trigger the cooperative drain
        let cancel = CancellationToken::new();
        let signal_token = cancel.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            info!("Termination signal received, draining");
            signal_token.cancel();
        });

        if self.dry_run {
            info!("Dry run: no downloads, no state changes");
        }

        let summary = engine.sync(self.dry_run, cancel).await?;

        if json {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        } else {
            print_summary(&summary);
        }

        Ok(())
    }
}

/// Resolves when the process is asked to terminate
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

fn print_summary(summary: &RunSummary) {
    let mode = if summary.dry_run { " (dry run)" } else { "" };
    println!("Sync {}{mode}", summary.outcome);
    println!("  new:       {}", summary.counts.new_files);
    println!("  updated:   {}", summary.counts.updated);
    println!("  unchanged: {}", summary.counts.unchanged);
    println!("  skipped:   {}", summary.counts.skipped);
    println!("  failed:    {}", summary.counts.failed);
    println!("  took:      {}ms", summary.duration_ms);

    if !summary.downloaded.is_empty() {
        println!("\nDownloaded:");
        for file in &summary.downloaded {
            let tag = if file.updated { "updated" } else { "new" };
            println!(
                "  [{tag}] {} ({})",
                file.local_path.display(),
                format_size(file.size_bytes)
            );
        }
    }

    if !summary.rejected.is_empty() {
        println!("\nSkipped:");
        for file in &summary.rejected {
            println!("  {} - {} ({})", file.course, file.name, file.detail);
        }
    }

    if !summary.failed.is_empty() {
        println!("\nFailed:");
        for file in &summary.failed {
            println!(
                "  {} - {} ({} after {} attempts)",
                file.course, file.name, file.error, file.attempts
            );
        }
    }
}

/// Human-readable byte size
fn format_size(bytes: u64) -> String {
    let mut size = bytes as f64;
    for unit in ["B", "KB", "MB", "GB"] {
        if size < 1024.0 {
            return format!("{size:.1} {unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.1} TB")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512.0 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
    }
}
