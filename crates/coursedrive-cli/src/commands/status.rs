//! Status command - recent run history

use anyhow::{Context, Result};
use clap::Args;

use coursedrive_core::ports::IStateStore;
use coursedrive_store::{DatabasePool, SqliteStateStore};

#[derive(Debug, Args)]
pub struct StatusCommand {
    /// How many runs to show
    #[arg(long, default_value_t = 10)]
    pub limit: u32,
}

impl StatusCommand {
    pub async fn execute(&self, json: bool) -> Result<()> {
        let db_path = super::default_db_path();
        let pool = DatabasePool::new(&db_path)
            .await
            .context("Failed to open state database")?;
        let store = SqliteStateStore::new(pool.pool().clone());

        let runs = store.recent_runs(self.limit).await?;

        if json {
            println!("{}", serde_json::to_string_pretty(&runs)?);
            return Ok(());
        }

        if runs.is_empty() {
            println!("No runs recorded yet.");
            return Ok(());
        }

        for run in &runs {
            let finished = run
                .finished_at()
                .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "-".to_string());
            let counts = run.counts();
            println!(
                "#{:<4} {:<12} started {}  finished {}  new {} updated {} unchanged {} skipped {} failed {}",
                run.id(),
                run.outcome().to_string(),
                run.started_at().format("%Y-%m-%d %H:%M:%S"),
                finished,
                counts.new_files,
                counts.updated,
                counts.unchanged,
                counts.skipped,
                counts.failed,
            );
        }

        Ok(())
    }
}
