//! Coursedrive CLI - Mirror Canvas course files to local disk
//!
//! Provides commands for:
//! - Running a sync (with dry-run preview)
//! - Viewing run history
//! - Listing the active courses on the configured Canvas instance

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{courses::CoursesCommand, status::StatusCommand, sync::SyncCommand};

#[derive(Debug, Parser)]
#[command(name = "coursedrive", version, about = "Incremental Canvas course-file mirror")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Synchronize course files from Canvas
    Sync(SyncCommand),
    /// Show recent run history
    Status(StatusCommand),
    /// List active courses on the Canvas instance
    Courses(CoursesCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Sync(cmd) => cmd.execute(cli.config, cli.json).await,
        Commands::Status(cmd) => cmd.execute(cli.json).await,
        Commands::Courses(cmd) => cmd.execute(cli.config, cli.json).await,
    }
}
