//! Coursedrive Sync - Incremental synchronization engine
//!
//! The [`SyncEngine`](engine::SyncEngine) drives one mirror run:
//!
//! 1. **Discover**: materialize the remote file list per selected course
//! 2. **Filter**: classify every descriptor against the configured rules
//! 3. **Detect changes**: compare admitted files against durable state
//! 4. **Download**: fetch new/updated files under bounded concurrency,
//!    committing each outcome to the state store as it arrives
//! 5. **Finalize**: write the run record and return the run summary
//!
//! Cancellation is cooperative throughout: a triggered token stops new work,
//! aborts in-flight transfers between chunks, cleans up temp files and
//! finalizes the run as interrupted.

pub mod download;
pub mod engine;
pub mod layout;
pub mod reconcile;

pub use download::{DownloadManager, DownloadOutcome, DownloadTask};
pub use engine::{RunContext, RunSummary, SyncEngine};
