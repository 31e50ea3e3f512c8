//! Course provider port (driven/secondary port)
//!
//! This module defines the interface for the remote learning-management
//! system. The primary implementation targets Canvas via its REST API, but
//! the trait is provider-agnostic.
//!
//! ## Design Notes
//!
//! - Discovery methods use `anyhow::Result` because failures there are
//!   fatal for the run and need no per-error classification.
//! - `fetch` returns the typed [`FetchError`](crate::errors::FetchError)
//!   taxonomy so the retry policy can apply its retryable predicate.
//! - File bodies are exposed as a chunk stream rather than a single buffer:
//!   the download manager observes cancellation between chunks and never
//!   holds a whole file in memory.

use bytes::Bytes;
use futures_util::stream::BoxStream;

use crate::domain::{CourseInfo, RemoteFile};
use crate::errors::FetchError;

/// Streaming file body: chunks of bytes, each of which may fail mid-transfer
pub type ByteStream = BoxStream<'static, Result<Bytes, FetchError>>;

/// Port trait for remote course-store operations
#[async_trait::async_trait]
pub trait ICourseProvider: Send + Sync {
    /// Lists the active courses visible to the authenticated user
    ///
    /// Pagination is the implementation's responsibility; the returned
    /// vector is the fully materialized list.
    async fn list_courses(&self) -> anyhow::Result<Vec<CourseInfo>>;

    /// Lists every file in a course, folder paths resolved
    ///
    /// The engine materializes the full list per course before filtering;
    /// there is no streaming-while-filtering requirement.
    async fn list_course_files(&self, course: &CourseInfo) -> anyhow::Result<Vec<RemoteFile>>;

    /// Opens a download stream for one file
    async fn fetch(&self, file: &RemoteFile) -> Result<ByteStream, FetchError>;
}
