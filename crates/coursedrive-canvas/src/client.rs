//! Canvas REST API client
//!
//! Provides a typed HTTP client for the Canvas LMS REST API. Handles
//! authentication headers, JSON deserialization, Link-header pagination and
//! streaming downloads.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use coursedrive_canvas::client::CanvasClient;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = CanvasClient::new("https://canvas.example.edu", "api-token");
//! let courses = client.list_courses().await?;
//! println!("{} active courses", courses.len());
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use coursedrive_core::errors::FetchError;
use coursedrive_core::ports::ByteStream;

/// Page size requested from paginated endpoints
const PER_PAGE: u32 = 100;

// ============================================================================
// Canvas API response types
// ============================================================================

/// A course object from `GET /api/v1/courses`
#[derive(Debug, Clone, Deserialize)]
pub struct CourseDto {
    pub id: i64,
    /// Absent on restricted enrollments; such courses are skipped
    pub course_code: Option<String>,
    pub name: Option<String>,
    /// Present when the request includes `include[]=term`
    pub term: Option<TermDto>,
}

/// Term sub-object of a course
#[derive(Debug, Clone, Deserialize)]
pub struct TermDto {
    pub name: Option<String>,
}

/// A file object from `GET /api/v1/courses/{id}/files`
#[derive(Debug, Clone, Deserialize)]
pub struct FileDto {
    pub id: i64,
    pub display_name: String,
    pub size: Option<u64>,
    /// Content modification timestamp (what change detection keys on)
    pub modified_at: Option<DateTime<Utc>>,
    /// Metadata modification timestamp, used as a fallback
    pub updated_at: Option<DateTime<Utc>>,
    /// Authenticated download URL
    pub url: String,
    pub folder_id: Option<i64>,
}

/// A folder object from `GET /api/v1/courses/{id}/folders`
#[derive(Debug, Clone, Deserialize)]
pub struct FolderDto {
    pub id: i64,
    /// Full path including the "course files" root segment
    pub full_name: String,
}

// ============================================================================
// CanvasClient
// ============================================================================

/// HTTP client for Canvas REST API calls
///
/// Wraps `reqwest::Client` with bearer authentication and base URL
/// construction. Listing endpoints follow Link-header pagination until the
/// last page and return the fully materialized result.
pub struct CanvasClient {
    client: Client,
    base_url: String,
    api_token: String,
}

impl CanvasClient {
    /// Creates a new CanvasClient for the given instance and token
    pub fn new(base_url: impl Into<String>, api_token: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            client: Client::new(),
            base_url,
            api_token: api_token.into(),
        }
    }

    /// Returns the Canvas instance base URL (no trailing slash)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Creates an authenticated request builder for an absolute URL
    fn request_url(&self, method: Method, url: &str) -> RequestBuilder {
        self.client.request(method, url).bearer_auth(&self.api_token)
    }

    /// Creates an authenticated request builder for an API path
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        self.request_url(method, &url)
    }

    /// Fetches every page of a paginated collection endpoint
    ///
    /// Canvas signals continuation through the `Link` response header with
    /// `rel="next"`; the loop follows it until the header disappears.
    async fn get_paginated<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>> {
        let mut url = format!("{}{}", self.base_url, path);
        let mut items: Vec<T> = Vec::new();

        loop {
            let response = self
                .request_url(Method::GET, &url)
                .send()
                .await
                .with_context(|| format!("Failed to fetch {url}"))?
                .error_for_status()
                .with_context(|| format!("GET {url} returned error status"))?;

            let next = next_page_url(&response);

            let mut page: Vec<T> = response
                .json()
                .await
                .with_context(|| format!("Failed to parse response from {url}"))?;
            items.append(&mut page);

            match next {
                Some(next_url) => url = next_url,
                None => break,
            }
        }

        debug!(path, count = items.len(), "Paginated listing complete");
        Ok(items)
    }

    /// Lists the active student courses, term included
    pub async fn list_courses(&self) -> Result<Vec<CourseDto>> {
        self.get_paginated(&format!(
            "/api/v1/courses?enrollment_state=active&include[]=term&per_page={PER_PAGE}"
        ))
        .await
    }

    /// Lists every file in a course
    pub async fn list_files(&self, course_id: i64) -> Result<Vec<FileDto>> {
        self.get_paginated(&format!(
            "/api/v1/courses/{course_id}/files?per_page={PER_PAGE}"
        ))
        .await
    }

    /// Lists every folder in a course
    pub async fn list_folders(&self, course_id: i64) -> Result<Vec<FolderDto>> {
        self.get_paginated(&format!(
            "/api/v1/courses/{course_id}/folders?per_page={PER_PAGE}"
        ))
        .await
    }

    /// Opens a streaming download for an authenticated file URL
    ///
    /// The response body is surfaced chunk by chunk so the caller can stop
    /// between chunks and never buffers a whole file.
    pub async fn download_stream(&self, url: &str) -> Result<ByteStream, FetchError> {
        let response = self
            .request_url(Method::GET, url)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::from_status(status.as_u16()));
        }

        let stream = response.bytes_stream().map(|chunk| {
            chunk.map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout
                } else {
                    FetchError::Interrupted(e.to_string())
                }
            })
        });

        Ok(stream.boxed())
    }
}

/// Maps a request-level reqwest error onto the fetch taxonomy
fn request_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else if e.is_connect() {
        FetchError::Connect(e.to_string())
    } else {
        FetchError::Interrupted(e.to_string())
    }
}

/// Extracts the `rel="next"` URL from a response's Link header
fn next_page_url(response: &Response) -> Option<String> {
    let header = response.headers().get("Link")?.to_str().ok()?;
    parse_next_link(header)
}

/// Parses a Link header value for the rel="next" target
///
/// Input: `<https://c.edu/api/v1/courses?page=2>; rel="next", <...>; rel="last"`
/// Output: `Some("https://c.edu/api/v1/courses?page=2")`
fn parse_next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|part| {
        let (url_part, params) = part.split_once(';')?;
        if params.contains("rel=\"next\"") {
            let url = url_part.trim().trim_start_matches('<').trim_end_matches('>');
            Some(url.to_string())
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_stripped() {
        let client = CanvasClient::new("https://canvas.example.edu/", "token");
        assert_eq!(client.base_url(), "https://canvas.example.edu");

        let client = CanvasClient::new("https://canvas.example.edu///", "token");
        assert_eq!(client.base_url(), "https://canvas.example.edu");
    }

    #[test]
    fn test_request_builder_url_and_auth() {
        let client = CanvasClient::new("https://canvas.example.edu", "secret-token");
        let request = client
            .request(Method::GET, "/api/v1/courses")
            .build()
            .unwrap();
        assert_eq!(
            request.url().as_str(),
            "https://canvas.example.edu/api/v1/courses"
        );
        let auth = request
            .headers()
            .get("authorization")
            .unwrap()
            .to_str()
            .unwrap();
        assert_eq!(auth, "Bearer secret-token");
    }

    #[test]
    fn test_parse_next_link() {
        let header = "<https://c.edu/api/v1/courses?page=2&per_page=100>; rel=\"next\", \
                      <https://c.edu/api/v1/courses?page=5&per_page=100>; rel=\"last\"";
        assert_eq!(
            parse_next_link(header),
            Some("https://c.edu/api/v1/courses?page=2&per_page=100".to_string())
        );
    }

    #[test]
    fn test_parse_next_link_missing() {
        let header = "<https://c.edu/api/v1/courses?page=5>; rel=\"last\"";
        assert_eq!(parse_next_link(header), None);
        assert_eq!(parse_next_link(""), None);
    }

    #[test]
    fn test_file_dto_deserialization() {
        let json = r#"{
            "id": 42,
            "display_name": "Lecture 1.pdf",
            "size": 1048576,
            "modified_at": "2026-01-15T10:00:00Z",
            "updated_at": "2026-01-16T09:00:00Z",
            "url": "https://canvas.example.edu/files/42/download?download_frd=1",
            "folder_id": 7
        }"#;

        let file: FileDto = serde_json::from_str(json).unwrap();
        assert_eq!(file.id, 42);
        assert_eq!(file.display_name, "Lecture 1.pdf");
        assert_eq!(file.size, Some(1_048_576));
        assert!(file.modified_at.is_some());
        assert_eq!(file.folder_id, Some(7));
    }

    #[test]
    fn test_file_dto_partial_fields() {
        let json = r#"{
            "id": 42,
            "display_name": "odd-file",
            "url": "https://canvas.example.edu/files/42/download"
        }"#;

        let file: FileDto = serde_json::from_str(json).unwrap();
        assert!(file.size.is_none());
        assert!(file.modified_at.is_none());
        assert!(file.folder_id.is_none());
    }

    #[test]
    fn test_course_dto_without_code() {
        let json = r#"{"id": 9, "name": "Restricted course"}"#;
        let course: CourseDto = serde_json::from_str(json).unwrap();
        assert!(course.course_code.is_none());
        assert!(course.term.is_none());
    }
}
