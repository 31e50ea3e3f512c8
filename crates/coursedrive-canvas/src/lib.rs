//! Coursedrive Canvas - Canvas LMS REST adapter
//!
//! Implements the `ICourseProvider` port from `coursedrive-core` against
//! the Canvas REST API:
//! - Bearer-token authenticated requests
//! - Link-header pagination, fully materialized per listing
//! - Folder-path resolution for course files
//! - Streaming file downloads mapped onto the fetch error taxonomy
//!
//! ## Key Components
//!
//! - [`CanvasClient`] - typed HTTP client for the REST endpoints
//! - [`CanvasCourseProvider`] - the `ICourseProvider` implementation

pub mod client;
pub mod provider;

pub use client::CanvasClient;
pub use provider::CanvasCourseProvider;
