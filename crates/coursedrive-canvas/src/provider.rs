//! ICourseProvider implementation backed by CanvasClient
//!
//! Maps Canvas REST DTOs onto domain descriptors:
//! - Courses without a course code (restricted enrollments) are skipped
//! - Folder ids are resolved to paths with the "course files" root segment
//!   stripped, so `course files/Lectures/Week 1` becomes `Lectures/Week 1`
//! - Missing sizes become 0, missing timestamps fall back to `updated_at`

use std::collections::HashMap;

use chrono::{Datelike, Utc};
use tracing::{debug, warn};

use coursedrive_core::domain::{CourseId, CourseInfo, FileId, RemoteFile};
use coursedrive_core::errors::FetchError;
use coursedrive_core::ports::{ByteStream, ICourseProvider};

use crate::client::{CanvasClient, FolderDto};

/// Canvas folder paths start with this root segment
const FOLDER_ROOT: &str = "course files";

/// Canvas-backed course provider
pub struct CanvasCourseProvider {
    client: CanvasClient,
}

impl CanvasCourseProvider {
    pub fn new(client: CanvasClient) -> Self {
        Self { client }
    }

    /// Builds the folder id -> cleaned path map for one course
    fn folder_paths(folders: &[FolderDto]) -> HashMap<i64, String> {
        folders
            .iter()
            .map(|f| (f.id, clean_folder_path(&f.full_name)))
            .collect()
    }
}

/// Strips the "course files" root segment from a folder path
fn clean_folder_path(full_name: &str) -> String {
    let stripped = full_name
        .strip_prefix(FOLDER_ROOT)
        .unwrap_or(full_name)
        .trim_start_matches('/');
    stripped.to_string()
}

#[async_trait::async_trait]
impl ICourseProvider for CanvasCourseProvider {
    async fn list_courses(&self) -> anyhow::Result<Vec<CourseInfo>> {
        let dtos = self.client.list_courses().await?;

        let mut courses = Vec::with_capacity(dtos.len());
        for dto in dtos {
            // Restricted enrollments come back without a course code
            let Some(code) = dto.course_code else {
                debug!(course_id = dto.id, "Skipping course without course code");
                continue;
            };

            let term = dto
                .term
                .and_then(|t| t.name)
                .unwrap_or_else(|| format!("Term {}", Utc::now().year()));

            courses.push(CourseInfo {
                id: CourseId::new(dto.id),
                code,
                name: dto.name.unwrap_or_else(|| "Untitled course".to_string()),
                term,
            });
        }

        debug!(count = courses.len(), "Listed active courses");
        Ok(courses)
    }

    async fn list_course_files(&self, course: &CourseInfo) -> anyhow::Result<Vec<RemoteFile>> {
        let folders = self.client.list_folders(course.id.as_i64()).await?;
        let paths = Self::folder_paths(&folders);

        let files = self.client.list_files(course.id.as_i64()).await?;

        let mut result = Vec::with_capacity(files.len());
        for dto in files {
            let folder_path = match dto.folder_id {
                Some(folder_id) => match paths.get(&folder_id) {
                    Some(path) => path.clone(),
                    None => {
                        warn!(
                            file_id = dto.id,
                            folder_id, "File references unknown folder, placing at course root"
                        );
                        String::new()
                    }
                },
                None => String::new(),
            };

            let modified_at = dto
                .modified_at
                .or(dto.updated_at)
                .unwrap_or_else(Utc::now);

            result.push(RemoteFile {
                id: FileId::new(dto.id),
                course_id: course.id,
                display_name: dto.display_name,
                size_bytes: dto.size.unwrap_or(0),
                modified_at,
                folder_path,
                download_url: dto.url,
                web_url: format!(
                    "{}/courses/{}/files/{}",
                    self.client.base_url(),
                    course.id,
                    dto.id
                ),
            });
        }

        debug!(course = %course.label(), count = result.len(), "Listed course files");
        Ok(result)
    }

    async fn fetch(&self, file: &RemoteFile) -> Result<ByteStream, FetchError> {
        self.client.download_stream(&file.download_url).await
    }
}
