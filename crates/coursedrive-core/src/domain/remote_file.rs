//! Remote descriptors produced by the course provider
//!
//! `RemoteFile` is the per-run snapshot of a file as Canvas reports it.
//! It is ephemeral: a fresh set is produced on every run and none of it is
//! persisted directly (the state store keeps its own `TrackedFile` rows).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::{CourseId, FileId};

/// A course as reported by the remote system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseInfo {
    /// Canvas course id
    pub id: CourseId,
    /// Short course code (e.g. "CS2106")
    pub code: String,
    /// Full course name
    pub name: String,
    /// Term/semester label (e.g. "AY25/26 Semester 1")
    pub term: String,
}

impl CourseInfo {
    /// "CODE - Name" label used in logs and reports
    pub fn label(&self) -> String {
        format!("{} - {}", self.code, self.name)
    }
}

/// Snapshot of a remote file's metadata for one run
///
/// The `(size_bytes, modified_at)` pair is the fingerprint used by the
/// change detector; `download_url` is the authenticated content endpoint
/// and `web_url` the human-facing page linked from run reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    /// Stable remote identity
    pub id: FileId,
    /// Owning course
    pub course_id: CourseId,
    /// Display name (what Canvas shows, used for the local filename)
    pub display_name: String,
    /// Byte size; 0 when the remote does not report one
    pub size_bytes: u64,
    /// Last-modified timestamp on the remote system
    pub modified_at: DateTime<Utc>,
    /// Folder path within the course ("" for the course root)
    pub folder_path: String,
    /// Authenticated download URL
    pub download_url: String,
    /// Human-facing URL on the remote system
    pub web_url: String,
}

impl RemoteFile {
    /// Lowercased extension including the leading dot ("" when absent)
    pub fn extension(&self) -> String {
        match self.display_name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => {
                format!(".{}", ext.to_lowercase())
            }
            _ => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(name: &str) -> RemoteFile {
        RemoteFile {
            id: FileId::new(1),
            course_id: CourseId::new(10),
            display_name: name.to_string(),
            size_bytes: 100,
            modified_at: Utc::now(),
            folder_path: String::new(),
            download_url: "https://canvas.test/files/1/download".to_string(),
            web_url: "https://canvas.test/courses/10/files/1".to_string(),
        }
    }

    #[test]
    fn test_extension_simple() {
        assert_eq!(remote("notes.PDF").extension(), ".pdf");
        assert_eq!(remote("lecture.mp4").extension(), ".mp4");
    }

    #[test]
    fn test_extension_multiple_dots() {
        assert_eq!(remote("archive.tar.gz").extension(), ".gz");
    }

    #[test]
    fn test_extension_absent() {
        assert_eq!(remote("README").extension(), "");
        assert_eq!(remote(".hidden").extension(), "");
        assert_eq!(remote("trailing.").extension(), "");
    }

    #[test]
    fn test_course_label() {
        let course = CourseInfo {
            id: CourseId::new(10),
            code: "CS2106".to_string(),
            name: "Operating Systems".to_string(),
            term: "Sem 1".to_string(),
        };
        assert_eq!(course.label(), "CS2106 - Operating Systems");
    }
}
