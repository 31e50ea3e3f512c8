//! Local layout planning
//!
//! Maps remote identities onto relative local paths below the download
//! root. The mapping must be a pure function of the listing so it is stable
//! across runs: two remote files that sanitize to the same local name get an
//! identity-based suffix, applied to every member of the collision set so
//! the result does not depend on listing order.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use coursedrive_core::domain::{CourseInfo, FileId, RemoteFile};

/// Longest filename component we will produce
const MAX_COMPONENT_LEN: usize = 200;

/// Sanitizes one path component for the local filesystem
///
/// Replaces the characters that are invalid on common filesystems with
/// underscores, trims leading/trailing dots and spaces, and bounds length.
pub fn sanitize_component(name: &str) -> String {
    let mut cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    cleaned = cleaned.trim_matches(|c| c == '.' || c == ' ').to_string();

    if cleaned.len() > MAX_COMPONENT_LEN {
        // Keep the extension when truncating
        let (stem, ext) = match cleaned.rsplit_once('.') {
            Some((s, e)) if !s.is_empty() => (s.to_string(), format!(".{e}")),
            _ => (cleaned.clone(), String::new()),
        };
        let budget = MAX_COMPONENT_LEN.saturating_sub(ext.len());
        let truncated: String = stem.chars().take(budget).collect();
        cleaned = format!("{truncated}{ext}");
    }

    if cleaned.is_empty() {
        "unnamed".to_string()
    } else {
        cleaned
    }
}

/// Directory name for a course: "CODE - Name (Term)"
pub fn course_dir(course: &CourseInfo) -> String {
    sanitize_component(&format!(
        "{} - {} ({})",
        course.code, course.name, course.term
    ))
}

/// Appends the remote identity to a filename stem
fn with_id_suffix(path: &Path, id: FileId) -> PathBuf {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unnamed");
    let name = match path.extension().and_then(|s| s.to_str()) {
        Some(ext) => format!("{stem}_{id}.{ext}"),
        None => format!("{stem}_{id}"),
    };
    path.with_file_name(name)
}

/// Plans relative destination paths for one course's admitted files
///
/// Returns the identity -> relative path map. When several files land on
/// the same path, every one of them gets `_<file id>` appended to its stem.
pub fn plan_paths(course: &CourseInfo, files: &[&RemoteFile]) -> HashMap<FileId, PathBuf> {
    let dir = PathBuf::from(course_dir(course));

    let naive: Vec<(FileId, PathBuf)> = files
        .iter()
        .map(|file| {
            let mut path = dir.clone();
            for part in file.folder_path.split('/').filter(|p| !p.is_empty()) {
                path.push(sanitize_component(part));
            }
            path.push(sanitize_component(&file.display_name));
            (file.id, path)
        })
        .collect();

    let mut occurrences: HashMap<&PathBuf, u32> = HashMap::new();
    for (_, path) in &naive {
        *occurrences.entry(path).or_insert(0) += 1;
    }

    naive
        .iter()
        .map(|(id, path)| {
            if occurrences[path] > 1 {
                (*id, with_id_suffix(path, *id))
            } else {
                (*id, path.clone())
            }
        })
        .collect()
}
