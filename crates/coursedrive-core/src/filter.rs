//! Filter engine
//!
//! Pure decision function over remote file descriptors: no I/O, no side
//! effects, total over every input. Rules are evaluated in a fixed
//! precedence order and the first match wins, so an oversized video is
//! reported as a video rejection rather than a size rejection.
//!
//! ## Rule order
//!
//! 1. extension blacklist (video vs other extension class)
//! 2. size above the global maximum
//! 3. PDFs above the PDF-specific maximum (textbook heuristic)
//! 4. case-insensitive name patterns ("textbook", "recording", ...)
//! 5. admit

use serde::{Deserialize, Serialize};

use crate::config::FilterConfig;
use crate::domain::RemoteFile;

/// Extensions classified as video for rejection reporting
const VIDEO_EXTS: &[&str] = &[
    ".mp4", ".avi", ".mov", ".mkv", ".webm", ".flv", ".wmv", ".m4v", ".mpeg", ".mpg",
];

/// Why a file was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Blacklisted video extension
    VideoExt,
    /// Blacklisted non-video extension (ebooks etc.)
    OtherExt,
    /// Larger than the global size cap
    TooLarge,
    /// PDF above the PDF-specific cap
    LikelyTextbook,
    /// Display name matched a skip pattern
    NamePattern,
}

impl SkipReason {
    /// Short stable label
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::VideoExt => "video_ext",
            SkipReason::OtherExt => "other_ext",
            SkipReason::TooLarge => "too_large",
            SkipReason::LikelyTextbook => "likely_textbook",
            SkipReason::NamePattern => "name_pattern",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of classifying one descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterDecision {
    /// Eligible for download
    Admit,
    /// Not downloaded; `detail` is the human-readable annotation carried
    /// into the run summary and the skipped-file record
    Reject { reason: SkipReason, detail: String },
}

impl FilterDecision {
    pub fn is_admit(&self) -> bool {
        matches!(self, FilterDecision::Admit)
    }
}

/// Compiled filter rules
///
/// Construction assumes an already-validated [`FilterConfig`]; threshold
/// sanity is a load-time configuration error, never a per-file failure.
#[derive(Debug, Clone)]
pub struct FilterEngine {
    max_size_bytes: u64,
    pdf_max_size_bytes: u64,
    blacklist: Vec<String>,
    patterns: Vec<String>,
}

impl FilterEngine {
    pub fn new(config: &FilterConfig) -> Self {
        Self {
            max_size_bytes: config.max_file_size_mb * 1024 * 1024,
            pdf_max_size_bytes: config.pdf_max_size_mb * 1024 * 1024,
            blacklist: config
                .extension_blacklist
                .iter()
                .map(|e| e.to_lowercase())
                .collect(),
            patterns: config
                .name_patterns_to_skip
                .iter()
                .map(|p| p.to_lowercase())
                .collect(),
        }
    }

    /// Classify one remote file descriptor
    pub fn classify(&self, file: &RemoteFile) -> FilterDecision {
        let ext = file.extension();
        let size = file.size_bytes;

        if !ext.is_empty() && self.blacklist.iter().any(|b| *b == ext) {
            let (reason, kind) = if VIDEO_EXTS.contains(&ext.as_str()) {
                (SkipReason::VideoExt, "video file")
            } else {
                (SkipReason::OtherExt, "blacklisted file type")
            };
            return FilterDecision::Reject {
                reason,
                detail: format!("{kind} ({ext})"),
            };
        }

        if size > self.max_size_bytes {
            return FilterDecision::Reject {
                reason: SkipReason::TooLarge,
                detail: format!(
                    "exceeds size limit ({:.1} MB > {} MB)",
                    size as f64 / 1024.0 / 1024.0,
                    self.max_size_bytes / 1024 / 1024
                ),
            };
        }

        if ext == ".pdf" && size > self.pdf_max_size_bytes {
            return FilterDecision::Reject {
                reason: SkipReason::LikelyTextbook,
                detail: format!(
                    "large PDF ({:.1} MB) - likely textbook",
                    size as f64 / 1024.0 / 1024.0
                ),
            };
        }

        let name_lower = file.display_name.to_lowercase();
        if let Some(pattern) = self.patterns.iter().find(|p| name_lower.contains(p.as_str())) {
            return FilterDecision::Reject {
                reason: SkipReason::NamePattern,
                detail: format!("name matches skip pattern '{pattern}'"),
            };
        }

        FilterDecision::Admit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CourseId, FileId};
    use chrono::Utc;

    const MB: u64 = 1024 * 1024;

    fn engine() -> FilterEngine {
        FilterEngine::new(&FilterConfig::default())
    }

    fn remote(name: &str, size: u64) -> RemoteFile {
        RemoteFile {
            id: FileId::new(1),
            course_id: CourseId::new(10),
            display_name: name.to_string(),
            size_bytes: size,
            modified_at: Utc::now(),
            folder_path: String::new(),
            download_url: "https://canvas.test/files/1/download".to_string(),
            web_url: "https://canvas.test/courses/10/files/1".to_string(),
        }
    }

    fn reject_reason(decision: FilterDecision) -> SkipReason {
        match decision {
            FilterDecision::Reject { reason, .. } => reason,
            FilterDecision::Admit => panic!("expected rejection"),
        }
    }

    #[test]
    fn test_small_pdf_admitted() {
        // Scenario: 5 MB lecture PDF with a 50 MB global and 30 MB PDF cap
        let decision = engine().classify(&remote("Lecture1.pdf", 5 * MB));
        assert!(decision.is_admit());
    }

    #[test]
    fn test_video_rejected_by_extension_before_size() {
        // An oversized video must report the extension class, not TooLarge
        let decision = engine().classify(&remote("Week6_Recording.mp4", 485 * MB));
        assert_eq!(reject_reason(decision), SkipReason::VideoExt);
    }

    #[test]
    fn test_large_pdf_rejected_as_textbook() {
        let decision = engine().classify(&remote("Textbook_Ch1.pdf", 45 * MB));
        assert_eq!(reject_reason(decision), SkipReason::LikelyTextbook);
    }

    #[test]
    fn test_ebook_extension_is_other_ext() {
        let decision = engine().classify(&remote("reader.epub", 2 * MB));
        assert_eq!(reject_reason(decision), SkipReason::OtherExt);
    }

    #[test]
    fn test_oversized_non_video_rejected_too_large() {
        let decision = engine().classify(&remote("dataset.zip", 51 * MB));
        assert_eq!(reject_reason(decision), SkipReason::TooLarge);
    }

    #[test]
    fn test_size_exactly_at_threshold_admitted() {
        // Thresholds are exclusive upper bounds: "greater than" rejects
        assert!(engine().classify(&remote("notes.txt", 50 * MB)).is_admit());
        assert!(engine().classify(&remote("slides.pdf", 30 * MB)).is_admit());
    }

    #[test]
    fn test_zero_size_never_rejected_for_size() {
        assert!(engine().classify(&remote("empty.pdf", 0)).is_admit());
    }

    #[test]
    fn test_name_pattern_case_insensitive() {
        let decision = engine().classify(&remote("Course TEXTBOOK scan.docx", MB));
        assert_eq!(reject_reason(decision), SkipReason::NamePattern);
    }

    #[test]
    fn test_no_extension_admitted_unless_pattern() {
        assert!(engine().classify(&remote("Makefile", 1024)).is_admit());

        let decision = engine().classify(&remote("lecture recording", 1024));
        assert_eq!(reject_reason(decision), SkipReason::NamePattern);
    }

    #[test]
    fn test_pattern_checked_after_pdf_rule() {
        // "Textbook_Ch1.pdf" at 45 MB matches both rules; the PDF size rule
        // has higher precedence
        let decision = engine().classify(&remote("Textbook_Ch1.pdf", 45 * MB));
        assert_eq!(reject_reason(decision), SkipReason::LikelyTextbook);

        // Under the PDF cap, the name pattern still rejects it
        let decision = engine().classify(&remote("Textbook_Ch1.pdf", 5 * MB));
        assert_eq!(reject_reason(decision), SkipReason::NamePattern);
    }

    #[test]
    fn test_classify_is_deterministic() {
        let file = remote("Week6_Recording.mp4", 485 * MB);
        let eng = engine();
        let first = eng.classify(&file);
        for _ in 0..5 {
            assert_eq!(eng.classify(&file), first);
        }
    }
}
