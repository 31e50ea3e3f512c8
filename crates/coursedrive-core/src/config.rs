//! Configuration module for Coursedrive.
//!
//! Provides typed configuration structs that map to the YAML configuration
//! file, with loading, validation and defaults. Validation happens once at
//! load time; decision logic downstream may assume thresholds are sane.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Environment variable holding the Canvas API token.
///
/// The token never lives in the YAML file so a shared config cannot leak it.
pub const API_TOKEN_ENV: &str = "CANVAS_API_TOKEN";

/// Top-level configuration for Coursedrive.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub canvas: CanvasConfig,
    pub download: DownloadConfig,
    pub filters: FilterConfig,
    pub courses: CoursesConfig,
}

/// Canvas instance settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    /// Base URL of the Canvas instance, e.g. `https://canvas.example.edu`.
    pub base_url: String,
}

/// Download behaviour settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Root directory for the local course-file mirror.
    pub root: PathBuf,
    /// Maximum concurrent downloads.
    pub concurrency: u32,
    /// Wall-clock budget for one fetch attempt, in seconds.
    pub fetch_timeout_secs: u64,
}

/// File filtering rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Files above this size (in MiB) are rejected.
    pub max_file_size_mb: u64,
    /// PDFs above this size (in MiB) are rejected as likely textbooks.
    pub pdf_max_size_mb: u64,
    /// Extensions (with leading dot) that are never downloaded.
    pub extension_blacklist: Vec<String>,
    /// Case-insensitive substrings that reject a file by name.
    pub name_patterns_to_skip: Vec<String>,
}

/// Course selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoursesConfig {
    /// Canvas course ids to mirror. Empty means every active course.
    pub ids: Vec<i64>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            root: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("~"))
                .join("CanvasFiles"),
            concurrency: 3,
            fetch_timeout_secs: 300,
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: 50,
            pdf_max_size_mb: 30,
            extension_blacklist: [
                ".mp4", ".avi", ".mov", ".mkv", ".webm", ".flv", ".wmv", ".m4v", ".mpeg",
                ".mpg", ".epub", ".mobi",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            name_patterns_to_skip: [
                "textbook",
                "ebook",
                "full book",
                "recording",
                "lecture recording",
                "video lecture",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/coursedrive/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("coursedrive")
            .join("config.yaml")
    }

    /// Canvas API token from the environment, if set.
    pub fn api_token() -> Option<String> {
        std::env::var(API_TOKEN_ENV).ok().filter(|t| !t.is_empty())
    }
}

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"download.concurrency"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- canvas ---
        if self.canvas.base_url.is_empty() {
            errors.push(ValidationError {
                field: "canvas.base_url".into(),
                message: "must be set".into(),
            });
        } else if url::Url::parse(&self.canvas.base_url).is_err() {
            errors.push(ValidationError {
                field: "canvas.base_url".into(),
                message: format!("not a valid URL: {}", self.canvas.base_url),
            });
        }

        // --- download ---
        if self.download.root.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "download.root".into(),
                message: "must be set".into(),
            });
        }
        if self.download.concurrency == 0 || self.download.concurrency > 16 {
            errors.push(ValidationError {
                field: "download.concurrency".into(),
                message: "must be in range 1..=16".into(),
            });
        }
        if self.download.fetch_timeout_secs == 0 {
            errors.push(ValidationError {
                field: "download.fetch_timeout_secs".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- filters ---
        if self.filters.max_file_size_mb == 0 {
            errors.push(ValidationError {
                field: "filters.max_file_size_mb".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.filters.pdf_max_size_mb == 0 {
            errors.push(ValidationError {
                field: "filters.pdf_max_size_mb".into(),
                message: "must be greater than 0".into(),
            });
        }
        for ext in &self.filters.extension_blacklist {
            if !ext.starts_with('.') {
                errors.push(ValidationError {
                    field: "filters.extension_blacklist".into(),
                    message: format!("extension '{ext}' must start with '.'"),
                });
            }
        }

        errors
    }
}
