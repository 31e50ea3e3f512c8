//! CLI subcommands

pub mod courses;
pub mod status;
pub mod sync;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use coursedrive_canvas::{CanvasClient, CanvasCourseProvider};
use coursedrive_core::config::{Config, API_TOKEN_ENV};

/// Loads and validates configuration from the given or default path
pub fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    let path = config_path.unwrap_or_else(Config::default_path);
    let config = Config::load_or_default(&path);

    let errors = config.validate();
    if !errors.is_empty() {
        for error in &errors {
            eprintln!("config error: {error}");
        }
        bail!("Configuration at {} is invalid", path.display());
    }

    Ok(config)
}

/// Builds the Canvas provider from config plus the token environment
pub fn build_provider(config: &Config) -> Result<CanvasCourseProvider> {
    let token = Config::api_token()
        .with_context(|| format!("Canvas API token not set; export {API_TOKEN_ENV}"))?;
    let client = CanvasClient::new(&config.canvas.base_url, token);
    Ok(CanvasCourseProvider::new(client))
}

/// Default location of the state database
pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("coursedrive")
        .join("coursedrive.db")
}
