//! Courses command - list active courses on the Canvas instance

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use coursedrive_core::ports::ICourseProvider;

#[derive(Debug, Args)]
pub struct CoursesCommand {}

impl CoursesCommand {
    pub async fn execute(&self, config_path: Option<PathBuf>, json: bool) -> Result<()> {
        let config = super::load_config(config_path)?;
        let provider = super::build_provider(&config)?;

        let courses = provider.list_courses().await?;

        if json {
            println!("{}", serde_json::to_string_pretty(&courses)?);
            return Ok(());
        }

        if courses.is_empty() {
            println!("No active courses found.");
            return Ok(());
        }

        println!("Active courses (add ids to courses.ids in the config to mirror):");
        for course in &courses {
            println!("  {:<10} {} ({})", course.id.to_string(), course.label(), course.term);
        }

        Ok(())
    }
}
