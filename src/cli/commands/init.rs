//! Implementation of the `simfuzz init` command.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::PathBuf;

use crate::adapters::sqlite::{database_url, initialize_database, PoolConfig};
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Config;
use crate::infrastructure::setup::initialize_project;

#[derive(Debug, Serialize)]
pub struct InitOutput {
    pub message: String,
    pub config_path: PathBuf,
    pub config_written: bool,
    pub directories_created: Vec<String>,
    pub database_path: String,
    pub output_dir: String,
}

impl CommandOutput for InitOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![self.message.clone()];
        if !self.directories_created.is_empty() {
            lines.push("\nCreated directories:".to_string());
            for dir in &self.directories_created {
                lines.push(format!("  - {dir}"));
            }
        }
        if self.config_written {
            lines.push(format!("\nWrote {}", self.config_path.display()));
        } else {
            lines.push(format!(
                "\nKept existing {} (use --force to overwrite)",
                self.config_path.display()
            ));
        }
        lines.push(format!("Database initialized at {}", self.database_path));
        lines.push(format!("Experiment output root: {}", self.output_dir));
        lines.join("\n")
    }
}

pub async fn execute(config: &Config, force: bool, json_mode: bool) -> Result<()> {
    let root = std::env::current_dir().context("Failed to get current directory")?;
    let report = initialize_project(&root, force)?;

    tokio::fs::create_dir_all(config.output_root())
        .await
        .with_context(|| format!("Failed to create output directory {}", config.output_dir))?;

    initialize_database(
        &database_url(&config.database.path),
        Some(PoolConfig::from(&config.database)),
    )
    .await
    .context("Failed to initialize database")?;

    let result = InitOutput {
        message: "Project initialized successfully.".to_string(),
        config_path: report.config_path,
        config_written: report.config_written,
        directories_created: report.directories_created,
        database_path: config.database.path.clone(),
        output_dir: config.output_dir.clone(),
    };
    output(&result, json_mode);
    Ok(())
}
