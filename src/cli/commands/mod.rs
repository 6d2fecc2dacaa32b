//! CLI command implementations.

pub mod experiment;
pub mod init;

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use crate::adapters::cleanup::cleaner_from_config;
use crate::adapters::sqlite::{database_url, initialize_database, PoolConfig, SqliteExperimentStore};
use crate::domain::models::Config;
use crate::infrastructure::config::ConfigLoader;
use crate::services::ExperimentService;

/// Load configuration from `path`, or from the default hierarchy when unset.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
}

/// Open the store and build a service seeded from it.
///
/// Running records are left untouched; `simfuzz recover` fails them explicitly.
pub async fn open_service(config: &Config) -> Result<Arc<ExperimentService>> {
    let service = build_service(config).await?;
    service.load().await;
    Ok(service)
}

/// Open the store and build an empty service.
pub async fn build_service(config: &Config) -> Result<Arc<ExperimentService>> {
    let url = database_url(&config.database.path);
    let pool = initialize_database(&url, Some(PoolConfig::from(&config.database)))
        .await
        .with_context(|| format!("Failed to open database at {}", config.database.path))?;

    let store = Arc::new(SqliteExperimentStore::new(pool));
    let cleaner = cleaner_from_config(&config.cleanup);
    let service = ExperimentService::new(config, store, cleaner)
        .context("Failed to create experiment service")?;
    Ok(Arc::new(service))
}
