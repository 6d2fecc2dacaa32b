//! Environment cleaners run before each launch.

pub mod command;

pub use command::CommandCleaner;

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::models::CleanupConfig;
use crate::domain::ports::EnvironmentCleaner;

/// Cleaner that does nothing; used when no cleanup command is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCleaner;

#[async_trait]
impl EnvironmentCleaner for NoopCleaner {
    fn name(&self) -> &'static str {
        "noop"
    }

    async fn cleanup(&self) -> bool {
        true
    }
}

/// Build the cleaner described by the configuration.
pub fn cleaner_from_config(config: &CleanupConfig) -> Arc<dyn EnvironmentCleaner> {
    match CommandCleaner::from_config(config) {
        Some(cleaner) => Arc::new(cleaner),
        None => Arc::new(NoopCleaner),
    }
}
