//! simfuzz - experiment orchestrator for simulation-based scenario search
//!
//! simfuzz launches a long-running search runner as a child process per
//! experiment, streams its output into live progress, enforces runtime
//! deadlines, and records every experiment in a durable `SQLite` store.
//!
//! # Architecture
//!
//! The crate follows a hexagonal layout:
//!
//! - **Domain Layer** (`domain`): experiment model, lifecycle rules, errors and ports
//! - **Adapters** (`adapters`): `SQLite` store and environment cleaners implementing the ports
//! - **Application Layer** (`application`): child-process supervision and output draining
//! - **Service Layer** (`services`): registry, lifecycle and the public experiment operations
//! - **Infrastructure Layer** (`infrastructure`): configuration, logging and project setup
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use simfuzz::{ExperimentConfig, ExperimentService};
//!
//! let service = ExperimentService::new(&config, store, cleaner)?;
//! let experiment = service.create(ExperimentConfig::new("3", "routes/town05.xml")).await?;
//! service.start(experiment.id).await?;
//! service.wait(experiment.id).await;
//! ```

pub mod adapters;
pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{
    Config, Experiment, ExperimentConfig, ExperimentResult, ExperimentStatus, ExperimentSummary,
    ExperimentUpdate, Optimization, Progress,
};
pub use domain::ports::{EnvironmentCleaner, ExperimentStore};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{ExperimentFilter, ExperimentService};
