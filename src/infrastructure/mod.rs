//! Infrastructure layer module
//!
//! - Configuration management (figment: defaults, YAML files, environment)
//! - Logging infrastructure (tracing subscriber, rolling files)
//! - Project setup
//!
//! Storage and cleanup adapters that satisfy the domain ports live in `adapters`.

pub mod config;
pub mod logging;
pub mod setup;
