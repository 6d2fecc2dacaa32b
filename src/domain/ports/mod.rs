//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines async trait interfaces that infrastructure adapters must implement:
//! - ExperimentStore: durable record of experiment metadata
//! - EnvironmentCleaner: pre-launch cleanup of a previous run's environment
//!
//! The orchestrator treats both as best-effort collaborators.

pub mod environment;
pub mod experiment_store;

pub use environment::EnvironmentCleaner;
pub use experiment_store::ExperimentStore;
