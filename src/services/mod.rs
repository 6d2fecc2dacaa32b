//! Orchestration services.

pub mod experiment_service;
pub mod lifecycle;
pub mod progress_parser;
pub mod registry;

pub use experiment_service::{ExperimentService, LoadReport, INTERRUPTED_BY_RESTART};
pub use lifecycle::Lifecycle;
pub use registry::{ExperimentFilter, ExperimentRegistry};
