//! Domain layer for the simfuzz experiment orchestrator
//!
//! This module contains the experiment model, its lifecycle state machine,
//! and the ports external collaborators implement.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
