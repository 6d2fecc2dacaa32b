//! Domain errors for the simfuzz experiment orchestrator.

use thiserror::Error;
use uuid::Uuid;

/// Domain-level errors that can occur in the orchestrator.
///
/// Precondition violations (`ExperimentNotFound`, `AlreadyRunning`,
/// `NotRunning`, `InvalidStateTransition`) are returned to callers of the
/// service. Launch, timeout and subprocess failures never leave the
/// supervised task; they are recorded on the experiment as its error message.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Experiment not found: {0}")]
    ExperimentNotFound(Uuid),

    #[error("Experiment {0} is already running")]
    AlreadyRunning(Uuid),

    #[error("Experiment {0} is not running")]
    NotRunning(Uuid),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Invalid experiment configuration: {0}")]
    InvalidConfig(String),

    #[error("Launch failed: {0}")]
    LaunchError(String),

    #[error("Experiment timed out after {seconds} seconds")]
    Timeout { seconds: f64 },

    #[error("Experiment subprocess failed with return code {}", format_exit_code(*.code))]
    Subprocess { code: Option<i32> },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Path escapes experiment output directory: {0}")]
    PathTraversal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

fn format_exit_code(code: Option<i32>) -> String {
    code.map_or_else(|| "none (terminated by signal)".to_string(), |c| c.to_string())
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::Persistence(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::Serialization(err.to_string())
    }
}
