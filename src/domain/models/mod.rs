pub mod config;
pub mod experiment;
pub mod record;
pub mod result;

pub use config::{
    CleanupConfig, Config, DatabaseConfig, LoggingConfig, RecoveryConfig, RunnerConfig,
    SupervisionConfig,
};
pub use experiment::{
    CompletionSummary, Experiment, ExperimentConfig, ExperimentStatus, ExperimentSummary,
    ExperimentUpdate, Optimization, Progress, ProgressDelta, Transition, TransitionOutcome,
};
pub use record::{ExperimentRecord, StatusUpdate};
pub use result::{BestSolution, ExperimentResult, BEST_SOLUTION_FILE, RUN_CONFIG_FILE};
