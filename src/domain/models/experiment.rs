//! Experiment domain model.
//!
//! An experiment is one simulation-based search run executed by an external
//! child process. Its status only changes through [`Experiment::apply_transition`],
//! which is the lifecycle state machine:
//!
//! ```text
//! created -> running -> { completed | failed | stopped }
//! ```
//!
//! Terminal states are absorbing. Each timestamp is set at most once.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};

/// Number of reward observations kept in [`Progress::recent_rewards`].
pub const RECENT_REWARDS_MAX: usize = 10;

/// Status of an experiment in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentStatus {
    /// Created, never started
    Created,
    /// Child process is being supervised
    Running,
    /// Child process exited successfully
    Completed,
    /// Launch, supervision or the child process failed
    Failed,
    /// Cancelled by an explicit stop request
    Stopped,
}

impl Default for ExperimentStatus {
    fn default() -> Self {
        Self::Created
    }
}

impl ExperimentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "created" => Some(Self::Created),
            "running" => Some(Self::Running),
            "completed" | "complete" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "stopped" => Some(Self::Stopped),
            _ => None,
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Stopped)
    }

    /// Valid transitions from this status.
    pub fn valid_transitions(&self) -> Vec<ExperimentStatus> {
        match self {
            Self::Created => vec![Self::Running],
            Self::Running => vec![Self::Completed, Self::Failed, Self::Stopped],
            Self::Completed | Self::Failed | Self::Stopped => vec![],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

impl std::fmt::Display for ExperimentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction in which the search improves its reward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Optimization {
    /// Lower rewards are better (e.g. time-to-collision)
    Minimize,
    /// Higher rewards are better
    Maximize,
}

impl Default for Optimization {
    fn default() -> Self {
        Self::Minimize
    }
}

impl Optimization {
    /// Whether `candidate` improves on `current`.
    pub fn is_improvement(&self, candidate: f64, current: f64) -> bool {
        match self {
            Self::Minimize => candidate < current,
            Self::Maximize => candidate > current,
        }
    }
}

/// Immutable configuration snapshot captured at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Route identifier passed positionally to the runner
    pub route_id: String,
    /// Route definition file
    pub route_file: String,
    /// Search method identifier (e.g. `random`)
    #[serde(default = "default_search_method")]
    pub search_method: String,
    /// Iteration budget
    #[serde(default = "default_num_iterations")]
    pub num_iterations: u32,
    /// Per-scenario timeout budget handed to the runner
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u32,
    /// Run the simulator without rendering
    #[serde(default)]
    pub headless: bool,
    /// Random seed
    #[serde(default = "default_random_seed")]
    pub random_seed: u64,
    /// Reward function identifier (e.g. `ttc`)
    #[serde(default = "default_reward_function")]
    pub reward_function: String,
    /// Direction of reward improvement
    #[serde(default)]
    pub optimization: Optimization,
}

fn default_search_method() -> String {
    "random".to_string()
}

const fn default_num_iterations() -> u32 {
    10
}

const fn default_timeout_seconds() -> u32 {
    300
}

const fn default_random_seed() -> u64 {
    42
}

fn default_reward_function() -> String {
    "ttc".to_string()
}

impl ExperimentConfig {
    pub fn new(route_id: impl Into<String>, route_file: impl Into<String>) -> Self {
        Self {
            route_id: route_id.into(),
            route_file: route_file.into(),
            search_method: default_search_method(),
            num_iterations: default_num_iterations(),
            timeout_seconds: default_timeout_seconds(),
            headless: false,
            random_seed: default_random_seed(),
            reward_function: default_reward_function(),
            optimization: Optimization::default(),
        }
    }

    pub fn with_search_method(mut self, method: impl Into<String>) -> Self {
        self.search_method = method.into();
        self
    }

    pub fn with_iterations(mut self, num_iterations: u32) -> Self {
        self.num_iterations = num_iterations;
        self
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Validate externally supplied fields.
    ///
    /// Route ids arrive from user-facing forms; a parenthesized value such as
    /// `(Town04)` is a display label, not an id, and is rejected.
    pub fn validate(&self) -> Result<(), String> {
        let route_id = self.route_id.trim();
        if route_id.is_empty() {
            return Err("route_id cannot be empty".to_string());
        }
        if route_id.starts_with('(') && route_id.ends_with(')') {
            return Err(format!(
                "route_id '{}' looks like a display label, expected a route identifier",
                self.route_id
            ));
        }
        if self.route_file.trim().is_empty() {
            return Err("route_file cannot be empty".to_string());
        }
        if self.search_method.trim().is_empty() {
            return Err("search_method cannot be empty".to_string());
        }
        if self.num_iterations == 0 {
            return Err("num_iterations must be at least 1".to_string());
        }
        if self.timeout_seconds == 0 {
            return Err("timeout_seconds must be at least 1".to_string());
        }
        Ok(())
    }
}

/// A single best-effort observation extracted from one line of child output.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProgressDelta {
    pub best_reward: Option<f64>,
    pub current_iteration: Option<u32>,
    pub collision_found: bool,
}

impl ProgressDelta {
    pub fn is_empty(&self) -> bool {
        self.best_reward.is_none() && self.current_iteration.is_none() && !self.collision_found
    }
}

/// Live progress of a running experiment.
///
/// Within one run `current_iteration` never decreases, `best_reward` only
/// improves under the configured [`Optimization`], and `collision_found`
/// never resets once set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub current_iteration: u32,
    pub total_iterations: u32,
    pub best_reward: Option<f64>,
    pub collision_found: bool,
    pub elapsed_seconds: Option<f64>,
    /// Most recent reward observations, oldest first
    pub recent_rewards: Vec<f64>,
}

impl Progress {
    pub fn new(total_iterations: u32) -> Self {
        Self {
            total_iterations,
            ..Default::default()
        }
    }

    /// Merge a parsed observation. Returns true if anything changed.
    pub fn apply(&mut self, delta: &ProgressDelta, optimization: Optimization) -> bool {
        let mut changed = false;

        if let Some(iteration) = delta.current_iteration {
            if iteration > self.current_iteration {
                self.current_iteration = iteration;
                changed = true;
            }
        }

        if let Some(reward) = delta.best_reward.filter(|r| r.is_finite()) {
            self.recent_rewards.push(reward);
            if self.recent_rewards.len() > RECENT_REWARDS_MAX {
                self.recent_rewards.remove(0);
            }
            let improves = self
                .best_reward
                .map_or(true, |best| optimization.is_improvement(reward, best));
            if improves {
                self.best_reward = Some(reward);
            }
            changed = true;
        }

        if delta.collision_found && !self.collision_found {
            self.collision_found = true;
            changed = true;
        }

        changed
    }
}

/// Final figures recorded when an experiment completes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionSummary {
    pub best_reward: Option<f64>,
    pub collision_found: bool,
    pub total_iterations: Option<u32>,
}

/// The permitted lifecycle transitions and the fields each one may carry.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// `created -> running`
    Start,
    /// `running -> completed`
    Complete(CompletionSummary),
    /// `running -> failed`
    Fail { error: String },
    /// `running -> stopped`
    Stop,
}

impl Transition {
    pub fn target(&self) -> ExperimentStatus {
        match self {
            Self::Start => ExperimentStatus::Running,
            Self::Complete(_) => ExperimentStatus::Completed,
            Self::Fail { .. } => ExperimentStatus::Failed,
            Self::Stop => ExperimentStatus::Stopped,
        }
    }
}

/// What [`Experiment::apply_transition`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// Status changed
    Applied,
    /// The experiment was already terminal; nothing changed
    Unchanged,
}

/// One tracked experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub id: Uuid,
    pub config: ExperimentConfig,
    pub status: ExperimentStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub progress: Option<Progress>,
    pub error_message: Option<String>,
    pub output_directory: PathBuf,
    pub notes: Option<String>,
    pub tags: Vec<String>,
}

impl Experiment {
    /// Create a new experiment whose artifacts live under `output_root`.
    pub fn new(config: ExperimentConfig, output_root: &std::path::Path) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            output_directory: output_directory_for(output_root, id),
            config,
            status: ExperimentStatus::default(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            progress: None,
            error_message: None,
            notes: None,
            tags: Vec::new(),
        }
    }

    /// Check if experiment is terminal.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply a lifecycle transition.
    ///
    /// Any transition attempted on a terminal experiment is a no-op. Other
    /// transitions not allowed by [`ExperimentStatus::valid_transitions`]
    /// are rejected.
    pub fn apply_transition(
        &mut self,
        transition: &Transition,
        now: DateTime<Utc>,
    ) -> DomainResult<TransitionOutcome> {
        let target = transition.target();
        if self.status.is_terminal() {
            return Ok(TransitionOutcome::Unchanged);
        }
        if !self.status.can_transition_to(target) {
            return Err(DomainError::InvalidStateTransition {
                from: self.status.as_str().to_string(),
                to: target.as_str().to_string(),
            });
        }

        self.status = target;
        match transition {
            Transition::Start => {
                self.started_at.get_or_insert(now);
            }
            Transition::Complete(summary) => {
                let total = self.config.num_iterations;
                let progress = self.progress.get_or_insert_with(|| Progress::new(total));
                if summary.best_reward.is_some() {
                    progress.best_reward = summary.best_reward;
                }
                progress.collision_found |= summary.collision_found;
                if let Some(iterations) = summary.total_iterations {
                    progress.current_iteration = progress.current_iteration.max(iterations);
                }
            }
            Transition::Fail { error } => {
                self.error_message = Some(error.clone());
            }
            Transition::Stop => {}
        }
        if target.is_terminal() {
            self.completed_at.get_or_insert(now);
        }

        Ok(TransitionOutcome::Applied)
    }

    /// Merge a progress observation into this experiment.
    pub fn record_progress(&mut self, delta: &ProgressDelta) -> bool {
        let total = self.config.num_iterations;
        let optimization = self.config.optimization;
        self.progress
            .get_or_insert_with(|| Progress::new(total))
            .apply(delta, optimization)
    }

    /// Refresh the elapsed wall-clock time of the current run.
    pub fn record_elapsed(&mut self, elapsed_seconds: f64) {
        let total = self.config.num_iterations;
        self.progress
            .get_or_insert_with(|| Progress::new(total))
            .elapsed_seconds = Some(elapsed_seconds);
    }

    pub fn summary(&self) -> ExperimentSummary {
        let progress = self.progress.as_ref();
        ExperimentSummary {
            id: self.id,
            status: self.status,
            route_id: self.config.route_id.clone(),
            route_file: self.config.route_file.clone(),
            search_method: self.config.search_method.clone(),
            created_at: self.created_at,
            completed_at: self.completed_at,
            collision_found: progress.is_some_and(|p| p.collision_found),
            best_reward: progress.and_then(|p| p.best_reward),
            current_iteration: progress.map_or(0, |p| p.current_iteration),
        }
    }
}

/// Deterministic per-experiment output directory.
pub fn output_directory_for(output_root: &std::path::Path, id: Uuid) -> PathBuf {
    output_root.join(format!("experiment_{id}"))
}

/// List view of an experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentSummary {
    pub id: Uuid,
    pub status: ExperimentStatus,
    pub route_id: String,
    pub route_file: String,
    pub search_method: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub collision_found: bool,
    pub best_reward: Option<f64>,
    pub current_iteration: u32,
}

/// Metadata-only update; never touches status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentUpdate {
    pub notes: Option<String>,
    pub tags: Option<Vec<String>>,
}
