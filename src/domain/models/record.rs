//! Durable representation of an experiment.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::experiment::{
    Experiment, ExperimentConfig, ExperimentStatus, Optimization, Progress, Transition,
};

/// The row persisted by an [`ExperimentStore`](crate::domain::ports::ExperimentStore).
///
/// Live counters (current iteration, elapsed time, reward trace) are not
/// durable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentRecord {
    pub id: Uuid,
    pub route_id: String,
    pub route_file: String,
    pub search_method: String,
    pub num_iterations: u32,
    pub timeout_seconds: u32,
    pub headless: bool,
    pub random_seed: u64,
    pub reward_function: String,
    pub optimization: Optimization,
    pub status: ExperimentStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub best_reward: Option<f64>,
    pub total_iterations: u32,
    pub collision_found: bool,
    pub output_directory: Option<PathBuf>,
    pub error_message: Option<String>,
    pub notes: Option<String>,
    pub tags: Vec<String>,
}

impl ExperimentRecord {
    pub fn from_experiment(experiment: &Experiment) -> Self {
        let progress = experiment.progress.as_ref();
        Self {
            id: experiment.id,
            route_id: experiment.config.route_id.clone(),
            route_file: experiment.config.route_file.clone(),
            search_method: experiment.config.search_method.clone(),
            num_iterations: experiment.config.num_iterations,
            timeout_seconds: experiment.config.timeout_seconds,
            headless: experiment.config.headless,
            random_seed: experiment.config.random_seed,
            reward_function: experiment.config.reward_function.clone(),
            optimization: experiment.config.optimization,
            status: experiment.status,
            created_at: experiment.created_at,
            started_at: experiment.started_at,
            completed_at: experiment.completed_at,
            best_reward: progress.and_then(|p| p.best_reward),
            total_iterations: progress.map_or(0, |p| p.current_iteration),
            collision_found: progress.is_some_and(|p| p.collision_found),
            output_directory: Some(experiment.output_directory.clone()),
            error_message: experiment.error_message.clone(),
            notes: experiment.notes.clone(),
            tags: experiment.tags.clone(),
        }
    }

    /// Rebuild the in-memory experiment after a restart.
    ///
    /// Progress exists only if a reward or collision was persisted, and its
    /// iteration counter starts again from zero.
    pub fn into_experiment(self, output_root: &std::path::Path) -> Experiment {
        let progress = (self.best_reward.is_some() || self.collision_found).then(|| Progress {
            best_reward: self.best_reward,
            collision_found: self.collision_found,
            ..Progress::new(self.num_iterations)
        });
        let output_directory = self
            .output_directory
            .unwrap_or_else(|| super::experiment::output_directory_for(output_root, self.id));

        Experiment {
            id: self.id,
            config: ExperimentConfig {
                route_id: self.route_id,
                route_file: self.route_file,
                search_method: self.search_method,
                num_iterations: self.num_iterations,
                timeout_seconds: self.timeout_seconds,
                headless: self.headless,
                random_seed: self.random_seed,
                reward_function: self.reward_function,
                optimization: self.optimization,
            },
            status: self.status,
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            progress,
            error_message: self.error_message,
            output_directory,
            notes: self.notes,
            tags: self.tags,
        }
    }
}

/// Fields written to the store on a status transition.
///
/// Timestamps are only filled in where the store has none yet.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub status: ExperimentStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub best_reward: Option<f64>,
    pub collision_found: Option<bool>,
    pub total_iterations: Option<u32>,
}

impl StatusUpdate {
    /// Build the update for a transition that has just been applied to `experiment`.
    pub fn after(experiment: &Experiment, transition: &Transition) -> Self {
        let mut update = Self {
            status: experiment.status,
            started_at: experiment.started_at,
            completed_at: experiment.completed_at,
            error_message: None,
            best_reward: None,
            collision_found: None,
            total_iterations: None,
        };
        match transition {
            Transition::Start | Transition::Stop => {}
            Transition::Fail { error } => update.error_message = Some(error.clone()),
            Transition::Complete(_) => {
                if let Some(progress) = &experiment.progress {
                    update.best_reward = progress.best_reward;
                    update.collision_found = Some(progress.collision_found);
                    update.total_iterations = Some(progress.current_iteration);
                }
            }
        }
        update
    }
}
