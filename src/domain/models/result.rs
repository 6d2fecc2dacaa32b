//! Result artifacts written by the search runner.

use std::path::PathBuf;

use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use super::experiment::{CompletionSummary, ExperimentStatus};

/// File name of the result artifact the runner writes on success.
pub const BEST_SOLUTION_FILE: &str = "best_solution.json";

/// File name of the per-run configuration handed to the runner.
pub const RUN_CONFIG_FILE: &str = "experiment_config.json";

/// Contents of `best_solution.json`. Every field is optional on disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BestSolution {
    #[serde(deserialize_with = "null_as_default")]
    pub total_iterations: u32,
    pub best_reward: Option<f64>,
    pub best_parameters: Option<serde_json::Value>,
    #[serde(deserialize_with = "null_as_default")]
    pub collision_found: bool,
    pub total_duration: Option<f64>,
    pub average_iteration_time: Option<f64>,
    pub min_reward: Option<f64>,
    pub max_reward: Option<f64>,
    pub mean_reward: Option<f64>,
    pub std_reward: Option<f64>,
}

/// Treat an explicit `null` like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl BestSolution {
    pub fn completion_summary(&self) -> CompletionSummary {
        CompletionSummary {
            best_reward: self.best_reward,
            collision_found: self.collision_found,
            total_iterations: (self.total_iterations > 0).then_some(self.total_iterations),
        }
    }
}

/// Detailed results of an experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentResult {
    pub experiment_id: Uuid,
    pub final_status: ExperimentStatus,
    pub total_iterations: u32,
    pub best_reward: Option<f64>,
    pub best_parameters: Option<serde_json::Value>,
    #[serde(deserialize_with = "null_as_default")]
    pub collision_found: bool,
    pub total_duration: Option<f64>,
    pub average_iteration_time: Option<f64>,
    pub min_reward: Option<f64>,
    pub max_reward: Option<f64>,
    pub mean_reward: Option<f64>,
    pub std_reward: Option<f64>,
    /// Names of regular files in the output directory, sorted
    pub result_files: Vec<String>,
    pub output_directory: PathBuf,
}

impl ExperimentResult {
    pub fn from_solution(
        experiment_id: Uuid,
        final_status: ExperimentStatus,
        solution: BestSolution,
        result_files: Vec<String>,
        output_directory: PathBuf,
    ) -> Self {
        Self {
            experiment_id,
            final_status,
            total_iterations: solution.total_iterations,
            best_reward: solution.best_reward,
            best_parameters: solution.best_parameters,
            collision_found: solution.collision_found,
            total_duration: solution.total_duration,
            average_iteration_time: solution.average_iteration_time,
            min_reward: solution.min_reward,
            max_reward: solution.max_reward,
            mean_reward: solution.mean_reward,
            std_reward: solution.std_reward,
            result_files,
            output_directory,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_solution_parses() {
        let solution: BestSolution =
            serde_json::from_str(r#"{"best_reward": 4.2, "collision_found": false}"#).unwrap();
        assert_eq!(solution.best_reward, Some(4.2));
        assert_eq!(solution.total_iterations, 0);
        assert!(solution.best_parameters.is_none());

        let summary = solution.completion_summary();
        assert_eq!(summary.best_reward, Some(4.2));
        assert_eq!(summary.total_iterations, None);
    }

    #[test]
    fn test_null_fields_fall_back_to_defaults() {
        let solution: BestSolution = serde_json::from_str(
            r#"{"best_reward": 1.5, "collision_found": null, "total_iterations": null, "std_reward": null}"#,
        )
        .unwrap();
        assert_eq!(solution.best_reward, Some(1.5));
        assert!(!solution.collision_found);
        assert_eq!(solution.total_iterations, 0);
        assert_eq!(solution.std_reward, None);
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let solution: BestSolution = serde_json::from_str(
            r#"{"total_iterations": 10, "best_parameters": {"speed": 12.5}, "extra": [1, 2]}"#,
        )
        .unwrap();
        assert_eq!(solution.total_iterations, 10);
        assert_eq!(
            solution.best_parameters,
            Some(serde_json::json!({"speed": 12.5}))
        );
    }
}
