//! Files exchanged with the runner through an experiment's output directory.

use std::path::{Path, PathBuf};

use serde::Serialize;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{BestSolution, Experiment, ExperimentConfig, BEST_SOLUTION_FILE, RUN_CONFIG_FILE};

/// Contents of the generated `experiment_config.json`.
#[derive(Debug, Serialize)]
struct RunConfig<'a> {
    experiment_id: Uuid,
    #[serde(flatten)]
    config: &'a ExperimentConfig,
    output_dir: &'a Path,
}

/// Write the per-run configuration the runner reads. Returns its path.
pub async fn write_run_config(experiment: &Experiment) -> DomainResult<PathBuf> {
    let path = experiment.output_directory.join(RUN_CONFIG_FILE);
    let run_config = RunConfig {
        experiment_id: experiment.id,
        config: &experiment.config,
        output_dir: &experiment.output_directory,
    };
    let json = serde_json::to_vec_pretty(&run_config)?;
    tokio::fs::write(&path, json).await?;
    Ok(path)
}

/// Read `best_solution.json`; `None` if it is missing or unreadable.
pub async fn read_best_solution(output_directory: &Path) -> Option<BestSolution> {
    let path = output_directory.join(BEST_SOLUTION_FILE);
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to read result artifact");
            return None;
        }
    };

    match serde_json::from_slice(&bytes) {
        Ok(solution) => Some(solution),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Malformed result artifact");
            None
        }
    }
}

/// Names of the regular files directly inside `output_directory`, sorted.
pub async fn list_result_files(output_directory: &Path) -> Vec<String> {
    let mut files = Vec::new();
    let Ok(mut entries) = tokio::fs::read_dir(output_directory).await else {
        return files;
    };

    while let Ok(Some(entry)) = entries.next_entry().await {
        if entry.file_type().await.is_ok_and(|t| t.is_file()) {
            files.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    files.sort();
    files
}
