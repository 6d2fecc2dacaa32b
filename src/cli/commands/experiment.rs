//! Experiment commands: create, run, start, stop, list, show, results,
//! update, delete, file and recover.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

use crate::cli::output::progress::{create_progress_bar, update_progress_bar};
use crate::cli::output::table::TableFormatter;
use crate::cli::output::{output, CommandOutput};
use crate::cli::types::{CreateArgs, ListArgs, UpdateArgs};
use crate::domain::errors::DomainError;
use crate::domain::models::{
    Experiment, ExperimentConfig, ExperimentResult, ExperimentStatus, ExperimentSummary,
    ExperimentUpdate, Optimization,
};
use crate::services::{ExperimentFilter, ExperimentService};

const FOLLOW_REFRESH: Duration = Duration::from_millis(250);

impl From<CreateArgs> for ExperimentConfig {
    fn from(args: CreateArgs) -> Self {
        Self {
            route_id: args.route_id,
            route_file: args.route_file,
            search_method: args.method,
            num_iterations: args.iterations,
            timeout_seconds: args.timeout,
            headless: args.headless,
            random_seed: args.seed,
            reward_function: args.reward_function,
            optimization: if args.maximize {
                Optimization::Maximize
            } else {
                Optimization::Minimize
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ExperimentDetailOutput {
    #[serde(flatten)]
    pub experiment: Experiment,
}

impl CommandOutput for ExperimentDetailOutput {
    fn to_human(&self) -> String {
        let exp = &self.experiment;
        let config = &exp.config;
        let mut lines = vec![
            format!("Experiment: {}", exp.id),
            format!("Status: {}", exp.status),
            format!("Route: {} ({})", config.route_id, config.route_file),
            format!(
                "Search: {} x{} (seed {}, reward {}, {:?})",
                config.search_method,
                config.num_iterations,
                config.random_seed,
                config.reward_function,
                config.optimization
            ),
            format!("Scenario timeout: {}s", config.timeout_seconds),
            format!("Headless: {}", config.headless),
            format!("Output: {}", exp.output_directory.display()),
            format!("Created: {}", exp.created_at.format("%Y-%m-%d %H:%M:%S")),
        ];

        if let Some(started) = exp.started_at {
            lines.push(format!("Started: {}", started.format("%Y-%m-%d %H:%M:%S")));
        }
        if let Some(completed) = exp.completed_at {
            lines.push(format!("Completed: {}", completed.format("%Y-%m-%d %H:%M:%S")));
        }
        if let Some(progress) = &exp.progress {
            lines.push(format!(
                "Progress: {}/{}",
                progress.current_iteration, progress.total_iterations
            ));
            if let Some(best) = progress.best_reward {
                lines.push(format!("Best reward: {best}"));
            }
            lines.push(format!("Collision found: {}", progress.collision_found));
            if let Some(elapsed) = progress.elapsed_seconds {
                lines.push(format!("Elapsed: {elapsed:.1}s"));
            }
        }
        if let Some(error) = &exp.error_message {
            lines.push(format!("Error: {error}"));
        }
        if let Some(notes) = &exp.notes {
            lines.push(format!("Notes: {notes}"));
        }
        if !exp.tags.is_empty() {
            lines.push(format!("Tags: {}", exp.tags.join(", ")));
        }

        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct ExperimentListOutput {
    pub experiments: Vec<ExperimentSummary>,
    pub total: usize,
}

impl CommandOutput for ExperimentListOutput {
    fn to_human(&self) -> String {
        if self.experiments.is_empty() {
            return "No experiments found.".to_string();
        }
        format!(
            "Found {} experiment(s):\n{}",
            self.total,
            TableFormatter::new().format_experiments(&self.experiments)
        )
    }
}

#[derive(Debug, Serialize)]
pub struct ResultsOutput {
    #[serde(flatten)]
    pub result: ExperimentResult,
}

fn push_optional(lines: &mut Vec<String>, label: &str, value: Option<f64>) {
    if let Some(value) = value {
        lines.push(format!("{label}: {value}"));
    }
}

impl CommandOutput for ResultsOutput {
    fn to_human(&self) -> String {
        let r = &self.result;
        let mut lines = vec![
            format!("Experiment: {}", r.experiment_id),
            format!("Final status: {}", r.final_status),
            format!("Total iterations: {}", r.total_iterations),
            format!("Collision found: {}", r.collision_found),
        ];
        push_optional(&mut lines, "Best reward", r.best_reward);
        push_optional(&mut lines, "Total duration (s)", r.total_duration);
        push_optional(&mut lines, "Average iteration time (s)", r.average_iteration_time);
        push_optional(&mut lines, "Min reward", r.min_reward);
        push_optional(&mut lines, "Max reward", r.max_reward);
        push_optional(&mut lines, "Mean reward", r.mean_reward);
        push_optional(&mut lines, "Std reward", r.std_reward);
        if let Some(params) = &r.best_parameters {
            lines.push(format!("Best parameters: {params}"));
        }
        lines.push(format!("Output: {}", r.output_directory.display()));
        if !r.result_files.is_empty() {
            lines.push("Files:".to_string());
            for file in &r.result_files {
                lines.push(format!("  - {file}"));
            }
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct ActionOutput {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experiment_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl CommandOutput for ActionOutput {
    fn to_human(&self) -> String {
        self.message.clone()
    }
}

pub async fn handle_create(service: &ExperimentService, args: CreateArgs, json: bool) -> Result<()> {
    let experiment = service.create(args.into()).await.context("Failed to create experiment")?;
    output(&ExperimentDetailOutput { experiment }, json);
    Ok(())
}

/// Create an experiment and follow it in the foreground.
pub async fn handle_run(service: &ExperimentService, args: CreateArgs, json: bool) -> Result<()> {
    let experiment = service.create(args.into()).await.context("Failed to create experiment")?;
    if !json {
        println!("Created experiment {}", experiment.id);
    }
    handle_start(service, experiment.id, json).await
}

/// Start an experiment and follow it until it reaches a terminal state.
pub async fn handle_start(service: &ExperimentService, id: Uuid, json: bool) -> Result<()> {
    let experiment = service.start(id).await?;
    let experiment = follow(service, experiment, json).await?;
    output(&ExperimentDetailOutput { experiment }, json);
    Ok(())
}

async fn follow(service: &ExperimentService, experiment: Experiment, json: bool) -> Result<Experiment> {
    let id = experiment.id;
    let bar = (!json).then(|| create_progress_bar(u64::from(experiment.config.num_iterations)));

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let done = service.wait(id);
    tokio::pin!(done);
    let mut refresh = tokio::time::interval(FOLLOW_REFRESH);

    loop {
        tokio::select! {
            () = &mut done => break,
            signal = &mut ctrl_c => {
                signal.context("Failed to listen for Ctrl-C")?;
                if let Some(bar) = &bar {
                    bar.set_message("stopping...");
                }
                match service.stop(id).await {
                    Ok(_) | Err(DomainError::NotRunning(_)) => {}
                    Err(e) => return Err(e.into()),
                }
                break;
            }
            _ = refresh.tick() => {
                if let (Some(bar), Some(progress)) = (&bar, service.get(id).await.and_then(|e| e.progress)) {
                    update_progress_bar(bar, &progress);
                }
            }
        }
    }

    let experiment = service.get(id).await.ok_or(DomainError::ExperimentNotFound(id))?;
    if let Some(bar) = bar {
        if let Some(progress) = &experiment.progress {
            update_progress_bar(&bar, progress);
        }
        bar.finish_with_message(experiment.status.to_string());
    }
    Ok(experiment)
}

pub async fn handle_stop(service: &ExperimentService, id: Uuid, json: bool) -> Result<()> {
    let experiment = service.stop(id).await?;
    let result = ActionOutput {
        success: true,
        message: format!("Experiment {id} {}", experiment.status),
        experiment_id: Some(id),
        path: None,
    };
    output(&result, json);
    Ok(())
}

fn parse_status(status: &str) -> Result<ExperimentStatus> {
    match ExperimentStatus::from_str(status) {
        Some(status) => Ok(status),
        None => bail!(
            "Invalid status '{status}' (expected created, running, completed, failed or stopped)"
        ),
    }
}

pub async fn handle_list(service: &ExperimentService, args: ListArgs, json: bool) -> Result<()> {
    let filter = ExperimentFilter {
        status: args.status.as_deref().map(parse_status).transpose()?,
        search_method: args.method,
    };
    let experiments = service.list(&filter, args.offset, Some(args.limit)).await;
    let result = ExperimentListOutput {
        total: experiments.len(),
        experiments,
    };
    output(&result, json);
    Ok(())
}

pub async fn handle_show(service: &ExperimentService, id: Uuid, json: bool) -> Result<()> {
    let experiment = service.get(id).await.ok_or(DomainError::ExperimentNotFound(id))?;
    output(&ExperimentDetailOutput { experiment }, json);
    Ok(())
}

pub async fn handle_results(service: &ExperimentService, id: Uuid, json: bool) -> Result<()> {
    let result = service.results(id).await?;
    output(&ResultsOutput { result }, json);
    Ok(())
}

pub async fn handle_update(service: &ExperimentService, args: UpdateArgs, json: bool) -> Result<()> {
    if args.notes.is_none() && args.tags.is_none() {
        bail!("Nothing to update: pass --notes and/or --tags");
    }
    let update = ExperimentUpdate {
        notes: args.notes,
        tags: args.tags.map(|tags| {
            tags.into_iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect()
        }),
    };
    let experiment = service.update(args.id, update).await?;
    output(&ExperimentDetailOutput { experiment }, json);
    Ok(())
}

pub async fn handle_delete(service: &ExperimentService, id: Uuid, json: bool) -> Result<()> {
    if !service.delete(id).await? {
        bail!(DomainError::ExperimentNotFound(id));
    }
    let result = ActionOutput {
        success: true,
        message: format!("Experiment {id} deleted"),
        experiment_id: Some(id),
        path: None,
    };
    output(&result, json);
    Ok(())
}

pub async fn handle_file(service: &ExperimentService, id: Uuid, name: &str, json: bool) -> Result<()> {
    let Some(path) = service.file_path(id, name).await else {
        bail!("File '{name}' not found for experiment {id}");
    };
    let result = ActionOutput {
        success: true,
        message: path.display().to_string(),
        experiment_id: Some(id),
        path: Some(path),
    };
    output(&result, json);
    Ok(())
}

/// Fail every experiment still recorded as running.
///
/// `service` must not have been seeded yet.
pub async fn handle_recover(service: &ExperimentService, json: bool) -> Result<()> {
    let report = service.initialize().await;
    let result = ActionOutput {
        success: true,
        message: format!(
            "Loaded {} experiment(s); marked {} interrupted run(s) as failed",
            report.loaded, report.interrupted
        ),
        experiment_id: None,
        path: None,
    };
    output(&result, json);
    Ok(())
}
