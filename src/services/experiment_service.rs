//! Experiment service: the public operations of the orchestrator.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use uuid::Uuid;

use super::lifecycle::Lifecycle;
use super::registry::{ExperimentFilter, ExperimentRegistry};
use crate::application::artifacts;
use crate::application::supervisor::{ActiveRuns, Supervisor};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    Config, Experiment, ExperimentConfig, ExperimentRecord, ExperimentResult, ExperimentStatus,
    ExperimentSummary, ExperimentUpdate, Transition,
};
use crate::domain::ports::{EnvironmentCleaner, ExperimentStore};

/// Error recorded on experiments found `running` at startup.
pub const INTERRUPTED_BY_RESTART: &str = "interrupted by service restart";

/// Outcome of seeding the registry from the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Experiments newly registered
    pub loaded: usize,
    /// Of those, experiments failed because they were still `running`
    pub interrupted: usize,
}

/// Owns the registry, the active-run map and the supervisor.
///
/// Construct one per process and share it behind an `Arc`.
pub struct ExperimentService {
    output_root: PathBuf,
    registry: Arc<ExperimentRegistry>,
    store: Arc<dyn ExperimentStore>,
    lifecycle: Lifecycle,
    supervisor: Supervisor,
    active: Arc<ActiveRuns>,
    load_limit: i64,
}

impl ExperimentService {
    pub fn new(
        config: &Config,
        store: Arc<dyn ExperimentStore>,
        cleaner: Arc<dyn EnvironmentCleaner>,
    ) -> DomainResult<Self> {
        let output_root = std::path::absolute(config.output_root())?;
        let registry = Arc::new(ExperimentRegistry::new());
        let lifecycle = Lifecycle::new(Arc::clone(&registry), Arc::clone(&store));
        let supervisor = Supervisor::new(
            Arc::clone(&registry),
            lifecycle.clone(),
            cleaner,
            config.runner.clone(),
            config.supervision.clone(),
            &config.cleanup,
        );

        Ok(Self {
            output_root,
            registry,
            store,
            lifecycle,
            supervisor,
            active: Arc::new(ActiveRuns::new()),
            load_limit: config.recovery.load_limit,
        })
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Seed the registry from the store and fail interrupted runs.
    ///
    /// Nothing supervises an experiment across a restart, so any record still
    /// `running` is failed. Use this in the process that owns supervision.
    pub async fn initialize(&self) -> LoadReport {
        self.load_records(true).await
    }

    /// Seed the registry from the store without touching any status.
    pub async fn load(&self) -> LoadReport {
        self.load_records(false).await
    }

    async fn load_records(&self, fail_interrupted: bool) -> LoadReport {
        let records = match self.store.list(self.load_limit, 0).await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load experiments from store, starting empty");
                return LoadReport::default();
            }
        };

        let mut report = LoadReport::default();
        // Newest first from the store; register oldest first.
        for record in records.into_iter().rev() {
            let id = record.id;
            if self.registry.entry(id).await.is_some() {
                continue;
            }
            let experiment = record.into_experiment(&self.output_root);
            let interrupted = experiment.status == ExperimentStatus::Running;
            self.registry.register(experiment).await;
            report.loaded += 1;

            if interrupted && fail_interrupted {
                report.interrupted += 1;
                tracing::warn!(experiment_id = %id, "Experiment was running when the service stopped");
                let fail = Transition::Fail {
                    error: INTERRUPTED_BY_RESTART.to_string(),
                };
                if let Err(e) = self.lifecycle.transition(id, &fail).await {
                    tracing::warn!(experiment_id = %id, error = %e, "Failed to mark interrupted experiment");
                }
            }
        }

        tracing::debug!(
            count = report.loaded,
            interrupted = report.interrupted,
            "Loaded experiments from store"
        );
        report
    }

    pub async fn create(&self, config: ExperimentConfig) -> DomainResult<Experiment> {
        config.validate().map_err(DomainError::InvalidConfig)?;

        let experiment = Experiment::new(config, &self.output_root);
        tokio::fs::create_dir_all(&experiment.output_directory).await?;

        if let Err(e) = self.store.save(&ExperimentRecord::from_experiment(&experiment)).await {
            tracing::warn!(experiment_id = %experiment.id, error = %e, "Failed to persist new experiment");
        }
        self.registry.register(experiment.clone()).await;

        tracing::info!(
            experiment_id = %experiment.id,
            route_id = %experiment.config.route_id,
            search_method = %experiment.config.search_method,
            "Experiment created"
        );
        Ok(experiment)
    }

    /// Transition to `running` and spawn the supervised task.
    pub async fn start(&self, id: Uuid) -> DomainResult<Experiment> {
        let entry = self
            .registry
            .entry(id)
            .await
            .ok_or(DomainError::ExperimentNotFound(id))?;
        let mut experiment = entry.lock().await;

        // A delete may have removed the entry while this call waited on its lock.
        let current = self.registry.entry(id).await;
        if !current.is_some_and(|current| Arc::ptr_eq(&current, &entry)) {
            return Err(DomainError::ExperimentNotFound(id));
        }
        if self.active.contains(id) {
            return Err(DomainError::AlreadyRunning(id));
        }
        if experiment.status != ExperimentStatus::Created {
            return Err(DomainError::InvalidStateTransition {
                from: experiment.status.as_str().to_string(),
                to: ExperimentStatus::Running.as_str().to_string(),
            });
        }

        self.lifecycle.apply(&mut experiment, &Transition::Start).await?;
        // Spawned under the lock, so the task cannot record a terminal
        // status before `running` is in place.
        self.supervisor.spawn(experiment.clone(), &self.active);

        Ok(experiment.clone())
    }

    /// Cancel the supervised task and wait until its child is gone.
    ///
    /// The cancellation is requested under the experiment's lock while it is
    /// still `running`, and the task picks its terminal transition under the
    /// same lock, so a stop that returns `Ok` always leaves it `stopped`.
    pub async fn stop(&self, id: Uuid) -> DomainResult<Experiment> {
        let entry = self
            .registry
            .entry(id)
            .await
            .ok_or(DomainError::ExperimentNotFound(id))?;
        let run = {
            let experiment = entry.lock().await;
            let run = self
                .active
                .get(id)
                .filter(|_| experiment.status == ExperimentStatus::Running)
                .ok_or(DomainError::NotRunning(id))?;
            tracing::info!(experiment_id = %id, "Stopping experiment");
            run.cancel();
            run
        };
        run.wait().await;

        self.registry
            .get(id)
            .await
            .ok_or(DomainError::ExperimentNotFound(id))
    }

    /// Wait for the supervised task of `id`, if any, to finish.
    pub async fn wait(&self, id: Uuid) {
        if let Some(run) = self.active.get(id) {
            run.wait().await;
        }
    }

    pub fn is_active(&self, id: Uuid) -> bool {
        self.active.contains(id)
    }

    /// Stop every active experiment.
    pub async fn shutdown(&self) {
        for id in self.active.ids() {
            if let Err(e) = self.stop(id).await {
                tracing::debug!(experiment_id = %id, error = %e, "Experiment ended before shutdown stop");
            }
        }
    }

    pub async fn get(&self, id: Uuid) -> Option<Experiment> {
        self.registry.get(id).await
    }

    pub async fn list(
        &self,
        filter: &ExperimentFilter,
        offset: usize,
        limit: Option<usize>,
    ) -> Vec<ExperimentSummary> {
        self.registry.list(filter, offset, limit).await
    }

    /// Results read from the output directory. A missing or unreadable
    /// artifact yields empty fields.
    pub async fn results(&self, id: Uuid) -> DomainResult<ExperimentResult> {
        let experiment = self
            .registry
            .get(id)
            .await
            .ok_or(DomainError::ExperimentNotFound(id))?;

        let directory = experiment.output_directory;
        let solution = artifacts::read_best_solution(&directory).await.unwrap_or_default();
        let files = artifacts::list_result_files(&directory).await;

        Ok(ExperimentResult::from_solution(
            id,
            experiment.status,
            solution,
            files,
            directory,
        ))
    }

    /// Update notes and tags; status is untouched.
    pub async fn update(&self, id: Uuid, update: ExperimentUpdate) -> DomainResult<Experiment> {
        let updated = self
            .registry
            .mutate(id, |experiment| {
                if let Some(notes) = &update.notes {
                    experiment.notes = Some(notes.clone());
                }
                if let Some(tags) = &update.tags {
                    experiment.tags = tags.clone();
                }
                experiment.clone()
            })
            .await
            .ok_or(DomainError::ExperimentNotFound(id))?;

        match self
            .store
            .update_metadata(id, update.notes.as_deref(), update.tags.as_deref())
            .await
        {
            Ok(true) => {}
            Ok(false) => tracing::warn!(experiment_id = %id, "No durable record to update"),
            Err(e) => tracing::warn!(experiment_id = %id, error = %e, "Failed to persist metadata"),
        }

        Ok(updated)
    }

    /// Stop if active, then remove the output directory, the registry entry
    /// and the durable record. Returns false for unknown ids.
    pub async fn delete(&self, id: Uuid) -> DomainResult<bool> {
        loop {
            if let Some(run) = self.active.get(id) {
                run.cancel();
                run.wait().await;
            }

            let Some(entry) = self.registry.entry(id).await else {
                return Ok(false);
            };
            let experiment = entry.lock().await;
            // A start may have slipped in between the stop and the lock.
            if self.active.contains(id) {
                continue;
            }

            match tokio::fs::remove_dir_all(&experiment.output_directory).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            self.registry.remove(id).await;
            break;
        }

        match self.store.delete(id).await {
            Ok(_) => {}
            Err(e) => tracing::warn!(experiment_id = %id, error = %e, "Failed to delete durable record"),
        }
        tracing::info!(experiment_id = %id, "Experiment deleted");
        Ok(true)
    }

    /// Path of an existing file strictly inside the experiment's output
    /// directory.
    pub async fn file_path(&self, id: Uuid, filename: &str) -> Option<PathBuf> {
        let experiment = self.registry.get(id).await?;
        match resolve_within(&experiment.output_directory, filename).await {
            Ok(path) => Some(path),
            Err(DomainError::PathTraversal(name)) => {
                tracing::warn!(experiment_id = %id, filename = %name, "Rejected file outside output directory");
                None
            }
            Err(_) => None,
        }
    }
}

/// Resolve `filename` inside `directory`, following symlinks.
async fn resolve_within(directory: &Path, filename: &str) -> DomainResult<PathBuf> {
    let root = tokio::fs::canonicalize(directory).await?;
    let candidate = tokio::fs::canonicalize(root.join(filename)).await?;

    if !candidate.starts_with(&root) || candidate == root {
        return Err(DomainError::PathTraversal(filename.to_string()));
    }
    if !tokio::fs::metadata(&candidate).await?.is_file() {
        return Err(DomainError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("not a file: {filename}"),
        )));
    }
    Ok(candidate)
}
