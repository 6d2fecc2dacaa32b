//! Applies lifecycle transitions and mirrors them to the durable store.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use super::registry::ExperimentRegistry;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Experiment, StatusUpdate, Transition, TransitionOutcome};
use crate::domain::ports::ExperimentStore;

#[derive(Clone)]
pub struct Lifecycle {
    registry: Arc<ExperimentRegistry>,
    store: Arc<dyn ExperimentStore>,
}

impl Lifecycle {
    pub fn new(registry: Arc<ExperimentRegistry>, store: Arc<dyn ExperimentStore>) -> Self {
        Self { registry, store }
    }

    /// Look up the experiment and apply `transition` under its lock.
    pub async fn transition(&self, id: Uuid, transition: &Transition) -> DomainResult<TransitionOutcome> {
        let entry = self
            .registry
            .entry(id)
            .await
            .ok_or(DomainError::ExperimentNotFound(id))?;
        let mut experiment = entry.lock().await;
        self.apply(&mut experiment, transition).await
    }

    /// Apply `transition` to an experiment whose lock the caller holds.
    ///
    /// The store write happens before the lock is released so writes for one
    /// experiment reach the store in transition order.
    pub async fn apply(&self, experiment: &mut Experiment, transition: &Transition) -> DomainResult<TransitionOutcome> {
        let from = experiment.status;
        let outcome = experiment.apply_transition(transition, Utc::now())?;

        match outcome {
            TransitionOutcome::Applied => {
                tracing::info!(
                    experiment_id = %experiment.id,
                    from = %from,
                    to = %experiment.status,
                    "Experiment status changed"
                );
                self.persist(experiment.id, &StatusUpdate::after(experiment, transition)).await;
            }
            TransitionOutcome::Unchanged => {
                tracing::debug!(
                    experiment_id = %experiment.id,
                    status = %experiment.status,
                    attempted = %transition.target(),
                    "Ignoring transition on terminal experiment"
                );
            }
        }

        Ok(outcome)
    }

    /// Best-effort store write; failures are logged and swallowed.
    pub async fn persist(&self, id: Uuid, update: &StatusUpdate) {
        match self.store.update_status(id, update).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                tracing::warn!(experiment_id = %id, status = %update.status, "No durable record to update");
            }
            Err(e) => {
                tracing::warn!(experiment_id = %id, status = %update.status, error = %e, "Failed to persist status");
            }
        }
    }
}
