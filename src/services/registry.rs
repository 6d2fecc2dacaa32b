//! In-memory registry of every known experiment.
//!
//! Each experiment sits behind its own async mutex, so writers to one
//! experiment are serialized while different experiments never contend
//! beyond the brief map lookup.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::domain::models::{Experiment, ExperimentStatus, ExperimentSummary};

/// Shared handle to one registry entry.
pub type ExperimentEntry = Arc<Mutex<Experiment>>;

/// Equality filters applied by [`ExperimentRegistry::list`].
#[derive(Debug, Clone, Default)]
pub struct ExperimentFilter {
    pub status: Option<ExperimentStatus>,
    pub search_method: Option<String>,
}

impl ExperimentFilter {
    fn matches(&self, experiment: &Experiment) -> bool {
        self.status.map_or(true, |s| experiment.status == s)
            && self
                .search_method
                .as_deref()
                .map_or(true, |m| experiment.config.search_method == m)
    }
}

#[derive(Default)]
struct Entries {
    by_id: HashMap<Uuid, ExperimentEntry>,
    order: Vec<Uuid>,
}

#[derive(Default)]
pub struct ExperimentRegistry {
    entries: RwLock<Entries>,
}

impl ExperimentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an experiment, replacing any entry with the same id.
    pub async fn register(&self, experiment: Experiment) -> ExperimentEntry {
        let id = experiment.id;
        let entry = Arc::new(Mutex::new(experiment));
        let mut entries = self.entries.write().await;
        if entries.by_id.insert(id, entry.clone()).is_none() {
            entries.order.push(id);
        }
        entry
    }

    pub async fn entry(&self, id: Uuid) -> Option<ExperimentEntry> {
        self.entries.read().await.by_id.get(&id).cloned()
    }

    /// Snapshot of one experiment.
    pub async fn get(&self, id: Uuid) -> Option<Experiment> {
        let entry = self.entry(id).await?;
        let experiment = entry.lock().await;
        Some(experiment.clone())
    }

    /// Atomic read-modify-write of one experiment.
    pub async fn mutate<R>(&self, id: Uuid, f: impl FnOnce(&mut Experiment) -> R) -> Option<R> {
        let entry = self.entry(id).await?;
        let mut experiment = entry.lock().await;
        Some(f(&mut experiment))
    }

    /// Filter, then paginate over insertion order.
    pub async fn list(
        &self,
        filter: &ExperimentFilter,
        offset: usize,
        limit: Option<usize>,
    ) -> Vec<ExperimentSummary> {
        let snapshot: Vec<ExperimentEntry> = {
            let entries = self.entries.read().await;
            entries
                .order
                .iter()
                .filter_map(|id| entries.by_id.get(id).cloned())
                .collect()
        };

        let mut summaries = Vec::new();
        for entry in snapshot {
            let experiment = entry.lock().await;
            if filter.matches(&experiment) {
                summaries.push(experiment.summary());
            }
        }

        summaries
            .into_iter()
            .skip(offset)
            .take(limit.unwrap_or(usize::MAX))
            .collect()
    }

    pub async fn remove(&self, id: Uuid) -> bool {
        let mut entries = self.entries.write().await;
        if entries.by_id.remove(&id).is_some() {
            entries.order.retain(|existing| *existing != id);
            true
        } else {
            false
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.order.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
