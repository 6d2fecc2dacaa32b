//! Experiment store port - durable record of experiment metadata.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{ExperimentRecord, StatusUpdate};

/// Durable record bridge.
///
/// The orchestrator calls the store opportunistically: every error is
/// logged by the caller and never changes an experiment's in-memory status.
#[async_trait]
pub trait ExperimentStore: Send + Sync {
    /// Persist a newly created experiment.
    async fn save(&self, record: &ExperimentRecord) -> DomainResult<ExperimentRecord>;

    /// Write a status transition. Timestamps already present are kept.
    ///
    /// Returns `None` if no record exists for `id`.
    async fn update_status(
        &self,
        id: Uuid,
        update: &StatusUpdate,
    ) -> DomainResult<Option<ExperimentRecord>>;

    /// Write notes and tags. `None` leaves the stored value untouched.
    async fn update_metadata(
        &self,
        id: Uuid,
        notes: Option<&str>,
        tags: Option<&[String]>,
    ) -> DomainResult<bool>;

    /// Get a record by ID.
    async fn get(&self, id: Uuid) -> DomainResult<Option<ExperimentRecord>>;

    /// List records, newest first.
    async fn list(&self, limit: i64, offset: i64) -> DomainResult<Vec<ExperimentRecord>>;

    /// Delete a record. Returns false if none existed.
    async fn delete(&self, id: Uuid) -> DomainResult<bool>;
}
