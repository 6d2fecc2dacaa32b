//! SQLite implementation of the ExperimentStore.

use std::path::PathBuf;

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{parse_datetime, parse_json_or_default, parse_optional_datetime, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ExperimentRecord, ExperimentStatus, Optimization, StatusUpdate};
use crate::domain::ports::ExperimentStore;

#[derive(Clone)]
pub struct SqliteExperimentStore {
    pool: SqlitePool,
}

impl SqliteExperimentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExperimentStore for SqliteExperimentStore {
    async fn save(&self, record: &ExperimentRecord) -> DomainResult<ExperimentRecord> {
        let tags_json = serde_json::to_string(&record.tags)?;

        sqlx::query(
            r#"INSERT OR REPLACE INTO experiments (id, route_id, route_file, search_method,
               num_iterations, timeout_seconds, headless, random_seed, reward_function, optimization,
               status, created_at, started_at, completed_at, best_reward, total_iterations,
               collision_found, output_directory, error_message, notes, tags)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#
        )
        .bind(record.id.to_string())
        .bind(&record.route_id)
        .bind(&record.route_file)
        .bind(&record.search_method)
        .bind(i64::from(record.num_iterations))
        .bind(i64::from(record.timeout_seconds))
        .bind(record.headless)
        .bind(record.random_seed as i64)
        .bind(&record.reward_function)
        .bind(optimization_str(record.optimization))
        .bind(record.status.as_str())
        .bind(record.created_at.to_rfc3339())
        .bind(record.started_at.map(|t| t.to_rfc3339()))
        .bind(record.completed_at.map(|t| t.to_rfc3339()))
        .bind(record.best_reward)
        .bind(i64::from(record.total_iterations))
        .bind(record.collision_found)
        .bind(record.output_directory.as_ref().map(|p| p.to_string_lossy().into_owned()))
        .bind(&record.error_message)
        .bind(&record.notes)
        .bind(&tags_json)
        .execute(&self.pool)
        .await?;

        Ok(record.clone())
    }

    async fn update_status(&self, id: Uuid, update: &StatusUpdate) -> DomainResult<Option<ExperimentRecord>> {
        let result = sqlx::query(
            r#"UPDATE experiments SET
                 status = ?,
                 started_at = COALESCE(started_at, ?),
                 completed_at = COALESCE(completed_at, ?),
                 error_message = COALESCE(?, error_message),
                 best_reward = COALESCE(?, best_reward),
                 collision_found = COALESCE(?, collision_found),
                 total_iterations = COALESCE(?, total_iterations)
               WHERE id = ?"#
        )
        .bind(update.status.as_str())
        .bind(update.started_at.map(|t| t.to_rfc3339()))
        .bind(update.completed_at.map(|t| t.to_rfc3339()))
        .bind(&update.error_message)
        .bind(update.best_reward)
        .bind(update.collision_found)
        .bind(update.total_iterations.map(i64::from))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get(id).await
    }

    async fn update_metadata(&self, id: Uuid, notes: Option<&str>, tags: Option<&[String]>) -> DomainResult<bool> {
        let tags_json = tags.map(serde_json::to_string).transpose()?;

        let result = sqlx::query(
            "UPDATE experiments SET notes = COALESCE(?, notes), tags = COALESCE(?, tags) WHERE id = ?"
        )
        .bind(notes)
        .bind(tags_json)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<ExperimentRecord>> {
        let row: Option<ExperimentRow> = sqlx::query_as("SELECT * FROM experiments WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(ExperimentRecord::try_from).transpose()
    }

    async fn list(&self, limit: i64, offset: i64) -> DomainResult<Vec<ExperimentRecord>> {
        let rows: Vec<ExperimentRow> = sqlx::query_as(
            "SELECT * FROM experiments ORDER BY created_at DESC LIMIT ? OFFSET ?"
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let records = rows
            .into_iter()
            .filter_map(|row| {
                let id = row.id.clone();
                match ExperimentRecord::try_from(row) {
                    Ok(record) => Some(record),
                    Err(e) => {
                        tracing::warn!(experiment_id = %id, error = %e, "Skipping malformed experiment row");
                        None
                    }
                }
            })
            .collect();
        Ok(records)
    }

    async fn delete(&self, id: Uuid) -> DomainResult<bool> {
        let result = sqlx::query("DELETE FROM experiments WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

fn optimization_str(optimization: Optimization) -> &'static str {
    match optimization {
        Optimization::Minimize => "minimize",
        Optimization::Maximize => "maximize",
    }
}

fn parse_optimization(s: &str) -> DomainResult<Optimization> {
    match s {
        "minimize" => Ok(Optimization::Minimize),
        "maximize" => Ok(Optimization::Maximize),
        other => Err(DomainError::Serialization(format!("Invalid optimization: {other}"))),
    }
}

#[derive(sqlx::FromRow)]
struct ExperimentRow {
    id: String,
    route_id: String,
    route_file: String,
    search_method: String,
    num_iterations: i64,
    timeout_seconds: i64,
    headless: bool,
    random_seed: i64,
    reward_function: String,
    optimization: String,
    status: String,
    created_at: String,
    started_at: Option<String>,
    completed_at: Option<String>,
    best_reward: Option<f64>,
    total_iterations: i64,
    collision_found: bool,
    output_directory: Option<String>,
    error_message: Option<String>,
    notes: Option<String>,
    tags: Option<String>,
}

impl TryFrom<ExperimentRow> for ExperimentRecord {
    type Error = DomainError;

    fn try_from(row: ExperimentRow) -> Result<Self, Self::Error> {
        let status = ExperimentStatus::from_str(&row.status)
            .ok_or_else(|| DomainError::Serialization(format!("Invalid status: {}", row.status)))?;
        let to_u32 = |field: &str, value: i64| {
            u32::try_from(value)
                .map_err(|_| DomainError::Serialization(format!("Invalid {field}: {value}")))
        };

        Ok(ExperimentRecord {
            id: parse_uuid(&row.id)?,
            route_id: row.route_id,
            route_file: row.route_file,
            search_method: row.search_method,
            num_iterations: to_u32("num_iterations", row.num_iterations)?,
            timeout_seconds: to_u32("timeout_seconds", row.timeout_seconds)?,
            headless: row.headless,
            random_seed: row.random_seed as u64,
            reward_function: row.reward_function,
            optimization: parse_optimization(&row.optimization)?,
            status,
            created_at: parse_datetime(&row.created_at)?,
            started_at: parse_optional_datetime(row.started_at)?,
            completed_at: parse_optional_datetime(row.completed_at)?,
            best_reward: row.best_reward,
            total_iterations: to_u32("total_iterations", row.total_iterations)?,
            collision_found: row.collision_found,
            output_directory: row.output_directory.map(PathBuf::from),
            error_message: row.error_message,
            notes: row.notes,
            tags: parse_json_or_default(row.tags)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use crate::domain::models::{CompletionSummary, Experiment, ExperimentConfig, Transition};
    use chrono::Utc;
    use std::path::Path;

    async fn setup_store() -> SqliteExperimentStore {
        let pool = create_migrated_test_pool().await.unwrap();
        SqliteExperimentStore::new(pool)
    }

    fn experiment(route_id: &str) -> Experiment {
        Experiment::new(
            ExperimentConfig::new(route_id, "routes/town05.xml").with_headless(true),
            Path::new("/tmp/out"),
        )
    }

    #[tokio::test]
    async fn test_save_and_get() {
        let store = setup_store().await;
        let mut exp = experiment("3");
        exp.tags = vec!["nightly".into(), "town05".into()];
        let record = ExperimentRecord::from_experiment(&exp);

        store.save(&record).await.unwrap();
        let loaded = store.get(exp.id).await.unwrap().unwrap();

        assert_eq!(loaded.route_id, "3");
        assert!(loaded.headless);
        assert_eq!(loaded.status, ExperimentStatus::Created);
        assert_eq!(loaded.tags, vec!["nightly", "town05"]);
        assert_eq!(loaded.output_directory, Some(exp.output_directory.clone()));
        assert_eq!(loaded.created_at.timestamp_millis(), exp.created_at.timestamp_millis());
    }

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let store = setup_store().await;
        assert!(store.get(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_status_keeps_first_timestamps() {
        let store = setup_store().await;
        let mut exp = experiment("1");
        store.save(&ExperimentRecord::from_experiment(&exp)).await.unwrap();

        let start = Transition::Start;
        exp.apply_transition(&start, Utc::now()).unwrap();
        let first = store
            .update_status(exp.id, &StatusUpdate::after(&exp, &start))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.status, ExperimentStatus::Running);
        let started_at = first.started_at.unwrap();

        let mut update = StatusUpdate::after(&exp, &start);
        update.started_at = Some(started_at + chrono::Duration::seconds(30));
        let second = store.update_status(exp.id, &update).await.unwrap().unwrap();
        assert_eq!(second.started_at, Some(started_at));
    }

    #[tokio::test]
    async fn test_update_status_writes_completion_figures() {
        let store = setup_store().await;
        let mut exp = experiment("1");
        store.save(&ExperimentRecord::from_experiment(&exp)).await.unwrap();

        exp.apply_transition(&Transition::Start, Utc::now()).unwrap();
        let complete = Transition::Complete(CompletionSummary {
            best_reward: Some(4.2),
            collision_found: true,
            total_iterations: Some(10),
        });
        exp.apply_transition(&complete, Utc::now()).unwrap();

        let record = store
            .update_status(exp.id, &StatusUpdate::after(&exp, &complete))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status, ExperimentStatus::Completed);
        assert_eq!(record.best_reward, Some(4.2));
        assert!(record.collision_found);
        assert_eq!(record.total_iterations, 10);
        assert!(record.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_update_status_unknown_id() {
        let store = setup_store().await;
        let exp = experiment("1");
        let update = StatusUpdate::after(&exp, &Transition::Stop);
        assert!(store.update_status(exp.id, &update).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_metadata_partial() {
        let store = setup_store().await;
        let exp = experiment("1");
        store.save(&ExperimentRecord::from_experiment(&exp)).await.unwrap();

        let tags = vec!["regression".to_string()];
        assert!(store.update_metadata(exp.id, Some("first pass"), Some(&tags)).await.unwrap());
        assert!(store.update_metadata(exp.id, None, None).await.unwrap());

        let loaded = store.get(exp.id).await.unwrap().unwrap();
        assert_eq!(loaded.notes.as_deref(), Some("first pass"));
        assert_eq!(loaded.tags, tags);
        assert_eq!(loaded.status, ExperimentStatus::Created);

        assert!(!store.update_metadata(Uuid::new_v4(), Some("x"), None).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_newest_first_and_delete() {
        let store = setup_store().await;
        let mut older = experiment("1");
        older.created_at = Utc::now() - chrono::Duration::minutes(5);
        let newer = experiment("2");
        store.save(&ExperimentRecord::from_experiment(&older)).await.unwrap();
        store.save(&ExperimentRecord::from_experiment(&newer)).await.unwrap();

        let listed = store.list(10, 0).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, newer.id);
        assert_eq!(store.list(1, 1).await.unwrap()[0].id, older.id);

        assert!(store.delete(older.id).await.unwrap());
        assert!(!store.delete(older.id).await.unwrap());
        assert_eq!(store.list(10, 0).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_skips_malformed_rows() {
        let store = setup_store().await;
        let good = experiment("1");
        store.save(&ExperimentRecord::from_experiment(&good)).await.unwrap();

        sqlx::query(
            r#"INSERT INTO experiments (id, route_id, route_file, search_method, num_iterations,
               timeout_seconds, status, created_at)
               VALUES (?, '2', 'r.xml', 'random', 5, 300, 'exploded', ?)"#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&store.pool)
        .await
        .unwrap();
        sqlx::query(
            r#"INSERT INTO experiments (id, route_id, route_file, search_method, num_iterations,
               timeout_seconds, created_at)
               VALUES ('not-a-uuid', '3', 'r.xml', 'random', 5, 300, ?)"#,
        )
        .bind(Utc::now().to_rfc3339())
        .execute(&store.pool)
        .await
        .unwrap();

        let listed = store.list(10, 0).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, good.id);
    }
}
