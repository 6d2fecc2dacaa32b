//! Common test utilities for integration tests
//!
//! Provides a service wired to an in-memory store, fake runner scripts and
//! polling helpers shared across the integration test files.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use uuid::Uuid;

use simfuzz::adapters::cleanup::NoopCleaner;
use simfuzz::adapters::sqlite::{create_migrated_test_pool, SqliteExperimentStore};
use simfuzz::domain::models::{
    CleanupConfig, Config, ExperimentRecord, RunnerConfig, StatusUpdate, SupervisionConfig,
};
use simfuzz::{DomainError, DomainResult, ExperimentService, ExperimentStore};

/// Runner that reports progress, writes its result artifact and exits 0.
pub const SUCCESS_RUNNER: &str = r#"
echo "Iteration 1/3"
echo "Best reward: 5.0"
echo "Iteration 2/3"
echo "Best reward: 4.2"
echo "simulator warming up" >&2
echo "Iteration 3/3"
echo "Collision found at t=12.5"
printf '{"total_iterations": 3, "best_reward": 4.2, "collision_found": true, "mean_reward": 4.6}' \
    > "$SIMFUZZ_OUTPUT_DIR/best_solution.json"
"#;

/// Runner that records its pid and never finishes.
pub const HANGING_RUNNER: &str = r#"
echo $$ > "$SIMFUZZ_OUTPUT_DIR/runner.pid"
echo "Iteration 1/3"
while true; do sleep 1; done
"#;

/// Like [`HANGING_RUNNER`] but ignores SIGTERM.
pub const STUBBORN_RUNNER: &str = r#"
trap '' TERM
echo $$ > "$SIMFUZZ_OUTPUT_DIR/runner.pid"
while true; do sleep 1; done
"#;

/// Runner that exits 0 while a background child it started keeps running.
pub const ABANDONING_RUNNER: &str = r#"
sleep 30 &
echo $! > "$SIMFUZZ_OUTPUT_DIR/runner.pid"
echo "Iteration 1/3"
exit 0
"#;

/// Runner that exits 0 leaving a child in its own session holding stdout.
pub const DETACHING_RUNNER: &str = r#"
setsid sleep 30 &
echo $! > "$SIMFUZZ_OUTPUT_DIR/runner.pid"
touch "$SIMFUZZ_OUTPUT_DIR/exiting"
exit 0
"#;

/// Runner that fails with exit code 3.
pub const FAILING_RUNNER: &str = r#"
echo "Iteration 1/3"
echo "CARLA connection refused" >&2
exit 3
"#;

/// Create a temporary directory for test isolation
pub fn temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Setup test logging
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Deadlines short enough for tests.
pub fn fast_supervision() -> SupervisionConfig {
    SupervisionConfig {
        poll_interval_ms: 50,
        max_runtime_ms: 20_000,
        inactivity_timeout_ms: 1_000,
        terminate_grace_ms: 500,
        cancel_grace_ms: 500,
        drain_timeout_ms: 1_000,
    }
}

/// Write `body` to `runner.sh` in `dir` and return its path.
pub fn write_runner(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("runner.sh");
    std::fs::write(&path, body).expect("Failed to write runner script");
    path
}

/// Configuration running `/bin/sh <script>` with fast deadlines.
pub fn test_config(dir: &Path, script: &Path) -> Config {
    Config {
        output_dir: dir.join("experiments").to_string_lossy().into_owned(),
        runner: RunnerConfig {
            program: "/bin/sh".to_string(),
            script: script.to_string_lossy().into_owned(),
            working_dir: None,
            extra_args: vec![],
        },
        supervision: fast_supervision(),
        cleanup: CleanupConfig {
            settle_delay_ms: 0,
            ..CleanupConfig::default()
        },
        ..Config::default()
    }
}

/// A service, its store and the directory they live in.
pub struct Harness {
    pub service: Arc<ExperimentService>,
    pub store: Arc<SqliteExperimentStore>,
    pub dir: TempDir,
}

/// Build a harness whose runner executes `body`.
pub async fn harness(body: &str) -> Harness {
    harness_with(body, |_| {}).await
}

/// Build a harness, letting `customize` adjust the configuration.
pub async fn harness_with(body: &str, customize: impl FnOnce(&mut Config)) -> Harness {
    let dir = temp_dir();
    let script = write_runner(dir.path(), body);
    let mut config = test_config(dir.path(), &script);
    customize(&mut config);

    let pool = create_migrated_test_pool().await.expect("Failed to create test pool");
    let store = Arc::new(SqliteExperimentStore::new(pool));
    let service = ExperimentService::new(&config, store.clone(), Arc::new(NoopCleaner))
        .expect("Failed to create service");

    Harness {
        service: Arc::new(service),
        store,
        dir,
    }
}

/// Wait for the supervised task of `id` to finish, failing the test after `timeout_ms`.
pub async fn wait_done(service: &ExperimentService, id: Uuid, timeout_ms: u64) {
    tokio::time::timeout(Duration::from_millis(timeout_ms), service.wait(id))
        .await
        .expect("experiment did not finish in time");
}

/// Wait for a condition to be true with timeout
///
/// Polls the predicate every 20ms until it returns true or timeout is reached.
pub async fn wait_for<F>(mut predicate: F, timeout_ms: u64) -> bool
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();
    let timeout = Duration::from_millis(timeout_ms);

    while start.elapsed() < timeout {
        if predicate() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    false
}

/// Pid written by [`HANGING_RUNNER`] or [`STUBBORN_RUNNER`], once present.
pub fn read_pid(output_dir: &Path) -> Option<i32> {
    std::fs::read_to_string(output_dir.join("runner.pid"))
        .ok()
        .and_then(|s| s.trim().parse().ok())
}

/// Whether a process with `pid` still exists. Zombies awaiting their
/// reaper count as gone.
pub fn process_alive(pid: i32) -> bool {
    if nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None).is_err() {
        return false;
    }
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => !stat
            .rsplit_once(')')
            .is_some_and(|(_, rest)| rest.trim_start().starts_with('Z')),
        Err(_) => true,
    }
}

/// Store whose every call fails.
pub struct FailingStore;

fn unavailable<T>() -> DomainResult<T> {
    Err(DomainError::Persistence("store unavailable".to_string()))
}

#[async_trait]
impl ExperimentStore for FailingStore {
    async fn save(&self, _record: &ExperimentRecord) -> DomainResult<ExperimentRecord> {
        unavailable()
    }

    async fn update_status(
        &self,
        _id: Uuid,
        _update: &StatusUpdate,
    ) -> DomainResult<Option<ExperimentRecord>> {
        unavailable()
    }

    async fn update_metadata(
        &self,
        _id: Uuid,
        _notes: Option<&str>,
        _tags: Option<&[String]>,
    ) -> DomainResult<bool> {
        unavailable()
    }

    async fn get(&self, _id: Uuid) -> DomainResult<Option<ExperimentRecord>> {
        unavailable()
    }

    async fn list(&self, _limit: i64, _offset: i64) -> DomainResult<Vec<ExperimentRecord>> {
        unavailable()
    }

    async fn delete(&self, _id: Uuid) -> DomainResult<bool> {
        unavailable()
    }
}
