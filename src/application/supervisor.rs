//! Subprocess supervision for running experiments.
//!
//! One supervised task per running experiment. It cleans the environment,
//! launches the runner in its own process group, drains its output, enforces
//! the runtime ceiling, and always ends by applying exactly one terminal
//! transition. The child never outlives the task: every exit path ends by
//! killing whatever is left of its process group.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::artifacts;
use super::stream_reader::{OutputClock, OutputReaders};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    CleanupConfig, CompletionSummary, Experiment, RunnerConfig, SupervisionConfig, Transition,
};
use crate::domain::ports::EnvironmentCleaner;
use crate::services::lifecycle::Lifecycle;
use crate::services::registry::ExperimentRegistry;

/// Environment variable carrying the experiment id to the runner.
pub const EXPERIMENT_ID_ENV: &str = "SIMFUZZ_EXPERIMENT_ID";
/// Environment variable carrying the output directory to the runner.
pub const OUTPUT_DIR_ENV: &str = "SIMFUZZ_OUTPUT_DIR";

/// Handle to a supervised task.
#[derive(Clone)]
pub struct ActiveRun {
    cancel: CancellationToken,
    done: Shared<BoxFuture<'static, ()>>,
}

impl ActiveRun {
    /// Ask the supervised task to stop.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Resolves once the task has applied its terminal transition and left
    /// the active map.
    pub async fn wait(&self) {
        self.done.clone().await;
    }
}

/// Experiments that currently own a supervised task.
#[derive(Default)]
pub struct ActiveRuns {
    runs: Mutex<HashMap<Uuid, ActiveRun>>,
}

impl ActiveRuns {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, ActiveRun>> {
        self.runs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, id: Uuid) -> Option<ActiveRun> {
        self.lock().get(&id).cloned()
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.lock().contains_key(&id)
    }

    pub fn ids(&self) -> Vec<Uuid> {
        self.lock().keys().copied().collect()
    }

    fn insert(&self, id: Uuid, run: ActiveRun) {
        self.lock().insert(id, run);
    }

    fn remove(&self, id: Uuid) {
        self.lock().remove(&id);
    }
}

/// Removes the active entry when the supervised task ends, however it ends.
/// Waiters are released after the entry is gone.
struct ActiveRunGuard {
    id: Uuid,
    active: Arc<ActiveRuns>,
    _done: oneshot::Sender<()>,
}

impl Drop for ActiveRunGuard {
    fn drop(&mut self) {
        self.active.remove(self.id);
    }
}

/// How a supervised child ended.
enum ChildExit {
    Exited(ExitStatus),
    TimedOut,
    Cancelled,
}

/// What the supervised task reports back to the lifecycle.
enum RunOutcome {
    Completed(CompletionSummary),
    Failed(String),
    Cancelled,
}

#[derive(Clone)]
pub struct Supervisor {
    registry: Arc<ExperimentRegistry>,
    lifecycle: Lifecycle,
    cleaner: Arc<dyn EnvironmentCleaner>,
    runner: RunnerConfig,
    supervision: SupervisionConfig,
    settle_delay: Duration,
}

impl Supervisor {
    pub fn new(
        registry: Arc<ExperimentRegistry>,
        lifecycle: Lifecycle,
        cleaner: Arc<dyn EnvironmentCleaner>,
        runner: RunnerConfig,
        supervision: SupervisionConfig,
        cleanup: &CleanupConfig,
    ) -> Self {
        Self {
            registry,
            lifecycle,
            cleaner,
            runner,
            supervision,
            settle_delay: Duration::from_millis(cleanup.settle_delay_ms),
        }
    }

    /// Spawn the supervised task and register it as active.
    ///
    /// The entry is in `active` before the task starts, and the task removes
    /// it on every exit path.
    pub fn spawn(&self, experiment: Experiment, active: &Arc<ActiveRuns>) -> ActiveRun {
        let id = experiment.id;
        let cancel = CancellationToken::new();
        let (done_tx, done_rx) = oneshot::channel::<()>();
        let run = ActiveRun {
            cancel: cancel.clone(),
            done: done_rx.map(|_| ()).boxed().shared(),
        };
        active.insert(id, run.clone());

        let guard = ActiveRunGuard {
            id,
            active: Arc::clone(active),
            _done: done_tx,
        };
        let supervisor = self.clone();
        tokio::spawn(async move {
            let _guard = guard;
            supervisor.run(experiment, cancel).await;
        });

        run
    }

    /// Run one experiment to its terminal state.
    pub async fn run(&self, experiment: Experiment, cancel: CancellationToken) {
        let id = experiment.id;
        let outcome = match self.execute(&experiment, &cancel).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(experiment_id = %id, error = %e, "Experiment failed");
                RunOutcome::Failed(e.to_string())
            }
        };

        let Some(entry) = self.registry.entry(id).await else {
            tracing::debug!(experiment_id = %id, "Experiment removed before its run ended");
            return;
        };
        let mut experiment = entry.lock().await;
        // Decided under the lock `stop` cancels under: a stop that saw the
        // experiment running must find it stopped.
        let transition = match outcome {
            _ if cancel.is_cancelled() => Transition::Stop,
            RunOutcome::Completed(summary) => Transition::Complete(summary),
            RunOutcome::Failed(error) => Transition::Fail { error },
            RunOutcome::Cancelled => Transition::Stop,
        };
        if let Err(e) = self.lifecycle.apply(&mut experiment, &transition).await {
            tracing::warn!(experiment_id = %id, error = %e, "Could not record terminal status");
        }
    }

    async fn execute(&self, experiment: &Experiment, cancel: &CancellationToken) -> DomainResult<RunOutcome> {
        let id = experiment.id;

        let cleaned = tokio::select! {
            () = cancel.cancelled() => return Ok(RunOutcome::Cancelled),
            cleaned = self.cleaner.cleanup() => cleaned,
        };
        if !cleaned {
            tracing::warn!(experiment_id = %id, cleaner = self.cleaner.name(), "Environment cleanup failed, launching anyway");
        }
        if !self.settle_delay.is_zero() {
            tokio::select! {
                () = cancel.cancelled() => return Ok(RunOutcome::Cancelled),
                () = tokio::time::sleep(self.settle_delay) => {}
            }
        }

        let mut child = self.launch(experiment).await?;
        let pgid = child.id();
        let clock = OutputClock::new();
        let readers = OutputReaders::spawn(&mut child, id, Arc::clone(&self.registry), clock.clone());

        let started = Instant::now();
        let exit = self.supervise(id, &mut child, pgid, cancel, &clock, started).await;
        if exit.is_err() {
            force_kill(&mut child, pgid).await;
        }
        // Background processes the runner left behind still hold its pipes.
        signal_group(&mut child, pgid, GroupSignal::Kill);
        readers.finish(self.supervision.drain_timeout()).await;

        let elapsed = started.elapsed().as_secs_f64();
        self.registry.mutate(id, |e| e.record_elapsed(elapsed)).await;

        match exit? {
            ChildExit::Exited(status) if status.success() => {
                tracing::info!(experiment_id = %id, elapsed_seconds = elapsed, "Runner finished successfully");
                let summary = artifacts::read_best_solution(&experiment.output_directory)
                    .await
                    .map(|solution| solution.completion_summary())
                    .unwrap_or_default();
                Ok(RunOutcome::Completed(summary))
            }
            ChildExit::Exited(status) => {
                let error = DomainError::Subprocess { code: status.code() };
                tracing::error!(experiment_id = %id, code = ?status.code(), "Runner exited with failure");
                Ok(RunOutcome::Failed(error.to_string()))
            }
            ChildExit::TimedOut => Ok(RunOutcome::Failed(
                DomainError::Timeout {
                    seconds: self.supervision.max_runtime().as_secs_f64(),
                }
                .to_string(),
            )),
            ChildExit::Cancelled => Ok(RunOutcome::Cancelled),
        }
    }

    async fn launch(&self, experiment: &Experiment) -> DomainResult<Child> {
        let script = self.resolve_script().await?;
        tokio::fs::create_dir_all(&experiment.output_directory).await?;
        let config_path = artifacts::write_run_config(experiment).await?;

        let working_dir = self
            .runner
            .working_dir
            .as_ref()
            .map(PathBuf::from)
            .or_else(|| {
                script
                    .as_deref()
                    .and_then(Path::parent)
                    .filter(|p| !p.as_os_str().is_empty())
                    .map(Path::to_path_buf)
            });

        let mut cmd = Command::new(&self.runner.program);
        if let Some(script) = &script {
            cmd.arg(script);
        }
        cmd.args(runner_args(experiment, &config_path))
            .args(&self.runner.extra_args)
            .env(EXPERIMENT_ID_ENV, experiment.id.to_string())
            .env(OUTPUT_DIR_ENV, &experiment.output_directory)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &working_dir {
            cmd.current_dir(dir);
        }
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn().map_err(|e| {
            DomainError::LaunchError(format!("Failed to start {}: {e}", self.runner.program))
        })?;

        tracing::info!(
            experiment_id = %experiment.id,
            pid = ?child.id(),
            program = %self.runner.program,
            route_id = %experiment.config.route_id,
            "Runner launched"
        );
        Ok(child)
    }

    /// Absolute path of the runner script, if one is configured.
    async fn resolve_script(&self) -> DomainResult<Option<PathBuf>> {
        if self.runner.script.trim().is_empty() {
            return Ok(None);
        }
        match tokio::fs::canonicalize(&self.runner.script).await {
            Ok(path) => Ok(Some(path)),
            Err(_) => Err(DomainError::LaunchError(format!(
                "Runner script not found: {}",
                self.runner.script
            ))),
        }
    }

    async fn supervise(
        &self,
        id: Uuid,
        child: &mut Child,
        pgid: Option<u32>,
        cancel: &CancellationToken,
        clock: &OutputClock,
        started: Instant,
    ) -> DomainResult<ChildExit> {
        let deadline = tokio::time::Instant::from_std(started) + self.supervision.max_runtime();
        let inactivity_timeout = self.supervision.inactivity_timeout();
        let mut ticker = tokio::time::interval(self.supervision.poll_interval().max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        let mut warned_for: Option<u64> = None;

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    tracing::info!(experiment_id = %id, "Stop requested, terminating runner");
                    terminate(child, pgid, self.supervision.cancel_grace()).await;
                    return Ok(ChildExit::Cancelled);
                }
                status = child.wait() => return Ok(ChildExit::Exited(status?)),
                () = tokio::time::sleep_until(deadline) => {
                    tracing::error!(
                        experiment_id = %id,
                        max_runtime_ms = self.supervision.max_runtime_ms,
                        "Runner exceeded maximum runtime, terminating"
                    );
                    terminate(child, pgid, self.supervision.terminate_grace()).await;
                    return Ok(ChildExit::TimedOut);
                }
                _ = ticker.tick() => {
                    let elapsed = started.elapsed().as_secs_f64();
                    self.registry.mutate(id, |e| e.record_elapsed(elapsed)).await;

                    let idle = clock.idle_for();
                    let mark = clock.last_output_ms();
                    if idle >= inactivity_timeout && warned_for != Some(mark) {
                        tracing::warn!(
                            experiment_id = %id,
                            idle_seconds = idle.as_secs(),
                            "No output from runner"
                        );
                        warned_for = Some(mark);
                    }
                }
            }
        }
    }
}

/// Arguments following the runner script.
pub fn runner_args(experiment: &Experiment, config_path: &Path) -> Vec<String> {
    let config = &experiment.config;
    let mut args = vec![
        config.route_id.clone(),
        "--method".to_string(),
        config.search_method.clone(),
        "--iterations".to_string(),
        config.num_iterations.to_string(),
        "--route-file".to_string(),
        config.route_file.clone(),
        "--timeout".to_string(),
        config.timeout_seconds.to_string(),
        "--seed".to_string(),
        config.random_seed.to_string(),
        "--reward-function".to_string(),
        config.reward_function.clone(),
        "--config".to_string(),
        config_path.to_string_lossy().into_owned(),
        "--output-dir".to_string(),
        experiment.output_directory.to_string_lossy().into_owned(),
    ];
    if config.headless {
        args.push("--headless".to_string());
    }
    args
}

/// SIGTERM the process group, wait up to `grace`, then SIGKILL.
async fn terminate(child: &mut Child, pgid: Option<u32>, grace: Duration) {
    signal_group(child, pgid, GroupSignal::Terminate);

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => {
            tracing::debug!(?status, "Runner exited after terminate");
            // Leftover group members that ignored SIGTERM.
            signal_group(child, pgid, GroupSignal::Kill);
        }
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Error waiting for runner to exit, killing");
            force_kill(child, pgid).await;
        }
        Err(_) => {
            tracing::warn!(grace_ms = grace.as_millis() as u64, "Runner ignored terminate, killing");
            force_kill(child, pgid).await;
        }
    }
}

async fn force_kill(child: &mut Child, pgid: Option<u32>) {
    signal_group(child, pgid, GroupSignal::Kill);
    if let Err(e) = child.kill().await {
        tracing::debug!(error = %e, "Kill after group signal failed");
    }
}

#[derive(Debug, Clone, Copy)]
enum GroupSignal {
    Terminate,
    Kill,
}

#[cfg(unix)]
fn signal_group(_child: &mut Child, pgid: Option<u32>, signal: GroupSignal) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pgid) = pgid.and_then(|p| i32::try_from(p).ok()) else {
        return;
    };
    let signal = match signal {
        GroupSignal::Terminate => Signal::SIGTERM,
        GroupSignal::Kill => Signal::SIGKILL,
    };
    match killpg(Pid::from_raw(pgid), signal) {
        Ok(()) | Err(nix::errno::Errno::ESRCH) => {}
        Err(e) => tracing::debug!(pgid, ?signal, error = %e, "Failed to signal process group"),
    }
}

#[cfg(not(unix))]
fn signal_group(child: &mut Child, _pgid: Option<u32>, _signal: GroupSignal) {
    if let Err(e) = child.start_kill() {
        tracing::debug!(error = %e, "Failed to kill runner");
    }
}
