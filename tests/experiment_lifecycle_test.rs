//! End-to-end lifecycle tests driving a fake runner through `/bin/sh`.

#![cfg(unix)]

mod common;

use std::sync::Arc;

use common::*;
use simfuzz::adapters::cleanup::NoopCleaner;
use simfuzz::domain::models::{BEST_SOLUTION_FILE, RUN_CONFIG_FILE};
use simfuzz::{DomainError, ExperimentConfig, ExperimentService, ExperimentStatus, ExperimentStore};

fn config() -> ExperimentConfig {
    ExperimentConfig::new("3", "routes/town05.xml").with_iterations(3)
}

#[tokio::test]
async fn test_successful_run_completes_with_results() {
    setup_test_logging();
    let h = harness(SUCCESS_RUNNER).await;
    let exp = h.service.create(config()).await.unwrap();

    let started = h.service.start(exp.id).await.unwrap();
    assert_eq!(started.status, ExperimentStatus::Running);
    assert!(started.started_at.is_some());

    wait_done(&h.service, exp.id, 10_000).await;

    let finished = h.service.get(exp.id).await.unwrap();
    assert_eq!(finished.status, ExperimentStatus::Completed);
    assert!(finished.completed_at.is_some());
    assert!(finished.error_message.is_none());
    let progress = finished.progress.unwrap();
    assert_eq!(progress.best_reward, Some(4.2));
    assert!(progress.collision_found);
    assert_eq!(progress.current_iteration, 3);
    assert_eq!(progress.recent_rewards, vec![5.0, 4.2]);
    assert!(progress.elapsed_seconds.is_some());

    let results = h.service.results(exp.id).await.unwrap();
    assert_eq!(results.final_status, ExperimentStatus::Completed);
    assert_eq!(results.best_reward, Some(4.2));
    assert_eq!(results.total_iterations, 3);
    assert_eq!(results.mean_reward, Some(4.6));
    assert_eq!(
        results.result_files,
        vec![BEST_SOLUTION_FILE.to_string(), RUN_CONFIG_FILE.to_string()]
    );

    let record = h.store.get(exp.id).await.unwrap().unwrap();
    assert_eq!(record.status, ExperimentStatus::Completed);
    assert_eq!(record.best_reward, Some(4.2));
    assert!(record.collision_found);
    assert!(record.started_at.is_some());
    assert!(record.completed_at.is_some());
    assert!(!h.service.is_active(exp.id));
}

#[tokio::test]
async fn test_runner_receives_config_and_environment() {
    let body = r#"
echo "$SIMFUZZ_EXPERIMENT_ID" > "$SIMFUZZ_OUTPUT_DIR/env_id.txt"
echo "$@" > "$SIMFUZZ_OUTPUT_DIR/args.txt"
pwd > "$SIMFUZZ_OUTPUT_DIR/cwd.txt"
"#;
    let h = harness(body).await;
    let exp = h
        .service
        .create(config().with_headless(true))
        .await
        .unwrap();
    h.service.start(exp.id).await.unwrap();
    wait_done(&h.service, exp.id, 10_000).await;

    let dir = &exp.output_directory;
    let env_id = std::fs::read_to_string(dir.join("env_id.txt")).unwrap();
    assert_eq!(env_id.trim(), exp.id.to_string());

    let args = std::fs::read_to_string(dir.join("args.txt")).unwrap();
    assert!(args.starts_with("3 --method random --iterations 3"));
    assert!(args.contains("--route-file routes/town05.xml"));
    assert!(args.trim_end().ends_with("--headless"));

    let cwd = std::fs::read_to_string(dir.join("cwd.txt")).unwrap();
    let script_dir = std::fs::canonicalize(h.dir.path()).unwrap();
    assert_eq!(std::fs::canonicalize(cwd.trim()).unwrap(), script_dir);

    let run_config: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(dir.join(RUN_CONFIG_FILE)).unwrap()).unwrap();
    assert_eq!(run_config["experiment_id"], exp.id.to_string());
    assert_eq!(run_config["route_id"], "3");
    assert_eq!(run_config["num_iterations"], 3);
    assert_eq!(run_config["headless"], true);

    // Exit 0 without a result artifact still completes, with empty figures.
    let finished = h.service.get(exp.id).await.unwrap();
    assert_eq!(finished.status, ExperimentStatus::Completed);
    let results = h.service.results(exp.id).await.unwrap();
    assert!(results.best_reward.is_none());
    assert!(results.best_parameters.is_none());
}

#[tokio::test]
async fn test_nonzero_exit_fails_with_return_code() {
    let h = harness(FAILING_RUNNER).await;
    let exp = h.service.create(config()).await.unwrap();
    h.service.start(exp.id).await.unwrap();
    wait_done(&h.service, exp.id, 10_000).await;

    let failed = h.service.get(exp.id).await.unwrap();
    assert_eq!(failed.status, ExperimentStatus::Failed);
    let error = failed.error_message.unwrap();
    assert!(error.contains("return code 3"), "unexpected error: {error}");
    assert_eq!(failed.progress.unwrap().current_iteration, 1);

    let record = h.store.get(exp.id).await.unwrap().unwrap();
    assert_eq!(record.status, ExperimentStatus::Failed);
    assert_eq!(record.error_message.as_deref(), Some(error.as_str()));
}

#[tokio::test]
async fn test_runtime_ceiling_terminates_runner() {
    let h = harness_with(HANGING_RUNNER, |c| c.supervision.max_runtime_ms = 1_000).await;
    let exp = h.service.create(config()).await.unwrap();
    h.service.start(exp.id).await.unwrap();

    let dir = exp.output_directory.clone();
    assert!(wait_for(|| read_pid(&dir).is_some(), 5_000).await);
    let pid = read_pid(&dir).unwrap();

    wait_done(&h.service, exp.id, 10_000).await;

    let failed = h.service.get(exp.id).await.unwrap();
    assert_eq!(failed.status, ExperimentStatus::Failed);
    assert!(failed.error_message.unwrap().contains("timed out"));
    assert!(!process_alive(pid), "runner {pid} survived the timeout");
}

#[tokio::test]
async fn test_inactivity_only_warns() {
    let h = harness_with(HANGING_RUNNER, |c| {
        c.supervision.inactivity_timeout_ms = 200;
        c.supervision.max_runtime_ms = 5_000;
    })
    .await;
    let exp = h.service.create(config()).await.unwrap();
    h.service.start(exp.id).await.unwrap();

    let dir = exp.output_directory.clone();
    assert!(wait_for(|| read_pid(&dir).is_some(), 5_000).await);
    let pid = read_pid(&dir).unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(800)).await;
    assert_eq!(h.service.get(exp.id).await.unwrap().status, ExperimentStatus::Running);
    assert!(h.service.is_active(exp.id));
    assert!(process_alive(pid), "silent runner {pid} was terminated");

    let stopped = h.service.stop(exp.id).await.unwrap();
    assert_eq!(stopped.status, ExperimentStatus::Stopped);
    assert!(stopped.error_message.is_none());
}

#[tokio::test]
async fn test_stop_terminates_runner() {
    let h = harness(HANGING_RUNNER).await;
    let exp = h.service.create(config()).await.unwrap();
    h.service.start(exp.id).await.unwrap();

    let dir = exp.output_directory.clone();
    assert!(wait_for(|| read_pid(&dir).is_some(), 5_000).await);
    let pid = read_pid(&dir).unwrap();
    assert!(process_alive(pid));

    let stopped = h.service.stop(exp.id).await.unwrap();
    assert_eq!(stopped.status, ExperimentStatus::Stopped);
    assert!(stopped.completed_at.is_some());
    assert!(!process_alive(pid), "runner {pid} survived stop");
    assert!(!h.service.is_active(exp.id));

    assert!(matches!(h.service.stop(exp.id).await, Err(DomainError::NotRunning(_))));
    assert!(matches!(
        h.service.start(exp.id).await,
        Err(DomainError::InvalidStateTransition { .. })
    ));
    let record = h.store.get(exp.id).await.unwrap().unwrap();
    assert_eq!(record.status, ExperimentStatus::Stopped);
}

#[tokio::test]
async fn test_stop_kills_runner_ignoring_terminate() {
    let h = harness_with(STUBBORN_RUNNER, |c| c.supervision.cancel_grace_ms = 200).await;
    let exp = h.service.create(config()).await.unwrap();
    h.service.start(exp.id).await.unwrap();

    let dir = exp.output_directory.clone();
    assert!(wait_for(|| read_pid(&dir).is_some(), 5_000).await);
    let pid = read_pid(&dir).unwrap();

    let stopped = h.service.stop(exp.id).await.unwrap();
    assert_eq!(stopped.status, ExperimentStatus::Stopped);
    assert!(!process_alive(pid), "runner {pid} survived forced kill");
}

#[tokio::test]
async fn test_stop_during_settle_delay_launches_nothing() {
    let h = harness_with(HANGING_RUNNER, |c| c.cleanup.settle_delay_ms = 5_000).await;
    let exp = h.service.create(config()).await.unwrap();
    h.service.start(exp.id).await.unwrap();

    let stopped = h.service.stop(exp.id).await.unwrap();
    assert_eq!(stopped.status, ExperimentStatus::Stopped);
    assert!(read_pid(&exp.output_directory).is_none());
}

#[tokio::test]
async fn test_leftover_background_process_is_killed_on_exit() {
    let h = harness_with(ABANDONING_RUNNER, |c| c.supervision.drain_timeout_ms = 10_000).await;
    let exp = h.service.create(config()).await.unwrap();
    h.service.start(exp.id).await.unwrap();
    wait_done(&h.service, exp.id, 5_000).await;

    assert_eq!(h.service.get(exp.id).await.unwrap().status, ExperimentStatus::Completed);
    let pid = read_pid(&exp.output_directory).unwrap();
    assert!(wait_for(|| !process_alive(pid), 2_000).await, "background process {pid} survived");
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_stop_after_runner_exit_still_ends_stopped() {
    let h = harness_with(DETACHING_RUNNER, |c| c.supervision.drain_timeout_ms = 3_000).await;
    let exp = h.service.create(config()).await.unwrap();
    h.service.start(exp.id).await.unwrap();

    let dir = exp.output_directory.clone();
    assert!(wait_for(|| dir.join("exiting").exists(), 5_000).await);
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    // The runner is gone but its detached child keeps the output open.
    assert!(h.service.is_active(exp.id));

    let stopped = h.service.stop(exp.id).await.unwrap();
    assert_eq!(stopped.status, ExperimentStatus::Stopped);
    assert_eq!(h.store.get(exp.id).await.unwrap().unwrap().status, ExperimentStatus::Stopped);

    if let Some(pid) = read_pid(&dir) {
        let _ = nix::sys::signal::kill(
            nix::unistd::Pid::from_raw(pid),
            nix::sys::signal::Signal::SIGKILL,
        );
    }
}

#[tokio::test]
async fn test_delete_racing_start_leaves_no_run_behind() {
    let h = harness(HANGING_RUNNER).await;
    for _ in 0..5 {
        let exp = h.service.create(config()).await.unwrap();
        let (deleted, started) = tokio::join!(h.service.delete(exp.id), h.service.start(exp.id));

        assert!(deleted.unwrap());
        if let Err(e) = started {
            assert!(matches!(e, DomainError::ExperimentNotFound(_)), "unexpected error: {e}");
        }
        assert!(h.service.get(exp.id).await.is_none());
        assert!(!h.service.is_active(exp.id));

        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        assert!(!exp.output_directory.exists(), "a run was launched after delete");
        assert!(matches!(
            h.service.stop(exp.id).await,
            Err(DomainError::ExperimentNotFound(_))
        ));
    }
}

#[tokio::test]
async fn test_start_twice_is_already_running() {
    let h = harness(HANGING_RUNNER).await;
    let exp = h.service.create(config()).await.unwrap();
    h.service.start(exp.id).await.unwrap();

    assert!(matches!(
        h.service.start(exp.id).await,
        Err(DomainError::AlreadyRunning(id)) if id == exp.id
    ));
    h.service.stop(exp.id).await.unwrap();
}

#[tokio::test]
async fn test_concurrent_stops_share_one_cancellation() {
    let h = harness(HANGING_RUNNER).await;
    let exp = h.service.create(config()).await.unwrap();
    h.service.start(exp.id).await.unwrap();
    let dir = exp.output_directory.clone();
    assert!(wait_for(|| read_pid(&dir).is_some(), 5_000).await);

    let (a, b) = tokio::join!(h.service.stop(exp.id), h.service.stop(exp.id));
    let ok = [&a, &b].iter().filter(|r| r.is_ok()).count();
    assert!(ok >= 1);
    for result in [a, b] {
        match result {
            Ok(exp) => assert_eq!(exp.status, ExperimentStatus::Stopped),
            Err(e) => assert!(matches!(e, DomainError::NotRunning(_))),
        }
    }
    assert_eq!(
        h.service.get(exp.id).await.unwrap().status,
        ExperimentStatus::Stopped
    );
}

#[tokio::test]
async fn test_delete_running_experiment() {
    let h = harness(HANGING_RUNNER).await;
    let exp = h.service.create(config()).await.unwrap();
    h.service.start(exp.id).await.unwrap();

    let dir = exp.output_directory.clone();
    assert!(wait_for(|| read_pid(&dir).is_some(), 5_000).await);
    let pid = read_pid(&dir).unwrap();

    assert!(h.service.delete(exp.id).await.unwrap());
    assert!(!process_alive(pid));
    assert!(!dir.exists());
    assert!(h.service.get(exp.id).await.is_none());
    assert!(h.store.get(exp.id).await.unwrap().is_none());
    assert!(!h.service.delete(exp.id).await.unwrap());
}

#[tokio::test]
async fn test_missing_script_fails_launch() {
    let h = harness_with(SUCCESS_RUNNER, |c| {
        c.runner.script = "/nonexistent/sim_runner.py".to_string();
    })
    .await;
    let exp = h.service.create(config()).await.unwrap();
    h.service.start(exp.id).await.unwrap();
    wait_done(&h.service, exp.id, 10_000).await;

    let failed = h.service.get(exp.id).await.unwrap();
    assert_eq!(failed.status, ExperimentStatus::Failed);
    let error = failed.error_message.unwrap();
    assert!(error.contains("Runner script not found"), "unexpected error: {error}");
}

#[tokio::test]
async fn test_missing_program_fails_launch() {
    let h = harness_with(SUCCESS_RUNNER, |c| {
        c.runner.program = "/nonexistent/python3".to_string();
    })
    .await;
    let exp = h.service.create(config()).await.unwrap();
    h.service.start(exp.id).await.unwrap();
    wait_done(&h.service, exp.id, 10_000).await;

    let failed = h.service.get(exp.id).await.unwrap();
    assert_eq!(failed.status, ExperimentStatus::Failed);
    assert!(failed.error_message.unwrap().starts_with("Launch failed"));
}

#[tokio::test]
async fn test_store_failures_do_not_change_outcome() {
    let dir = temp_dir();
    let script = write_runner(dir.path(), SUCCESS_RUNNER);
    let config = test_config(dir.path(), &script);
    let service = ExperimentService::new(&config, Arc::new(FailingStore), Arc::new(NoopCleaner)).unwrap();

    let exp = service.create(ExperimentConfig::new("3", "r.xml")).await.unwrap();
    service.start(exp.id).await.unwrap();
    wait_done(&service, exp.id, 10_000).await;

    assert_eq!(service.get(exp.id).await.unwrap().status, ExperimentStatus::Completed);
    assert_eq!(service.initialize().await.loaded, 0);
    assert!(service.delete(exp.id).await.unwrap());
}

#[tokio::test]
async fn test_file_lookup_stays_inside_output_directory() {
    let h = harness(SUCCESS_RUNNER).await;
    let exp = h.service.create(config()).await.unwrap();
    h.service.start(exp.id).await.unwrap();
    wait_done(&h.service, exp.id, 10_000).await;

    let found = h.service.file_path(exp.id, BEST_SOLUTION_FILE).await.unwrap();
    assert_eq!(found.file_name().unwrap(), BEST_SOLUTION_FILE);

    std::fs::write(h.dir.path().join("secret.txt"), "x").unwrap();
    assert!(h.service.file_path(exp.id, "../../secret.txt").await.is_none());
    assert!(h.service.file_path(exp.id, "/etc/passwd").await.is_none());
    assert!(h.service.file_path(exp.id, "missing.json").await.is_none());
    assert!(h.service.file_path(exp.id, ".").await.is_none());
}

#[tokio::test]
async fn test_independent_experiments_run_concurrently() {
    let h = harness(SUCCESS_RUNNER).await;
    let a = h.service.create(config()).await.unwrap();
    let b = h.service.create(config()).await.unwrap();
    h.service.start(a.id).await.unwrap();
    h.service.start(b.id).await.unwrap();

    wait_done(&h.service, a.id, 10_000).await;
    wait_done(&h.service, b.id, 10_000).await;

    for id in [a.id, b.id] {
        let exp = h.service.get(id).await.unwrap();
        assert_eq!(exp.status, ExperimentStatus::Completed);
        assert_eq!(exp.progress.unwrap().best_reward, Some(4.2));
    }
    assert_ne!(a.output_directory, b.output_directory);
}

#[tokio::test]
async fn test_shutdown_stops_everything() {
    let h = harness(HANGING_RUNNER).await;
    let a = h.service.create(config()).await.unwrap();
    let b = h.service.create(config()).await.unwrap();
    h.service.start(a.id).await.unwrap();
    h.service.start(b.id).await.unwrap();

    h.service.shutdown().await;

    for id in [a.id, b.id] {
        assert!(!h.service.is_active(id));
        assert_eq!(h.service.get(id).await.unwrap().status, ExperimentStatus::Stopped);
    }
}
