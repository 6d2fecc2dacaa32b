use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Main configuration structure for simfuzz
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Root directory holding one output directory per experiment
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Search runner invocation
    #[serde(default)]
    pub runner: RunnerConfig,

    /// Subprocess supervision deadlines
    #[serde(default)]
    pub supervision: SupervisionConfig,

    /// Pre-launch environment cleanup
    #[serde(default)]
    pub cleanup: CleanupConfig,

    /// Startup recovery from the durable store
    #[serde(default)]
    pub recovery: RecoveryConfig,
}

fn default_output_dir() -> String {
    "output/experiments".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
            runner: RunnerConfig::default(),
            supervision: SupervisionConfig::default(),
            cleanup: CleanupConfig::default(),
            recovery: RecoveryConfig::default(),
        }
    }
}

impl Config {
    pub fn output_root(&self) -> PathBuf {
        PathBuf::from(&self.output_dir)
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".simfuzz/experiments.db".to_string()
}

const fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stdout only when unset
    #[serde(default)]
    pub log_dir: Option<String>,

    /// Rotation policy for file logs: daily, hourly or never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}

/// How the search runner is invoked
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RunnerConfig {
    /// Interpreter or executable
    #[serde(default = "default_runner_program")]
    pub program: String,

    /// Runner script handed to `program` as its first argument
    #[serde(default = "default_runner_script")]
    pub script: String,

    /// Working directory; defaults to the script's parent directory
    #[serde(default)]
    pub working_dir: Option<String>,

    /// Extra arguments appended after the generated ones
    #[serde(default)]
    pub extra_args: Vec<String>,
}

fn default_runner_program() -> String {
    "python3".to_string()
}

fn default_runner_script() -> String {
    "src/simulation/sim_runner.py".to_string()
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            program: default_runner_program(),
            script: default_runner_script(),
            working_dir: None,
            extra_args: vec![],
        }
    }
}

/// Deadlines enforced while a child process runs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SupervisionConfig {
    /// How often the supervisor wakes to check deadlines
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Overall runtime ceiling
    #[serde(default = "default_max_runtime_ms")]
    pub max_runtime_ms: u64,

    /// Silence after which an inactivity warning is logged
    #[serde(default = "default_inactivity_timeout_ms")]
    pub inactivity_timeout_ms: u64,

    /// Wait between SIGTERM and SIGKILL on timeout or failure
    #[serde(default = "default_terminate_grace_ms")]
    pub terminate_grace_ms: u64,

    /// Wait between SIGTERM and SIGKILL on an explicit stop
    #[serde(default = "default_cancel_grace_ms")]
    pub cancel_grace_ms: u64,

    /// How long to keep draining output after the child exits
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,
}

const fn default_poll_interval_ms() -> u64 {
    30_000
}

const fn default_max_runtime_ms() -> u64 {
    2 * 60 * 60 * 1000
}

const fn default_inactivity_timeout_ms() -> u64 {
    10 * 60 * 1000
}

const fn default_terminate_grace_ms() -> u64 {
    5_000
}

const fn default_cancel_grace_ms() -> u64 {
    2_000
}

const fn default_drain_timeout_ms() -> u64 {
    5_000
}

impl Default for SupervisionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_runtime_ms: default_max_runtime_ms(),
            inactivity_timeout_ms: default_inactivity_timeout_ms(),
            terminate_grace_ms: default_terminate_grace_ms(),
            cancel_grace_ms: default_cancel_grace_ms(),
            drain_timeout_ms: default_drain_timeout_ms(),
        }
    }
}

impl SupervisionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_runtime(&self) -> Duration {
        Duration::from_millis(self.max_runtime_ms)
    }

    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_millis(self.inactivity_timeout_ms)
    }

    pub fn terminate_grace(&self) -> Duration {
        Duration::from_millis(self.terminate_grace_ms)
    }

    pub fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

/// Pre-launch environment cleanup
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CleanupConfig {
    /// Command (program followed by arguments); no cleanup when empty
    #[serde(default)]
    pub command: Vec<String>,

    /// Upper bound on the cleanup command's runtime
    #[serde(default = "default_cleanup_timeout_ms")]
    pub timeout_ms: u64,

    /// Pause between cleanup and launch
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
}

const fn default_cleanup_timeout_ms() -> u64 {
    60_000
}

const fn default_settle_delay_ms() -> u64 {
    2_000
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            command: vec![],
            timeout_ms: default_cleanup_timeout_ms(),
            settle_delay_ms: default_settle_delay_ms(),
        }
    }
}

/// Startup recovery
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RecoveryConfig {
    /// Maximum number of records loaded from the store at startup
    #[serde(default = "default_load_limit")]
    pub load_limit: i64,
}

const fn default_load_limit() -> i64 {
    1000
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            load_limit: default_load_limit(),
        }
    }
}
