//! Project initialization
//!
//! Creates the `.simfuzz` directory, writes a default `config.yaml` and the
//! experiment output root.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use super::config::CONFIG_DIR;

/// Default configuration template content
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# simfuzz configuration
# Override settings by editing this file, adding .simfuzz/local.yaml or setting
# environment variables with the SIMFUZZ_ prefix
#
# Example environment variables:
#   export SIMFUZZ_OUTPUT_DIR=/data/experiments
#   export SIMFUZZ_RUNNER__SCRIPT=/opt/sim/sim_runner.py
#   export SIMFUZZ_SUPERVISION__MAX_RUNTIME_MS=3600000
#   export SIMFUZZ_LOGGING__LEVEL=debug

# Root directory holding one output directory per experiment
output_dir: "output/experiments"

database:
  # Path to SQLite database file (project-local)
  path: ".simfuzz/experiments.db"
  max_connections: 5

logging:
  # Log level: trace, debug, info, warn, error
  level: "info"
  # Log format: json, pretty
  format: "pretty"
  # Rolling JSON log files are written here when set
  # log_dir: ".simfuzz/logs"
  rotation: "daily"

# Search runner invocation: <program> <script> --route-id ... --output-dir ...
runner:
  program: "python3"
  script: "src/simulation/sim_runner.py"
  # working_dir defaults to the script's parent directory
  extra_args: []

supervision:
  poll_interval_ms: 30000
  # Overall runtime ceiling (2 hours)
  max_runtime_ms: 7200000
  # Log a warning after this much silence from the runner
  inactivity_timeout_ms: 600000
  terminate_grace_ms: 5000
  cancel_grace_ms: 2000
  drain_timeout_ms: 5000

# Command run before every launch to clear leftover simulator processes
cleanup:
  command: []
  timeout_ms: 60000
  settle_delay_ms: 2000

recovery:
  load_limit: 1000
"#;

/// What [`initialize_project`] did.
#[derive(Debug, Clone, Serialize)]
pub struct SetupReport {
    pub config_path: PathBuf,
    pub config_written: bool,
    pub directories_created: Vec<String>,
}

/// Create the configuration directory and default config under `root`.
///
/// An existing `config.yaml` is only replaced when `force` is set.
pub fn initialize_project(root: &Path, force: bool) -> Result<SetupReport> {
    let config_dir = root.join(CONFIG_DIR);
    let mut directories_created = Vec::new();

    if !config_dir.exists() {
        fs::create_dir_all(&config_dir)
            .with_context(|| format!("Failed to create {}", config_dir.display()))?;
        directories_created.push(CONFIG_DIR.to_string());
    }

    let config_path = config_dir.join("config.yaml");
    let config_written = if config_path.exists() && !force {
        false
    } else {
        fs::write(&config_path, DEFAULT_CONFIG_TEMPLATE)
            .with_context(|| format!("Failed to write {}", config_path.display()))?;
        true
    };

    Ok(SetupReport {
        config_path,
        config_written,
        directories_created,
    })
}
