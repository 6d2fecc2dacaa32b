//! Cleanup by running an external command.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::domain::models::CleanupConfig;
use crate::domain::ports::EnvironmentCleaner;

/// Runs a configured command (e.g. a script that kills stale simulator
/// servers) and waits for it up to a timeout.
#[derive(Debug, Clone)]
pub struct CommandCleaner {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandCleaner {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    /// `None` when the configured command is empty.
    pub fn from_config(config: &CleanupConfig) -> Option<Self> {
        let (program, args) = config.command.split_first()?;
        Some(Self::new(
            program.clone(),
            args.to_vec(),
            Duration::from_millis(config.timeout_ms),
        ))
    }
}

#[async_trait]
impl EnvironmentCleaner for CommandCleaner {
    fn name(&self) -> &'static str {
        "command"
    }

    async fn cleanup(&self) -> bool {
        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!(program = %self.program, error = %e, "Failed to spawn cleanup command");
                return false;
            }
        };

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) if output.status.success() => {
                tracing::debug!(program = %self.program, "Cleanup command finished");
                true
            }
            Ok(Ok(output)) => {
                tracing::warn!(
                    program = %self.program,
                    code = ?output.status.code(),
                    stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                    "Cleanup command failed"
                );
                false
            }
            Ok(Err(e)) => {
                tracing::warn!(program = %self.program, error = %e, "Cleanup command could not be awaited");
                false
            }
            Err(_) => {
                tracing::warn!(
                    program = %self.program,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Cleanup command timed out"
                );
                false
            }
        }
    }
}
