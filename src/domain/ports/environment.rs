//! Environment cleanup port.

use async_trait::async_trait;

/// Tears down leftovers of a previous run (simulator servers, stale sockets)
/// before a new child process is launched.
#[async_trait]
pub trait EnvironmentCleaner: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Run the cleanup. Returns whether it fully succeeded; a `false` result
    /// is reported as a warning and the launch continues.
    async fn cleanup(&self) -> bool;
}
