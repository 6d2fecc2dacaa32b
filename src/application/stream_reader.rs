//! Draining a child's stdout and stderr.
//!
//! Both streams are read on their own tasks so a flood on one never stalls
//! the other (a stalled pipe would block the child once its buffer fills).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::services::progress_parser;
use crate::services::registry::ExperimentRegistry;

/// Which output channel a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

/// Time of the most recent output line, shared between the readers and the
/// supervisor's inactivity check.
#[derive(Debug, Clone)]
pub struct OutputClock {
    origin: Instant,
    last_output_ms: Arc<AtomicU64>,
}

impl OutputClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            last_output_ms: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn touch(&self) {
        let now = self.origin.elapsed().as_millis() as u64;
        self.last_output_ms.fetch_max(now, Ordering::Relaxed);
    }

    /// Milliseconds since the clock's origin at which output was last seen.
    pub fn last_output_ms(&self) -> u64 {
        self.last_output_ms.load(Ordering::Relaxed)
    }

    pub fn idle_for(&self) -> Duration {
        let now = self.origin.elapsed().as_millis() as u64;
        Duration::from_millis(now.saturating_sub(self.last_output_ms()))
    }
}

impl Default for OutputClock {
    fn default() -> Self {
        Self::new()
    }
}

/// The two reader tasks of one child process.
pub struct OutputReaders {
    experiment_id: Uuid,
    handles: Vec<JoinHandle<()>>,
    stop: CancellationToken,
}

impl OutputReaders {
    /// Take the child's piped stdout/stderr and start draining them.
    pub fn spawn(
        child: &mut Child,
        experiment_id: Uuid,
        registry: Arc<ExperimentRegistry>,
        clock: OutputClock,
    ) -> Self {
        let stop = CancellationToken::new();
        let mut handles = Vec::with_capacity(2);

        if let Some(stdout) = child.stdout.take() {
            handles.push(tokio::spawn(drain(
                stdout,
                OutputStream::Stdout,
                experiment_id,
                registry.clone(),
                clock.clone(),
                stop.clone(),
            )));
        }
        if let Some(stderr) = child.stderr.take() {
            handles.push(tokio::spawn(drain(
                stderr,
                OutputStream::Stderr,
                experiment_id,
                registry,
                clock,
                stop.clone(),
            )));
        }

        Self {
            experiment_id,
            handles,
            stop,
        }
    }

    /// Wait for both streams to reach end-of-stream.
    ///
    /// A grandchild holding the pipes open would keep them from closing, so
    /// after `timeout` the readers are told to stop and then joined.
    pub async fn finish(self, timeout: Duration) {
        let Self {
            experiment_id,
            handles,
            stop,
        } = self;

        let joined = futures::future::join_all(handles);
        tokio::pin!(joined);

        if tokio::time::timeout(timeout, &mut joined).await.is_err() {
            tracing::warn!(
                experiment_id = %experiment_id,
                timeout_ms = timeout.as_millis() as u64,
                "Output streams still open after child exit, abandoning drain"
            );
            stop.cancel();
            joined.await;
        }
    }
}

async fn drain<R>(
    reader: R,
    stream: OutputStream,
    experiment_id: Uuid,
    registry: Arc<ExperimentRegistry>,
    clock: OutputClock,
    stop: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let read = tokio::select! {
            _ = stop.cancelled() => break,
            read = reader.read_until(b'\n', &mut buf) => read,
        };

        match read {
            Ok(0) => break,
            Ok(_) => {
                clock.touch();
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                handle_line(line, stream, experiment_id, &registry).await;
            }
            Err(e) => {
                tracing::warn!(
                    experiment_id = %experiment_id,
                    stream = stream.as_str(),
                    error = %e,
                    "Error reading child output"
                );
                break;
            }
        }
    }
}

async fn handle_line(line: &str, stream: OutputStream, experiment_id: Uuid, registry: &ExperimentRegistry) {
    match stream {
        OutputStream::Stdout => tracing::info!(experiment_id = %experiment_id, stream = "stdout", "{line}"),
        OutputStream::Stderr => tracing::warn!(experiment_id = %experiment_id, stream = "stderr", "{line}"),
    }

    if let Some(delta) = progress_parser::parse_line(line) {
        registry
            .mutate(experiment_id, |experiment| experiment.record_progress(&delta))
            .await;
    }
}
