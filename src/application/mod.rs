//! Application layer: supervising runner processes.

pub mod artifacts;
pub mod stream_reader;
pub mod supervisor;

pub use stream_reader::{OutputClock, OutputReaders, OutputStream};
pub use supervisor::{ActiveRun, ActiveRuns, Supervisor};
