//! Concurrent execution of graph runs.
//!
//! [`RunRegistry`] accepts run submissions, executes each run as its own tokio
//! task, and keeps per-run state, backend timings and traces. Finished runs
//! are archived in a bounded history, oldest evicted first.

pub mod config;
pub mod error;
pub mod registry;
pub mod run;
pub mod timing;

pub use config::{RuntimeConfig, RuntimeConfigError};
pub use error::RegistryError;
pub use registry::{RunHandle, RunRegistry};
pub use run::{BackendCall, GraphRun, NodeTiming, RunErrorInfo, RunId, RunState};
pub use timing::{TimedBackend, TimingSink};
