/*!
 * Process Types
 * Common types for worker dispatch and reaping
 */

use super::handle::WorkerExit;
use crate::core::limits::{DEFAULT_MAX_CONCURRENT, DEFAULT_PROGRESS_INTERVAL};
use crate::core::types::Cell;
use crate::shm::ShmError;
use miette::Diagnostic;
use nix::errno::Errno;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Process operation result
pub type ProcessResult<T> = Result<T, ProcessError>;

/// Process errors
#[derive(Error, Debug, Diagnostic)]
pub enum ProcessError {
    #[error("Spawn failed for cell {cell}: {reason}")]
    #[diagnostic(
        code(process::spawn_failed),
        help("The process table or memory may be exhausted; lower --max-concurrent.")
    )]
    SpawnFailed { cell: Cell, reason: String },

    #[error("Waiting for workers failed: {0}")]
    #[diagnostic(code(process::wait_failed))]
    WaitFailed(#[source] Errno),

    #[error("Worker for cell {cell} {exit}; {failed} worker(s) failed this cycle")]
    #[diagnostic(
        code(process::worker_failed),
        help("A worker that fails leaves its cell unset, so the cycle result is unusable.")
    )]
    WorkerFailed {
        cell: Cell,
        exit: WorkerExit,
        failed: usize,
    },

    #[error("{missing} of {total} cells were never marked complete")]
    #[diagnostic(code(process::incomplete_cells))]
    IncompleteCells { missing: usize, total: usize },

    #[error("Dispatch cancelled")]
    #[diagnostic(code(process::cancelled))]
    Cancelled,

    #[error(transparent)]
    #[diagnostic(transparent)]
    Shm(#[from] ShmError),
}

/// Admission-control settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SchedulerConfig {
    /// Maximum outstanding (spawned but not yet reaped) workers
    pub max_concurrent: usize,
    /// Progress line every this many reaps
    pub progress_interval: usize,
}

impl SchedulerConfig {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            max_concurrent,
            ..Self::default()
        }
    }

    pub fn with_progress_interval(mut self, interval: usize) -> Self {
        self.progress_interval = interval;
        self
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

/// A worker that exited unsuccessfully
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerFailure {
    pub cell: Cell,
    pub exit: WorkerExit,
}

/// Outcome counters for one dispatch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DispatchReport {
    pub spawned: usize,
    pub reaped: usize,
    /// Highest number of simultaneously outstanding workers
    pub peak_active: usize,
    pub failures: Vec<WorkerFailure>,
}
