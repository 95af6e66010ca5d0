/*!
 * Worker Handles
 * OS process identity of a dispatched cell and its termination status
 */

use crate::core::types::Cell;
use nix::sys::wait::WaitStatus;
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

/// A spawned, not yet reaped, worker process
#[derive(Debug, Clone, Copy)]
pub struct WorkerHandle {
    pub pid: Pid,
    pub cell: Cell,
    pub spawned_at: Instant,
}

impl WorkerHandle {
    pub fn new(pid: Pid, cell: Cell) -> Self {
        Self {
            pid,
            cell,
            spawned_at: Instant::now(),
        }
    }

    pub fn lifetime(&self) -> Duration {
        self.spawned_at.elapsed()
    }
}

/// How a worker process terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum WorkerExit {
    /// Normal exit with status code
    Exited(i32),
    /// Killed by a signal (raw signal number)
    Signaled(i32),
}

impl WorkerExit {
    /// Map a wait status to `(pid, exit)`; stop/continue events yield `None`
    pub fn from_wait_status(status: WaitStatus) -> Option<(Pid, Self)> {
        match status {
            WaitStatus::Exited(pid, code) => Some((pid, WorkerExit::Exited(code))),
            WaitStatus::Signaled(pid, signal, _) => {
                Some((pid, WorkerExit::Signaled(signal as i32)))
            }
            _ => None,
        }
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        matches!(self, WorkerExit::Exited(0))
    }
}

impl fmt::Display for WorkerExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerExit::Exited(code) => write!(f, "exited with status {}", code),
            WorkerExit::Signaled(signal) => write!(f, "was killed by signal {}", signal),
        }
    }
}
