/*!
 * Reaper
 *
 * Collects terminated workers with wait-for-any-child, releasing their
 * process-table entries, keeping the outstanding count used for admission
 * control, and reporting progress.
 */

use super::handle::{WorkerExit, WorkerHandle};
use super::types::{DispatchReport, ProcessError, ProcessResult, WorkerFailure};
use ahash::RandomState;
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::wait;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Outstanding workers of one dispatch, keyed by raw pid
pub struct Reaper {
    active: HashMap<i32, WorkerHandle, RandomState>,
    total: usize,
    progress_interval: usize,
    report: DispatchReport,
}

impl Reaper {
    pub fn new(total: usize, progress_interval: usize) -> Self {
        Self {
            active: HashMap::with_hasher(RandomState::new()),
            total,
            progress_interval: progress_interval.max(1),
            report: DispatchReport::default(),
        }
    }

    /// Record a freshly spawned worker
    pub fn track(&mut self, handle: WorkerHandle) {
        self.active.insert(handle.pid.as_raw(), handle);
        self.report.spawned += 1;
        self.report.peak_active = self.report.peak_active.max(self.active.len());
    }

    /// Outstanding (spawned, not yet reaped) workers
    #[inline]
    pub fn active(&self) -> usize {
        self.active.len()
    }

    pub fn into_report(mut self) -> DispatchReport {
        std::mem::take(&mut self.report)
    }

    /// Block until any child terminates and account for it
    ///
    /// Returns `Ok(None)` when the wait was interrupted by a signal or the
    /// terminated child is not one of ours, so the caller can re-check
    /// cancellation.
    pub fn reap_one(&mut self) -> ProcessResult<Option<(WorkerHandle, WorkerExit)>> {
        let status = match wait() {
            Ok(status) => status,
            Err(Errno::EINTR) => return Ok(None),
            Err(Errno::ECHILD) if !self.active.is_empty() => {
                // Children vanished without being reaped by us (someone
                // else waited for them); they can no longer be collected.
                let lost = self.active.len();
                warn!(lost, "Outstanding workers were reaped elsewhere");
                self.active.clear();
                return Err(ProcessError::WaitFailed(Errno::ECHILD));
            }
            Err(errno) => return Err(ProcessError::WaitFailed(errno)),
        };

        let Some((pid, exit)) = WorkerExit::from_wait_status(status) else {
            return Ok(None);
        };

        let Some(handle) = self.active.remove(&pid.as_raw()) else {
            warn!(pid = pid.as_raw(), "Reaped a child that is not a tracked worker");
            return Ok(None);
        };

        self.report.reaped += 1;
        if !exit.is_success() {
            debug!(
                cell = %handle.cell,
                pid = pid.as_raw(),
                exit = %exit,
                lifetime_us = handle.lifetime().as_micros() as u64,
                "Worker failed"
            );
            self.report.failures.push(WorkerFailure {
                cell: handle.cell,
                exit,
            });
        }

        if self.report.reaped % self.progress_interval == 0 {
            info!(
                completed = self.report.reaped,
                total = self.total,
                percent = (self.percent() * 10.0).round() / 10.0,
                "Progress"
            );
        }

        Ok(Some((handle, exit)))
    }

    /// Kill every outstanding worker and collect it
    ///
    /// Best effort: used on the error path, so failures are logged, not
    /// returned.
    pub fn abort(&mut self) {
        if self.active.is_empty() {
            return;
        }

        warn!(outstanding = self.active.len(), "Aborting outstanding workers");
        for handle in self.active.values() {
            match kill(handle.pid, Signal::SIGKILL) {
                Ok(()) | Err(Errno::ESRCH) => {}
                Err(e) => warn!(pid = handle.pid.as_raw(), error = %e, "Failed to kill worker"),
            }
        }

        while !self.active.is_empty() {
            if let Err(e) = self.reap_one() {
                warn!(error = %e, "Stopped collecting aborted workers");
                break;
            }
        }
    }

    fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.report.reaped as f64 * 100.0 / self.total as f64
        }
    }
}

impl Drop for Reaper {
    fn drop(&mut self) {
        // Never leave zombies behind on any exit path
        self.abort();
    }
}
