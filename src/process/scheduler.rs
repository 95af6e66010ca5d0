/*!
 * Process Scheduler
 *
 * Admission-control loop: dispatches one worker process per output cell in
 * row-major order while never holding more than `max_concurrent` outstanding
 * workers. The release signal is child termination, collected by the Reaper.
 */

use super::handle::WorkerHandle;
use super::reaper::Reaper;
use super::spawn::Spawner;
use super::types::{DispatchReport, ProcessError, ProcessResult, SchedulerConfig};
use crate::shm::SharedRegion;
use crate::signals::CancellationToken;
use tracing::{debug, error, info};

/// Dispatches CellWorker processes for a region
pub struct ProcessScheduler<S: Spawner> {
    spawner: S,
    config: SchedulerConfig,
    cancel: CancellationToken,
}

impl<S: Spawner> ProcessScheduler<S> {
    pub fn new(spawner: S, config: SchedulerConfig) -> Self {
        Self {
            spawner,
            config,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn spawner(&self) -> &S {
        &self.spawner
    }

    /// Run one full dispatch over the region's active output
    ///
    /// Inputs must already be populated; the shared borrow of `region`
    /// guarantees they cannot change while workers are outstanding. Every
    /// spawned worker is reaped before this returns, on success and on error.
    pub fn dispatch<const N: usize>(
        &mut self,
        region: &SharedRegion<N>,
    ) -> ProcessResult<DispatchReport> {
        let dims = region.dims()?;
        let total = dims.cells();
        let max_concurrent = self.config.max_concurrent.max(1);
        let mut reaper = Reaper::new(total, self.config.progress_interval);

        info!(
            cells = total,
            dims = %dims,
            max_concurrent,
            spawner = self.spawner.kind(),
            "Dispatching worker processes"
        );

        for cell in dims.cells_row_major() {
            while reaper.active() >= max_concurrent {
                self.check_cancelled(&mut reaper)?;
                reaper.reap_one()?;
            }
            self.check_cancelled(&mut reaper)?;

            match self.spawner.spawn(cell, region.name()) {
                Ok(pid) => reaper.track(WorkerHandle::new(pid, cell)),
                Err(e) => {
                    error!(cell = %cell, error = %e, "Aborting dispatch");
                    reaper.abort();
                    return Err(e);
                }
            }
        }

        while reaper.active() > 0 {
            self.check_cancelled(&mut reaper)?;
            reaper.reap_one()?;
        }

        let report = reaper.into_report();
        info!(
            spawned = report.spawned,
            reaped = report.reaped,
            peak_active = report.peak_active,
            "All worker processes finished"
        );

        if let Some(first) = report.failures.first() {
            return Err(ProcessError::WorkerFailed {
                cell: first.cell,
                exit: first.exit,
                failed: report.failures.len(),
            });
        }

        let missing = region.missing_cells()?;
        if !missing.is_empty() {
            debug!(first_missing = %missing[0], "Completion flags not set");
            return Err(ProcessError::IncompleteCells {
                missing: missing.len(),
                total,
            });
        }

        Ok(report)
    }

    fn check_cancelled(&self, reaper: &mut Reaper) -> ProcessResult<()> {
        if self.cancel.is_cancelled() {
            info!(outstanding = reaper.active(), "Cancellation requested");
            reaper.abort();
            return Err(ProcessError::Cancelled);
        }
        Ok(())
    }
}
