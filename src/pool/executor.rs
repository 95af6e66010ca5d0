/*!
 * Thread Pool Executor
 * Alternate in-process strategy: scoped threads pulling cells from a WorkQueue
 */

use super::queue::WorkQueue;
use crate::core::errors::{MatmulError, MatmulResult};
use crate::core::limits::{MAX_POOL_THREADS, POOL_QUEUE_DEPTH_PER_THREAD};
use crate::core::types::Cell;
use crate::process::CellWorker;
use crate::shm::{SharedRegion, ShmError};
use crate::signals::CancellationToken;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use tracing::{debug, info};

/// Counters for one pool run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolReport {
    pub threads: usize,
    pub cells: usize,
}

/// Fixed-size pool of scoped worker threads
#[derive(Debug, Clone)]
pub struct ThreadPoolExecutor {
    threads: usize,
    cancel: CancellationToken,
}

impl ThreadPoolExecutor {
    pub fn new(threads: usize) -> Self {
        Self {
            threads: threads.max(1),
            cancel: CancellationToken::new(),
        }
    }

    /// CPU count, capped at `MAX_POOL_THREADS`
    pub fn with_default_threads() -> Self {
        Self::new(num_cpus::get().min(MAX_POOL_THREADS))
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Compute every active output cell of the region
    pub fn run<const N: usize>(&self, region: &SharedRegion<N>) -> MatmulResult<PoolReport> {
        let dims = region.dims()?;
        let queue = WorkQueue::<Cell>::new(self.threads * POOL_QUEUE_DEPTH_PER_THREAD);
        let first_error: Mutex<Option<ShmError>> = Mutex::new(None);
        let computed = AtomicUsize::new(0);

        info!(threads = self.threads, cells = dims.cells(), "Running thread pool");

        let cancelled = thread::scope(|scope| {
            for _ in 0..self.threads {
                scope.spawn(|| {
                    while let Some(cell) = queue.pop() {
                        match CellWorker::new(region, cell).run() {
                            Ok(_) => {
                                computed.fetch_add(1, Ordering::Relaxed);
                            }
                            Err(e) => {
                                first_error.lock().get_or_insert(e);
                                queue.close();
                            }
                        }
                    }
                });
            }

            let mut cancelled = false;
            for cell in dims.cells_row_major() {
                if self.cancel.is_cancelled() {
                    cancelled = true;
                    break;
                }
                if queue.push(cell).is_err() {
                    break;
                }
            }
            queue.close();
            cancelled
        });

        if let Some(e) = first_error.into_inner() {
            return Err(e.into());
        }
        if cancelled {
            return Err(MatmulError::Cancelled);
        }

        let cells = computed.into_inner();
        debug!(cells, "Thread pool finished");
        Ok(PoolReport {
            threads: self.threads,
            cells,
        })
    }
}

impl Default for ThreadPoolExecutor {
    fn default() -> Self {
        Self::with_default_threads()
    }
}
