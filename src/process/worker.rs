/*!
 * Cell Worker
 *
 * Unit of work executed inside a freshly spawned process: compute one output
 * cell from the shared inputs, publish it, set its completion flag.
 */

use crate::core::limits::{
    WORKER_EXIT_ATTACH_FAILED, WORKER_EXIT_COMPUTE_FAILED, WORKER_EXIT_OK, WORKER_EXIT_PANICKED,
};
use crate::core::types::{Cell, Element, RegionName};
use crate::shm::{SharedRegion, ShmResult};
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Computes `C[row][col] = sum_k B[row][k] * A[k][col]` for its one cell
pub struct CellWorker<'r, const N: usize> {
    region: &'r SharedRegion<N>,
    cell: Cell,
}

impl<'r, const N: usize> CellWorker<'r, N> {
    pub fn new(region: &'r SharedRegion<N>, cell: Cell) -> Self {
        Self { region, cell }
    }

    pub fn cell(&self) -> Cell {
        self.cell
    }

    /// Compute and publish the cell; touches no other output cell
    pub fn run(&self) -> ShmResult<Element> {
        let value = self.region.compute_cell(self.cell)?;
        self.region.store_cell(self.cell, value)?;
        Ok(value)
    }

    /// Process entry point: attach by name, run, report an exit code
    ///
    /// Never unwinds; a panic is turned into `WORKER_EXIT_PANICKED`.
    pub fn attach_and_run(name: &RegionName, cell: Cell) -> i32 {
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let region = match SharedRegion::<N>::attach(name) {
                Ok(region) => region,
                Err(_) => return WORKER_EXIT_ATTACH_FAILED,
            };

            match CellWorker::new(&region, cell).run() {
                Ok(_) => WORKER_EXIT_OK,
                Err(_) => WORKER_EXIT_COMPUTE_FAILED,
            }
        }));

        outcome.unwrap_or(WORKER_EXIT_PANICKED)
    }
}
