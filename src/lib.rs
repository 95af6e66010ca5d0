/*!
 * Shared-Memory Matrix Multiplication
 *
 * Computes C = B x A by dispatching one worker process per output cell.
 * Inputs and outputs live in a named POSIX shared-memory region; the
 * launcher bounds how many workers are alive at once and reaps them.
 */

pub mod core;
pub mod monitoring;
pub mod pool;
pub mod process;
pub mod shm;
pub mod signals;
pub mod supervisor;

// Re-exports
pub use crate::core::limits::CAPACITY;
pub use crate::core::{
    Cell, Dims, Element, MatmulError, MatmulResult, Matrix, RegionName, ValidationError,
};
pub use monitoring::init_tracing;
pub use pool::ThreadPoolExecutor;
pub use process::{CellWorker, ExecSpawner, ForkSpawner, ProcessError, ProcessScheduler, Spawner};
pub use shm::{SharedRegion, ShmError, StandardRegion};
pub use signals::{install_termination_handlers, CancellationToken};
pub use supervisor::{RunConfig, RunSummary, SpawnMode, Strategy, Supervisor};
