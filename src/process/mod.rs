/*!
 * Process Module
 * Worker processes: spawning, admission control and reaping
 */

pub mod handle;
pub mod reaper;
pub mod scheduler;
pub mod spawn;
pub mod types;
pub mod worker;

// Re-export public API
pub use handle::{WorkerExit, WorkerHandle};
pub use reaper::Reaper;
pub use scheduler::ProcessScheduler;
pub use spawn::{ExecSpawner, ForkSpawner, Spawner};
pub use types::{DispatchReport, ProcessError, ProcessResult, SchedulerConfig, WorkerFailure};
pub use worker::CellWorker;
