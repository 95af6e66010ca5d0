/*!
 * Thread Pool Module
 * In-process alternative to one-process-per-cell dispatch
 */

pub mod executor;
pub mod queue;

pub use executor::{PoolReport, ThreadPoolExecutor};
pub use queue::WorkQueue;
