/*!
 * Supervisor Module
 * Multi-cycle orchestration, configuration and statistics
 */

pub mod config;
pub mod input;
pub mod stats;
#[allow(clippy::module_inception)]
pub mod supervisor;

pub use config::{parse_positive, RunConfig, SpawnMode, Strategy};
pub use input::{prompt_missing, PromptedDims};
pub use stats::{CycleClock, CycleTiming, RunSummary, TimingStats};
pub use supervisor::{verify_output, Supervisor};
