/*!
 * Shared Memory Module
 * Named region shared by the launcher and every worker process
 */

pub mod layout;
pub mod region;
pub mod types;

// Re-export public API
pub use layout::{RegionHeader, RegionLayout};
pub use region::{RegionRole, SharedRegion};
pub use types::{ShmError, ShmResult};

/// Region at the compile-time maximum capacity, as used by the binary
pub type StandardRegion = SharedRegion<{ crate::core::limits::CAPACITY }>;
