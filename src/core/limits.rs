/*!
 * System Limits and Constants
 *
 * Centralized location for capacities, defaults and exit codes.
 * Organized by domain for maintainability and discoverability.
 */

// =============================================================================
// MATRIX LIMITS
// =============================================================================

/// Compile-time maximum side of every matrix held in the shared region
/// Each of A, B and C is stored as a `CAPACITY x CAPACITY` grid
pub const CAPACITY: usize = 1000;

/// Random input range (inclusive)
pub const INPUT_MIN: i64 = 1;
pub const INPUT_MAX: i64 = 5;

// =============================================================================
// SHARED MEMORY
// =============================================================================

/// Name of the shared memory object used by the binary
pub const DEFAULT_REGION_NAME: &str = "/matrix_multiplication";

/// Header magic ("SHMATMUL")
pub const REGION_MAGIC: u64 = 0x5348_4D41_544D_554C;

/// Permission bits for the shared memory object (rw for everyone, as 0666)
pub const REGION_MODE: u32 = 0o666;

// =============================================================================
// PROCESS SCHEDULING
// =============================================================================

/// Maximum simultaneously outstanding worker processes
pub const DEFAULT_MAX_CONCURRENT: usize = 100;

/// Emit a progress line every this many reaped workers
pub const DEFAULT_PROGRESS_INTERVAL: usize = 100_000;

/// Log cycle start every this many cycles
pub const CYCLE_LOG_INTERVAL: usize = 10;

// =============================================================================
// THREAD POOL
// =============================================================================

/// Upper bound on pool threads regardless of CPU count
pub const MAX_POOL_THREADS: usize = 16;

/// Queued cells per pool thread before the producer blocks
pub const POOL_QUEUE_DEPTH_PER_THREAD: usize = 64;

// =============================================================================
// WORKER EXIT CODES
// =============================================================================

pub const WORKER_EXIT_OK: i32 = 0;
pub const WORKER_EXIT_ATTACH_FAILED: i32 = 2;
pub const WORKER_EXIT_COMPUTE_FAILED: i32 = 3;
pub const WORKER_EXIT_PANICKED: i32 = 4;
