/*!
 * Shared Memory Types
 * Errors for the named shared region
 */

use crate::core::types::{Cell, Dims};
use miette::Diagnostic;
use nix::errno::Errno;
use thiserror::Error;

/// Shared memory operation result
pub type ShmResult<T> = Result<T, ShmError>;

/// Shared memory error types
#[derive(Debug, Error, Diagnostic)]
pub enum ShmError {
    /// shm_open with O_CREAT failed
    #[error("Failed to create shared memory object {name}: {source}")]
    #[diagnostic(
        code(shm::create_failed),
        help("Check /dev/shm permissions and that the name is not held by another user.")
    )]
    Create {
        name: String,
        #[source]
        source: Errno,
    },

    /// ftruncate failed; the object has already been unlinked
    #[error("Failed to size shared memory object {name} to {size} bytes: {source}")]
    #[diagnostic(
        code(shm::size_failed),
        help("The shared memory filesystem may be too small for the region.")
    )]
    Size {
        name: String,
        size: usize,
        #[source]
        source: Errno,
    },

    /// mmap failed; a created object has already been unlinked
    #[error("Failed to map shared memory object {name}: {source}")]
    #[diagnostic(code(shm::map_failed))]
    Map {
        name: String,
        #[source]
        source: Errno,
    },

    /// shm_open without O_CREAT failed for a reason other than absence
    #[error("Failed to open shared memory object {name}: {source}")]
    #[diagnostic(code(shm::open_failed))]
    Open {
        name: String,
        #[source]
        source: Errno,
    },

    #[error("Shared memory object {0} does not exist")]
    #[diagnostic(
        code(shm::not_found),
        help("The region must be created by the launching process before workers attach.")
    )]
    NotFound(String),

    #[error("Failed to inspect shared memory object {name}: {source}")]
    #[diagnostic(code(shm::inspect_failed))]
    Inspect {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// Object exists but was created with another layout
    #[error("Shared memory object {name} has an incompatible layout: {reason}")]
    #[diagnostic(
        code(shm::layout_mismatch),
        help("Launcher and workers must be built with the same capacity.")
    )]
    LayoutMismatch { name: String, reason: String },

    #[error("Failed to unmap shared memory object {name}: {source}")]
    #[diagnostic(code(shm::unmap_failed))]
    Unmap {
        name: String,
        #[source]
        source: Errno,
    },

    #[error("Failed to unlink shared memory object {name}: {source}")]
    #[diagnostic(code(shm::unlink_failed))]
    Unlink {
        name: String,
        #[source]
        source: Errno,
    },

    #[error("Shared memory object {0} is no longer mapped")]
    #[diagnostic(code(shm::detached))]
    Detached(String),

    #[error("Dimensions {dims} exceed region capacity {capacity}")]
    #[diagnostic(code(shm::capacity_exceeded))]
    DimensionsExceedCapacity { dims: Dims, capacity: usize },

    #[error("Cell {cell} outside the active {rows}x{rows} output")]
    #[diagnostic(code(shm::cell_out_of_range))]
    CellOutOfRange { cell: Cell, rows: usize },
}
