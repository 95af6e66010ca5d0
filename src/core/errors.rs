/*!
 * Error Types
 * Centralized error handling with thiserror and miette
 */

use crate::core::types::Cell;
use miette::Diagnostic;
use thiserror::Error;

pub use crate::process::ProcessError;
pub use crate::shm::ShmError;

/// Common result type for engine operations
pub type MatmulResult<T> = Result<T, MatmulError>;

/// User-supplied configuration outside accepted bounds
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum ValidationError {
    #[error("Row count {value} outside [1, {max}]")]
    #[diagnostic(
        code(validation::rows),
        help("The output is rows x rows; pick a row count no larger than the region capacity.")
    )]
    RowsOutOfRange { value: usize, max: usize },

    #[error("Inner dimension {value} outside [1, {max}]")]
    #[diagnostic(
        code(validation::inner),
        help("The inner dimension is the shared side of B and A, bounded by capacity.")
    )]
    InnerOutOfRange { value: usize, max: usize },

    #[error("Cycle count must be positive")]
    #[diagnostic(code(validation::cycles))]
    ZeroCycles,

    #[error("Maximum concurrent workers must be positive")]
    #[diagnostic(code(validation::max_concurrent))]
    ZeroConcurrency,

    #[error("Thread count must be positive")]
    #[diagnostic(code(validation::threads))]
    ZeroThreads,

    #[error("Progress interval must be positive")]
    #[diagnostic(code(validation::progress_interval))]
    ZeroProgressInterval,

    #[error("Invalid shared memory name: {0:?}")]
    #[diagnostic(
        code(validation::region_name),
        help("Use a single path component such as /matrix_multiplication.")
    )]
    InvalidRegionName(String),

    #[error("Not a positive integer: {0:?}")]
    #[diagnostic(code(validation::number))]
    NotANumber(String),

    #[error("Exec-based workers require the standard capacity {expected}, region uses {actual}")]
    #[diagnostic(
        code(validation::exec_capacity),
        help("Use fork-based workers for non-standard region capacities.")
    )]
    ExecCapacity { expected: usize, actual: usize },
}

/// Top-level engine error
#[derive(Error, Debug, Diagnostic)]
pub enum MatmulError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Shm(#[from] ShmError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Validation(#[from] ValidationError),

    #[error("Result mismatch at cell {cell}: expected {expected}, found {actual}")]
    #[diagnostic(
        code(matmul::verification_failed),
        help("A worker wrote a wrong value or a stale value survived from an earlier cycle.")
    )]
    VerificationFailed {
        cell: Cell,
        expected: i64,
        actual: i64,
    },

    #[error("Run cancelled")]
    #[diagnostic(code(matmul::cancelled))]
    Cancelled,

    #[error("I/O error: {0}")]
    #[diagnostic(code(matmul::io))]
    Io(#[from] std::io::Error),
}

impl MatmulError {
    /// Whether the error came from an external cancellation request
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            MatmulError::Cancelled | MatmulError::Process(ProcessError::Cancelled)
        )
    }
}
