/*!
 * Core Module
 * Fundamental types, limits and error handling
 */

pub mod errors;
pub mod limits;
pub mod matrix;
pub mod types;

// Re-export for convenience
pub use errors::*;
pub use matrix::Matrix;
pub use types::*;
