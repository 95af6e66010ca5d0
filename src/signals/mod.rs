/*!
 * Signals Module
 * Termination signal handling and cooperative cancellation
 */

pub mod cancel;

// Re-export public API
pub use cancel::{
    install_termination_handlers, termination_requested, termination_signal, CancellationToken,
};
