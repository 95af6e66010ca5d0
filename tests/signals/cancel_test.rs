/*!
 * Cancellation Tests
 * SIGTERM delivery feeding the cancellation token
 */

use nix::sys::signal::{raise, Signal};
use serial_test::serial;
use shm_matmul::signals::{
    install_termination_handlers, termination_requested, termination_signal, CancellationToken,
};

#[test]
#[serial]
fn test_sigterm_cancels_watching_tokens() {
    let token = install_termination_handlers().unwrap();
    let detached = CancellationToken::new();
    assert!(!token.is_cancelled());

    raise(Signal::SIGTERM).unwrap();

    assert!(termination_requested());
    assert_eq!(termination_signal(), Some(libc::SIGTERM));
    assert!(token.is_cancelled());
    assert!(CancellationToken::watching_signals().is_cancelled());
    // Tokens not watching signals are unaffected
    assert!(!detached.is_cancelled());
}
