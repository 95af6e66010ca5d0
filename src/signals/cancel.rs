/*!
 * Cancellation
 *
 * Token observed by the dispatch loops, fed either programmatically or by
 * SIGINT/SIGTERM. The signal handler only stores to atomics; teardown of the
 * shared region happens on the normal unwind of the owning scope.
 */

use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use tracing::info;

static TERMINATION_REQUESTED: AtomicBool = AtomicBool::new(false);
static TERMINATION_SIGNAL: AtomicI32 = AtomicI32::new(0);

extern "C" fn on_termination(signal: libc::c_int) {
    TERMINATION_SIGNAL.store(signal, Ordering::SeqCst);
    TERMINATION_REQUESTED.store(true, Ordering::SeqCst);
}

/// Install SIGINT and SIGTERM handlers that request termination
///
/// Installed without `SA_RESTART`: a blocking wait returns `EINTR` and the
/// dispatch loop re-checks its token.
pub fn install_termination_handlers() -> nix::Result<CancellationToken> {
    let action = SigAction::new(
        SigHandler::Handler(on_termination),
        SaFlags::empty(),
        SigSet::empty(),
    );

    for signal in [Signal::SIGINT, Signal::SIGTERM] {
        // SAFETY: the handler only performs atomic stores.
        unsafe { sigaction(signal, &action) }?;
    }

    info!("Termination handlers installed for SIGINT and SIGTERM");
    Ok(CancellationToken::watching_signals())
}

/// Whether SIGINT/SIGTERM arrived since the handlers were installed
pub fn termination_requested() -> bool {
    TERMINATION_REQUESTED.load(Ordering::SeqCst)
}

/// Raw number of the last termination signal, if any
pub fn termination_signal() -> Option<i32> {
    match TERMINATION_SIGNAL.load(Ordering::SeqCst) {
        0 => None,
        signal => Some(signal),
    }
}

/// Shared cancellation flag
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    watch_signals: bool,
}

impl CancellationToken {
    /// Token cancelled only through `cancel`
    pub fn new() -> Self {
        Self::default()
    }

    /// Token that also reports cancelled once a termination signal arrived
    pub fn watching_signals() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            watch_signals: true,
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst) || (self.watch_signals && termination_requested())
    }
}
