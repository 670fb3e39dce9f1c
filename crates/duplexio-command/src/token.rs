use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
struct Flags {
    cancelled: bool,
    forced: bool,
}

#[derive(Debug, Default)]
struct TokenState {
    flags: Mutex<Flags>,
    changed: Condvar,
}

/// Cooperative stop signal shared between a worker and its owner.
///
/// The owner first cancels (a polite request), then may force (the request
/// became urgent). Workers check the token at every poll boundary and may
/// sleep on it with [`wait_timeout`](Self::wait_timeout) so either signal
/// wakes them immediately. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    state: Arc<TokenState>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the worker to stop at its next poll boundary.
    pub fn cancel(&self) {
        self.state.flags.lock().cancelled = true;
        self.state.changed.notify_all();
    }

    /// Escalate: the owner has given up waiting. Implies [`cancel`](Self::cancel).
    pub fn force(&self) {
        {
            let mut flags = self.state.flags.lock();
            flags.cancelled = true;
            flags.forced = true;
        }
        self.state.changed.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.flags.lock().cancelled
    }

    pub fn is_forced(&self) -> bool {
        self.state.flags.lock().forced
    }

    /// Sleep up to `timeout`, waking early on cancellation.
    ///
    /// Returns whether the token is cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut flags = self.state.flags.lock();
        if !flags.cancelled {
            self.state
                .changed
                .wait_while_for(&mut flags, |flags| !flags.cancelled, timeout);
        }
        flags.cancelled
    }
}
