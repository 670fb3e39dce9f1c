use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use flume::RecvTimeoutError;
use tracing::{debug, error, warn};

use crate::token::CancellationToken;

/// Time limits for [`ShutdownThread::shutdown`].
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Total time to wait for a cooperative exit after cancelling.
    pub budget: Duration,
    /// Wait granularity, and the extra wait granted after forcing.
    pub increment: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            budget: Duration::from_millis(5000),
            increment: Duration::from_millis(1000),
        }
    }
}

/// A named worker thread that can be stopped within a bounded time.
///
/// The worker receives a [`CancellationToken`] and is expected to return soon
/// after it is cancelled. [`shutdown`](Self::shutdown) never blocks longer than
/// `budget + increment`; a worker that outlives that is detached.
pub struct ShutdownThread {
    name: String,
    config: ShutdownConfig,
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
    abandoned: Option<JoinHandle<()>>,
    done: flume::Receiver<()>,
}

impl ShutdownThread {
    /// Spawn `worker` on a new thread called `name`.
    pub fn spawn<F>(
        name: impl Into<String>,
        config: ShutdownConfig,
        worker: F,
    ) -> std::io::Result<Self>
    where
        F: FnOnce(CancellationToken) + Send + 'static,
    {
        let name = name.into();
        let token = CancellationToken::new();
        // The sender is dropped when the worker returns or unwinds.
        let (done_tx, done) = flume::bounded::<()>(1);

        let worker_token = token.clone();
        let handle = thread::Builder::new().name(name.clone()).spawn(move || {
            let _done = done_tx;
            worker(worker_token);
        })?;

        debug!(thread = %name, "spawned worker thread");
        Ok(Self {
            name,
            config,
            token,
            handle: Some(handle),
            abandoned: None,
            done,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// A clone of the worker's token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Whether the worker has returned.
    pub fn is_finished(&self) -> bool {
        self.handle
            .as_ref()
            .or(self.abandoned.as_ref())
            .is_none_or(JoinHandle::is_finished)
    }

    /// Stop the worker. Returns true iff it terminated.
    ///
    /// Cancels the token and waits up to `budget` in `increment` steps. If the
    /// worker is still alive, forces the token, unparks the thread and waits
    /// one more `increment` before giving up on it.
    pub fn shutdown(&mut self) -> bool {
        let Some(handle) = self.handle.take() else {
            return self.is_finished();
        };

        if !self.wait_exit(Duration::ZERO) {
            debug!(thread = %self.name, "attempting graceful shutdown");
            self.token.cancel();

            if !self.wait_graceful() {
                warn!(
                    thread = %self.name,
                    budget = ?self.config.budget,
                    "graceful shutdown failed, forcing"
                );
                self.token.force();
                handle.thread().unpark();

                if !self.wait_exit(self.config.increment) {
                    error!(
                        thread = %self.name,
                        "forced shutdown failed, abandoning thread"
                    );
                    self.abandoned = Some(handle);
                    return false;
                }
                debug!(thread = %self.name, "forced shutdown succeeded");
            } else {
                debug!(thread = %self.name, "graceful shutdown succeeded");
            }
        }

        if handle.join().is_err() {
            warn!(thread = %self.name, "worker thread panicked");
        }
        true
    }

    fn wait_graceful(&self) -> bool {
        let deadline = Instant::now() + self.config.budget;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let step = self.config.increment.min(deadline - now);
            if self.wait_exit(step) {
                return true;
            }
        }
    }

    fn wait_exit(&self, timeout: Duration) -> bool {
        match self.done.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
            Err(RecvTimeoutError::Timeout) => false,
        }
    }
}

impl Drop for ShutdownThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}
