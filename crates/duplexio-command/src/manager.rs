use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use duplexio_engine::IoEngine;
use flume::{Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::command::Command;
use crate::error::{CommandError, Result};
use crate::shutdown::{ShutdownConfig, ShutdownThread};
use crate::token::CancellationToken;

static WORKER_INSTANCE: AtomicUsize = AtomicUsize::new(0);

/// Settings for [`CommandManager`].
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum number of pending commands.
    pub capacity: usize,
    /// How long the worker waits for a command before re-checking its token.
    pub poll_interval: Duration,
    /// Limits applied when stopping the worker.
    pub shutdown: ShutdownConfig,
    /// Worker threads are named `<prefix>-<instance>`.
    pub thread_name_prefix: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            poll_interval: Duration::from_millis(1000),
            shutdown: ShutdownConfig::default(),
            thread_name_prefix: "duplexio-command".to_string(),
        }
    }
}

/// Lifecycle of a [`CommandManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Stopped,
    Running,
    Stopping,
}

impl fmt::Display for ManagerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ManagerState::Stopped => "stopped",
            ManagerState::Running => "running",
            ManagerState::Stopping => "stopping",
        })
    }
}

type Queued = Box<dyn Command>;

struct Inner {
    state: ManagerState,
    sender: Option<Sender<Queued>>,
    receiver: Option<Receiver<Queued>>,
    worker: Option<ShutdownThread>,
}

/// Runs queued commands one at a time on a dedicated worker thread.
///
/// Producers on any thread call [`enqueue`](Self::enqueue); a full queue
/// rejects instead of blocking. Commands run in insertion order against the
/// bound engine. A failing or panicking command is logged and dropped and the
/// worker moves on to the next one.
pub struct CommandManager {
    engine: Arc<dyn IoEngine>,
    config: QueueConfig,
    inner: Mutex<Inner>,
}

impl CommandManager {
    /// Create a stopped manager with default configuration.
    pub fn new(engine: Arc<dyn IoEngine>) -> Self {
        Self::with_config(engine, QueueConfig::default())
    }

    pub fn with_config(engine: Arc<dyn IoEngine>, config: QueueConfig) -> Self {
        Self {
            engine,
            config,
            inner: Mutex::new(Inner {
                state: ManagerState::Stopped,
                sender: None,
                receiver: None,
                worker: None,
            }),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<dyn IoEngine> {
        &self.engine
    }

    pub fn state(&self) -> ManagerState {
        self.inner.lock().state
    }

    /// Maximum number of pending commands.
    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Commands waiting to run (excludes the one executing).
    pub fn pending(&self) -> usize {
        self.inner.lock().sender.as_ref().map_or(0, Sender::len)
    }

    /// Spawn the worker. No-op when already running.
    pub fn start(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.state != ManagerState::Stopped {
            return Ok(());
        }

        let (sender, receiver) = flume::bounded::<Queued>(self.config.capacity);
        let name = format!(
            "{}-{}",
            self.config.thread_name_prefix,
            WORKER_INSTANCE.fetch_add(1, Ordering::Relaxed)
        );

        let engine = Arc::clone(&self.engine);
        let queue = receiver.clone();
        let poll_interval = self.config.poll_interval;
        let worker_name = name.clone();
        let worker = ShutdownThread::spawn(name, self.config.shutdown.clone(), move |token| {
            run_worker(&worker_name, engine.as_ref(), &queue, poll_interval, &token);
        })?;

        info!(
            worker = worker.name(),
            capacity = self.config.capacity,
            "command manager started"
        );
        inner.sender = Some(sender);
        inner.receiver = Some(receiver);
        inner.worker = Some(worker);
        inner.state = ManagerState::Running;
        Ok(())
    }

    /// Drop pending commands and stop the worker.
    ///
    /// Returns true when the worker terminated (or the manager was not
    /// running), false when it had to be abandoned.
    pub fn stop(&self) -> bool {
        let (sender, receiver, worker) = {
            let mut inner = self.inner.lock();
            if inner.state != ManagerState::Running {
                return true;
            }
            inner.state = ManagerState::Stopping;
            (
                inner.sender.take(),
                inner.receiver.take(),
                inner.worker.take(),
            )
        };

        let dropped = receiver.as_ref().map_or(0, |queue| queue.drain().count());
        drop(sender);
        drop(receiver);

        let stopped = match worker {
            Some(mut worker) => {
                info!(worker = worker.name(), dropped, "stopping command manager");
                worker.shutdown()
            }
            None => true,
        };

        self.inner.lock().state = ManagerState::Stopped;
        info!(stopped, "command manager stopped");
        stopped
    }

    /// Queue `command` without blocking.
    ///
    /// Returns `Ok(false)` when the queue is full and
    /// [`CommandError::NotRunning`] unless the manager is running.
    pub fn enqueue<C: Command + 'static>(&self, command: C) -> Result<bool> {
        self.enqueue_boxed(Box::new(command))
    }

    /// [`enqueue`](Self::enqueue) for an already boxed command.
    pub fn enqueue_boxed(&self, command: Box<dyn Command>) -> Result<bool> {
        let inner = self.inner.lock();
        let sender = match (&inner.state, &inner.sender) {
            (ManagerState::Running, Some(sender)) => sender,
            _ => return Err(CommandError::NotRunning),
        };

        match sender.try_send(command) {
            Ok(()) => Ok(true),
            Err(TrySendError::Full(command)) => {
                debug!(command = command.name(), "command queue full, rejecting");
                Ok(false)
            }
            Err(TrySendError::Disconnected(_)) => Err(CommandError::NotRunning),
        }
    }
}

impl Drop for CommandManager {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_worker(
    name: &str,
    engine: &dyn IoEngine,
    queue: &Receiver<Queued>,
    poll_interval: Duration,
    token: &CancellationToken,
) {
    debug!(worker = name, "command worker running");
    while !token.is_cancelled() {
        match queue.recv_timeout(poll_interval) {
            Ok(command) => execute(name, engine, command),
            Err(RecvTimeoutError::Timeout) => {
                debug!(worker = name, "no command received, polling again");
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    debug!(worker = name, "command worker exiting");
}

fn execute(worker: &str, engine: &dyn IoEngine, command: Queued) {
    let command_name = command.name().to_string();
    debug!(worker, command = %command_name, "executing command");

    match panic::catch_unwind(AssertUnwindSafe(|| command.execute(engine))) {
        Ok(Ok(())) => debug!(worker, command = %command_name, "executed command"),
        Ok(Err(err)) => error!(
            worker,
            command = %command_name,
            error = %err,
            "command failed, dropping it and proceeding"
        ),
        Err(payload) => error!(
            worker,
            command = %command_name,
            panic = panic_message(payload.as_ref()),
            "command panicked, dropping it and proceeding"
        ),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "<non-string panic>"
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use duplexio_engine::ReplayEngine;

    use super::*;
    use crate::error::CommandFailure;

    fn idle_engine() -> Arc<dyn IoEngine> {
        Arc::new(ReplayEngine::new(Cursor::new(Vec::<u8>::new())))
    }

    #[test]
    fn defaults() {
        let config = QueueConfig::default();
        assert_eq!(config.capacity, 10);
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.thread_name_prefix, "duplexio-command");
    }

    #[test]
    fn enqueue_requires_running_manager() {
        let manager = CommandManager::new(idle_engine());
        assert_eq!(manager.state(), ManagerState::Stopped);

        let noop = |_: &dyn IoEngine| -> std::result::Result<(), CommandFailure> { Ok(()) };
        let err = manager.enqueue(noop).unwrap_err();
        assert!(matches!(err, CommandError::NotRunning));
        assert_eq!(manager.pending(), 0);
    }

    #[test]
    fn start_and_stop_are_idempotent() {
        let manager = CommandManager::new(idle_engine());
        manager.start().unwrap();
        manager.start().unwrap();
        assert_eq!(manager.state(), ManagerState::Running);

        assert!(manager.stop());
        assert!(manager.stop());
        assert_eq!(manager.state(), ManagerState::Stopped);
    }

    #[test]
    fn panic_message_extracts_strings() {
        let text: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(text.as_ref()), "static");
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(owned.as_ref()), "owned");
        let other: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(other.as_ref()), "<non-string panic>");
    }

    #[test]
    fn state_display() {
        assert_eq!(ManagerState::Stopping.to_string(), "stopping");
    }
}
