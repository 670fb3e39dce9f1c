//! Bounded command queue with a single worker thread.
//!
//! A [`CommandManager`] owns an engine handle, a bounded FIFO of
//! [`Command`]s and one worker thread that executes them in order. The worker
//! runs inside a [`ShutdownThread`], which can always be stopped within a
//! bounded time through its [`CancellationToken`].

pub mod command;
pub mod error;
pub mod manager;
pub mod shutdown;
pub mod token;

pub use command::{Command, NamedCommand};
pub use error::{CommandError, CommandFailure, Result};
pub use manager::{CommandManager, ManagerState, QueueConfig};
pub use shutdown::{ShutdownConfig, ShutdownThread};
pub use token::CancellationToken;
