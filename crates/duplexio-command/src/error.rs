/// Errors returned by [`CommandManager`](crate::CommandManager) operations.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// The manager is stopped or stopping.
    #[error("command manager is not running")]
    NotRunning,

    /// The worker thread could not be spawned.
    #[error("failed to spawn command worker: {0}")]
    Spawn(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CommandError>;

/// Error a [`Command`](crate::Command) reports back to the worker.
pub type CommandFailure = Box<dyn std::error::Error + Send + Sync>;
