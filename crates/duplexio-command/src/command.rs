use std::fmt;

use duplexio_engine::IoEngine;

use crate::error::CommandFailure;

/// A unit of work executed once by the command worker.
///
/// The engine is bound at execution time. Errors and panics are logged by the
/// worker and otherwise ignored; report results through channels or callbacks
/// captured by the command.
pub trait Command: Send {
    fn execute(self: Box<Self>, engine: &dyn IoEngine) -> Result<(), CommandFailure>;

    /// Name used in worker diagnostics.
    fn name(&self) -> &str {
        "anonymous"
    }
}

impl<F> Command for F
where
    F: FnOnce(&dyn IoEngine) -> Result<(), CommandFailure> + Send,
{
    fn execute(self: Box<Self>, engine: &dyn IoEngine) -> Result<(), CommandFailure> {
        (*self)(engine)
    }
}

/// A closure with a diagnostic name attached.
pub struct NamedCommand<F> {
    name: String,
    run: F,
}

impl<F> NamedCommand<F>
where
    F: FnOnce(&dyn IoEngine) -> Result<(), CommandFailure> + Send,
{
    pub fn new(name: impl Into<String>, run: F) -> Self {
        Self {
            name: name.into(),
            run,
        }
    }
}

impl<F> fmt::Debug for NamedCommand<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedCommand")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<F> Command for NamedCommand<F>
where
    F: FnOnce(&dyn IoEngine) -> Result<(), CommandFailure> + Send,
{
    fn execute(self: Box<Self>, engine: &dyn IoEngine) -> Result<(), CommandFailure> {
        (self.run)(engine)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
