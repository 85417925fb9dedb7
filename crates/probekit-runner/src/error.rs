//! Error types for the probekit runner.

use thiserror::Error;

/// Errors surfaced by runner operations.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The worker thread could not be spawned.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    /// The event loop exited before confirming startup.
    #[error("event loop exited before confirming startup")]
    LoopStart,

    /// The runner went away before a task delivered its completion.
    #[error("runner shut down before the task completed")]
    Shutdown,
}
