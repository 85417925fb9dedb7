//! Probekit Runner - background execution for network measurements
//!
//! This crate provides the core machinery for running asynchronous
//! measurement tasks off the caller's thread:
//!
//! - [`Runner`] - lazily starts one worker thread hosting an event loop
//!   and multiplexes any number of concurrent submissions onto it
//! - [`Completion`] - the continuation a task invokes exactly once when
//!   its asynchronous work is done
//! - [`NetTest`] - the seam between concrete measurements and the runner,
//!   with [`run_async`] and [`run_blocking`] entry points
//! - [`global_runner`] - a process-wide convenience instance
//!
//! The event loop itself lives in `probekit-reactor`; the runner consumes
//! it only through the four-operation [`Reactor`](probekit_reactor::Reactor)
//! contract, so a custom loop can be injected via
//! [`Runner::with_reactor`].
//!
//! # Threading model
//!
//! At most one worker thread per runner. Task bodies and completion
//! bookkeeping execute on that thread regardless of who called
//! [`Runner::submit`]; submitting never blocks on task execution, only on
//! worker startup or reaping. Callers that need a callback to run in a
//! particular context must arrange for that themselves: the runner makes
//! no guarantee about which thread invokes a task's callback beyond "not
//! the stack that triggered completion".

pub mod error;
pub mod nettest;
pub mod runner;

pub use error::RunnerError;
pub use nettest::{run_async, run_blocking, NetTest};
pub use runner::{global_runner, Completion, Runner};

/// Configuration for a runner's worker thread.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Name given to the worker thread.
    pub thread_name: String,
    /// Stack size for the worker thread (bytes).
    pub stack_size: Option<usize>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            thread_name: "probekit-worker".to_string(),
            stack_size: None,
        }
    }
}

impl RunnerConfig {
    /// Create a new configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the worker thread name.
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Set the stack size for the worker thread.
    pub fn with_stack_size(mut self, size: usize) -> Self {
        self.stack_size = Some(size);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_runner_config_default() {
        let config = RunnerConfig::default();
        assert_eq!(config.thread_name, "probekit-worker");
        assert!(config.stack_size.is_none());
    }

    #[test]
    fn test_runner_config_builder() {
        let config = RunnerConfig::new()
            .with_thread_name("custom")
            .with_stack_size(1024 * 1024);

        assert_eq!(config.thread_name, "custom");
        assert_eq!(config.stack_size, Some(1024 * 1024));
    }
}
