//! Adapter between network measurements and the background runner.
//!
//! The measurements themselves (DNS probes, connectivity tests, ...) are
//! external to this crate; [`NetTest`] is the seam they plug into. A test
//! runs as one opaque unit of work: the runner hands it the reactor for
//! scheduling and a `done` callback it must invoke exactly once.

use std::sync::Arc;

use crossbeam_channel::bounded;
use tracing::debug;

use probekit_reactor::{Callback, Reactor};

use crate::error::RunnerError;
use crate::runner::Runner;

/// A single network measurement.
///
/// `run` is invoked on the runner's worker thread and must not block it:
/// long-running work is scheduled through `reactor`, and `done` is invoked
/// from wherever the measurement finishes. A test that never calls `done`
/// keeps the runner busy forever.
pub trait NetTest: Send + 'static {
    /// Short name used in log output.
    fn name(&self) -> &str;

    /// Start the measurement.
    fn run(self: Box<Self>, reactor: Arc<dyn Reactor>, done: Callback);
}

/// Run a test on the runner, invoking `on_done` once it completes.
///
/// Returns as soon as the test is submitted. `on_done` runs on the
/// runner's worker thread, never on the calling one, and never on the
/// stack that completed the test.
pub fn run_async<T, F>(runner: &Runner, test: T, on_done: F) -> Result<(), RunnerError>
where
    T: NetTest,
    F: FnOnce() + Send + 'static,
{
    let reactor = runner.reactor();
    let test = Box::new(test);
    debug!(test = test.name(), "submitting test");
    runner.submit(move |completion| {
        test.run(reactor, Box::new(move || completion.finish(on_done)));
    })
}

/// Run a test and block the calling thread until it completes.
///
/// Returns [`RunnerError::Shutdown`] if the test is discarded before
/// completing, for instance when the runner is torn down with the test
/// still in flight.
pub fn run_blocking<T>(runner: &Runner, test: T) -> Result<(), RunnerError>
where
    T: NetTest,
{
    let (done_tx, done_rx) = bounded::<()>(1);
    run_async(runner, test, move || {
        let _ = done_tx.send(());
    })?;
    done_rx.recv().map_err(|_| RunnerError::Shutdown)
}
