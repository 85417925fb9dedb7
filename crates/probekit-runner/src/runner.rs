//! Background task runner.
//!
//! The [`Runner`] owns at most one worker thread at a time. The thread is
//! started lazily by the first submission, hosts a [`Reactor`] loop, and
//! stops itself once the last in-flight task completes. The next
//! submission joins the exited thread and starts a fresh one, so busy
//! periods are repeatable for the lifetime of the runner.
//!
//! # Design
//!
//! - All bookkeeping (`active` count, `running` flag, worker handle) sits
//!   behind one mutex; `submit` may be called concurrently from any number
//!   of threads and only its prologue is serialized.
//! - Starting the worker blocks on a one-shot handshake fired from the
//!   loop's startup callback, so by the time `submit` schedules the
//!   kickoff the loop is guaranteed to be live.
//! - A task signals completion through [`Completion::finish`], which hops
//!   through the loop's immediate queue once more before decrementing the
//!   count and invoking the caller's callback. The callback therefore
//!   never runs on the stack that triggered completion.
//!
//! The runner has no error channel for the tasks themselves: whatever a
//! task's own work produces travels through the task's callback, not
//! through the runner.
//!
//! # Example
//!
//! ```rust
//! use probekit_runner::Runner;
//!
//! let runner = Runner::new();
//! runner
//!     .submit(|completion| completion.finish(|| println!("measurement done")))
//!     .unwrap();
//! while !runner.is_idle() {
//!     std::thread::yield_now();
//! }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle};

use crossbeam_channel::bounded;
use parking_lot::Mutex;
use tracing::{debug, warn};

use probekit_reactor::{EventLoop, Reactor};

use crate::error::RunnerError;
use crate::RunnerConfig;

/// Bookkeeping guarded by the runner's lock.
struct RunnerState {
    /// Tasks submitted but not yet completed.
    active: u64,
    /// True iff a worker thread currently owns a live loop. The thread may
    /// already have exited and simply not be joined yet.
    running: bool,
    /// Present iff a worker thread was spawned and not yet joined.
    worker: Option<JoinHandle<()>>,
}

/// State shared between the runner and its in-flight completions.
struct Shared {
    state: Mutex<RunnerState>,
    reactor: Arc<dyn Reactor>,
    /// Monotonic id handed to each submission, for log output only.
    next_task: AtomicU64,
}

/// Multiplexes asynchronous tasks onto a lazily-started worker thread.
///
/// Cheap to share behind an `Arc`; independent instances each own their
/// worker thread and reactor. Dropping the runner forces the loop to stop
/// and joins the worker even if tasks are still outstanding; their
/// completion callbacks are then never invoked.
pub struct Runner {
    shared: Arc<Shared>,
    config: RunnerConfig,
}

impl Runner {
    /// Create a runner with default configuration and its own [`EventLoop`].
    pub fn new() -> Self {
        Self::with_config(RunnerConfig::default())
    }

    /// Create a runner with a specific configuration.
    pub fn with_config(config: RunnerConfig) -> Self {
        Self::with_reactor(Arc::new(EventLoop::new()), config)
    }

    /// Create a runner driving the given reactor.
    ///
    /// The reactor must not be driven by anyone else: the runner assumes
    /// it owns `run_until_stopped` for the instance.
    pub fn with_reactor(reactor: Arc<dyn Reactor>, config: RunnerConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(RunnerState {
                    active: 0,
                    running: false,
                    worker: None,
                }),
                reactor,
                next_task: AtomicU64::new(1),
            }),
            config,
        }
    }

    /// The reactor tasks should schedule their asynchronous work on.
    pub fn reactor(&self) -> Arc<dyn Reactor> {
        Arc::clone(&self.shared.reactor)
    }

    /// Submit a unit of work.
    ///
    /// `kickoff` runs later, on the worker thread, and receives a
    /// [`Completion`] it must eventually [`finish`](Completion::finish)
    /// from wherever its asynchronous work ends. A kickoff that never
    /// finishes leaves the runner busy and its loop running forever; the
    /// runner cannot detect this.
    ///
    /// Starts the worker thread on demand. Fails only if the thread could
    /// not be spawned or its loop never confirmed startup; the submission
    /// is not counted in either case.
    pub fn submit<K>(&self, kickoff: K) -> Result<(), RunnerError>
    where
        K: FnOnce(Completion) + Send + 'static,
    {
        let mut state = self.shared.state.lock();

        if state.active == 0 && state.running {
            // The previous busy period drained and the loop stopped itself;
            // the thread was never joined. Reap it before starting over.
            self.shared.reactor.request_stop();
            if let Some(worker) = state.worker.take() {
                if worker.join().is_err() {
                    warn!("previous worker thread panicked");
                }
            }
            state.running = false;
        }

        if !state.running {
            state.worker = Some(self.start_worker()?);
            state.running = true;
        }

        state.active += 1;
        drop(state);

        let task = self.shared.next_task.fetch_add(1, Ordering::Relaxed);
        let completion = Completion {
            shared: Arc::clone(&self.shared),
            task,
        };
        self.shared.reactor.schedule_now(Box::new(move || {
            debug!(task, "task starting");
            kickoff(completion);
        }));
        Ok(())
    }

    /// Whether no submitted task is currently outstanding.
    ///
    /// Advisory only: another thread may submit immediately after this
    /// returns true.
    pub fn is_idle(&self) -> bool {
        self.shared.state.lock().active == 0
    }

    /// Spawn the worker thread and wait for its loop to come up.
    fn start_worker(&self) -> Result<JoinHandle<()>, RunnerError> {
        let (started_tx, started_rx) = bounded::<()>(1);
        let reactor = Arc::clone(&self.shared.reactor);

        let mut builder = thread::Builder::new().name(self.config.thread_name.clone());
        if let Some(stack_size) = self.config.stack_size {
            builder = builder.stack_size(stack_size);
        }
        let worker = builder.spawn(move || {
            debug!("worker thread started");
            reactor.run_until_stopped(Box::new(move || {
                let _ = started_tx.send(());
            }));
            debug!("worker thread exiting");
        })?;

        // Block until the loop confirms it is live. From here on, work
        // scheduled on the reactor is observed by a running loop.
        if started_rx.recv().is_err() {
            let _ = worker.join();
            return Err(RunnerError::LoopStart);
        }
        Ok(worker)
    }
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Runner {
    fn drop(&mut self) {
        let worker = {
            let mut state = self.shared.state.lock();
            if state.active > 0 {
                warn!(
                    active = state.active,
                    "runner dropped with tasks in flight; their callbacks will not run"
                );
            }
            state.running = false;
            state.worker.take()
        };
        if let Some(worker) = worker {
            // Join outside the lock: a completion callback on the loop may
            // be contending for it right now.
            self.shared.reactor.request_stop();
            let _ = worker.join();
        }
    }
}

/// The completion continuation handed to each kickoff.
///
/// Consumed by [`finish`](Completion::finish), so a task cannot complete
/// twice. Dropping it without finishing leaves the runner busy forever.
pub struct Completion {
    shared: Arc<Shared>,
    task: u64,
}

impl Completion {
    /// Signal that the task's work is done.
    ///
    /// Safe to call from any thread. The bookkeeping and `end` both run on
    /// a later turn of the loop, never on the caller's stack: the stack
    /// that observed completion has fully unwound by the time `end` runs.
    pub fn finish<F>(self, end: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let Completion { shared, task } = self;
        let reactor = Arc::clone(&shared.reactor);
        reactor.schedule_now(Box::new(move || {
            let remaining = {
                let mut state = shared.state.lock();
                assert!(
                    state.active > 0,
                    "task completed with no submission outstanding"
                );
                state.active -= 1;
                state.active
            };
            debug!(task, remaining, "task finished");
            if remaining == 0 {
                shared.reactor.request_stop();
            }
            end();
        }));
    }
}

/// Process-wide shared runner.
static GLOBAL_RUNNER: OnceLock<Runner> = OnceLock::new();

/// Get the process-wide runner, creating it on first access.
///
/// A convenience for composition points that want one shared worker;
/// nothing in this crate requires it. Every API takes an explicit
/// [`Runner`], and independent instances are fully supported.
pub fn global_runner() -> &'static Runner {
    GLOBAL_RUNNER.get_or_init(Runner::new)
}
