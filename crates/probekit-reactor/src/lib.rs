//! # Probekit Reactor
//!
//! The scheduling contract consumed by the probekit runner, plus a default
//! implementation.
//!
//! A [`Reactor`] is a long-lived event loop with a single-threaded execution
//! model: everything scheduled on an instance runs on whichever thread is
//! currently driving its loop. The contract is deliberately narrow; four
//! operations are all the runner ever needs:
//!
//! - [`Reactor::run_until_stopped`] - drive the loop on the calling thread
//! - [`Reactor::schedule_now`] - enqueue work for the next loop turn
//! - [`Reactor::schedule_after`] - enqueue work after a minimum delay
//! - [`Reactor::request_stop`] - make the current run return
//!
//! [`EventLoop`] is the implementation used when no custom reactor is
//! injected. It does no I/O polling; it is a callback queue with timers.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use probekit_reactor::{EventLoop, Reactor};
//!
//! let reactor = Arc::new(EventLoop::new());
//!
//! let driver = {
//!     let reactor = Arc::clone(&reactor);
//!     std::thread::spawn(move || {
//!         reactor.run_until_stopped(Box::new(|| println!("loop is live")));
//!     })
//! };
//!
//! let stopper = Arc::clone(&reactor);
//! reactor.schedule_now(Box::new(move || stopper.request_stop()));
//! driver.join().unwrap();
//! ```

pub mod event_loop;

pub use event_loop::EventLoop;

use std::time::Duration;

/// A unit of work scheduled onto a reactor's loop thread.
pub type Callback = Box<dyn FnOnce() + Send + 'static>;

/// A long-lived event loop driven by exactly one thread at a time.
///
/// The scheduling operations are safe to call from any thread; the loop
/// state itself is owned exclusively by whichever thread is currently
/// inside [`run_until_stopped`](Reactor::run_until_stopped).
pub trait Reactor: Send + Sync {
    /// Drive the loop on the calling thread until a stop request arrives.
    ///
    /// `on_started` is invoked exactly once, after the loop has begun
    /// accepting scheduled work. Anything scheduled once `on_started` has
    /// run is guaranteed to be observed by the running loop.
    fn run_until_stopped(&self, on_started: Callback);

    /// Enqueue `f` to run on the loop thread at the next opportunity.
    ///
    /// Dispatch is FIFO with respect to other `schedule_now` calls.
    fn schedule_now(&self, f: Callback);

    /// Enqueue `f` to run on the loop thread after at least `delay`.
    fn schedule_after(&self, delay: Duration, f: Callback);

    /// Make the current [`run_until_stopped`](Reactor::run_until_stopped)
    /// call return at its next opportunity.
    ///
    /// Idempotent. When no loop is running, the request is recorded and
    /// then discarded by the next run.
    fn request_stop(&self);
}
