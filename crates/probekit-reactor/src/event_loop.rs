//! Default single-threaded event loop.
//!
//! The loop is a ready queue plus a deadline-ordered heap of delayed
//! callbacks, guarded by one mutex with a condvar for wakeups. Whoever
//! calls [`EventLoop::run_until_stopped`] becomes the loop thread; callers
//! on other threads only ever touch the queues.
//!
//! The loop is restartable: after a stop request makes a run return, a new
//! call to `run_until_stopped` starts a fresh cycle on the same instance.

use std::collections::{BinaryHeap, VecDeque};
use std::cmp::Ordering;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::{Callback, Reactor};

/// A callback waiting for its deadline.
struct Delayed {
    deadline: Instant,
    /// Insertion order, to break ties between equal deadlines.
    seq: u64,
    callback: Callback,
}

impl PartialEq for Delayed {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for Delayed {}

impl PartialOrd for Delayed {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Delayed {
    // Reversed so the max-heap yields the earliest deadline first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Queue state, guarded by the loop's mutex.
struct LoopState {
    ready: VecDeque<Callback>,
    delayed: BinaryHeap<Delayed>,
    next_seq: u64,
    /// A stop has been requested for the current run.
    stop: bool,
    /// A thread is currently inside `run_until_stopped`.
    live: bool,
}

/// The default [`Reactor`] implementation.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use probekit_reactor::{EventLoop, Reactor};
///
/// let reactor = Arc::new(EventLoop::new());
/// let stopper = Arc::clone(&reactor);
/// reactor.schedule_now(Box::new(move || stopper.request_stop()));
/// reactor.run_until_stopped(Box::new(|| {}));
/// ```
pub struct EventLoop {
    state: Mutex<LoopState>,
    wakeup: Condvar,
}

impl EventLoop {
    /// Create a new, idle event loop.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LoopState {
                ready: VecDeque::new(),
                delayed: BinaryHeap::new(),
                next_seq: 0,
                stop: false,
                live: false,
            }),
            wakeup: Condvar::new(),
        }
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl Reactor for EventLoop {
    fn run_until_stopped(&self, on_started: Callback) {
        {
            let mut state = self.state.lock();
            assert!(!state.live, "event loop is already being driven");
            state.live = true;
            // A stop requested while no run was active is void.
            state.stop = false;
        }
        debug!("event loop started");
        on_started();

        loop {
            let callback = {
                let mut state = self.state.lock();
                loop {
                    if state.stop {
                        state.live = false;
                        let dropped = state.ready.len() + state.delayed.len();
                        state.ready.clear();
                        state.delayed.clear();
                        if dropped > 0 {
                            debug!(dropped, "event loop stopped with work still queued");
                        } else {
                            debug!("event loop stopped");
                        }
                        return;
                    }

                    let now = Instant::now();
                    while state
                        .delayed
                        .peek()
                        .map_or(false, |entry| entry.deadline <= now)
                    {
                        if let Some(due) = state.delayed.pop() {
                            state.ready.push_back(due.callback);
                        }
                    }

                    if let Some(callback) = state.ready.pop_front() {
                        break callback;
                    }

                    // Nothing runnable: sleep until the next deadline or a
                    // wakeup from a scheduling call.
                    match state.delayed.peek().map(|entry| entry.deadline) {
                        Some(deadline) => {
                            let timeout = deadline.saturating_duration_since(Instant::now());
                            let _ = self.wakeup.wait_for(&mut state, timeout);
                        }
                        None => self.wakeup.wait(&mut state),
                    }
                }
            };
            // The lock is released here: callbacks may reschedule or stop
            // the loop re-entrantly.
            callback();
        }
    }

    fn schedule_now(&self, f: Callback) {
        self.state.lock().ready.push_back(f);
        self.wakeup.notify_one();
    }

    fn schedule_after(&self, delay: Duration, f: Callback) {
        {
            let mut state = self.state.lock();
            let seq = state.next_seq;
            state.next_seq += 1;
            state.delayed.push(Delayed {
                deadline: Instant::now() + delay,
                seq,
                callback: f,
            });
        }
        self.wakeup.notify_one();
    }

    fn request_stop(&self) {
        self.state.lock().stop = true;
        self.wakeup.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::sync::Arc;
    use std::thread;

    fn stop_soon(reactor: &Arc<EventLoop>) {
        let stopper = Arc::clone(reactor);
        reactor.schedule_now(Box::new(move || stopper.request_stop()));
    }

    #[test]
    fn test_schedule_now_runs_in_fifo_order() {
        let reactor = Arc::new(EventLoop::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let order = Arc::clone(&order);
            reactor.schedule_now(Box::new(move || order.lock().push(i)));
        }
        stop_soon(&reactor);

        reactor.run_until_stopped(Box::new(|| {}));
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn test_on_started_runs_before_queued_work() {
        let reactor = Arc::new(EventLoop::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        let in_queue = Arc::clone(&order);
        reactor.schedule_now(Box::new(move || in_queue.lock().push("task")));
        stop_soon(&reactor);

        let in_started = Arc::clone(&order);
        reactor.run_until_stopped(Box::new(move || in_started.lock().push("started")));
        assert_eq!(*order.lock(), vec!["started", "task"]);
    }

    #[test]
    fn test_schedule_after_waits_for_delay() {
        let reactor = Arc::new(EventLoop::new());
        let scheduled_at = Instant::now();
        let elapsed = Arc::new(Mutex::new(None));

        let record = Arc::clone(&elapsed);
        let stopper = Arc::clone(&reactor);
        reactor.schedule_after(
            Duration::from_millis(20),
            Box::new(move || {
                *record.lock() = Some(scheduled_at.elapsed());
                stopper.request_stop();
            }),
        );

        reactor.run_until_stopped(Box::new(|| {}));
        let elapsed = (*elapsed.lock()).unwrap();
        assert!(elapsed >= Duration::from_millis(20), "fired after {:?}", elapsed);
    }

    #[test]
    fn test_immediate_work_runs_before_delayed_work() {
        let reactor = Arc::new(EventLoop::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        let later = Arc::clone(&order);
        let stopper = Arc::clone(&reactor);
        reactor.schedule_after(
            Duration::from_millis(5),
            Box::new(move || {
                later.lock().push("delayed");
                stopper.request_stop();
            }),
        );
        let soon = Arc::clone(&order);
        reactor.schedule_now(Box::new(move || soon.lock().push("now")));

        reactor.run_until_stopped(Box::new(|| {}));
        assert_eq!(*order.lock(), vec!["now", "delayed"]);
    }

    #[test]
    fn test_delayed_entries_fire_in_deadline_order() {
        let reactor = Arc::new(EventLoop::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        let second = Arc::clone(&order);
        reactor.schedule_after(
            Duration::from_millis(30),
            Box::new(move || second.lock().push("slow")),
        );
        let first = Arc::clone(&order);
        reactor.schedule_after(
            Duration::from_millis(10),
            Box::new(move || first.lock().push("fast")),
        );
        let stopper = Arc::clone(&reactor);
        reactor.schedule_after(
            Duration::from_millis(50),
            Box::new(move || stopper.request_stop()),
        );

        reactor.run_until_stopped(Box::new(|| {}));
        assert_eq!(*order.lock(), vec!["fast", "slow"]);
    }

    #[test]
    fn test_stale_stop_request_is_cleared_at_start() {
        let reactor = Arc::new(EventLoop::new());
        reactor.request_stop();

        let ran = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ran);
        let stopper = Arc::clone(&reactor);
        reactor.schedule_now(Box::new(move || {
            counter.fetch_add(1, AtomicOrdering::SeqCst);
            stopper.request_stop();
        }));

        // The stale request must not make the run return before the
        // queued callback has had its turn.
        reactor.run_until_stopped(Box::new(|| {}));
        assert_eq!(ran.load(AtomicOrdering::SeqCst), 1);
    }

    #[test]
    fn test_loop_restarts_after_stop() {
        let reactor = Arc::new(EventLoop::new());
        let ran = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let counter = Arc::clone(&ran);
            let stopper = Arc::clone(&reactor);
            reactor.schedule_now(Box::new(move || {
                counter.fetch_add(1, AtomicOrdering::SeqCst);
                stopper.request_stop();
            }));
            reactor.run_until_stopped(Box::new(|| {}));
        }

        assert_eq!(ran.load(AtomicOrdering::SeqCst), 3);
    }

    #[test]
    fn test_scheduling_from_another_thread_wakes_the_loop() {
        let reactor = Arc::new(EventLoop::new());
        let (started_tx, started_rx) = crossbeam_channel::bounded::<()>(1);

        let driver = {
            let reactor = Arc::clone(&reactor);
            thread::spawn(move || {
                reactor.run_until_stopped(Box::new(move || {
                    let _ = started_tx.send(());
                }));
            })
        };
        started_rx.recv().unwrap();

        let ran = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ran);
        let stopper = Arc::clone(&reactor);
        reactor.schedule_now(Box::new(move || {
            counter.fetch_add(1, AtomicOrdering::SeqCst);
            stopper.request_stop();
        }));

        driver.join().unwrap();
        assert_eq!(ran.load(AtomicOrdering::SeqCst), 1);
    }

    #[test]
    fn test_on_started_fires_once_per_run() {
        let reactor = Arc::new(EventLoop::new());
        let started = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            stop_soon(&reactor);
            let counter = Arc::clone(&started);
            reactor.run_until_stopped(Box::new(move || {
                counter.fetch_add(1, AtomicOrdering::SeqCst);
            }));
        }

        assert_eq!(started.load(AtomicOrdering::SeqCst), 2);
    }

    #[test]
    fn test_stop_discards_queued_work() {
        let reactor = Arc::new(EventLoop::new());
        let ran = Arc::new(AtomicUsize::new(0));

        let stopper = Arc::clone(&reactor);
        reactor.schedule_now(Box::new(move || stopper.request_stop()));
        let counter = Arc::clone(&ran);
        reactor.schedule_after(
            Duration::from_millis(1),
            Box::new(move || {
                counter.fetch_add(1, AtomicOrdering::SeqCst);
            }),
        );

        reactor.run_until_stopped(Box::new(|| {}));

        // The delayed callback was dropped with the stopping run; a later
        // run must not resurrect it.
        stop_soon(&reactor);
        reactor.run_until_stopped(Box::new(|| {}));
        thread::sleep(Duration::from_millis(10));
        assert_eq!(ran.load(AtomicOrdering::SeqCst), 0);
    }
}
