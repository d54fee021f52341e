// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! A sliding-window limiter for the *rate* of task starts, independent of
//! the pool's concurrency bound.

use crate::util::Status;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A gate bounding the number of executions per time window.
///
/// The gate is composed *in front of* pool submission, not inside it: a
/// submitter first waits on [`acquire()`](Self::acquire), submits, then
/// counts the start with [`record()`](Self::record). A limit of zero
/// disables the gate entirely.
///
/// ```
/// use std::time::Duration;
/// use workpool::{Pool, RateGate};
///
/// let pool = Pool::new(4).unwrap();
/// // At most 100 task starts per second.
/// let gate = RateGate::new(Duration::from_secs(1), 100);
///
/// gate.acquire();
/// pool.submit(|| { /* ... */ }).unwrap();
/// gate.record();
/// # pool.release();
/// ```
pub struct RateGate {
    window: Arc<Window>,
    /// Dropping this sender disconnects the ticker thread's channel, ending
    /// it without waiting for the next tick.
    _ticker_stop: Sender<()>,
}

/// Execution counter for the current time window.
struct Window {
    limit: usize,
    executed: CachePadded<AtomicUsize>,
    /// Signals blocked submitters whenever the window resets.
    reset: Status<()>,
}

impl RateGate {
    /// Creates a gate allowing `limit` executions per `window_duration`.
    ///
    /// A `limit` of zero disables the gate: [`acquire()`](Self::acquire)
    /// never blocks and nothing is counted.
    pub fn new(window_duration: Duration, limit: usize) -> Self {
        let window = Arc::new(Window {
            limit,
            executed: CachePadded::new(AtomicUsize::new(0)),
            reset: Status::new(()),
        });
        let (ticker_stop, stop_receiver) = bounded(1);
        if limit > 0 {
            let window = window.clone();
            std::thread::Builder::new()
                .name("workpool-rate".to_owned())
                .spawn(move || tick_loop(&window, stop_receiver, window_duration))
                .expect("Spawning the rate-gate ticker thread failed");
        }
        Self {
            window,
            _ticker_stop: ticker_stop,
        }
    }

    /// Blocks until the current window has execution budget left.
    ///
    /// Returns immediately if the window's execution count is below the
    /// limit or the gate is disabled; otherwise waits for the ticker to
    /// reset the window.
    pub fn acquire(&self) {
        if self.window.limit == 0 {
            return;
        }
        let _guard = self
            .window
            .reset
            .wait_while(|_| self.window.executed.load(Ordering::Relaxed) >= self.window.limit);
    }

    /// Counts one execution against the current window. No-op when the gate
    /// is disabled.
    pub fn record(&self) {
        if self.window.limit != 0 {
            self.window.executed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Number of executions recorded in the current window.
    pub fn executed_in_window(&self) -> usize {
        self.window.executed.load(Ordering::Relaxed)
    }
}

/// Body of the ticker thread: resets the window counter at each boundary
/// and wakes every submitter blocked on the gate.
fn tick_loop(window: &Window, stop: Receiver<()>, window_duration: Duration) {
    loop {
        match stop.recv_timeout(window_duration) {
            Err(RecvTimeoutError::Timeout) => {
                window.executed.store(0, Ordering::Relaxed);
                window.reset.notify_all(());
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::time::Instant;

    fn wait_until(timeout: Duration, predicate: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if predicate() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        predicate()
    }

    #[test]
    fn test_disabled_gate_never_blocks() {
        let gate = RateGate::new(Duration::from_millis(10), 0);
        gate.acquire();
        gate.record();
        gate.acquire();
        assert_eq!(gate.executed_in_window(), 0);
    }

    #[test]
    fn test_acquire_under_limit_is_immediate() {
        let gate = RateGate::new(Duration::from_secs(60), 5);
        for _ in 0..4 {
            gate.record();
        }
        gate.acquire();
        assert_eq!(gate.executed_in_window(), 4);
    }

    #[test]
    fn test_window_reset_unblocks_acquire() {
        let gate = Arc::new(RateGate::new(Duration::from_millis(100), 2));
        gate.record();
        gate.record();

        let unblocked = Arc::new(AtomicBool::new(false));
        let waiter = std::thread::spawn({
            let gate = gate.clone();
            let unblocked = unblocked.clone();
            move || {
                gate.acquire();
                unblocked.store(true, Ordering::SeqCst);
            }
        });

        // The budget is exhausted: the waiter stays blocked until the next
        // window boundary.
        std::thread::sleep(Duration::from_millis(20));
        assert!(!unblocked.load(Ordering::SeqCst));

        assert!(wait_until(Duration::from_secs(1), || {
            unblocked.load(Ordering::SeqCst)
        }));
        waiter.join().unwrap();
    }

    #[test]
    fn test_counter_resets_each_window() {
        let gate = RateGate::new(Duration::from_millis(50), 10);
        gate.record();
        gate.record();
        assert!(wait_until(Duration::from_secs(1), || {
            gate.executed_in_window() == 0
        }));
    }
}
