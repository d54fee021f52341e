// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Lock strategies protecting the idle-worker queue.

use crate::util::Status;
use crossbeam_utils::Backoff;
use std::sync::atomic::{AtomicBool, Ordering};

/// A mutual-exclusion strategy for the pool's idle-worker queue.
///
/// The queue's critical sections are bounded to queue-structure mutation
/// only, so the default [`SpinLock`] is usually the right choice. A custom
/// implementation can be plugged in via
/// [`PoolBuilder::queue_lock`](crate::PoolBuilder::queue_lock).
///
/// # Safety
///
/// The pool mutates the idle-worker queue based on the exclusion this trait
/// promises. Implementations must guarantee that between a return from
/// [`acquire()`](Self::acquire) and the matching call to
/// [`release()`](Self::release), no other thread's `acquire()` returns.
pub unsafe trait Lock: Send + Sync {
    /// Blocks until the lock is acquired by the calling thread.
    fn acquire(&self);

    /// Releases the lock.
    ///
    /// Must only be called by the thread that currently holds the lock.
    fn release(&self);
}

/// A busy-wait lock that yields the processor between acquisition attempts
/// instead of descheduling the calling thread.
///
/// Intended for critical sections on the order of tens of nanoseconds, such
/// as an insert or detach on the idle-worker queue. Holding it across long
/// critical sections inverts its benefit over a blocking mutex.
#[derive(Default)]
pub struct SpinLock {
    locked: AtomicBool,
}

impl SpinLock {
    /// Creates a new, unlocked spinlock.
    pub fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
        }
    }
}

// SAFETY: `acquire()` only returns after atomically swapping the flag from
// unlocked to locked, and `release()` is the only place that swaps it back.
unsafe impl Lock for SpinLock {
    fn acquire(&self) {
        let backoff = Backoff::new();
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            backoff.snooze();
        }
    }

    fn release(&self) {
        self.locked.store(false, Ordering::Release);
    }
}

/// A blocking lock that deschedules contending threads.
///
/// An alternative to [`SpinLock`] for workloads where queue contention is
/// high enough that busy-waiting burns more cycles than a context switch.
pub struct MutexLock {
    locked: Status<bool>,
}

impl Default for MutexLock {
    fn default() -> Self {
        Self::new()
    }
}

impl MutexLock {
    /// Creates a new, unlocked mutex lock.
    pub fn new() -> Self {
        Self {
            locked: Status::new(false),
        }
    }
}

// SAFETY: `acquire()` only returns with the flag set to locked under the
// inner mutex, and `release()` is the only place that clears it.
unsafe impl Lock for MutexLock {
    fn acquire(&self) {
        let mut guard = self.locked.wait_while(|locked| *locked);
        *guard = true;
    }

    fn release(&self) {
        self.locked.notify_one(false);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;

    const NUM_THREADS: usize = 4;
    const ITERATIONS: usize = 1000;

    fn check_mutual_exclusion(lock: impl Lock + 'static) {
        let lock = Arc::new(lock);
        let in_critical_section = Arc::new(AtomicBool::new(false));

        let threads: Vec<_> = (0..NUM_THREADS)
            .map(|_| {
                std::thread::spawn({
                    let lock = lock.clone();
                    let in_critical_section = in_critical_section.clone();
                    move || {
                        for _ in 0..ITERATIONS {
                            lock.acquire();
                            // No other thread may be in the critical section.
                            assert!(!in_critical_section.swap(true, Ordering::SeqCst));
                            in_critical_section.store(false, Ordering::SeqCst);
                            lock.release();
                        }
                    }
                })
            })
            .collect();

        for t in threads {
            t.join().unwrap();
        }
    }

    #[test]
    fn test_spin_lock_mutual_exclusion() {
        check_mutual_exclusion(SpinLock::new());
    }

    #[test]
    fn test_mutex_lock_mutual_exclusion() {
        check_mutual_exclusion(MutexLock::new());
    }

    #[test]
    fn test_spin_lock_reacquire() {
        let lock = SpinLock::new();
        lock.acquire();
        lock.release();
        lock.acquire();
        lock.release();
    }
}
