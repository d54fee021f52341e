// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

#![doc = include_str!("../README.md")]
#![forbid(missing_docs)]

mod error;
mod lock;
mod macros;
mod multipool;
mod pool;
mod queue;
mod rate;
mod util;
mod worker;

pub use error::PoolError;
pub use lock::{Lock, MutexLock, SpinLock};
pub use multipool::{LoadBalancingStrategy, MultiPool};
pub use pool::{BoxedTask, PanicHandler, Pool, PoolBuilder, UNBOUNDED};
pub use queue::QueueStrategy;
pub use rate::RateGate;

use once_cell::sync::Lazy;

/// The process-wide pool backing [`submit()`], created on first use.
static DEFAULT_POOL: Lazy<Pool> =
    Lazy::new(|| Pool::new(UNBOUNDED).expect("Building the default pool failed"));

/// Returns the process-wide default pool: unbounded, with default options,
/// lazily created on first use.
///
/// The default pool is shared by everything in the process that uses it —
/// release it only when nothing will submit to it anymore, and prefer a
/// dedicated [`Pool`] when you need custom options or an isolated
/// lifecycle.
pub fn default_pool() -> &'static Pool {
    &DEFAULT_POOL
}

/// Submits a task to the process-wide default pool, with [`Pool::submit`]
/// semantics.
pub fn submit(task: impl FnOnce() + Send + 'static) -> Result<(), PoolError> {
    DEFAULT_POOL.submit(task)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_default_pool_submit() {
        const NUM_TASKS: usize = 10;

        let count = Arc::new(AtomicUsize::new(0));
        let (done_sender, done_receiver) = crossbeam_channel::unbounded();

        for _ in 0..NUM_TASKS {
            let count = count.clone();
            let done = done_sender.clone();
            submit(move || {
                count.fetch_add(1, Ordering::Relaxed);
                done.send(()).unwrap();
            })
            .unwrap();
        }
        for _ in 0..NUM_TASKS {
            done_receiver.recv_timeout(Duration::from_secs(5)).unwrap();
        }

        assert_eq!(count.load(Ordering::Relaxed), NUM_TASKS);
        // The default pool is shared with the whole process: it is
        // deliberately not released here.
        assert!(!default_pool().is_closed());
    }
}
