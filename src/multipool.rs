// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! A sharding layer spreading submissions over independent pools.

use crate::error::PoolError;
use crate::pool::{BoxedTask, Pool, PoolBuilder};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Strategy picking the shard a submission goes to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadBalancingStrategy {
    /// Rotate over the shards in submission order.
    RoundRobin,
    /// Pick the shard with the fewest alive workers, ties resolved by the
    /// lowest shard index.
    LeastTasks,
}

/// A set of independent [`Pool`] shards behind a load-balancing strategy.
///
/// Sharding reduces contention on the queue lock of a single pool under
/// heavy submission traffic. The shard count is fixed at construction;
/// aggregate accessors sum over the shards on every call.
///
/// With [`LoadBalancingStrategy::RoundRobin`], a submission that lands on a
/// saturated shard is rerouted once to the least-loaded shard, so a single
/// unlucky assignment doesn't surface a transient overload to the caller.
pub struct MultiPool<T: Send + 'static = BoxedTask> {
    shards: Vec<Pool<T>>,
    /// Rotation counter for [`LoadBalancingStrategy::RoundRobin`].
    index: AtomicUsize,
    strategy: LoadBalancingStrategy,
    closed: AtomicBool,
}

impl MultiPool {
    /// Creates a multi-pool of `shards` closure pools, each with the given
    /// capacity and default options.
    pub fn new(
        shards: usize,
        capacity_per_shard: isize,
        strategy: LoadBalancingStrategy,
    ) -> Result<Self, PoolError> {
        Self::with_builder(shards, strategy, move |_| PoolBuilder::new(capacity_per_shard))
    }

    /// Creates a multi-pool of `shards` closure pools, configuring each
    /// shard with the builder returned by `make_builder` for its index.
    pub fn with_builder(
        shards: usize,
        strategy: LoadBalancingStrategy,
        make_builder: impl Fn(usize) -> PoolBuilder,
    ) -> Result<Self, PoolError> {
        if shards == 0 {
            return Err(PoolError::InvalidMultiPoolSize);
        }
        let shards = (0..shards)
            .map(|index| make_builder(index).build())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            shards,
            index: AtomicUsize::new(0),
            strategy,
            closed: AtomicBool::new(false),
        })
    }

    /// Submits a task to a shard picked by the load-balancing strategy, with
    /// the same fire-and-forget semantics as [`Pool::submit`].
    pub fn submit(&self, task: impl FnOnce() + Send + 'static) -> Result<(), PoolError> {
        self.submit_payload(Box::new(task))
    }
}

impl<T: Send + 'static> MultiPool<T> {
    /// Creates a multi-pool of `shards` pools sharing the task function,
    /// each with the given capacity and default options.
    pub fn with_task_fn(
        shards: usize,
        capacity_per_shard: isize,
        strategy: LoadBalancingStrategy,
        task_fn: impl Fn(T) + Send + Sync + 'static,
    ) -> Result<Self, PoolError> {
        if shards == 0 {
            return Err(PoolError::InvalidMultiPoolSize);
        }
        let task_fn: Arc<dyn Fn(T) + Send + Sync> = Arc::new(task_fn);
        let shards = (0..shards)
            .map(|_| PoolBuilder::new(capacity_per_shard).build_inner(task_fn.clone(), false))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            shards,
            index: AtomicUsize::new(0),
            strategy,
            closed: AtomicBool::new(false),
        })
    }

    /// Submits one argument to the shared task function, on a shard picked
    /// by the load-balancing strategy.
    pub fn invoke(&self, arg: T) -> Result<(), PoolError> {
        self.submit_payload(arg)
    }

    fn submit_payload(&self, task: T) -> Result<(), PoolError> {
        if self.is_closed() {
            return Err(PoolError::PoolClosed);
        }
        let shard = &self.shards[self.next_index(self.strategy)];
        match shard.inner.try_submit(task) {
            Ok(()) => Ok(()),
            Err((PoolError::PoolOverload, task))
                if self.strategy == LoadBalancingStrategy::RoundRobin =>
            {
                // The rotation picked a saturated shard; give the task one
                // second chance on the least-loaded one.
                let shard = &self.shards[self.next_index(LoadBalancingStrategy::LeastTasks)];
                shard.inner.try_submit(task).map_err(|(error, _)| error)
            }
            Err((error, _)) => Err(error),
        }
    }

    fn next_index(&self, strategy: LoadBalancingStrategy) -> usize {
        match strategy {
            LoadBalancingStrategy::RoundRobin => {
                self.index.fetch_add(1, Ordering::Relaxed) % self.shards.len()
            }
            LoadBalancingStrategy::LeastTasks => self
                .shards
                .iter()
                .enumerate()
                .min_by_key(|(_, shard)| shard.running())
                .map(|(index, _)| index)
                .unwrap_or(0),
        }
    }

    /// Number of shards.
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Total number of alive workers across all shards.
    pub fn running(&self) -> usize {
        self.shards.iter().map(Pool::running).sum()
    }

    /// Total number of blocked submitters across all shards.
    pub fn waiting(&self) -> usize {
        self.shards.iter().map(Pool::waiting).sum()
    }

    /// Sum of the shard capacities.
    pub fn cap(&self) -> isize {
        self.shards.iter().map(Pool::cap).sum()
    }

    /// Sum of the shards' free worker slots.
    pub fn free(&self) -> isize {
        self.shards.iter().map(Pool::free).sum()
    }

    /// Number of alive workers in the shard at `index`.
    pub fn running_of(&self, index: usize) -> Result<usize, PoolError> {
        self.shard(index).map(Pool::running)
    }

    /// Number of blocked submitters in the shard at `index`.
    pub fn waiting_of(&self, index: usize) -> Result<usize, PoolError> {
        self.shard(index).map(Pool::waiting)
    }

    /// Number of free worker slots in the shard at `index`.
    pub fn free_of(&self, index: usize) -> Result<isize, PoolError> {
        self.shard(index).map(Pool::free)
    }

    fn shard(&self, index: usize) -> Result<&Pool<T>, PoolError> {
        self.shards.get(index).ok_or(PoolError::InvalidPoolIndex)
    }

    /// Whether the multi-pool has been released.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Changes the capacity of every shard, with [`Pool::tune`] semantics.
    pub fn tune(&self, capacity_per_shard: isize) {
        for shard in &self.shards {
            shard.tune(capacity_per_shard);
        }
    }

    /// Closes every shard concurrently and waits for each to quiesce, up to
    /// the given timeout per shard.
    ///
    /// Returns [`PoolError::PoolClosed`] if the multi-pool was already
    /// closed, and [`PoolError::ShardRelease`] listing the shards that
    /// failed to quiesce in time.
    pub fn release_timeout(&self, timeout: Duration) -> Result<(), PoolError> {
        if self
            .closed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(PoolError::PoolClosed);
        }

        let results: Vec<Result<(), PoolError>> = std::thread::scope(|scope| {
            let handles: Vec<_> = self
                .shards
                .iter()
                .map(|shard| scope.spawn(move || shard.release_timeout(timeout)))
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().expect("A shard release thread panicked"))
                .collect()
        });

        let failures: Vec<(usize, PoolError)> = results
            .into_iter()
            .enumerate()
            .filter_map(|(index, result)| result.err().map(|error| (index, error)))
            .collect();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(PoolError::ShardRelease(failures))
        }
    }

    /// Reopens a released multi-pool: resets the rotation counter and
    /// reboots every shard.
    ///
    /// Idempotent: rebooting an open multi-pool is a no-op.
    pub fn reboot(&self) {
        if self
            .closed
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.index.store(0, Ordering::SeqCst);
            for shard in &self.shards {
                shard.reboot();
            }
        }
    }
}
