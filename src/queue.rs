// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Containers of parked workers awaiting their next task or eviction.
//!
//! Two interchangeable layouts are available, selected at pool construction
//! via [`QueueStrategy`]: a growable stack and a fixed-capacity ring buffer.

use crate::pool::UNBOUNDED;
use crate::worker::WorkerHandle;
use std::time::{Duration, Instant};

/// Layout of the idle-worker queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueStrategy {
    /// A growable stack. The most-recently-parked worker is reused first:
    /// its caches are warmest and it is the furthest from its expiry cutoff.
    Stack,
    /// A fixed-capacity ring buffer, reusing workers in parking order. This
    /// is the only layout compatible with pre-allocation, and requires a
    /// bounded pool capacity.
    RingBuffer,
}

/// A parked worker together with the time it went idle.
pub(crate) struct IdleWorker<T> {
    pub handle: WorkerHandle<T>,
    pub idle_since: Instant,
}

/// Errors internal to the idle-worker queue. These never cross the pool
/// boundary: the pool translates them into an overload or a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum QueueError {
    /// The fixed-capacity queue is full.
    Full,
    /// The queue was built with a capacity of zero.
    ZeroLength,
}

/// A container of parked workers.
///
/// All mutation happens under the pool's queue lock; implementations don't
/// synchronize internally.
pub(crate) trait IdleQueue<T>: Send {
    /// Number of currently parked workers.
    fn len(&self) -> usize;

    /// Maximum number of parked workers, or [`UNBOUNDED`] for a growable
    /// queue.
    fn capacity(&self) -> isize;

    /// Whether no worker is currently parked.
    fn is_empty(&self) -> bool;

    /// Parks a worker.
    fn insert(&mut self, worker: IdleWorker<T>) -> Result<(), QueueError>;

    /// Removes and returns the most reusable parked worker, if any.
    fn detach(&mut self) -> Option<IdleWorker<T>>;

    /// Removes and returns every worker that has been idle strictly longer
    /// than `expiry`, as measured at `now`.
    fn evict_older_than(&mut self, expiry: Duration, now: Instant) -> Vec<IdleWorker<T>>;

    /// Removes and returns all parked workers.
    fn reset_all(&mut self) -> Vec<IdleWorker<T>>;
}

/// Builds the queue for the given strategy and pool capacity.
pub(crate) fn new_queue<T: Send + 'static>(
    strategy: QueueStrategy,
    capacity: isize,
) -> Box<dyn IdleQueue<T>> {
    match strategy {
        QueueStrategy::Stack => Box::new(WorkerStack::new(capacity.max(0) as usize)),
        QueueStrategy::RingBuffer => Box::new(RingQueue::new(capacity.max(0) as usize)),
    }
}

/// Growable stack of parked workers.
///
/// Workers are appended in parking order, so the sequence is ordered by idle
/// time as a side effect: entries near the front have been idle at least as
/// long as entries further back, up to scheduling jitter.
pub(crate) struct WorkerStack<T> {
    items: Vec<IdleWorker<T>>,
}

impl<T> WorkerStack<T> {
    pub fn new(initial_capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(initial_capacity),
        }
    }

    /// Returns the largest index whose entry went idle at or before `cutoff`,
    /// or `-1` if there is none.
    ///
    /// This is a bisection over index space, not a true binary search over
    /// time: the sequence is only approximately time-ordered (see the type
    /// documentation), so eviction is best-effort. It never selects an entry
    /// that went idle after `cutoff`, which is the property that matters.
    fn bisect(items: &[IdleWorker<T>], lo: isize, hi: isize, cutoff: Instant) -> isize {
        if lo > hi {
            return hi;
        }
        let mid = (lo + hi) / 2;
        if items[mid as usize].idle_since > cutoff {
            Self::bisect(items, lo, mid - 1, cutoff)
        } else {
            Self::bisect(items, mid + 1, hi, cutoff)
        }
    }
}

impl<T: Send> IdleQueue<T> for WorkerStack<T> {
    fn len(&self) -> usize {
        self.items.len()
    }

    fn capacity(&self) -> isize {
        UNBOUNDED
    }

    fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn insert(&mut self, worker: IdleWorker<T>) -> Result<(), QueueError> {
        self.items.push(worker);
        Ok(())
    }

    fn detach(&mut self) -> Option<IdleWorker<T>> {
        self.items.pop()
    }

    fn evict_older_than(&mut self, expiry: Duration, now: Instant) -> Vec<IdleWorker<T>> {
        let Some(cutoff) = now.checked_sub(expiry) else {
            return Vec::new();
        };
        let boundary = Self::bisect(&self.items, 0, self.items.len() as isize - 1, cutoff);
        if boundary < 0 {
            return Vec::new();
        }
        self.items.drain(..=boundary as usize).collect()
    }

    fn reset_all(&mut self) -> Vec<IdleWorker<T>> {
        self.items.drain(..).collect()
    }
}

/// Fixed-capacity ring buffer of parked workers.
///
/// Insertion order is exactly idle-time order here, so eviction is an exact
/// scan from the head rather than the stack's heuristic bisection.
pub(crate) struct RingQueue<T> {
    items: Vec<Option<IdleWorker<T>>>,
    head: usize,
    tail: usize,
    /// Disambiguates `head == tail`, which is otherwise both "empty" and
    /// "full".
    full: bool,
}

impl<T> RingQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: (0..capacity).map(|_| None).collect(),
            head: 0,
            tail: 0,
            full: false,
        }
    }
}

impl<T: Send> IdleQueue<T> for RingQueue<T> {
    fn len(&self) -> usize {
        if self.full {
            self.items.len()
        } else if self.tail >= self.head {
            self.tail - self.head
        } else {
            self.items.len() - self.head + self.tail
        }
    }

    fn capacity(&self) -> isize {
        self.items.len() as isize
    }

    fn is_empty(&self) -> bool {
        !self.full && self.head == self.tail
    }

    fn insert(&mut self, worker: IdleWorker<T>) -> Result<(), QueueError> {
        if self.items.is_empty() {
            return Err(QueueError::ZeroLength);
        }
        if self.full {
            return Err(QueueError::Full);
        }
        self.items[self.tail] = Some(worker);
        self.tail = (self.tail + 1) % self.items.len();
        self.full = self.tail == self.head;
        Ok(())
    }

    fn detach(&mut self) -> Option<IdleWorker<T>> {
        if self.is_empty() {
            return None;
        }
        let worker = self.items[self.head].take();
        self.head = (self.head + 1) % self.items.len();
        self.full = false;
        worker
    }

    fn evict_older_than(&mut self, expiry: Duration, now: Instant) -> Vec<IdleWorker<T>> {
        let Some(cutoff) = now.checked_sub(expiry) else {
            return Vec::new();
        };
        let mut evicted = Vec::new();
        while !self.is_empty() {
            let oldest_idle_since = self.items[self.head]
                .as_ref()
                .expect("non-empty ring slot at head")
                .idle_since;
            if oldest_idle_since > cutoff {
                break;
            }
            evicted.extend(self.detach());
        }
        evicted
    }

    fn reset_all(&mut self) -> Vec<IdleWorker<T>> {
        let mut workers = Vec::with_capacity(self.len());
        while let Some(worker) = self.detach() {
            workers.push(worker);
        }
        workers
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::worker::Message;
    use crossbeam_channel::{bounded, Receiver};

    fn idle_worker(idle_since: Instant) -> (IdleWorker<u64>, Receiver<Message<u64>>) {
        let (sender, receiver) = bounded(1);
        (
            IdleWorker {
                handle: WorkerHandle::new(sender),
                idle_since,
            },
            receiver,
        )
    }

    /// Builds a queue holding `count` workers parked 10ms apart, oldest
    /// first, and returns the parking timestamps.
    fn fill<Q: IdleQueue<u64>>(queue: &mut Q, base: Instant, count: usize) -> Vec<Instant> {
        (0..count)
            .map(|i| {
                let idle_since = base + Duration::from_millis(10 * i as u64);
                // Dropping the receiving half is fine: these tests never send.
                let (worker, _receiver) = idle_worker(idle_since);
                queue.insert(worker).unwrap();
                idle_since
            })
            .collect()
    }

    #[test]
    fn test_stack_detach_is_lifo() {
        let mut stack = WorkerStack::new(0);
        let base = Instant::now();
        let times = fill(&mut stack, base, 3);

        assert_eq!(stack.len(), 3);
        assert_eq!(stack.detach().unwrap().idle_since, times[2]);
        assert_eq!(stack.detach().unwrap().idle_since, times[1]);
        assert_eq!(stack.detach().unwrap().idle_since, times[0]);
        assert!(stack.detach().is_none());
        assert!(stack.is_empty());
    }

    #[test]
    fn test_stack_is_unbounded() {
        let mut stack = WorkerStack::new(2);
        let base = Instant::now();
        fill(&mut stack, base, 100);
        assert_eq!(stack.len(), 100);
        assert_eq!(IdleQueue::capacity(&stack), UNBOUNDED);
    }

    #[test]
    fn test_stack_evicts_oldest_run() {
        let mut stack = WorkerStack::new(0);
        let base = Instant::now();
        let times = fill(&mut stack, base, 10);

        // Entries 0..=3 went idle at or before `now - expiry`.
        let now = times[3] + Duration::from_secs(1);
        let evicted = stack.evict_older_than(Duration::from_secs(1), now);

        assert_eq!(evicted.len(), 4);
        for (worker, time) in evicted.iter().zip(&times[..4]) {
            assert_eq!(worker.idle_since, *time);
        }
        assert_eq!(stack.len(), 6);
        // The survivors keep their order: the newest is still on top.
        assert_eq!(stack.detach().unwrap().idle_since, times[9]);
    }

    #[test]
    fn test_stack_evicts_nothing_when_fresh() {
        let mut stack = WorkerStack::new(0);
        let base = Instant::now();
        fill(&mut stack, base, 5);

        let now = base + Duration::from_millis(100);
        let evicted = stack.evict_older_than(Duration::from_secs(10), now);
        assert!(evicted.is_empty());
        assert_eq!(stack.len(), 5);
    }

    #[test]
    fn test_stack_evicts_everything_when_stale() {
        let mut stack = WorkerStack::new(0);
        let base = Instant::now();
        fill(&mut stack, base, 5);

        let now = base + Duration::from_secs(10);
        let evicted = stack.evict_older_than(Duration::from_secs(1), now);
        assert_eq!(evicted.len(), 5);
        assert!(stack.is_empty());
    }

    #[test]
    fn test_stack_reset_all() {
        let mut stack = WorkerStack::new(0);
        let base = Instant::now();
        fill(&mut stack, base, 5);

        assert_eq!(stack.reset_all().len(), 5);
        assert!(stack.is_empty());
    }

    #[test]
    fn test_ring_insert_full() {
        let mut ring = RingQueue::new(10);
        let base = Instant::now();
        fill(&mut ring, base, 10);

        let (extra, _receiver) = idle_worker(base);
        assert_eq!(ring.insert(extra).unwrap_err(), QueueError::Full);
        assert_eq!(ring.len(), 10);
    }

    #[test]
    fn test_ring_zero_capacity() {
        let mut ring = RingQueue::new(0);
        let (worker, _receiver) = idle_worker(Instant::now());
        assert_eq!(ring.insert(worker).unwrap_err(), QueueError::ZeroLength);
    }

    #[test]
    fn test_ring_detach_is_fifo() {
        let mut ring = RingQueue::new(4);
        let base = Instant::now();
        let times = fill(&mut ring, base, 3);

        assert_eq!(ring.detach().unwrap().idle_since, times[0]);
        assert_eq!(ring.detach().unwrap().idle_since, times[1]);
        assert_eq!(ring.detach().unwrap().idle_since, times[2]);
        assert!(ring.detach().is_none());
    }

    #[test]
    fn test_ring_wraps_around() {
        let mut ring = RingQueue::new(3);
        let base = Instant::now();
        fill(&mut ring, base, 3);

        // Free one slot and refill it, so that the ring wraps.
        ring.detach().unwrap();
        let (worker, _receiver) = idle_worker(base + Duration::from_secs(1));
        ring.insert(worker).unwrap();

        assert_eq!(ring.len(), 3);
        let (worker, _receiver) = idle_worker(base);
        assert_eq!(ring.insert(worker).unwrap_err(), QueueError::Full);
    }

    #[test]
    fn test_ring_evicts_all_but_most_recent() {
        let mut ring = RingQueue::new(10);
        let base = Instant::now();
        let times = fill(&mut ring, base, 10);

        // Entries 0..=3 went idle at or before `now - expiry`; the 6 most
        // recent survive.
        let now = times[3] + Duration::from_secs(1);
        let evicted = ring.evict_older_than(Duration::from_secs(1), now);

        assert_eq!(evicted.len(), 4);
        assert_eq!(ring.len(), 6);
        assert_eq!(ring.detach().unwrap().idle_since, times[4]);
    }

    #[test]
    fn test_ring_reset_all() {
        let mut ring = RingQueue::new(5);
        let base = Instant::now();
        fill(&mut ring, base, 5);

        assert_eq!(ring.reset_all().len(), 5);
        assert!(ring.is_empty());
        // The capacity is retained: the queue is reusable after a reset.
        let (worker, _receiver) = idle_worker(base);
        assert!(ring.insert(worker).is_ok());
    }
}
