// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The capacity-bounded worker pool.

use crate::error::PoolError;
use crate::lock::{Lock, SpinLock};
use crate::macros::{log_debug, log_error, log_warn};
use crate::queue::{new_queue, IdleQueue, IdleWorker, QueueStrategy};
use crate::worker::{self, WorkerHandle};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use crossbeam_utils::sync::{Parker, Unparker};
use crossbeam_utils::CachePadded;
use std::any::Any;
#[cfg(feature = "log")]
use std::backtrace::Backtrace;
use std::cell::UnsafeCell;
use std::collections::VecDeque;
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicBool, AtomicIsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Pool capacity placing no bound on the number of running workers.
pub const UNBOUNDED: isize = -1;

/// A task submitted to a closure pool.
pub type BoxedTask = Box<dyn FnOnce() + Send + 'static>;

/// Callback invoked with the payload of a panicking task.
pub type PanicHandler = Arc<dyn Fn(Box<dyn Any + Send>) + Send + Sync>;

/// Expiry duration used when none is configured.
const DEFAULT_EXPIRY: Duration = Duration::from_secs(1);

/// Interval at which [`Pool::release_timeout`] re-checks for quiescence.
const RELEASE_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A builder for [`Pool`].
///
/// All options other than the capacity have defaults: a one-second expiry,
/// blocking submission without a waiter limit, a growable stack for the
/// idle-worker queue protected by a [`SpinLock`], and an active scavenger.
pub struct PoolBuilder {
    capacity: isize,
    expiry: Duration,
    nonblocking: bool,
    max_blocking_tasks: usize,
    prealloc: bool,
    queue_strategy: Option<QueueStrategy>,
    queue_lock: Option<Box<dyn Lock>>,
    panic_handler: Option<PanicHandler>,
    disable_purge: bool,
}

impl PoolBuilder {
    /// Starts building a pool that runs at most `capacity` workers at once.
    ///
    /// For closure pools built with [`build()`](Self::build), a non-positive
    /// capacity is treated as [`UNBOUNDED`]. Pools built with
    /// [`build_with()`](Self::build_with) require a positive capacity.
    pub fn new(capacity: isize) -> Self {
        Self {
            capacity,
            expiry: Duration::ZERO,
            nonblocking: false,
            max_blocking_tasks: 0,
            prealloc: false,
            queue_strategy: None,
            queue_lock: None,
            panic_handler: None,
            disable_purge: false,
        }
    }

    /// Sets how long a worker may sit idle before the scavenger evicts it.
    ///
    /// A zero duration selects the default of one second.
    pub fn expiry(mut self, expiry: Duration) -> Self {
        self.expiry = expiry;
        self
    }

    /// Makes submission fail fast with [`PoolError::PoolOverload`] when the
    /// pool is saturated, instead of waiting for a free worker.
    pub fn nonblocking(mut self, nonblocking: bool) -> Self {
        self.nonblocking = nonblocking;
        self
    }

    /// Caps the number of submitters allowed to wait for a free worker at
    /// once; further submitters fail fast with
    /// [`PoolError::PoolOverload`]. Zero (the default) means no limit.
    pub fn max_blocking_tasks(mut self, max_blocking_tasks: usize) -> Self {
        self.max_blocking_tasks = max_blocking_tasks;
        self
    }

    /// Pre-allocates the idle-worker queue to the pool capacity, using the
    /// ring-buffer layout. Requires a bounded capacity, and makes
    /// [`Pool::tune`] a no-op.
    pub fn prealloc(mut self, prealloc: bool) -> Self {
        self.prealloc = prealloc;
        self
    }

    /// Selects the idle-worker queue layout. The default is
    /// [`QueueStrategy::Stack`], or [`QueueStrategy::RingBuffer`] when
    /// pre-allocation is requested.
    pub fn queue_strategy(mut self, strategy: QueueStrategy) -> Self {
        self.queue_strategy = Some(strategy);
        self
    }

    /// Selects the lock protecting the idle-worker queue. The default is a
    /// [`SpinLock`].
    pub fn queue_lock(mut self, lock: impl Lock + 'static) -> Self {
        self.queue_lock = Some(Box::new(lock));
        self
    }

    /// Installs a callback invoked with the payload of every task panic.
    ///
    /// Without a handler, panics are logged together with a backtrace (if
    /// the `log` feature is enabled). Either way the panic is contained:
    /// it never propagates to the submitter, and the worker that ran the
    /// task exits without returning to the idle queue.
    pub fn panic_handler(
        mut self,
        handler: impl Fn(Box<dyn Any + Send>) + Send + Sync + 'static,
    ) -> Self {
        self.panic_handler = Some(Arc::new(handler));
        self
    }

    /// Disables the background scavenger, so idle workers are never
    /// reclaimed.
    pub fn disable_purge(mut self, disable_purge: bool) -> Self {
        self.disable_purge = disable_purge;
        self
    }

    /// Builds a pool accepting closures via [`Pool::submit`].
    pub fn build(self) -> Result<Pool, PoolError> {
        self.build_inner(Arc::new(|task: BoxedTask| task()), true)
    }

    /// Builds a pool that runs `task_fn` on every submitted argument, via
    /// [`Pool::invoke`]. This avoids a per-task closure allocation when all
    /// tasks share their code.
    pub fn build_with<T, F>(self, task_fn: F) -> Result<Pool<T>, PoolError>
    where
        T: Send + 'static,
        F: Fn(T) + Send + Sync + 'static,
    {
        self.build_inner(Arc::new(task_fn), false)
    }

    pub(crate) fn build_inner<T: Send + 'static>(
        self,
        task_fn: Arc<dyn Fn(T) + Send + Sync>,
        allow_unbounded: bool,
    ) -> Result<Pool<T>, PoolError> {
        let capacity = if self.capacity > 0 {
            self.capacity
        } else if allow_unbounded {
            if self.capacity != UNBOUNDED {
                log_warn!(
                    "[pool] non-positive capacity {} treated as unbounded",
                    self.capacity
                );
            }
            UNBOUNDED
        } else {
            return Err(PoolError::InvalidPoolSize);
        };

        let strategy = if self.prealloc {
            QueueStrategy::RingBuffer
        } else {
            self.queue_strategy.unwrap_or(QueueStrategy::Stack)
        };
        if strategy == QueueStrategy::RingBuffer && capacity == UNBOUNDED {
            // The ring buffer requires a fixed bound to allocate.
            return Err(PoolError::InvalidPreallocSize);
        }

        let expiry = if self.expiry.is_zero() {
            DEFAULT_EXPIRY
        } else {
            self.expiry
        };
        let lock = self
            .queue_lock
            .unwrap_or_else(|| Box::new(SpinLock::new()));

        let inner = Arc::new(PoolInner {
            capacity: AtomicIsize::new(capacity),
            running: CachePadded::new(AtomicIsize::new(0)),
            waiting: CachePadded::new(AtomicIsize::new(0)),
            closed: AtomicBool::new(false),
            synced: Synced::new(lock, new_queue(strategy, capacity)),
            task_fn,
            expiry,
            nonblocking: self.nonblocking,
            max_blocking_tasks: self.max_blocking_tasks,
            prealloc: self.prealloc,
            panic_handler: self.panic_handler,
            disable_purge: self.disable_purge,
            scavenger: Mutex::new(None),
            purge_done: AtomicBool::new(true),
        });
        inner.start_scavenger();
        Ok(Pool { inner })
    }
}

/// A worker pool running at most a fixed number of tasks concurrently.
///
/// The type parameter is the task payload handed to workers. The default,
/// [`BoxedTask`], makes a *closure pool*: every submission carries its own
/// code. [`Pool::with_task_fn`] instead binds a shared task function at
/// construction, and submissions carry plain argument values.
///
/// A `Pool` is a cheap handle: clones share the same workers. Dropping all
/// handles does not shut the pool down; call [`release()`](Self::release)
/// or [`release_timeout()`](Self::release_timeout) for that.
pub struct Pool<T: Send + 'static = BoxedTask> {
    pub(crate) inner: Arc<PoolInner<T>>,
}

// Not derived, to avoid the spurious `T: Clone` bound.
impl<T: Send + 'static> Clone for Pool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Send + 'static> Debug for Pool<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("capacity", &self.cap())
            .field("running", &self.running())
            .field("waiting", &self.waiting())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Pool {
    /// Creates a closure pool with the default options. See
    /// [`PoolBuilder`] to customize them.
    pub fn new(capacity: isize) -> Result<Self, PoolError> {
        PoolBuilder::new(capacity).build()
    }

    /// Submits a task for execution on any worker.
    ///
    /// Submission is fire-and-forget: a successful return means the task
    /// was handed to a worker, not that it ran. When the pool is saturated,
    /// this blocks until a worker frees up, unless non-blocking mode or the
    /// blocking-submitter limit says otherwise — then it returns
    /// [`PoolError::PoolOverload`].
    pub fn submit(&self, task: impl FnOnce() + Send + 'static) -> Result<(), PoolError> {
        self.inner
            .try_submit(Box::new(task))
            .map_err(|(error, _)| error)
    }
}

impl<T: Send + 'static> Pool<T> {
    /// Creates a pool that runs `task_fn` on every submitted argument, with
    /// the default options. See [`PoolBuilder::build_with`] to customize
    /// them.
    pub fn with_task_fn(
        capacity: isize,
        task_fn: impl Fn(T) + Send + Sync + 'static,
    ) -> Result<Self, PoolError> {
        PoolBuilder::new(capacity).build_with(task_fn)
    }

    /// Submits one argument to the pool's task function, with the same
    /// semantics as [`Pool::submit`].
    pub fn invoke(&self, arg: T) -> Result<(), PoolError> {
        self.inner.try_submit(arg).map_err(|(error, _)| error)
    }

    /// Number of currently alive workers, running a task or parked idle.
    ///
    /// The value may be stale by the time the caller acts on it.
    pub fn running(&self) -> usize {
        self.inner.running_count().max(0) as usize
    }

    /// Number of submitters currently blocked waiting for a worker.
    pub fn waiting(&self) -> usize {
        self.inner.waiting_count().max(0) as usize
    }

    /// The pool capacity, or [`UNBOUNDED`].
    pub fn cap(&self) -> isize {
        self.inner.capacity()
    }

    /// Number of additional workers the pool may spawn, or [`UNBOUNDED`].
    pub fn free(&self) -> isize {
        self.inner.free_count()
    }

    /// Whether the pool has been released.
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Changes the pool capacity.
    ///
    /// No-op on unbounded or pre-allocated pools, and for non-positive or
    /// unchanged values. Shrinking takes effect lazily: excess workers are
    /// not interrupted, they exit as they finish their current task.
    pub fn tune(&self, capacity: isize) {
        self.inner.tune(capacity);
    }

    /// Closes the pool: idle workers are told to exit, blocked submitters
    /// are woken and observe the closed state, and the scavenger stops.
    /// Tasks already handed to a worker run to completion.
    ///
    /// Idempotent: releasing a closed pool is a no-op.
    pub fn release(&self) {
        self.inner.release();
    }

    /// Closes the pool like [`release()`](Self::release), then waits until
    /// every worker has exited and the scavenger has finished, up to the
    /// given timeout.
    ///
    /// Returns [`PoolError::PoolClosed`] if the pool was already closed, and
    /// [`PoolError::ReleaseTimeout`] if stragglers outlive the timeout (they
    /// are not force-killed).
    pub fn release_timeout(&self, timeout: Duration) -> Result<(), PoolError> {
        self.inner.release_timeout(timeout)
    }

    /// Reopens a released pool and restarts its scavenger. Workers are not
    /// restored; new ones are spawned on demand.
    ///
    /// Idempotent: rebooting an open pool is a no-op.
    pub fn reboot(&self) {
        self.inner.reboot();
    }
}

/// State shared by all handles to a pool and by its worker threads.
pub(crate) struct PoolInner<T: Send + 'static> {
    /// Maximum number of alive workers, or [`UNBOUNDED`]. Only mutated by
    /// [`tune()`](Self::tune).
    capacity: AtomicIsize,
    /// Number of alive workers. Incremented when a worker slot is claimed,
    /// decremented when the worker thread exits.
    running: CachePadded<AtomicIsize>,
    /// Number of submitters blocked in [`retrieve_worker()`](Self::retrieve_worker).
    waiting: CachePadded<AtomicIsize>,
    /// Whether the pool has been released.
    closed: AtomicBool,
    /// The idle-worker queue and the submitter wait list, under the queue
    /// lock.
    synced: Synced<T>,
    /// Function applied to every task payload.
    task_fn: Arc<dyn Fn(T) + Send + Sync>,
    expiry: Duration,
    nonblocking: bool,
    max_blocking_tasks: usize,
    prealloc: bool,
    panic_handler: Option<PanicHandler>,
    disable_purge: bool,
    /// Handle stopping the scavenger thread: dropping the sender disconnects
    /// the channel its purge loop sleeps on.
    scavenger: Mutex<Option<Sender<()>>>,
    /// Whether the scavenger thread has exited (vacuously true when purging
    /// is disabled or not yet started).
    purge_done: AtomicBool,
}

impl<T: Send + 'static> PoolInner<T> {
    fn capacity(&self) -> isize {
        self.capacity.load(Ordering::SeqCst)
    }

    fn running_count(&self) -> isize {
        self.running.load(Ordering::SeqCst)
    }

    fn waiting_count(&self) -> isize {
        self.waiting.load(Ordering::SeqCst)
    }

    fn free_count(&self) -> isize {
        let capacity = self.capacity();
        if capacity == UNBOUNDED {
            UNBOUNDED
        } else {
            capacity - self.running_count()
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Runs one task payload. Called from worker threads.
    pub fn run_task(&self, task: T) {
        (self.task_fn)(task);
    }

    /// Hands the task to a worker, acquiring one first.
    ///
    /// On failure the task is given back to the caller alongside the error,
    /// so that layers above (e.g. the multi-pool reroute) can retry it.
    pub fn try_submit(self: &Arc<Self>, task: T) -> Result<(), (PoolError, T)> {
        if self.is_closed() {
            return Err((PoolError::PoolClosed, task));
        }
        match self.retrieve_worker() {
            Some(worker) => {
                worker.send_task(task);
                Ok(())
            }
            None => Err((PoolError::PoolOverload, task)),
        }
    }

    /// Acquires a worker: reuses an idle one, spawns within capacity, or —
    /// in blocking mode — parks the calling thread until one of those
    /// becomes possible. Returns [`None`] when the submission must be
    /// rejected.
    fn retrieve_worker(self: &Arc<Self>) -> Option<WorkerHandle<T>> {
        loop {
            let mut synced = self.synced.lock();
            if let Some(idle) = synced.queue.detach() {
                drop(synced);
                return Some(idle.handle);
            }

            let capacity = self.capacity();
            if capacity == UNBOUNDED || self.running_count() < capacity {
                // Claim the slot before releasing the lock, so that two
                // submitters can't both take the last one.
                self.running.fetch_add(1, Ordering::SeqCst);
                drop(synced);
                return Some(self.spawn_worker());
            }

            // The pool is saturated.
            if self.nonblocking {
                return None;
            }
            if self.max_blocking_tasks > 0
                && self.waiting_count() as usize >= self.max_blocking_tasks
            {
                return None;
            }

            self.waiting.fetch_add(1, Ordering::SeqCst);
            let parker = Parker::new();
            synced.waiters.push_back(parker.unparker().clone());
            drop(synced);
            parker.park();
            self.waiting.fetch_sub(1, Ordering::SeqCst);

            if self.is_closed() {
                return None;
            }
            // Woken by a returned worker, a freed slot, or a full reap. Loop
            // to re-validate: a racing submitter may have consumed whatever
            // caused the wake.
        }
    }

    /// Spawns a worker thread. The caller must have claimed a running slot.
    fn spawn_worker(self: &Arc<Self>) -> WorkerHandle<T> {
        let (sender, receiver) = bounded(1);
        let handle = WorkerHandle::new(sender);
        let pool = self.clone();
        let worker_handle = handle.clone();
        std::thread::Builder::new()
            .name("workpool-worker".to_owned())
            .spawn(move || worker::run(pool, receiver, worker_handle))
            .expect("Spawning a worker thread failed");
        log_debug!("[pool] spawned a worker ({} running)", self.running_count());
        handle
    }

    /// Takes a worker back after it finished a task.
    ///
    /// Returns `false` when the worker must exit instead of parking: the
    /// pool was closed, or a capacity shrink left more workers running than
    /// allowed.
    pub fn revert_worker(&self, handle: &WorkerHandle<T>) -> bool {
        let capacity = self.capacity();
        if (capacity != UNBOUNDED && self.running_count() > capacity) || self.is_closed() {
            // Waiters must re-check the pool state rather than wait for a
            // worker that will never be parked.
            self.broadcast();
            return false;
        }

        let idle = IdleWorker {
            handle: handle.clone(),
            idle_since: Instant::now(),
        };
        let mut synced = self.synced.lock();
        // Double-check under the lock: a release concurrent with the check
        // above has already flushed the queue, and a worker parked now would
        // never be told to exit.
        if self.is_closed() {
            drop(synced);
            self.broadcast();
            return false;
        }
        if synced.queue.insert(idle).is_err() {
            return false;
        }
        // One returned worker unblocks at most one submitter.
        let waiter = synced.waiters.pop_front();
        drop(synced);
        if let Some(waiter) = waiter {
            waiter.unpark();
        }
        true
    }

    /// Called by every worker thread on exit, whatever the exit path.
    pub fn worker_exited(&self) {
        self.running.fetch_sub(1, Ordering::SeqCst);
        // The freed slot may let one blocked submitter spawn afresh.
        self.signal_one();
    }

    /// Contains a task panic: delegates to the configured handler, or logs
    /// it with a backtrace.
    pub fn handle_task_panic(&self, payload: Box<dyn Any + Send>) {
        match &self.panic_handler {
            Some(handler) => handler(payload),
            None => {
                log_error!(
                    "[worker] task panicked: {}\n{}",
                    panic_message(payload.as_ref()),
                    Backtrace::force_capture()
                );
            }
        }
    }

    pub fn tune(&self, size: isize) {
        let capacity = self.capacity();
        if capacity == UNBOUNDED || size <= 0 || size == capacity || self.prealloc {
            return;
        }
        self.capacity.store(size, Ordering::SeqCst);
        if size > capacity {
            // One extra slot frees exactly one submitter; more may free
            // many.
            if size - capacity == 1 {
                self.signal_one();
            } else {
                self.broadcast();
            }
        }
        // Shrinking takes effect lazily: excess workers exit as their
        // revert observes `running > capacity`.
    }

    pub fn release(&self) {
        if self
            .closed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // Already closed.
            return;
        }
        self.stop_scavenger();

        let mut synced = self.synced.lock();
        let idle = synced.queue.reset_all();
        let waiters = std::mem::take(&mut synced.waiters);
        drop(synced);

        // Sentinels go out after the lock is dropped: a channel send must
        // never stall queue operations on other threads.
        for worker in &idle {
            worker.handle.stop();
        }
        for waiter in waiters {
            waiter.unpark();
        }
        log_debug!("[pool] released, {} idle workers stopped", idle.len());
    }

    pub fn release_timeout(&self, timeout: Duration) -> Result<(), PoolError> {
        if self.is_closed() {
            return Err(PoolError::PoolClosed);
        }
        self.release();

        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.running_count() == 0
                && (self.disable_purge || self.purge_done.load(Ordering::SeqCst))
            {
                return Ok(());
            }
            std::thread::sleep(RELEASE_POLL_INTERVAL);
        }
        Err(PoolError::ReleaseTimeout)
    }

    pub fn reboot(self: &Arc<Self>) {
        if self
            .closed
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            log_debug!("[pool] rebooted");
            self.start_scavenger();
        }
    }

    /// Wakes one blocked submitter, if any.
    fn signal_one(&self) {
        let mut synced = self.synced.lock();
        let waiter = synced.waiters.pop_front();
        drop(synced);
        if let Some(waiter) = waiter {
            waiter.unpark();
        }
    }

    /// Wakes all blocked submitters.
    fn broadcast(&self) {
        let mut synced = self.synced.lock();
        let waiters = std::mem::take(&mut synced.waiters);
        drop(synced);
        for waiter in waiters {
            waiter.unpark();
        }
    }

    pub(crate) fn start_scavenger(self: &Arc<Self>) {
        if self.disable_purge {
            return;
        }
        self.purge_done.store(false, Ordering::SeqCst);
        let (sender, receiver) = bounded(1);
        *self.scavenger.lock().unwrap() = Some(sender);
        let pool = self.clone();
        std::thread::Builder::new()
            .name("workpool-purge".to_owned())
            .spawn(move || pool.purge_loop(receiver))
            .expect("Spawning the scavenger thread failed");
    }

    fn stop_scavenger(&self) {
        // Dropping the sender disconnects the channel the purge loop sleeps
        // on, ending it without waiting for the next tick.
        self.scavenger.lock().unwrap().take();
    }

    /// Body of the scavenger thread: purges expired idle workers once per
    /// expiry interval, for the lifetime of an open pool.
    fn purge_loop(&self, stop: Receiver<()>) {
        loop {
            match stop.recv_timeout(self.expiry) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
            if self.is_closed() {
                break;
            }
            self.purge_stale_workers();
        }
        self.purge_done.store(true, Ordering::SeqCst);
    }

    fn purge_stale_workers(&self) {
        let mut synced = self.synced.lock();
        let stale = synced.queue.evict_older_than(self.expiry, Instant::now());
        drop(synced);

        // Sentinels go out after the lock is dropped: a channel send must
        // never stall queue operations on other threads.
        for worker in &stale {
            worker.handle.stop();
        }
        if !stale.is_empty() {
            log_debug!("[scavenger] evicted {} expired workers", stale.len());
        }

        // Submitters may be stuck waiting after every worker was reaped, or
        // after a capacity increase freed slots.
        if self.running_count() == 0 || (self.waiting_count() > 0 && self.free_count() > 0) {
            self.broadcast();
        }
    }
}

/// Extracts a printable message from a panic payload.
#[cfg(feature = "log")]
fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("opaque panic payload")
}

/// The idle-worker queue and the submitter wait list, guarded by the queue
/// lock strategy.
struct Synced<T: Send + 'static> {
    lock: Box<dyn Lock>,
    state: UnsafeCell<SyncedState<T>>,
}

struct SyncedState<T: Send + 'static> {
    queue: Box<dyn IdleQueue<T>>,
    /// Blocked submitters, in arrival order. Waiters push here under the
    /// lock before parking; wakers pop and unpark outside the lock.
    waiters: VecDeque<Unparker>,
}

impl<T: Send + 'static> Synced<T> {
    fn new(lock: Box<dyn Lock>, queue: Box<dyn IdleQueue<T>>) -> Self {
        Self {
            lock,
            state: UnsafeCell::new(SyncedState {
                queue,
                waiters: VecDeque::new(),
            }),
        }
    }

    fn lock(&self) -> SyncedGuard<'_, T> {
        self.lock.acquire();
        SyncedGuard { synced: self }
    }
}

// SAFETY: all access to `state` goes through `SyncedGuard`, which holds the
// lock for its whole lifetime; the `Lock` safety contract guarantees mutual
// exclusion between guards. The contained state is `Send`.
unsafe impl<T: Send + 'static> Sync for Synced<T> {}

/// Proof of holding the queue lock, granting access to [`SyncedState`].
struct SyncedGuard<'a, T: Send + 'static> {
    synced: &'a Synced<T>,
}

impl<T: Send + 'static> std::ops::Deref for SyncedGuard<'_, T> {
    type Target = SyncedState<T>;

    fn deref(&self) -> &SyncedState<T> {
        // SAFETY: this guard holds the queue lock (acquired in
        // `Synced::lock()`, released in `drop()`), so no other thread
        // accesses the state concurrently.
        unsafe { &*self.synced.state.get() }
    }
}

impl<T: Send + 'static> std::ops::DerefMut for SyncedGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut SyncedState<T> {
        // SAFETY: same as `deref()`.
        unsafe { &mut *self.synced.state.get() }
    }
}

impl<T: Send + 'static> Drop for SyncedGuard<'_, T> {
    fn drop(&mut self) {
        self.synced.lock.release();
    }
}
