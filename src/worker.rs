// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The worker execution context: one thread per worker, receiving tasks over
//! a channel and parking back into the pool's idle queue between tasks.

use crate::macros::{log_debug, log_error};
use crate::pool::PoolInner;
use crossbeam_channel::{Receiver, Sender};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Message handed to a worker over its task channel.
pub(crate) enum Message<T> {
    /// A task payload to execute.
    Task(T),
    /// Sentinel telling the worker to exit instead of parking again.
    Stop,
}

/// The pool-side handle to a worker: the sending half of its task channel.
///
/// A worker is reachable from exactly one place at a time — a submitter that
/// detached it, the idle queue, or nowhere once it has exited — so at most
/// one task is ever in flight per worker.
pub(crate) struct WorkerHandle<T> {
    tasks: Sender<Message<T>>,
}

// Not derived, to avoid the spurious `T: Clone` bound.
impl<T> Clone for WorkerHandle<T> {
    fn clone(&self) -> Self {
        Self {
            tasks: self.tasks.clone(),
        }
    }
}

impl<T> WorkerHandle<T> {
    pub fn new(tasks: Sender<Message<T>>) -> Self {
        Self { tasks }
    }

    /// Hands a task to the worker. The worker is parked in a `recv()` call
    /// whenever it is reachable from the pool, so this doesn't block.
    pub fn send_task(&self, task: T) {
        if self.tasks.send(Message::Task(task)).is_err() {
            log_error!("[pool] task handed to a worker that already exited");
        }
    }

    /// Tells the worker to exit. The worker may already be gone, in which
    /// case there is nothing to do.
    pub fn stop(&self) {
        let _ = self.tasks.send(Message::Stop);
    }
}

/// Main loop of a worker thread.
///
/// Runs tasks one at a time, parking back into the pool's idle queue after
/// each successful task. Exits on the [`Message::Stop`] sentinel, when the
/// pool refuses to take the worker back (closed or shrunk), or after a task
/// panic.
pub(crate) fn run<T: Send + 'static>(
    pool: Arc<PoolInner<T>>,
    tasks: Receiver<Message<T>>,
    handle: WorkerHandle<T>,
) {
    // The running count must be decremented on every exit path, including a
    // panic escaping the panic handler itself, so the accounting lives in a
    // drop guard.
    let _exit = ExitGuard { pool: &pool };

    loop {
        match tasks.recv() {
            Ok(Message::Task(task)) => {
                let result = panic::catch_unwind(AssertUnwindSafe(|| pool.run_task(task)));
                if let Err(payload) = result {
                    pool.handle_task_panic(payload);
                    // A panicked worker never returns to the idle queue.
                    return;
                }
                if !pool.revert_worker(&handle) {
                    log_debug!("[worker] pool refused the revert, exiting");
                    return;
                }
            }
            Ok(Message::Stop) | Err(_) => return,
        }
    }
}

/// Decrements the pool's running count and wakes one blocked submitter when
/// the owning worker thread exits, whatever the exit path.
struct ExitGuard<'a, T: Send + 'static> {
    pool: &'a Arc<PoolInner<T>>,
}

impl<T: Send + 'static> Drop for ExitGuard<'_, T> {
    fn drop(&mut self) {
        self.pool.worker_exited();
    }
}
