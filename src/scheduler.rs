//! Deferred-activation scheduling.
//!
//! Scope restoration and auto-activation wait for the rendering layer to
//! catch up: the element to activate may not be registered until the next
//! frame has mounted it. Rather than hardcoding a timer, the engine takes
//! a [`Scheduler`] at construction. Production hosts hand it a
//! paint-deferred scheduler (drain the queue after layout); tests use
//! [`ImmediateScheduler`] and get synchronous behavior under the same
//! contract.

use parking_lot::Mutex;

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce() + Send>;

/// Deferred execution primitive injected into the engine.
pub trait Scheduler: Send + Sync {
    /// Schedule a task to run later (or immediately, per implementation).
    fn schedule(&self, task: Task);
}

/// Runs every task inline. The test scheduler.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImmediateScheduler;

impl Scheduler for ImmediateScheduler {
    fn schedule(&self, task: Task) {
        task();
    }
}

/// Collects tasks for the host to drain after paint. The production
/// scheduler for frame-driven hosts.
#[derive(Default)]
pub struct QueueScheduler {
    queue: Mutex<Vec<Task>>,
}

impl QueueScheduler {
    /// Create an empty queue scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks waiting to run.
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Run every queued task, returning how many ran. Tasks scheduled
    /// while draining run in the same drain.
    pub fn drain(&self) -> usize {
        let mut ran = 0;
        loop {
            let batch: Vec<Task> = std::mem::take(&mut *self.queue.lock());
            if batch.is_empty() {
                return ran;
            }
            ran += batch.len();
            for task in batch {
                task();
            }
        }
    }
}

impl Scheduler for QueueScheduler {
    fn schedule(&self, task: Task) {
        self.queue.lock().push(task);
    }
}

impl std::fmt::Debug for QueueScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueScheduler")
            .field("pending", &self.pending())
            .finish()
    }
}
