//! Chase-Lev work-stealing deque wrappers for actor scheduling.
//!
//! Wraps [`crossbeam_deque`] to provide the three work-stealing primitives
//! used by the scheduler:
//!
//! - [`WorkDeque`] — per-worker LIFO push/pop (owner thread only).
//! - [`WorkStealer`] — handle for other threads to steal FIFO from a worker.
//! - [`GlobalQueue`] — shared injector queue for external submissions.
//!
//! The queues hold [`ActorRef`]s: a queued reference keeps the control
//! block alive until a worker claims it.

use crossbeam_deque::{Injector, Steal, Stealer, Worker};

use crate::actor::ActorRef;

/// Per-worker work-stealing deque.
///
/// The owning thread pushes and pops from the bottom (LIFO).
/// Other threads steal from the top (FIFO) via [`WorkStealer`].
pub(crate) struct WorkDeque {
    worker: Worker<ActorRef>,
}

/// Handle for stealing from another thread's [`WorkDeque`].
#[derive(Clone)]
pub(crate) struct WorkStealer {
    stealer: Stealer<ActorRef>,
}

/// Global injector queue shared across all worker threads.
///
/// Supports bulk steal into a local [`WorkDeque`].
pub(crate) struct GlobalQueue {
    injector: Injector<ActorRef>,
}

impl WorkDeque {
    /// Creates a new work-stealing deque and its corresponding stealer
    /// handle.
    pub(crate) fn new() -> (Self, WorkStealer) {
        let worker = Worker::new_lifo();
        let stealer = worker.stealer();
        (Self { worker }, WorkStealer { stealer })
    }

    /// Pushes an actor onto the bottom of the deque (owner thread only).
    pub(crate) fn push(&self, actor: ActorRef) {
        self.worker.push(actor);
    }

    /// Pops an actor from the bottom of the deque (owner thread, LIFO).
    pub(crate) fn pop(&self) -> Option<ActorRef> {
        self.worker.pop()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.worker.is_empty()
    }
}

impl WorkStealer {
    /// Steals an actor from the top of the associated deque (FIFO).
    ///
    /// Returns `None` if the deque is empty; contended steals retry.
    pub(crate) fn steal(&self) -> Option<ActorRef> {
        loop {
            match self.stealer.steal() {
                Steal::Success(actor) => return Some(actor),
                Steal::Empty => return None,
                Steal::Retry => {}
            }
        }
    }
}

impl GlobalQueue {
    /// Creates a new global injector queue.
    pub(crate) fn new() -> Self {
        Self {
            injector: Injector::new(),
        }
    }

    /// Pushes an actor into the global queue.
    pub(crate) fn push(&self, actor: ActorRef) {
        self.injector.push(actor);
    }

    /// Steals a batch of work from the global queue into `dest`, returning
    /// one actor immediately.
    pub(crate) fn steal_batch_and_pop(&self, dest: &WorkDeque) -> Option<ActorRef> {
        loop {
            match self.injector.steal_batch_and_pop(&dest.worker) {
                Steal::Success(actor) => return Some(actor),
                Steal::Empty => return None,
                Steal::Retry => {}
            }
        }
    }

    /// Approximate number of queued actors.
    pub(crate) fn len(&self) -> usize {
        self.injector.len()
    }
}

// ── Tests ───────────────────────────────────────────────────────────────
