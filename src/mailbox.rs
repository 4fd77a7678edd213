//! Per-actor FIFO mailbox.
//!
//! One mailbox per actor: any thread may enqueue, only the actor's current
//! executor dequeues. Enqueue never blocks (beyond the queue mutex) and
//! never fails; sending to a terminated actor is legal and silently
//! dropped once the mailbox has been closed.
//!
//! Dequeue comes in blocking, non-blocking, deadline-bounded, and
//! pattern-matched flavors. Pattern-matched dequeue implements selective
//! receive: envelopes are offered to the matcher in arrival order, rejected
//! envelopes are parked in a per-call skip buffer, and on a match the skip
//! buffer is spliced back ahead of the remaining queue so the mailbox stays
//! a single arrival-ordered sequence.
//!
//! The mailbox also owns the *current message* slot: every successful
//! dequeue installs the consumed envelope as [`last_dequeued`], which is
//! what `reply` targets. The slot is stable until the next dequeue.
//!
//! [`last_dequeued`]: Mailbox::last_dequeued

use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::{Condvar, Mutex, MutexGuard};

use crate::clock::Instant;
use crate::message::Envelope;
use crate::scheduler::{MESSAGES_RECEIVED, MESSAGES_SENT};

/// Matcher callback for selective receive: consume the envelope (including
/// any handling side effects) and return `true`, or reject it with `false`
/// to leave it in the mailbox.
pub type MatchRules<'a> = dyn FnMut(&Envelope) -> bool + 'a;

/// FIFO queue of envelopes with a condvar for blocking consumers.
pub struct Mailbox {
    queue: Mutex<Queue>,
    not_empty: Condvar,
}

struct Queue {
    items: VecDeque<Envelope>,
    last_dequeued: Option<Envelope>,
    /// Bumped on every enqueue, never on requeue. Lets the scheduler tell
    /// "new messages arrived" apart from "only skipped messages remain".
    enqueue_seq: u64,
    closed: bool,
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new()
    }
}

impl Mailbox {
    /// Create an empty, open mailbox.
    #[must_use]
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(Queue {
                items: VecDeque::new(),
                last_dequeued: None,
                enqueue_seq: 0,
                closed: false,
            }),
            not_empty: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, Queue>) -> MutexGuard<'a, Queue> {
        self.not_empty
            .wait(guard)
            .unwrap_or_else(|e| e.into_inner())
    }

    // ── Producer side ───────────────────────────────────────────────────

    /// Append an envelope. Callable from any thread; never blocks beyond
    /// the queue mutex. Enqueues into a closed mailbox are dropped.
    pub fn enqueue(&self, env: Envelope) {
        let mut q = self.lock();
        if q.closed {
            return;
        }
        q.items.push_back(env);
        q.enqueue_seq += 1;
        drop(q);
        MESSAGES_SENT.fetch_add(1, Ordering::Relaxed);
        self.not_empty.notify_one();
    }

    /// Splice envelopes back ahead of the current queue contents,
    /// preserving their order. Used to merge a skip buffer back; does not
    /// bump the enqueue sequence and does not wake anyone.
    pub fn requeue_front(&self, items: Vec<Envelope>) {
        if items.is_empty() {
            return;
        }
        let mut q = self.lock();
        for env in items.into_iter().rev() {
            q.items.push_front(env);
        }
    }

    // ── Consumer side ───────────────────────────────────────────────────

    /// Block until a message is available, dequeue it, and install it as
    /// the current message.
    pub fn dequeue(&self) -> Envelope {
        let mut q = self.lock();
        loop {
            if let Some(env) = q.items.pop_front() {
                return Self::consume(&mut q, env);
            }
            q = self.wait(q);
        }
    }

    /// Dequeue the next message if one is available.
    pub fn try_dequeue(&self) -> Option<Envelope> {
        let mut q = self.lock();
        let env = q.items.pop_front()?;
        Some(Self::consume(&mut q, env))
    }

    /// Block at most until `deadline` on the monotonic clock.
    pub fn try_dequeue_until(&self, deadline: Instant) -> Option<Envelope> {
        let mut q = self.lock();
        loop {
            if let Some(env) = q.items.pop_front() {
                return Some(Self::consume(&mut q, env));
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, _timeout) = self
                .not_empty
                .wait_timeout(q, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            q = guard;
        }
    }

    /// Selective receive: scan messages in arrival order, offering each to
    /// `rules`; block until one is consumed. Rejected messages are retained
    /// and spliced back in order before this returns.
    pub fn dequeue_matching(&self, rules: &mut MatchRules<'_>) {
        let mut skipped = Vec::new();
        loop {
            let env = {
                let mut q = self.lock();
                loop {
                    if let Some(env) = q.items.pop_front() {
                        break env;
                    }
                    q = self.wait(q);
                }
            };
            if self.offer(rules, env, &mut skipped) {
                break;
            }
        }
        self.requeue_front(skipped);
    }

    /// Non-blocking selective receive. Returns `true` if `rules` consumed
    /// a message; on `false` every scanned message is back in the mailbox.
    pub fn try_dequeue_matching(&self, rules: &mut MatchRules<'_>) -> bool {
        let mut skipped = Vec::new();
        let matched = loop {
            let Some(env) = ({
                let mut q = self.lock();
                q.items.pop_front()
            }) else {
                break false;
            };
            if self.offer(rules, env, &mut skipped) {
                break true;
            }
        };
        self.requeue_front(skipped);
        matched
    }

    /// The most recently consumed envelope. Stable until the next dequeue.
    #[must_use]
    pub fn last_dequeued(&self) -> Option<Envelope> {
        self.lock().last_dequeued.clone()
    }

    /// Reinstall a previously observed current message.
    ///
    /// The receive layer consumes some envelopes internally (normal exit
    /// signals, stale timeouts); those must not disturb the reply context,
    /// so the caller snapshots the slot first and puts it back here.
    pub(crate) fn restore_last_dequeued(&self, prev: Option<Envelope>) {
        self.lock().last_dequeued = prev;
    }

    /// Install `env` as the current message and offer it to `rules`.
    ///
    /// On consume the installation sticks and `true` is returned. On
    /// reject the previous current message is restored and `env` joins the
    /// skip buffer. The lock is not held while `rules` runs: handlers may
    /// send, spawn, or read `last_dequeued` through this same mailbox.
    fn offer(
        &self,
        rules: &mut MatchRules<'_>,
        env: Envelope,
        skipped: &mut Vec<Envelope>,
    ) -> bool {
        let prev = self.lock().last_dequeued.replace(env.clone());
        if rules(&env) {
            MESSAGES_RECEIVED.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            self.lock().last_dequeued = prev;
            skipped.push(env);
            false
        }
    }

    fn consume(q: &mut Queue, env: Envelope) -> Envelope {
        q.last_dequeued = Some(env.clone());
        MESSAGES_RECEIVED.fetch_add(1, Ordering::Relaxed);
        env
    }

    // ── Queries ─────────────────────────────────────────────────────────

    /// Number of queued messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    /// `true` if no messages are queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    /// `true` if at least one message is queued.
    #[must_use]
    pub fn has_messages(&self) -> bool {
        !self.is_empty()
    }

    /// Total number of enqueues so far (requeues excluded).
    #[must_use]
    pub fn enqueue_seq(&self) -> u64 {
        self.lock().enqueue_seq
    }

    /// Close the mailbox: drop queued messages and reject future enqueues.
    /// Called when the owning actor terminates.
    pub(crate) fn close(&self) {
        let mut q = self.lock();
        q.closed = true;
        q.items.clear();
        drop(q);
        self.not_empty.notify_all();
    }
}

impl std::fmt::Debug for Mailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let q = self.lock();
        f.debug_struct("Mailbox")
            .field("len", &q.items.len())
            .field("enqueue_seq", &q.enqueue_seq)
            .field("closed", &q.closed)
            .finish()
    }
}

// ── Tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock;
    use crate::msg;
    use std::time::Duration;

    fn int_env(n: i32) -> Envelope {
        Envelope::new(None, msg!(n))
    }

    fn str_env(s: &str) -> Envelope {
        Envelope::new(None, msg!(s.to_string()))
    }

    fn int_of(env: &Envelope) -> Option<i32> {
        env.payload.value::<i32>(0).copied()
    }

    #[test]
    fn fifo_order() {
        let mb = Mailbox::new();
        for n in 0..5 {
            mb.enqueue(int_env(n));
        }
        for n in 0..5 {
            assert_eq!(int_of(&mb.dequeue()), Some(n));
        }
    }

    #[test]
    fn try_dequeue_empty_returns_none() {
        let mb = Mailbox::new();
        assert!(mb.try_dequeue().is_none());
        assert!(mb.is_empty());
    }

    #[test]
    fn last_dequeued_is_stable_between_dequeues() {
        let mb = Mailbox::new();
        mb.enqueue(int_env(1));
        mb.enqueue(int_env(2));

        assert!(mb.last_dequeued().is_none());
        mb.dequeue();
        let first = mb.last_dequeued().expect("slot installed");
        assert_eq!(int_of(&first), Some(1));
        // Still 1 until the next dequeue.
        assert_eq!(int_of(&mb.last_dequeued().unwrap()), Some(1));
        mb.dequeue();
        assert_eq!(int_of(&mb.last_dequeued().unwrap()), Some(2));
    }

    #[test]
    fn selective_receive_preserves_order_across_types() {
        let mb = Mailbox::new();
        mb.enqueue(int_env(1));
        mb.enqueue(str_env("a"));
        mb.enqueue(int_env(2));
        mb.enqueue(str_env("b"));

        let got: std::cell::Cell<Option<i32>> = std::cell::Cell::new(None);
        let mut int_rule = |env: &Envelope| match int_of(env) {
            Some(n) => {
                got.set(Some(n));
                true
            }
            None => false,
        };
        assert!(mb.try_dequeue_matching(&mut int_rule));
        assert_eq!(got.get(), Some(1));
        assert!(mb.try_dequeue_matching(&mut int_rule));
        assert_eq!(got.get(), Some(2));

        // Strings were skipped twice but kept their order.
        let got_str: std::cell::RefCell<Option<String>> = std::cell::RefCell::new(None);
        let mut str_rule = |env: &Envelope| match env.payload.value::<String>(0) {
            Some(s) => {
                *got_str.borrow_mut() = Some(s.clone());
                true
            }
            None => false,
        };
        assert!(mb.try_dequeue_matching(&mut str_rule));
        assert_eq!(got_str.borrow().as_deref(), Some("a"));
        assert!(mb.try_dequeue_matching(&mut str_rule));
        assert_eq!(got_str.borrow().as_deref(), Some("b"));
        assert!(mb.is_empty());
    }

    #[test]
    fn unmatched_messages_are_never_lost() {
        let mb = Mailbox::new();
        mb.enqueue(str_env("x"));
        mb.enqueue(str_env("y"));

        let mut never = |env: &Envelope| int_of(env).is_some();
        assert!(!mb.try_dequeue_matching(&mut never));
        // Both skipped messages are back, in order.
        assert_eq!(mb.len(), 2);
        assert_eq!(
            mb.dequeue().payload.value::<String>(0).map(String::as_str),
            Some("x")
        );
        assert_eq!(
            mb.dequeue().payload.value::<String>(0).map(String::as_str),
            Some("y")
        );
    }

    #[test]
    fn reject_restores_previous_current_message() {
        let mb = Mailbox::new();
        mb.enqueue(int_env(7));
        mb.dequeue();
        assert_eq!(int_of(&mb.last_dequeued().unwrap()), Some(7));

        mb.enqueue(str_env("nope"));
        let mut int_rule = |env: &Envelope| int_of(env).is_some();
        assert!(!mb.try_dequeue_matching(&mut int_rule));
        // The rejected scan must not clobber the reply context.
        assert_eq!(int_of(&mb.last_dequeued().unwrap()), Some(7));
    }

    #[test]
    fn dequeue_matching_blocks_until_match() {
        use std::sync::Arc;
        let mb = Arc::new(Mailbox::new());
        mb.enqueue(str_env("noise"));

        let producer = {
            let mb = Arc::clone(&mb);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(30));
                mb.enqueue(int_env(99));
            })
        };

        let mut got = None;
        let mut rule = |env: &Envelope| match int_of(env) {
            Some(n) => {
                got = Some(n);
                true
            }
            None => false,
        };
        mb.dequeue_matching(&mut rule);
        assert_eq!(got, Some(99));
        // The noise message survived the selective receive.
        assert_eq!(mb.len(), 1);
        producer.join().expect("producer thread panicked");
    }

    #[test]
    fn try_dequeue_until_times_out() {
        let mb = Mailbox::new();
        let t0 = clock::now();
        let deadline = clock::after(Duration::from_millis(40));
        assert!(mb.try_dequeue_until(deadline).is_none());
        assert!(clock::now() - t0 >= Duration::from_millis(40));
    }

    #[test]
    fn try_dequeue_until_returns_early_on_message() {
        let mb = Mailbox::new();
        mb.enqueue(int_env(3));
        let deadline = clock::after(Duration::from_secs(10));
        let env = mb.try_dequeue_until(deadline).expect("message available");
        assert_eq!(int_of(&env), Some(3));
    }

    #[test]
    fn requeue_front_preserves_order() {
        let mb = Mailbox::new();
        mb.enqueue(int_env(3));
        let seq = mb.enqueue_seq();
        mb.requeue_front(vec![int_env(1), int_env(2)]);
        // Requeue does not count as an enqueue.
        assert_eq!(mb.enqueue_seq(), seq);
        assert_eq!(int_of(&mb.dequeue()), Some(1));
        assert_eq!(int_of(&mb.dequeue()), Some(2));
        assert_eq!(int_of(&mb.dequeue()), Some(3));
    }

    #[test]
    fn enqueue_seq_counts_enqueues() {
        let mb = Mailbox::new();
        assert_eq!(mb.enqueue_seq(), 0);
        mb.enqueue(int_env(1));
        mb.enqueue(int_env(2));
        assert_eq!(mb.enqueue_seq(), 2);
        mb.dequeue();
        assert_eq!(mb.enqueue_seq(), 2);
    }

    #[test]
    fn closed_mailbox_drops_enqueues() {
        let mb = Mailbox::new();
        mb.enqueue(int_env(1));
        mb.close();
        assert!(mb.is_empty());
        mb.enqueue(int_env(2));
        assert!(mb.is_empty());
        assert!(mb.try_dequeue().is_none());
    }
}
