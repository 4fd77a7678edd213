//! Event-based actor behaviors.
//!
//! A scheduled actor is a state machine: the scheduler feeds it one
//! dequeued message per invocation and acts on the returned [`React`].
//! Between invocations the actor holds no stack, which is what lets an
//! unbounded number of actors share a fixed worker pool.
//!
//! Handlers run with the actor installed as the thread's current context,
//! so the free functions in [`context`](crate::context) — `reply`, `send`,
//! `spawn`, `link`, … — all work from inside [`Behavior::react`].

use crate::actor::ExitReason;
use crate::message::Envelope;

/// Outcome of offering one message to a behavior.
pub enum React {
    /// The message was consumed; keep the current behavior.
    Done,
    /// The message was rejected: hand it back so it stays in the mailbox
    /// (selective receive). The actor sees it again after its behavior
    /// changes, or not at all if it never does.
    Skipped(Envelope),
    /// The message was consumed and the actor switches behavior. Skipped
    /// messages are replayed to the new behavior in arrival order.
    Become(Box<dyn Behavior>),
    /// The message was consumed and the actor terminates with the given
    /// reason.
    Quit(ExitReason),
}

/// An event-based actor implementation.
pub trait Behavior: Send + 'static {
    /// Runs after the actor is registered, before its first message.
    fn on_start(&mut self) {}

    /// Handle one dequeued message.
    fn react(&mut self, env: Envelope) -> React;
}

/// Closures are behaviors: `FnMut(Envelope) -> React`.
impl<F> Behavior for F
where
    F: FnMut(Envelope) -> React + Send + 'static,
{
    fn react(&mut self, env: Envelope) -> React {
        self(env)
    }
}

// ── Tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msg;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn closures_are_behaviors() {
        let seen = Arc::new(AtomicUsize::new(0));
        {
            let seen = Arc::clone(&seen);
            let mut b = move |env: Envelope| {
                if env.payload.value::<i32>(0).is_some() {
                    seen.fetch_add(1, Ordering::SeqCst);
                    React::Done
                } else {
                    React::Skipped(env)
                }
            };
            let consumed = matches!(b.react(Envelope::new(None, msg!(1_i32))), React::Done);
            assert!(consumed);
            let skipped = matches!(
                b.react(Envelope::new(None, msg!("s".to_string()))),
                React::Skipped(_)
            );
            assert!(skipped);
        }
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
