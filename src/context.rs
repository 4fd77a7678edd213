//! The current-actor context and the public messaging operations.
//!
//! Every thread that executes actor code carries the current actor in a
//! thread-local slot: worker threads install it for the duration of a
//! scheduling quantum, detached actor threads for their whole lifetime.
//! A plain thread that first touches the actor API is *converted* — it
//! gets its own counted actor context, so `receive`, `reply`, and
//! `await_all_others_done` work from `main` exactly as they do inside a
//! spawned actor.
//!
//! The operations here are free functions acting on the current actor:
//! `send`, `reply`, the `receive` family, `link`/`unlink`/`quit`, and
//! quiescence.

use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, trace};

use crate::actor::{self, ActorRef, ExitReason, ExitUnwind};
use crate::channel::Channel;
use crate::clock::Duration;
use crate::message::{Envelope, Tuple};
use crate::registry::{self, HiddenContext};
use crate::scheduler;
use crate::timed;

thread_local! {
    static CURRENT: RefCell<Option<ActorRef>> = const { RefCell::new(None) };
    /// Present only on converted (non-spawned) threads; terminates the
    /// context when the thread dies.
    static CONVERTED: RefCell<Option<ConvertedGuard>> = const { RefCell::new(None) };
}

struct ConvertedGuard(ActorRef);

impl Drop for ConvertedGuard {
    fn drop(&mut self) {
        actor::terminate(&self.0, ExitReason::NORMAL);
    }
}

/// Install `next` as the current actor, returning the previous one.
/// Used by executors around a quantum or a detached actor body.
pub(crate) fn swap_current(next: Option<ActorRef>) -> Option<ActorRef> {
    CURRENT.with(|c| c.replace(next))
}

/// The current actor, without converting the calling thread.
pub(crate) fn current_unchecked() -> Option<ActorRef> {
    CURRENT.with(|c| c.borrow().clone())
}

/// The calling context's own actor reference.
///
/// On a thread not yet backed by an actor, this converts the thread: a
/// counted actor context is created that lives (and occupies the actor
/// count) until the thread exits.
pub fn self_ref() -> ActorRef {
    if let Some(actor) = current_unchecked() {
        return actor;
    }
    let actor = scheduler::register_converted_context();
    CURRENT.with(|c| *c.borrow_mut() = Some(actor.clone()));
    CONVERTED.with(|c| *c.borrow_mut() = Some(ConvertedGuard(actor.clone())));
    actor
}

// ── Sending ─────────────────────────────────────────────────────────────

/// Send `payload` to any channel, with the caller as sender.
pub fn send<C: Channel + ?Sized>(to: &C, payload: Tuple) {
    let from = self_ref();
    to.enqueue(Envelope::new(Some(from), payload));
}

/// Send `payload` to the sender of [`last_received`].
///
/// The reply target was frozen when that message was dequeued, so replies
/// stay correct even while further sends race into the mailbox. Replying
/// with no current message, or to a message without a sender, is a no-op.
pub fn reply(payload: Tuple) {
    let me = self_ref();
    let Some(last) = me.cell.mailbox.last_dequeued() else {
        debug!("reply without a current message dropped");
        return;
    };
    let Some(target) = last.sender else {
        debug!("reply to a sender-less message dropped");
        return;
    };
    let env = match last.response_id {
        Some(id) => Envelope::with_response(Some(me.clone()), payload, id),
        None => Envelope::new(Some(me.clone()), payload),
    };
    target.deliver(env);
}

/// The most recently dequeued envelope, stable until the next dequeue.
#[must_use]
pub fn last_received() -> Option<Envelope> {
    self_ref().cell.mailbox.last_dequeued()
}

// ── Receiving ───────────────────────────────────────────────────────────

enum Filtered {
    /// Hand the envelope to the caller.
    Deliver,
    /// Runtime-internal message (normal exit, stale timeout): drop it and
    /// keep receiving.
    Swallow,
}

/// Default handling for runtime-internal envelopes on the blocking
/// receive path. Diverges (terminating the actor) on a non-normal exit
/// signal when the actor is not trapping exits.
fn filter(me: &ActorRef, env: &Envelope) -> Filtered {
    if timed::parse_timeout(env).is_some() {
        // A timeout for a receive that already completed.
        return Filtered::Swallow;
    }
    if me.cell.traps_exits() {
        return Filtered::Deliver;
    }
    match actor::parse_exit(env) {
        Some((_, reason)) if reason.is_normal() => Filtered::Swallow,
        Some((from, reason)) => {
            trace!("actor {} terminating via link to {from}", me.id());
            quit(reason);
        }
        None => Filtered::Deliver,
    }
}

/// Block until a message is available and dequeue it.
///
/// Exit signals are handled transparently unless the actor traps exits:
/// normal exits are discarded, any other exit reason terminates the
/// caller. A swallowed envelope does not disturb the reply context: the
/// previous current message is put back.
pub fn receive() -> Envelope {
    let me = self_ref();
    loop {
        let prev = me.cell.mailbox.last_dequeued();
        let env = me.cell.mailbox.dequeue();
        match filter(&me, &env) {
            Filtered::Deliver => return env,
            Filtered::Swallow => me.cell.mailbox.restore_last_dequeued(prev),
        }
    }
}

/// Dequeue the next message if one is immediately available.
pub fn try_receive() -> Option<Envelope> {
    let me = self_ref();
    loop {
        let prev = me.cell.mailbox.last_dequeued();
        let env = me.cell.mailbox.try_dequeue()?;
        match filter(&me, &env) {
            Filtered::Deliver => return Some(env),
            Filtered::Swallow => me.cell.mailbox.restore_last_dequeued(prev),
        }
    }
}

/// Selective receive: block until `rules` consumes a message.
///
/// Messages are offered in arrival order; rejected messages stay in the
/// mailbox ahead of anything newer.
pub fn receive_matching<F>(mut rules: F)
where
    F: FnMut(&Envelope) -> bool,
{
    let me = self_ref();
    loop {
        let prev = me.cell.mailbox.last_dequeued();
        let mut swallowed = false;
        let mut wrapped = |env: &Envelope| match filter(&me, env) {
            Filtered::Swallow => {
                swallowed = true;
                true
            }
            Filtered::Deliver => rules(env),
        };
        me.cell.mailbox.dequeue_matching(&mut wrapped);
        if !swallowed {
            return;
        }
        me.cell.mailbox.restore_last_dequeued(prev);
    }
}

/// Non-blocking selective receive. Returns `true` if `rules` consumed a
/// message.
pub fn try_receive_matching<F>(mut rules: F) -> bool
where
    F: FnMut(&Envelope) -> bool,
{
    let me = self_ref();
    loop {
        let prev = me.cell.mailbox.last_dequeued();
        let mut swallowed = false;
        let mut wrapped = |env: &Envelope| match filter(&me, env) {
            Filtered::Swallow => {
                swallowed = true;
                true
            }
            Filtered::Deliver => rules(env),
        };
        let matched = me.cell.mailbox.try_dequeue_matching(&mut wrapped);
        if !matched {
            return false;
        }
        if !swallowed {
            return true;
        }
        me.cell.mailbox.restore_last_dequeued(prev);
    }
}

static TIMEOUT_TOKENS: AtomicU64 = AtomicU64::new(1);

/// Selective receive bounded by `timeout`.
///
/// Returns `true` if `rules` consumed a message, `false` on timeout. The
/// timeout is implemented as a distinguished self-send scheduled through
/// the time emitter; timeouts from abandoned receives are ignored. A
/// timed-out receive leaves the reply context untouched: `reply` still
/// targets the sender of the last message `rules` (or a plain receive)
/// actually consumed.
pub fn receive_for<F>(mut rules: F, timeout: Duration) -> bool
where
    F: FnMut(&Envelope) -> bool,
{
    let me = self_ref();
    let token = TIMEOUT_TOKENS.fetch_add(1, Ordering::Relaxed);
    timed::schedule_timeout(timeout, token);

    let mut timed_out = false;
    loop {
        let prev = me.cell.mailbox.last_dequeued();
        let mut swallowed = false;
        let mut wrapped = |env: &Envelope| {
            if timed::parse_timeout(env) == Some(token) {
                timed_out = true;
                return true;
            }
            match filter(&me, env) {
                Filtered::Swallow => {
                    swallowed = true;
                    true
                }
                Filtered::Deliver => rules(env),
            }
        };
        me.cell.mailbox.dequeue_matching(&mut wrapped);
        if timed_out || swallowed {
            // The consumed envelope was an internal sentinel, not a real
            // dequeue.
            me.cell.mailbox.restore_last_dequeued(prev);
        }
        if timed_out || !swallowed {
            break;
        }
    }
    !timed_out
}

// ── Lifecycle ───────────────────────────────────────────────────────────

/// Symmetrically link the caller to `other`.
///
/// If `other` has already terminated, the caller immediately receives its
/// exit signal instead.
pub fn link(other: &ActorRef) {
    let me = self_ref();
    actor::link_cells(&me, other);
}

/// Symmetrically remove the link between the caller and `other`.
pub fn unlink(other: &ActorRef) {
    let me = self_ref();
    actor::unlink_cells(&me, other);
}

/// Control whether the caller receives exit signals as ordinary messages
/// instead of the default die-with-the-peer handling.
pub fn trap_exits(on: bool) {
    self_ref().cell.set_trap_exits(on);
}

/// Terminate the calling actor with `reason`.
///
/// Unwinds out of the current actor body; the executor records `reason`,
/// notifies linked peers and attached observers, and moves on. Inside
/// event-based behaviors, returning [`React::Quit`] is the gentler
/// equivalent.
///
/// [`React::Quit`]: crate::behavior::React::Quit
pub fn quit(reason: ExitReason) -> ! {
    let _ = self_ref();
    std::panic::panic_any(ExitUnwind(reason));
}

// ── Quiescence ──────────────────────────────────────────────────────────

/// Block until every counted actor other than the caller (and any
/// registered hidden contexts) has terminated.
pub fn await_all_others_done() {
    let baseline = registry::hidden_contexts()
        + match current_unchecked() {
            Some(me) if !me.cell.is_hidden() => 1,
            _ => 0,
        };
    trace!("awaiting quiescence at baseline {baseline}");
    registry::wait_for_actor_count(baseline);
}

/// Register a thread that is not an actor but must be visible to
/// [`await_all_others_done`] (e.g. an external event loop). Dropping the
/// guard deregisters it.
#[must_use]
pub fn register_hidden_context() -> HiddenContext {
    HiddenContext::new()
}

// ── Tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::{ActorCell, ActorState};
    use crate::msg;
    use crate::scheduler::Hint;

    fn fresh_ref() -> ActorRef {
        let actor = ActorRef {
            cell: ActorCell::new(Hint::DetachedHidden, None),
        };
        actor.cell.set_state(ActorState::Executing);
        actor
    }

    #[test]
    fn swap_current_round_trips() {
        let a = fresh_ref();
        let prev = swap_current(Some(a.clone()));
        assert!(prev.is_none());
        assert_eq!(current_unchecked().map(|r| r.id()), Some(a.id()));
        let back = swap_current(prev);
        assert_eq!(back.map(|r| r.id()), Some(a.id()));
        assert!(current_unchecked().is_none());
    }

    #[test]
    fn self_ref_is_stable_within_a_thread() {
        let a = fresh_ref();
        let prev = swap_current(Some(a.clone()));
        assert_eq!(self_ref().id(), a.id());
        assert_eq!(self_ref().id(), a.id());
        swap_current(prev);
    }

    #[test]
    fn reply_targets_the_frozen_sender() {
        let me = fresh_ref();
        let peer = fresh_ref();
        let prev = swap_current(Some(me.clone()));

        me.cell
            .mailbox
            .enqueue(Envelope::new(Some(peer.clone()), msg!(1_i32)));
        let env = me.cell.mailbox.dequeue();
        assert_eq!(env.sender.as_ref().map(ActorRef::id), Some(peer.id()));

        // More traffic lands after the dequeue; the reply still goes to
        // the frozen sender.
        me.cell.mailbox.enqueue(Envelope::new(None, msg!(2_i32)));
        reply(msg!("pong".to_string()));

        let got = peer.cell.mailbox.try_dequeue().expect("reply delivered");
        assert_eq!(
            got.payload.value::<String>(0).map(String::as_str),
            Some("pong")
        );
        assert_eq!(got.sender.map(|r| r.id()), Some(me.id()));
        swap_current(prev);
    }

    #[test]
    fn reply_without_current_message_is_a_noop() {
        let me = fresh_ref();
        let prev = swap_current(Some(me.clone()));
        reply(msg!(1_i32)); // must not panic
        swap_current(prev);
    }

    #[test]
    fn reply_carries_the_response_id() {
        use crate::message::ResponseId;
        let me = fresh_ref();
        let peer = fresh_ref();
        let prev = swap_current(Some(me.clone()));

        let id = ResponseId::fresh();
        me.cell
            .mailbox
            .enqueue(Envelope::with_response(Some(peer.clone()), msg!(1_i32), id));
        me.cell.mailbox.dequeue();
        reply(msg!(2_i32));

        let got = peer.cell.mailbox.try_dequeue().expect("reply delivered");
        assert_eq!(got.response_id, Some(id));
        swap_current(prev);
    }

    #[test]
    fn try_receive_on_empty_mailbox() {
        let me = fresh_ref();
        let prev = swap_current(Some(me.clone()));
        assert!(try_receive().is_none());
        swap_current(prev);
    }

    #[test]
    fn swallowed_exit_does_not_clobber_the_reply_context() {
        let me = fresh_ref();
        let peer = fresh_ref();
        let gone = fresh_ref();
        let prev = swap_current(Some(me.clone()));

        // A real message installs the reply context.
        me.cell
            .mailbox
            .enqueue(Envelope::new(Some(peer.clone()), msg!(1_i32)));
        me.cell.mailbox.dequeue();

        // A normal exit signal arrives and is swallowed; the mailbox is
        // then empty again.
        me.cell
            .mailbox
            .enqueue(actor::exit_envelope(&gone, ExitReason::NORMAL));
        assert!(try_receive().is_none());

        // The reply still targets the frozen sender of the real message.
        reply(msg!("pong".to_string()));
        let got = peer.cell.mailbox.try_dequeue().expect("reply delivered");
        assert_eq!(
            got.payload.value::<String>(0).map(String::as_str),
            Some("pong")
        );
        swap_current(prev);
    }

    #[test]
    fn swallowed_exit_in_selective_receive_keeps_the_reply_context() {
        let me = fresh_ref();
        let peer = fresh_ref();
        let gone = fresh_ref();
        let prev = swap_current(Some(me.clone()));

        me.cell
            .mailbox
            .enqueue(Envelope::new(Some(peer.clone()), msg!(7_i32)));
        me.cell.mailbox.dequeue();

        me.cell
            .mailbox
            .enqueue(actor::exit_envelope(&gone, ExitReason::NORMAL));
        assert!(!try_receive_matching(|_env| false));

        let last = last_received().expect("reply context intact");
        assert_eq!(last.sender.map(|r| r.id()), Some(peer.id()));
        assert_eq!(last.payload.value::<i32>(0), Some(&7));
        swap_current(prev);
    }

    #[test]
    fn receive_swallows_normal_exit_signals() {
        let me = fresh_ref();
        let peer = fresh_ref();
        let prev = swap_current(Some(me.clone()));

        me.cell
            .mailbox
            .enqueue(actor::exit_envelope(&peer, ExitReason::NORMAL));
        me.cell.mailbox.enqueue(Envelope::new(None, msg!(7_i32)));

        let env = receive();
        assert_eq!(env.payload.value::<i32>(0), Some(&7));
        swap_current(prev);
    }

    #[test]
    fn trapping_context_receives_exit_signals() {
        let me = fresh_ref();
        let peer = fresh_ref();
        let prev = swap_current(Some(me.clone()));
        trap_exits(true);

        me.cell
            .mailbox
            .enqueue(actor::exit_envelope(&peer, ExitReason::user(2)));
        let env = try_receive().expect("trapped exit delivered");
        let (from, reason) = actor::parse_exit(&env).expect("exit signal");
        assert_eq!(from, peer.id());
        assert_eq!(reason, ExitReason::user(2));

        trap_exits(false);
        swap_current(prev);
    }
}
