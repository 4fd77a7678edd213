//! Timed delivery: `delayed_send`, `delayed_reply`, receive timeouts.
//!
//! One hidden, detached actor — the *time emitter* — is the sole consumer
//! of delayed-delivery requests. It keeps pending deliveries in an
//! ordered multimap keyed by `(deadline, insertion-seq)`, so entries with
//! equal deadlines fire in insertion order. The loop alternates between
//! firing everything due and waiting — on the mailbox, bounded by the
//! next deadline — for new requests.
//!
//! Requests are ordinary envelopes:
//!
//! - `(SEND, Duration, ChannelRef, Tuple)` — deliver the tuple to the
//!   channel after the delay, preserving the requesting sender.
//! - `(REPLY, Duration, ActorRef, ResponseId, Tuple)` — same, delivered
//!   as a correlated reply. A request without a valid response id
//!   degrades to `SEND`.
//! - `(DIE)` — stop, dropping pending entries.
//!
//! Firing is best-effort: delivery to an actor that terminated in the
//! meantime is a silent no-op.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use log::{debug, warn};

use crate::actor::ActorRef;
use crate::channel::{Channel, ChannelRef};
use crate::clock::{self, Duration, Instant};
use crate::context;
use crate::message::{Atom, Envelope, ResponseId, Tuple};
use crate::msg;
use crate::scheduler::{self, Hint};

const SEND: Atom = Atom::new("SEND");
const REPLY: Atom = Atom::new("REPLY");
const DIE: Atom = Atom::new("DIE");
const TIMEOUT: Atom = Atom::new("TIMEOUT");

static EMITTER: OnceLock<ActorRef> = OnceLock::new();

fn emitter() -> ActorRef {
    EMITTER
        .get_or_init(|| scheduler::spawn_fn_with(Hint::DetachedHidden, emitter_main))
        .clone()
}

/// Stop the time emitter, dropping pending deliveries. Called on
/// scheduler shutdown; a no-op if the emitter never started.
pub(crate) fn stop() {
    if let Some(emitter) = EMITTER.get() {
        emitter.deliver(Envelope::new(None, msg!(DIE)));
    }
}

// ── Public API ──────────────────────────────────────────────────────────

/// Deliver `payload` to `to` after `delay`, with the caller as sender.
pub fn delayed_send(to: impl Into<ChannelRef>, delay: Duration, payload: Tuple) {
    let from = context::self_ref();
    let to: ChannelRef = to.into();
    emitter().deliver(Envelope::new(Some(from), msg!(SEND, delay, to, payload)));
}

/// Deliver `payload` to `to` after `delay` as a reply correlated by
/// `response_id`. Without a response id this degrades to
/// [`delayed_send`].
pub fn delayed_reply(
    to: &ActorRef,
    delay: Duration,
    response_id: Option<ResponseId>,
    payload: Tuple,
) {
    match response_id {
        Some(id) => {
            let from = context::self_ref();
            emitter().deliver(Envelope::new(
                Some(from),
                msg!(REPLY, delay, to.clone(), id, payload),
            ));
        }
        None => delayed_send(to, delay, payload),
    }
}

/// Schedule the `(TIMEOUT, token)` self-send backing `receive_for`.
/// A zero delay enqueues the timeout immediately, bypassing the emitter.
pub(crate) fn schedule_timeout(delay: Duration, token: u64) {
    let me = context::self_ref();
    if delay.is_zero() {
        me.deliver(Envelope::new(None, msg!(TIMEOUT, token)));
    } else {
        delayed_send(&me, delay, msg!(TIMEOUT, token));
    }
}

/// Decode a `(TIMEOUT, token)` envelope.
pub(crate) fn parse_timeout(env: &Envelope) -> Option<u64> {
    if env.payload.len() != 2 || !env.payload.matches_atom(0, TIMEOUT) {
        return None;
    }
    env.payload.value::<u64>(1).copied()
}

// ── Emitter internals ───────────────────────────────────────────────────

/// A pending delivery.
enum Delayed {
    Send {
        to: ChannelRef,
        sender: Option<ActorRef>,
        payload: Tuple,
    },
    Reply {
        to: ActorRef,
        sender: Option<ActorRef>,
        id: ResponseId,
        payload: Tuple,
    },
}

impl Delayed {
    /// Enqueue the delivery into its target with the original sender.
    fn fire(self) {
        match self {
            Delayed::Send {
                to,
                sender,
                payload,
            } => to.enqueue(Envelope::new(sender, payload)),
            Delayed::Reply {
                to,
                sender,
                id,
                payload,
            } => to.enqueue(Envelope::with_response(sender, payload, id)),
        }
    }
}

/// Decode a `SEND` or `REPLY` request into its delay and delivery.
fn parse_request(env: &Envelope) -> Option<(Duration, Delayed)> {
    let p = &env.payload;
    if p.len() == 4 && p.matches_atom(0, SEND) {
        let delay = *p.value::<Duration>(1)?;
        let to = p.value::<ChannelRef>(2)?.clone();
        let payload = p.value::<Tuple>(3)?.clone();
        return Some((
            delay,
            Delayed::Send {
                to,
                sender: env.sender.clone(),
                payload,
            },
        ));
    }
    if p.len() == 5 && p.matches_atom(0, REPLY) {
        let delay = *p.value::<Duration>(1)?;
        let to = p.value::<ActorRef>(2)?.clone();
        let id = *p.value::<ResponseId>(3)?;
        let payload = p.value::<Tuple>(4)?.clone();
        return Some((
            delay,
            Delayed::Reply {
                to,
                sender: env.sender.clone(),
                id,
                payload,
            },
        ));
    }
    None
}

fn emitter_main() {
    let me = context::self_ref();
    let mailbox = &me.cell.mailbox;

    // (deadline, insertion-seq) -> delivery. The seq makes the key a
    // stable multimap: equal deadlines fire in insertion order.
    let mut entries: BTreeMap<(Instant, u64), Delayed> = BTreeMap::new();
    let mut seq: u64 = 0;

    loop {
        let env = if entries.is_empty() {
            Some(mailbox.dequeue())
        } else {
            let now = clock::now();
            while let Some(first) = entries.first_entry() {
                if first.key().0 > now {
                    break;
                }
                first.remove().fire();
            }
            match entries.keys().next() {
                None => continue,
                // Timeout means more entries came due; loop to fire them.
                Some(&(deadline, _)) => mailbox.try_dequeue_until(deadline),
            }
        };
        let Some(env) = env else { continue };

        if env.payload.matches_atom(0, DIE) {
            debug!(
                "time emitter stopping, dropping {} pending deliveries",
                entries.len()
            );
            return;
        }
        match parse_request(&env) {
            Some((delay, delivery)) => {
                seq += 1;
                entries.insert((clock::now() + delay, seq), delivery);
            }
            None => warn!("time emitter: unknown message {env:?}"),
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::{ActorCell, ActorState};

    fn fresh_ref() -> ActorRef {
        let actor = ActorRef {
            cell: ActorCell::new(Hint::DetachedHidden, None),
        };
        actor.cell.set_state(ActorState::Executing);
        actor
    }

    #[test]
    fn parse_send_request_round_trips() {
        let target = fresh_ref();
        let to: ChannelRef = (&target).into();
        let env = Envelope::new(
            None,
            msg!(SEND, Duration::from_millis(5), to, msg!(42_i32)),
        );
        let (delay, delivery) = parse_request(&env).expect("well-formed request");
        assert_eq!(delay, Duration::from_millis(5));

        delivery.fire();
        let got = target.cell.mailbox.try_dequeue().expect("fired");
        assert_eq!(got.payload.value::<i32>(0), Some(&42));
        assert!(got.response_id.is_none());
    }

    #[test]
    fn parse_reply_request_round_trips() {
        let target = fresh_ref();
        let id = ResponseId::fresh();
        let env = Envelope::new(
            None,
            msg!(REPLY, Duration::from_millis(1), target.clone(), id, msg!(1_i32)),
        );
        let (_, delivery) = parse_request(&env).expect("well-formed request");
        delivery.fire();

        let got = target.cell.mailbox.try_dequeue().expect("fired");
        assert_eq!(got.response_id, Some(id));
    }

    #[test]
    fn malformed_requests_do_not_parse() {
        assert!(parse_request(&Envelope::new(None, msg!(1_i32))).is_none());
        // SEND with a missing payload element.
        assert!(parse_request(&Envelope::new(
            None,
            msg!(SEND, Duration::from_millis(1))
        ))
        .is_none());
    }

    #[test]
    fn fired_delivery_preserves_the_original_sender() {
        let requester = fresh_ref();
        let target = fresh_ref();
        let to: ChannelRef = (&target).into();
        let env = Envelope::new(
            Some(requester.clone()),
            msg!(SEND, Duration::ZERO, to, msg!(9_i32)),
        );
        let (_, delivery) = parse_request(&env).expect("request");
        delivery.fire();

        let got = target.cell.mailbox.try_dequeue().expect("fired");
        assert_eq!(got.sender.map(|r| r.id()), Some(requester.id()));
    }

    #[test]
    fn equal_deadlines_fire_in_insertion_order() {
        let deadline = clock::now();
        let mut entries: BTreeMap<(Instant, u64), u32> = BTreeMap::new();
        entries.insert((deadline, 2), 20);
        entries.insert((deadline, 1), 10);
        entries.insert((deadline, 3), 30);

        let fired: Vec<u32> = entries.into_values().collect();
        assert_eq!(fired, vec![10, 20, 30]);
    }

    #[test]
    fn parse_timeout_round_trips() {
        let env = Envelope::new(None, msg!(TIMEOUT, 77_u64));
        assert_eq!(parse_timeout(&env), Some(77));
        assert_eq!(parse_timeout(&Envelope::new(None, msg!(1_i32))), None);
    }

    #[test]
    fn firing_at_a_dead_target_is_a_noop() {
        let target = fresh_ref();
        crate::actor::terminate(&target, crate::actor::ExitReason::NORMAL);

        let to: ChannelRef = (&target).into();
        let env = Envelope::new(None, msg!(SEND, Duration::ZERO, to, msg!(1_i32)));
        let (_, delivery) = parse_request(&env).expect("request");
        delivery.fire(); // must not panic; the closed mailbox drops it
        assert!(target.cell.mailbox.is_empty());
    }
}
