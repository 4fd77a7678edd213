//! The channel capability: anything a message can be enqueued into.
//!
//! A closed set of variants implements it: local actors ([`ActorRef`]),
//! fan-out groups ([`Group`]), and remote proxies (ordinary actors whose
//! behavior forwards to a transport — see [`remote`](crate::remote)).

use std::sync::{Arc, RwLock};

use crate::actor::{ActorId, ActorRef};
use crate::message::Envelope;

/// Capability to accept an envelope. Enqueueing never fails and never
/// blocks senders beyond brief synchronization; delivery to a terminated
/// receiver is a silent no-op.
pub trait Channel: Send + Sync {
    /// Enqueue an envelope.
    fn enqueue(&self, env: Envelope);
}

/// Shared handle to any channel variant.
pub type ChannelRef = Arc<dyn Channel>;

impl Channel for ActorRef {
    fn enqueue(&self, env: Envelope) {
        self.deliver(env);
    }
}

impl From<ActorRef> for ChannelRef {
    fn from(actor: ActorRef) -> Self {
        Arc::new(actor)
    }
}

impl From<&ActorRef> for ChannelRef {
    fn from(actor: &ActorRef) -> Self {
        Arc::new(actor.clone())
    }
}

// ── Groups ──────────────────────────────────────────────────────────────

/// Fan-out channel: enqueueing delivers a copy of the envelope to every
/// member. Payloads are shared, not deep-copied — members see the same
/// copy-on-write tuple.
#[derive(Clone, Default)]
pub struct Group {
    members: Arc<RwLock<Vec<ActorRef>>>,
}

impl Group {
    /// Create an empty group.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a member. Idempotent.
    pub fn join(&self, actor: &ActorRef) {
        let mut members = self.members.write().unwrap_or_else(|e| e.into_inner());
        if !members.iter().any(|m| m.id() == actor.id()) {
            members.push(actor.clone());
        }
    }

    /// Remove a member by id.
    pub fn leave(&self, id: ActorId) {
        self.members
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|m| m.id() != id);
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// `true` if the group has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Channel for Group {
    fn enqueue(&self, env: Envelope) {
        let members = self.members.read().unwrap_or_else(|e| e.into_inner());
        for member in members.iter() {
            member.deliver(env.clone());
        }
    }
}

impl From<Group> for ChannelRef {
    fn from(group: Group) -> Self {
        Arc::new(group)
    }
}

// ── Tests ───────────────────────────────────────────────────────────────
