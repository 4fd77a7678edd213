//! Actor identity, lifecycle state, and the control block.
//!
//! An actor is represented by an [`ActorCell`] shared behind an `Arc`
//! ([`ActorRef`]). The cell owns the mailbox, the lifecycle state machine,
//! the symmetric link set (ids only — the registry resolves them at exit
//! time, so link cycles never keep dead actors alive), and the list of
//! attached lifecycle observers.
//!
//! Lifecycle: `Initialized → Runnable ⇄ Executing ⇄ Blocked → Terminated`.
//! All transitions are CAS-gated; at most one worker ever holds an actor in
//! `Executing`. Termination is one-shot: the first caller of
//! [`terminate`] wins, closes the mailbox, propagates exit signals to
//! linked peers, and fires the attached observers.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use log::{debug, trace};

use crate::behavior::Behavior;
use crate::mailbox::Mailbox;
use crate::message::{Atom, Envelope};
use crate::msg;
use crate::registry;
use crate::remote::ProcessInfo;
use crate::scheduler::{self, Hint};

// ── Identity ────────────────────────────────────────────────────────────

/// Process-unique 32-bit actor id. Ids are never reused within a process
/// lifetime; 0 is reserved and never assigned.
pub type ActorId = u32;

static NEXT_ACTOR_ID: AtomicU32 = AtomicU32::new(1);

pub(crate) fn next_actor_id() -> ActorId {
    NEXT_ACTOR_ID.fetch_add(1, Ordering::Relaxed)
}

// ── Exit reasons ────────────────────────────────────────────────────────

/// 32-bit code summarising why an actor terminated.
///
/// `0` means "not terminated"; values at or above
/// [`ExitReason::USER_BASE`] are reserved for user-defined reasons.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExitReason(u32);

impl ExitReason {
    /// The actor has not terminated.
    pub const NONE: ExitReason = ExitReason(0);
    /// Voluntary, successful termination.
    pub const NORMAL: ExitReason = ExitReason(1);
    /// The actor's behavior panicked.
    pub const UNHANDLED_EXCEPTION: ExitReason = ExitReason(2);
    /// Termination cause unknown.
    pub const UNKNOWN: ExitReason = ExitReason(3);
    /// The link to a remote actor broke.
    pub const REMOTE_LINK_UNREACHABLE: ExitReason = ExitReason(4);
    /// First value available for user-defined reasons.
    pub const USER_BASE: ExitReason = ExitReason(0x10000);

    /// Wrap a raw reason code.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// User-defined reason `USER_BASE + offset`.
    #[must_use]
    pub const fn user(offset: u32) -> Self {
        Self(Self::USER_BASE.0 + offset)
    }

    /// Raw reason code.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// `true` for [`ExitReason::NORMAL`].
    #[must_use]
    pub const fn is_normal(self) -> bool {
        self.0 == Self::NORMAL.0
    }

    /// `true` once a termination reason has been recorded.
    #[must_use]
    pub const fn is_set(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Debug for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            0 => f.write_str("not-terminated"),
            1 => f.write_str("normal"),
            2 => f.write_str("unhandled-exception"),
            3 => f.write_str("unknown"),
            4 => f.write_str("remote-link-unreachable"),
            raw => write!(f, "user({raw:#x})"),
        }
    }
}

/// Unwind payload used by `quit` to leave user code with a recorded
/// reason. The executor catches it and terminates the actor; any other
/// panic payload maps to [`ExitReason::UNHANDLED_EXCEPTION`].
pub(crate) struct ExitUnwind(pub ExitReason);

// ── Lifecycle state ─────────────────────────────────────────────────────

/// Actor lifecycle states. Stored as an atomic in the control block.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum ActorState {
    /// Control block exists but has not been handed to an executor.
    Initialized = 0,
    /// Waiting in (or headed for) the scheduler's runnable queue.
    Runnable = 1,
    /// A worker or dedicated thread is driving the actor right now.
    Executing = 2,
    /// No pending work; a fresh enqueue makes the actor runnable again.
    Blocked = 3,
    /// Terminal. Never left once entered.
    Terminated = 4,
}

impl ActorState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Initialized,
            1 => Self::Runnable,
            2 => Self::Executing,
            3 => Self::Blocked,
            _ => Self::Terminated,
        }
    }
}

// ── Attachables ─────────────────────────────────────────────────────────

/// Token identifying an attached observer for selective detach.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct AttachToken(pub u64);

/// Opaque observer of an actor's termination.
///
/// Used internally to keep the global actor count accurate and externally
/// (e.g. by a remote transport) to release resources tied to an actor's
/// lifetime.
pub trait Attachable: Send {
    /// Called exactly once, with the actor's termination reason.
    fn actor_exited(&mut self, reason: ExitReason);

    /// `true` if this observer is identified by `token` (for
    /// [`ActorRef::detach`]).
    fn matches(&self, _token: &AttachToken) -> bool {
        false
    }
}

// ── Control block ───────────────────────────────────────────────────────

/// Per-actor execution state owned by the current executor.
pub(crate) struct CellRuntime {
    /// Event-based behavior; `None` for blocking-callable actors.
    pub behavior: Option<Box<dyn Behavior>>,
    /// Whether `on_start` has run.
    pub started: bool,
    /// Messages the behavior rejected in the current scheduling quantum.
    /// Merged back ahead of the mailbox at quantum end.
    pub skipped: Vec<Envelope>,
}

/// The actor control block.
pub struct ActorCell {
    id: ActorId,
    hint: Hint,
    /// Hidden actors are invisible to `await_all_others_done`.
    hidden: bool,
    /// Set for proxies standing in for actors on other nodes.
    pub(crate) process: OnceLock<ProcessInfo>,
    pub(crate) mailbox: Mailbox,
    state: AtomicU8,
    exit_reason: AtomicU32,
    trap_exits: AtomicBool,
    links: Mutex<HashSet<ActorId>>,
    attached: Mutex<Vec<Box<dyn Attachable>>>,
    pub(crate) runtime: Mutex<CellRuntime>,
}

impl ActorCell {
    pub(crate) fn new(hint: Hint, behavior: Option<Box<dyn Behavior>>) -> Arc<Self> {
        Arc::new(Self {
            id: next_actor_id(),
            hint,
            hidden: hint.is_hidden(),
            process: OnceLock::new(),
            mailbox: Mailbox::new(),
            state: AtomicU8::new(ActorState::Initialized as u8),
            exit_reason: AtomicU32::new(ExitReason::NONE.raw()),
            trap_exits: AtomicBool::new(false),
            links: Mutex::new(HashSet::new()),
            attached: Mutex::new(Vec::new()),
            runtime: Mutex::new(CellRuntime {
                behavior,
                started: false,
                skipped: Vec::new(),
            }),
        })
    }

    pub(crate) fn id(&self) -> ActorId {
        self.id
    }

    pub(crate) fn hint(&self) -> Hint {
        self.hint
    }

    pub(crate) fn is_hidden(&self) -> bool {
        self.hidden
    }

    pub(crate) fn state(&self) -> ActorState {
        ActorState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// CAS `from → to`; `true` on success.
    pub(crate) fn transition(&self, from: ActorState, to: ActorState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn set_state(&self, state: ActorState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub(crate) fn traps_exits(&self) -> bool {
        self.trap_exits.load(Ordering::Acquire)
    }

    pub(crate) fn set_trap_exits(&self, on: bool) {
        self.trap_exits.store(on, Ordering::Release);
    }

    pub(crate) fn add_link(&self, peer: ActorId) -> bool {
        self.links
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(peer)
    }

    pub(crate) fn remove_link(&self, peer: ActorId) -> bool {
        self.links
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&peer)
    }

    #[cfg(test)]
    pub(crate) fn is_linked(&self, peer: ActorId) -> bool {
        self.links
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&peer)
    }
}

impl fmt::Debug for ActorCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorCell")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("reason", &ExitReason::from_raw(self.exit_reason.load(Ordering::Acquire)))
            .finish()
    }
}

// ── Actor references ────────────────────────────────────────────────────

/// Reference-counted handle to an actor.
///
/// The control block is released once the actor has terminated and the
/// last handle is dropped; the registry only holds weak references.
#[derive(Clone)]
pub struct ActorRef {
    pub(crate) cell: Arc<ActorCell>,
}

impl ActorRef {
    /// The actor's process-unique id.
    #[must_use]
    pub fn id(&self) -> ActorId {
        self.cell.id
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ActorState {
        self.cell.state()
    }

    /// `true` once the actor has terminated.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.cell.state() == ActorState::Terminated
    }

    /// The recorded termination reason ([`ExitReason::NONE`] while the
    /// actor is alive).
    #[must_use]
    pub fn exit_reason(&self) -> ExitReason {
        ExitReason::from_raw(self.cell.exit_reason.load(Ordering::Acquire))
    }

    /// Attach a lifecycle observer. If the actor has already terminated,
    /// the observer fires immediately with the recorded reason.
    pub fn attach(&self, mut observer: Box<dyn Attachable>) {
        let mut attached = self.cell.attached.lock().unwrap_or_else(|e| e.into_inner());
        if self.cell.state() == ActorState::Terminated {
            drop(attached);
            observer.actor_exited(self.exit_reason());
        } else {
            attached.push(observer);
        }
    }

    /// Detach every observer matching `token`.
    pub fn detach(&self, token: &AttachToken) {
        self.cell
            .attached
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|obs| !obs.matches(token));
    }

    /// Enqueue an envelope and wake the actor if it was blocked.
    pub(crate) fn deliver(&self, env: Envelope) {
        self.cell.mailbox.enqueue(env);
        self.wake();
    }

    /// Make a blocked scheduled actor runnable again. Blocked detached
    /// actors are woken by the mailbox condvar instead.
    pub(crate) fn wake(&self) {
        if self.cell.hint.is_scheduled()
            && self.cell.transition(ActorState::Blocked, ActorState::Runnable)
        {
            scheduler::get_scheduler().enqueue(self);
        }
    }
}

impl PartialEq for ActorRef {
    fn eq(&self, other: &Self) -> bool {
        self.cell.id == other.cell.id
    }
}

impl Eq for ActorRef {}

impl std::hash::Hash for ActorRef {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.cell.id.hash(state);
    }
}

impl fmt::Debug for ActorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActorRef({})", self.cell.id)
    }
}

// ── Termination ─────────────────────────────────────────────────────────

/// Terminate `actor` with `reason`. One-shot: returns `false` if the actor
/// was already terminated. Closes the mailbox, delivers exit signals to
/// linked peers, fires attached observers, and unregisters the actor.
pub(crate) fn terminate(actor: &ActorRef, reason: ExitReason) -> bool {
    let cell = &actor.cell;
    let prev = cell
        .state
        .swap(ActorState::Terminated as u8, Ordering::AcqRel);
    if prev == ActorState::Terminated as u8 {
        return false;
    }
    cell.exit_reason.store(reason.raw(), Ordering::Release);
    debug!("actor {} terminated: {:?}", cell.id, reason);

    cell.mailbox.close();

    // Drain the link set first so propagation cannot loop back here.
    let peers: Vec<ActorId> = {
        let mut links = cell.links.lock().unwrap_or_else(|e| e.into_inner());
        links.drain().collect()
    };
    for peer_id in peers {
        let Some(peer) = registry::lookup(peer_id) else {
            continue;
        };
        peer.cell.remove_link(cell.id);
        trace!("exit signal {} -> {} ({:?})", cell.id, peer_id, reason);
        peer.deliver(exit_envelope(actor, reason));
    }

    let mut observers: Vec<Box<dyn Attachable>> = {
        let mut attached = cell.attached.lock().unwrap_or_else(|e| e.into_inner());
        attached.drain(..).collect()
    };
    for obs in &mut observers {
        obs.actor_exited(reason);
    }

    registry::unregister(cell.id);
    true
}

// ── Links ───────────────────────────────────────────────────────────────

/// Atom tagging exit-signal envelopes: `(EXIT, ActorId, ExitReason)`.
pub const EXIT: Atom = Atom::new("EXIT");

/// Build the exit-signal envelope `from` sends on termination.
pub(crate) fn exit_envelope(from: &ActorRef, reason: ExitReason) -> Envelope {
    Envelope::new(Some(from.clone()), msg!(EXIT, from.id(), reason))
}

/// Decode an exit-signal envelope into `(origin, reason)`.
pub(crate) fn parse_exit(env: &Envelope) -> Option<(ActorId, ExitReason)> {
    if env.payload.len() != 3 || !env.payload.matches_atom(0, EXIT) {
        return None;
    }
    let from = *env.payload.value::<ActorId>(1)?;
    let reason = *env.payload.value::<ExitReason>(2)?;
    Some((from, reason))
}

/// Symmetrically link two actors. Idempotent; linking an actor to itself
/// is a no-op. If either side has already terminated, the survivor
/// immediately receives that actor's exit signal instead.
pub(crate) fn link_cells(a: &ActorRef, b: &ActorRef) {
    if a.id() == b.id() {
        return;
    }
    if b.is_terminated() {
        a.deliver(exit_envelope(b, b.exit_reason()));
        return;
    }
    if a.is_terminated() {
        b.deliver(exit_envelope(a, a.exit_reason()));
        return;
    }
    a.cell.add_link(b.id());
    b.cell.add_link(a.id());
    // A peer may have terminated while the links were being added; its
    // exit propagation only saw the entries that had already landed.
    if b.is_terminated() && a.cell.remove_link(b.id()) {
        b.cell.remove_link(a.id());
        a.deliver(exit_envelope(b, b.exit_reason()));
    } else if a.is_terminated() && b.cell.remove_link(a.id()) {
        a.cell.remove_link(b.id());
        b.deliver(exit_envelope(a, a.exit_reason()));
    }
}

/// Symmetrically remove a link. Safe to call when no link exists.
pub(crate) fn unlink_cells(a: &ActorRef, b: &ActorRef) {
    a.cell.remove_link(b.id());
    b.cell.remove_link(a.id());
}

// ── Tests ───────────────────────────────────────────────────────────────
