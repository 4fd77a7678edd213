//! Process-wide actor registry and the global actor count.
//!
//! The registry maps actor ids to weak control-block references so exit
//! propagation can resolve link ids without keeping dead actors alive.
//! It is sharded to keep lock contention off the spawn/terminate path.
//!
//! The actor count drives [`await_all_others_done`]: every non-hidden
//! actor (and every converted or hidden context) increments it on
//! registration and decrements it through its exit observer. Waiters are
//! notified on every decrement.
//!
//! [`await_all_others_done`]: crate::context::await_all_others_done

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, LazyLock, Mutex, RwLock, Weak};

use crate::actor::{ActorCell, ActorId, ActorRef};

// ── Sharded id → cell map ───────────────────────────────────────────────

const SHARDS: usize = 16;

static REGISTRY: LazyLock<[RwLock<HashMap<ActorId, Weak<ActorCell>>>; SHARDS]> =
    LazyLock::new(|| std::array::from_fn(|_| RwLock::new(HashMap::new())));

fn shard_for(id: ActorId) -> &'static RwLock<HashMap<ActorId, Weak<ActorCell>>> {
    &REGISTRY[id as usize % SHARDS]
}

/// Register an actor so link propagation can find it by id.
pub(crate) fn register(actor: &ActorRef) {
    let mut shard = shard_for(actor.id())
        .write()
        .unwrap_or_else(|e| e.into_inner());
    shard.insert(actor.id(), Arc::downgrade(&actor.cell));
}

/// Resolve an id to a live actor, or `None` if it never existed, has been
/// unregistered, or its control block is already gone.
pub(crate) fn lookup(id: ActorId) -> Option<ActorRef> {
    let shard = shard_for(id).read().unwrap_or_else(|e| e.into_inner());
    let cell = shard.get(&id)?.upgrade()?;
    Some(ActorRef { cell })
}

/// Remove an id from the registry. Safe to call for unknown ids.
pub(crate) fn unregister(id: ActorId) {
    let mut shard = shard_for(id).write().unwrap_or_else(|e| e.into_inner());
    shard.remove(&id);
}

// ── Actor count ─────────────────────────────────────────────────────────

struct ActorCount {
    count: Mutex<u64>,
    zero_or_lower: Condvar,
}

static ACTOR_COUNT: LazyLock<ActorCount> = LazyLock::new(|| ActorCount {
    count: Mutex::new(0),
    zero_or_lower: Condvar::new(),
});

/// Contexts registered through [`register_hidden_context`] — part of the
/// quiescence baseline, on top of the caller itself.
static HIDDEN_CONTEXTS: AtomicU64 = AtomicU64::new(0);

pub(crate) fn inc_actor_count() {
    let mut count = ACTOR_COUNT.count.lock().unwrap_or_else(|e| e.into_inner());
    *count += 1;
}

pub(crate) fn dec_actor_count() {
    let mut count = ACTOR_COUNT.count.lock().unwrap_or_else(|e| e.into_inner());
    debug_assert!(*count > 0, "actor count underflow");
    *count = count.saturating_sub(1);
    drop(count);
    // Every decrement notifies: waiters have different targets.
    ACTOR_COUNT.zero_or_lower.notify_all();
}

/// Current number of counted (non-hidden, not-yet-terminated) actor
/// contexts, including converted threads and registered hidden contexts.
#[must_use]
pub fn actor_count() -> u64 {
    *ACTOR_COUNT.count.lock().unwrap_or_else(|e| e.into_inner())
}

/// Block until the count drops to `target` or below.
pub(crate) fn wait_for_actor_count(target: u64) {
    let mut count = ACTOR_COUNT.count.lock().unwrap_or_else(|e| e.into_inner());
    while *count > target {
        count = ACTOR_COUNT
            .zero_or_lower
            .wait(count)
            .unwrap_or_else(|e| e.into_inner());
    }
}

pub(crate) fn hidden_contexts() -> u64 {
    HIDDEN_CONTEXTS.load(Ordering::Acquire)
}

// ── Hidden contexts ─────────────────────────────────────────────────────

/// Guard returned by [`register_hidden_context`]. Dropping it deregisters
/// the context.
///
/// [`register_hidden_context`]: crate::context::register_hidden_context
#[derive(Debug)]
pub struct HiddenContext {
    _priv: (),
}

impl HiddenContext {
    pub(crate) fn new() -> Self {
        HIDDEN_CONTEXTS.fetch_add(1, Ordering::AcqRel);
        inc_actor_count();
        Self { _priv: () }
    }
}

impl Drop for HiddenContext {
    fn drop(&mut self) {
        HIDDEN_CONTEXTS.fetch_sub(1, Ordering::AcqRel);
        dec_actor_count();
    }
}

// ── Tests ───────────────────────────────────────────────────────────────
