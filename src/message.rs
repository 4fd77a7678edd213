//! Message envelopes and the type-erased payload tuple.
//!
//! Payloads are opaque to the runtime: a [`Tuple`] is an immutable sequence
//! of type-erased [`Value`]s shared behind an `Arc`, so fanning a message
//! out to a group clones a pointer, not the data. Mutation goes through
//! [`Tuple::to_mut`], which copies only when the payload is actually shared
//! (copy-on-write).
//!
//! An [`Envelope`] is what actually travels through mailboxes: the payload
//! plus the sender reference and an optional response id used by
//! [`reply`](crate::context::reply) and delayed replies.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::actor::ActorRef;

// ── Atoms ───────────────────────────────────────────────────────────────

/// Interned protocol constant, used as the leading element of runtime
/// protocol tuples (`SEND`, `REPLY`, `DIE`, `EXIT`, `TIMEOUT`) and freely
/// available to user code for its own message tags.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Atom(&'static str);

impl Atom {
    /// Create an atom from a static name.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    /// The atom's name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        self.0
    }
}

impl fmt::Debug for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}", self.0)
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

// ── Values ──────────────────────────────────────────────────────────────

/// A single type-erased payload element.
///
/// Values are cheap to clone (one `Arc` bump) and can be inspected only by
/// downcasting to a concrete type. The runtime itself downcasts just the
/// handful of types its own protocols carry; everything else is opaque
/// freight for user-side matchers.
#[derive(Clone)]
pub struct Value {
    inner: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl Value {
    /// Wrap a concrete value.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            inner: Arc::new(value),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// `true` if the value holds a `T`.
    #[must_use]
    pub fn is<T: Any>(&self) -> bool {
        self.inner.is::<T>()
    }

    /// Downcast to a `T`, or `None` on type mismatch.
    #[must_use]
    pub fn get<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    /// Name of the contained type, for diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.type_name)
    }
}

// ── Tuples ──────────────────────────────────────────────────────────────

/// Immutable, `Arc`-shared payload tuple.
///
/// Cloning shares the backing storage; [`Tuple::to_mut`] detaches a private
/// copy first if the storage is shared.
#[derive(Clone, Default)]
pub struct Tuple(Arc<Vec<Value>>);

impl Tuple {
    /// The empty tuple.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tuple from already-erased values.
    #[must_use]
    pub fn from_values(values: Vec<Value>) -> Self {
        Self(Arc::new(values))
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// `true` if the tuple has no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Element at `idx`.
    #[must_use]
    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.0.get(idx)
    }

    /// Typed element access: downcast element `idx` to `T`.
    #[must_use]
    pub fn value<T: Any>(&self, idx: usize) -> Option<&T> {
        self.0.get(idx).and_then(Value::get::<T>)
    }

    /// Atom at `idx`, if element `idx` is an [`Atom`].
    #[must_use]
    pub fn atom(&self, idx: usize) -> Option<Atom> {
        self.value::<Atom>(idx).copied()
    }

    /// `true` if element `idx` is the atom `a`.
    #[must_use]
    pub fn matches_atom(&self, idx: usize, a: Atom) -> bool {
        self.atom(idx) == Some(a)
    }

    /// Mutable access to the elements, copying the storage first if it is
    /// shared with another tuple.
    pub fn to_mut(&mut self) -> &mut Vec<Value> {
        Arc::make_mut(&mut self.0)
    }

    /// `true` if both tuples share the same backing storage.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.iter()).finish()
    }
}

/// Build a [`Tuple`] from a list of expressions.
///
/// ```
/// use spool::{msg, Atom};
///
/// const PING: Atom = Atom::new("PING");
/// let t = msg!(PING, 7_i32, "payload".to_string());
/// assert_eq!(t.atom(0), Some(PING));
/// assert_eq!(t.value::<i32>(1), Some(&7));
/// ```
#[macro_export]
macro_rules! msg {
    () => { $crate::message::Tuple::new() };
    ($($elem:expr),+ $(,)?) => {
        $crate::message::Tuple::from_values(
            vec![$($crate::message::Value::new($elem)),+],
        )
    };
}

// ── Response ids ────────────────────────────────────────────────────────

/// Token correlating a reply with the request that asked for it.
///
/// Fresh ids are process-unique; an envelope without one is an ordinary
/// asynchronous message.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ResponseId(u64);

static NEXT_RESPONSE_ID: AtomicU64 = AtomicU64::new(1);

impl ResponseId {
    /// Allocate a fresh, process-unique response id.
    #[must_use]
    pub fn fresh() -> Self {
        Self(NEXT_RESPONSE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw token value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

// ── Envelopes ───────────────────────────────────────────────────────────

/// A message in flight: payload, sender, and optional response id.
///
/// Envelopes are cheap to clone; the payload is shared, not copied.
#[derive(Clone)]
pub struct Envelope {
    /// Reference to the sending actor; `None` for messages the runtime
    /// fabricates without an originating actor.
    pub sender: Option<ActorRef>,
    /// The type-erased payload.
    pub payload: Tuple,
    /// Set on replies and on requests that expect a correlated reply.
    pub response_id: Option<ResponseId>,
}

impl Envelope {
    /// An ordinary asynchronous message.
    #[must_use]
    pub fn new(sender: Option<ActorRef>, payload: Tuple) -> Self {
        Self {
            sender,
            payload,
            response_id: None,
        }
    }

    /// A message carrying a response id.
    #[must_use]
    pub fn with_response(
        sender: Option<ActorRef>,
        payload: Tuple,
        response_id: ResponseId,
    ) -> Self {
        Self {
            sender,
            payload,
            response_id: Some(response_id),
        }
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("sender", &self.sender.as_ref().map(ActorRef::id))
            .field("payload", &self.payload)
            .field("response_id", &self.response_id)
            .finish()
    }
}

// ── Tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const PING: Atom = Atom::new("PING");
    const PONG: Atom = Atom::new("PONG");

    #[test]
    fn atoms_compare_by_name() {
        assert_eq!(PING, Atom::new("PING"));
        assert_ne!(PING, PONG);
        assert_eq!(PING.name(), "PING");
    }

    #[test]
    fn value_downcasts() {
        let v = Value::new(42_i32);
        assert!(v.is::<i32>());
        assert!(!v.is::<u32>());
        assert_eq!(v.get::<i32>(), Some(&42));
        assert_eq!(v.get::<String>(), None);
    }

    #[test]
    fn tuple_typed_access() {
        let t = msg!(PING, 5_i32, "hello".to_string());
        assert_eq!(t.len(), 3);
        assert!(t.matches_atom(0, PING));
        assert!(!t.matches_atom(0, PONG));
        assert_eq!(t.value::<i32>(1), Some(&5));
        assert_eq!(t.value::<String>(2).map(String::as_str), Some("hello"));
        // Type mismatch and out-of-range both yield None.
        assert_eq!(t.value::<i64>(1), None);
        assert!(t.get(3).is_none());
    }

    #[test]
    fn empty_tuple() {
        let t = msg!();
        assert!(t.is_empty());
        assert_eq!(t.len(), 0);
    }

    #[test]
    fn clone_shares_storage() {
        let a = msg!(1_i32, 2_i32);
        let b = a.clone();
        assert!(a.ptr_eq(&b));
    }

    #[test]
    fn to_mut_detaches_shared_storage() {
        let a = msg!(1_i32);
        let mut b = a.clone();
        b.to_mut().push(Value::new(2_i32));
        assert!(!a.ptr_eq(&b));
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 2);
        assert_eq!(b.value::<i32>(1), Some(&2));
    }

    #[test]
    fn response_ids_are_unique() {
        let a = ResponseId::fresh();
        let b = ResponseId::fresh();
        assert_ne!(a, b);
        assert_ne!(a.raw(), 0);
    }

    #[test]
    fn envelope_with_response() {
        let id = ResponseId::fresh();
        let env = Envelope::with_response(None, msg!(PONG), id);
        assert_eq!(env.response_id, Some(id));
        assert!(env.sender.is_none());
        assert!(env.payload.matches_atom(0, PONG));
    }
}
