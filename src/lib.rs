//! spool — an M:N actor runtime.
//!
//! A host program creates large numbers of lightweight actors, exchanges
//! asynchronous messages between them, and lets a fixed pool of worker
//! threads multiplex their execution. Lifecycles are coordinated through
//! symmetric links with exit-signal propagation, delayed delivery runs
//! through a single time-emitter actor, and a global quiescence barrier
//! ([`await_all_others_done`]) waits for everything else to finish.
//!
//! # Architecture
//!
//! ```text
//! Layer 0: clock, error, message           (no internal deps)
//! Layer 1: mailbox, deque                  (queues)
//! Layer 2: actor, behavior, channel        (control blocks, capabilities)
//! Layer 3: registry, scheduler, context    (multiplexing, current actor)
//! Layer 4: timed, remote                   (emitter actor, transport hooks)
//! ```
//!
//! # Two kinds of actors
//!
//! *Scheduled* actors are event-based state machines ([`Behavior`])
//! multiplexed onto the worker pool: one dequeued message per behavior
//! invocation, no stack held between messages. *Detached* actors
//! ([`spawn_fn`]) own an OS thread and may block freely in [`receive`].
//! A thread that is not an actor becomes one the first time it touches
//! the API, so `main` can send, receive, and await quiescence directly.
//!
//! # Example
//!
//! ```
//! use spool::{msg, receive_matching, reply, send, spawn, React};
//!
//! // An adder: replies to every (i32) with (i32 + 1).
//! let adder = spawn(|env: spool::Envelope| {
//!     match env.payload.value::<i32>(0) {
//!         Some(n) => {
//!             reply(msg!(n + 1));
//!             React::Done
//!         }
//!         None => React::Skipped(env),
//!     }
//! });
//!
//! send(&adder, msg!(41_i32));
//! let mut got = 0;
//! receive_matching(|env| match env.payload.value::<i32>(0) {
//!     Some(n) => {
//!         got = *n;
//!         true
//!     }
//!     None => false,
//! });
//! assert_eq!(got, 42);
//! ```

pub mod actor;
pub mod behavior;
pub mod channel;
pub mod clock;
pub mod context;
mod deque;
pub mod error;
pub mod mailbox;
pub mod message;
mod registry;
pub mod remote;
pub mod scheduler;
pub mod timed;

pub use actor::{ActorId, ActorRef, ActorState, AttachToken, Attachable, ExitReason, EXIT};
pub use behavior::{Behavior, React};
pub use channel::{Channel, ChannelRef, Group};
pub use clock::{Duration, Instant};
pub use context::{
    await_all_others_done, last_received, link, quit, receive, receive_for, receive_matching,
    register_hidden_context, reply, self_ref, send, trap_exits, try_receive,
    try_receive_matching, unlink,
};
pub use error::SpoolError;
pub use mailbox::Mailbox;
pub use message::{Atom, Envelope, ResponseId, Tuple, Value};
pub use registry::{actor_count, HiddenContext};
pub use remote::ProcessInfo;
pub use scheduler::{
    get_scheduler, metrics_snapshot, set_default_scheduler, set_scheduler, spawn, spawn_fn,
    spawn_fn_with, spawn_init, spawn_linked, spawn_with, Hint, Scheduler, SchedulerMetrics,
    ThreadPoolScheduler,
};
pub use timed::{delayed_reply, delayed_send};
