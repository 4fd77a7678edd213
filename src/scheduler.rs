//! M:N work-stealing scheduler and the spawn API.
//!
//! Manages a pool of OS worker threads that cooperatively execute
//! event-based actors. Each worker owns a local Chase-Lev deque; when
//! idle, workers steal from peers (random victim selection) or the shared
//! global injector queue, then park on a per-worker condvar.
//!
//! An actor is runnable iff it is not terminated and has pending mailbox
//! work (or its first quantum has not run yet). Workers claim an actor via
//! a CAS `Runnable → Executing`, drive its behavior for up to a message
//! budget, then either re-enqueue it or transition it to `Blocked` with a
//! double-check against the mailbox's enqueue sequence so a concurrent
//! send can never be lost.
//!
//! Detached actors bypass the pool entirely: they own a dedicated OS
//! thread and may block at will.
//!
//! The process-wide scheduler is set-once: [`set_scheduler`] fails without
//! side effects if a scheduler is already installed, and [`get_scheduler`]
//! lazily installs a default [`ThreadPoolScheduler`] sized to the hardware
//! (overridable through the `SPOOL_WORKERS` environment variable).

use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, Once, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, trace, warn};

use crate::actor::{
    self, ActorCell, ActorRef, ActorState, Attachable, CellRuntime, ExitReason, ExitUnwind,
};
use crate::behavior::{Behavior, React};
use crate::context;
use crate::deque::{GlobalQueue, WorkDeque, WorkStealer};
use crate::error::SpoolError;
use crate::message::Envelope;
use crate::registry;
use crate::timed;

// ── Constants ───────────────────────────────────────────────────────────

/// Park timeout — workers recheck the shutdown flag at this interval.
const PARK_TIMEOUT: Duration = Duration::from_millis(10);

/// Messages dispatched per scheduling quantum before an actor is
/// re-enqueued behind its peers.
const MSG_BUDGET: usize = 16;

/// Upper bound on pool size.
const MAX_WORKERS: usize = 256;

// ── Observability counters ──────────────────────────────────────────────

pub(crate) static JOBS_ENQUEUED: AtomicU64 = AtomicU64::new(0);
pub(crate) static QUANTA_RUN: AtomicU64 = AtomicU64::new(0);
pub(crate) static STEALS_TOTAL: AtomicU64 = AtomicU64::new(0);
pub(crate) static MESSAGES_SENT: AtomicU64 = AtomicU64::new(0);
pub(crate) static MESSAGES_RECEIVED: AtomicU64 = AtomicU64::new(0);
pub(crate) static ACTIVE_WORKERS: AtomicU64 = AtomicU64::new(0);

/// Consolidated scheduler counters, captured at approximately one instant.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerMetrics {
    /// Runnable-queue submissions since startup.
    pub jobs_enqueued: u64,
    /// Scheduling quanta completed since startup.
    pub quanta_run: u64,
    /// Work-steals from peer deques since startup.
    pub steals: u64,
    /// Messages enqueued into mailboxes since startup.
    pub messages_sent: u64,
    /// Messages dequeued from mailboxes since startup.
    pub messages_received: u64,
    /// Workers currently executing an actor.
    pub active_workers: u64,
}

/// Snapshot the scheduler counters.
#[must_use]
pub fn metrics_snapshot() -> SchedulerMetrics {
    SchedulerMetrics {
        jobs_enqueued: JOBS_ENQUEUED.load(Ordering::Relaxed),
        quanta_run: QUANTA_RUN.load(Ordering::Relaxed),
        steals: STEALS_TOTAL.load(Ordering::Relaxed),
        messages_sent: MESSAGES_SENT.load(Ordering::Relaxed),
        messages_received: MESSAGES_RECEIVED.load(Ordering::Relaxed),
        active_workers: ACTIVE_WORKERS.load(Ordering::Relaxed),
    }
}

// ── Scheduling hints ────────────────────────────────────────────────────

/// Per-spawn scheduling strategy.
///
/// `Scheduled` actors are multiplexed onto the worker pool; `Detached`
/// actors own an OS thread and may block indefinitely. The `*Hidden`
/// variants additionally exclude the actor from the global actor count,
/// making it invisible to `await_all_others_done`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Hint {
    /// Cooperative, pool-multiplexed (the default).
    Scheduled,
    /// Pool-multiplexed and excluded from the actor count.
    ScheduledHidden,
    /// Dedicated OS thread.
    Detached,
    /// Dedicated OS thread, excluded from the actor count.
    DetachedHidden,
}

impl Hint {
    /// `true` for the pool-multiplexed variants.
    #[must_use]
    pub fn is_scheduled(self) -> bool {
        matches!(self, Hint::Scheduled | Hint::ScheduledHidden)
    }

    /// `true` for the dedicated-thread variants.
    #[must_use]
    pub fn is_detached(self) -> bool {
        !self.is_scheduled()
    }

    /// `true` if the actor is excluded from the actor count.
    #[must_use]
    pub fn is_hidden(self) -> bool {
        matches!(self, Hint::ScheduledHidden | Hint::DetachedHidden)
    }
}

// ── Scheduler trait & global instance ───────────────────────────────────

/// A runnable-actor multiplexer.
///
/// Implementations own the policy for distributing runnable actors over
/// execution resources; the lifecycle CAS protocol around
/// [`enqueue`](Scheduler::enqueue) is fixed by the runtime.
pub trait Scheduler: Send + Sync {
    /// Submit an actor whose state has just transitioned to `Runnable`.
    fn enqueue(&self, actor: &ActorRef);

    /// Stop accepting work, stop the time emitter, and join any worker
    /// threads. Idempotent.
    fn shutdown(&self);
}

static SCHEDULER: OnceLock<Arc<dyn Scheduler>> = OnceLock::new();

/// Install a user-provided scheduler.
///
/// # Errors
///
/// Fails with [`SpoolError::SchedulerAlreadySet`] — without replacing the
/// installed scheduler — if one is already set (explicitly or lazily).
pub fn set_scheduler(scheduler: Arc<dyn Scheduler>) -> Result<(), SpoolError> {
    SCHEDULER
        .set(scheduler)
        .map_err(|_| SpoolError::SchedulerAlreadySet)
}

/// Install a [`ThreadPoolScheduler`] with `workers` threads.
///
/// # Errors
///
/// Fails if a scheduler is already installed or `workers` is zero.
pub fn set_default_scheduler(workers: usize) -> Result<(), SpoolError> {
    let pool = ThreadPoolScheduler::new(workers)?;
    set_scheduler(Arc::new(pool))
}

/// The process-wide scheduler, installing the default thread pool on
/// first use.
pub fn get_scheduler() -> Arc<dyn Scheduler> {
    SCHEDULER
        .get_or_init(|| Arc::new(ThreadPoolScheduler::with_default_workers()))
        .clone()
}

fn default_worker_count() -> usize {
    let default = thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(4);
    match std::env::var("SPOOL_WORKERS") {
        Ok(val) => match val.parse::<usize>() {
            Ok(n) if n > 0 => n,
            _ => {
                warn!("SPOOL_WORKERS={val} is invalid, using default");
                default
            }
        },
        Err(_) => default,
    }
    .clamp(1, MAX_WORKERS)
}

// ── Xorshift64 PRNG for victim selection ────────────────────────────────

/// Minimal xorshift64 PRNG — one per worker thread.
struct Xorshift64(u64);

impl Xorshift64 {
    fn new(seed: u64) -> Self {
        Self(if seed == 0 { 1 } else { seed })
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }
}

// ── Thread-pool scheduler ───────────────────────────────────────────────

/// Per-worker parking primitive. Each worker parks on its own
/// mutex/condvar to avoid contention on a single global lock.
struct Parker {
    mutex: Mutex<()>,
    cond: Condvar,
}

/// State shared between the scheduler handle and its worker threads.
struct PoolShared {
    global_queue: GlobalQueue,
    stealers: Vec<WorkStealer>,
    parkers: Vec<Parker>,
    shutdown: AtomicBool,
    worker_count: usize,
    wake_counter: AtomicU64,
}

impl PoolShared {
    fn submit(&self, actor: ActorRef) {
        JOBS_ENQUEUED.fetch_add(1, Ordering::Relaxed);
        self.global_queue.push(actor);
        self.wake_one();
    }

    /// Wake one parked worker, round-robin so wake-ups spread across the
    /// pool.
    fn wake_one(&self) {
        #[expect(
            clippy::cast_possible_truncation,
            reason = "modulo by worker_count keeps the result within usize range"
        )]
        let idx =
            (self.wake_counter.fetch_add(1, Ordering::Relaxed) % self.worker_count as u64) as usize;
        self.parkers[idx].cond.notify_one();
    }

    fn wake_all(&self) {
        for parker in &self.parkers {
            parker.cond.notify_all();
        }
    }
}

/// The default scheduler: a fixed pool of worker threads over a shared
/// injector queue plus per-worker work-stealing deques.
pub struct ThreadPoolScheduler {
    shared: Arc<PoolShared>,
    worker_handles: Mutex<Vec<Option<JoinHandle<()>>>>,
}

impl ThreadPoolScheduler {
    /// Start a pool with `worker_count` threads.
    ///
    /// # Errors
    ///
    /// Fails with [`SpoolError::InvalidWorkerCount`] if `worker_count` is
    /// zero. Worker counts above an internal maximum are clamped.
    pub fn new(worker_count: usize) -> Result<Self, SpoolError> {
        if worker_count == 0 {
            return Err(SpoolError::InvalidWorkerCount(0));
        }
        let worker_count = worker_count.min(MAX_WORKERS);

        install_quit_hook();

        // Phase 1: create all deques and collect stealers BEFORE spawning
        // threads. Workers steal from each other's deques, so every deque
        // must exist before any worker runs.
        let mut deques = Vec::with_capacity(worker_count);
        let mut stealers = Vec::with_capacity(worker_count);
        for _ in 0..worker_count {
            let (deque, stealer) = WorkDeque::new();
            deques.push(deque);
            stealers.push(stealer);
        }

        let parkers: Vec<Parker> = (0..worker_count)
            .map(|_| Parker {
                mutex: Mutex::new(()),
                cond: Condvar::new(),
            })
            .collect();

        let shared = Arc::new(PoolShared {
            global_queue: GlobalQueue::new(),
            stealers,
            parkers,
            shutdown: AtomicBool::new(false),
            worker_count,
            wake_counter: AtomicU64::new(0),
        });

        // Phase 2: spawn worker threads. Failure to create a worker is a
        // scheduler-plumbing failure and fatal to the process.
        let mut handles = Vec::with_capacity(worker_count);
        for (id, deque) in deques.into_iter().enumerate() {
            let shared = Arc::clone(&shared);
            let handle = thread::Builder::new()
                .name(format!("spool-worker-{id}"))
                .spawn(move || worker_loop(id, &deque, &shared))
                .expect("failed to spawn scheduler worker thread");
            handles.push(Some(handle));
        }

        debug!("thread pool scheduler started with {worker_count} workers");
        Ok(Self {
            shared,
            worker_handles: Mutex::new(handles),
        })
    }

    /// Start a pool sized to the hardware (or `SPOOL_WORKERS`).
    #[must_use]
    pub fn with_default_workers() -> Self {
        Self::new(default_worker_count()).expect("default worker count is nonzero")
    }

    /// Number of worker threads.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.shared.worker_count
    }

    /// Approximate depth of the shared runnable queue.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.shared.global_queue.len()
    }
}

impl Scheduler for ThreadPoolScheduler {
    fn enqueue(&self, actor: &ActorRef) {
        if self.shared.shutdown.load(Ordering::Acquire) {
            warn!(
                "scheduler is shut down, dropping runnable actor {}",
                actor.id()
            );
            return;
        }
        self.shared.submit(actor.clone());
    }

    fn shutdown(&self) {
        if self.shared.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        timed::stop();
        self.shared.wake_all();
        let mut handles = self
            .worker_handles
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        for handle in handles.iter_mut() {
            if let Some(h) = handle.take() {
                let _ = h.join();
            }
        }
        debug!("thread pool scheduler shut down");
    }
}

impl Drop for ThreadPoolScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ── Worker loop ─────────────────────────────────────────────────────────

fn worker_loop(id: usize, local: &WorkDeque, shared: &Arc<PoolShared>) {
    let mut rng = Xorshift64::new((id as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15));

    while !shared.shutdown.load(Ordering::Acquire) {
        // 1. Pop from the local deque (LIFO, cache-friendly).
        if let Some(actor) = local.pop() {
            run_actor(&actor, shared);
            continue;
        }

        // 2. Steal from a random peer.
        if let Some(actor) = steal_from_peers(shared, id, &mut rng) {
            run_actor(&actor, shared);
            continue;
        }

        // 3. Batch-steal from the global queue into the local deque.
        if let Some(actor) = shared.global_queue.steal_batch_and_pop(local) {
            run_actor(&actor, shared);
            continue;
        }

        // 4. Park until notified or timeout.
        let parker = &shared.parkers[id];
        let guard = parker.mutex.lock().unwrap_or_else(|e| e.into_inner());
        if shared.shutdown.load(Ordering::Acquire) {
            break;
        }
        let _ = parker.cond.wait_timeout(guard, PARK_TIMEOUT);
    }
}

fn run_actor(actor: &ActorRef, shared: &Arc<PoolShared>) {
    if activate(actor) {
        shared.submit(actor.clone());
    }
}

/// Try to steal an actor from a random peer worker's deque.
fn steal_from_peers(
    shared: &Arc<PoolShared>,
    self_id: usize,
    rng: &mut Xorshift64,
) -> Option<ActorRef> {
    let n = shared.worker_count;
    if n <= 1 {
        return None;
    }
    #[expect(
        clippy::cast_possible_truncation,
        reason = "worker count is bounded by MAX_WORKERS (256), well within usize range"
    )]
    let start = (rng.next_u64() % n as u64) as usize;
    for i in 0..n {
        let victim = (start + i) % n;
        if victim == self_id {
            continue;
        }
        if let Some(actor) = shared.stealers[victim].steal() {
            STEALS_TOTAL.fetch_add(1, Ordering::Relaxed);
            return Some(actor);
        }
    }
    None
}

// ── Actor activation ────────────────────────────────────────────────────

/// Outcome of offering one dequeued message to an actor.
enum Dispatch {
    /// The behavior consumed the message.
    Consumed,
    /// The runtime swallowed the message (normal exit signal, or no
    /// behavior installed).
    Ignored,
    /// The behavior rejected the message; it joined the skip buffer.
    Skipped,
    /// The actor terminated.
    Stopped,
}

/// Feed one envelope through exit-signal handling and the behavior.
fn dispatch_one(actor: &ActorRef, runtime: &mut CellRuntime, env: Envelope) -> Dispatch {
    let cell = &actor.cell;

    // Default exit handling: ignore normal exits, die on everything else.
    // Trapping actors see exit signals as ordinary messages.
    if !cell.traps_exits() {
        if let Some((from, reason)) = actor::parse_exit(&env) {
            if reason.is_normal() {
                return Dispatch::Ignored;
            }
            trace!("actor {} terminating via link to {from}", cell.id());
            actor::terminate(actor, reason);
            return Dispatch::Stopped;
        }
    }

    let outcome = match runtime.behavior.as_mut() {
        None => return Dispatch::Ignored,
        Some(behavior) => panic::catch_unwind(AssertUnwindSafe(|| behavior.react(env))),
    };

    match outcome {
        Ok(React::Done) => Dispatch::Consumed,
        Ok(React::Skipped(env)) => {
            runtime.skipped.push(env);
            Dispatch::Skipped
        }
        Ok(React::Become(next)) => {
            runtime.behavior = Some(next);
            // Replay skipped messages to the new behavior in order.
            cell.mailbox.requeue_front(std::mem::take(&mut runtime.skipped));
            Dispatch::Consumed
        }
        Ok(React::Quit(reason)) => {
            actor::terminate(actor, reason);
            Dispatch::Stopped
        }
        Err(payload) => {
            actor::terminate(actor, reason_from_panic(payload));
            Dispatch::Stopped
        }
    }
}

fn run_on_start(actor: &ActorRef, runtime: &mut CellRuntime) {
    if runtime.started {
        return;
    }
    runtime.started = true;
    if let Some(behavior) = runtime.behavior.as_mut() {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| behavior.on_start())) {
            actor::terminate(actor, reason_from_panic(payload));
        }
    }
}

/// Run one scheduling quantum for a claimed actor.
///
/// Claims the actor via CAS `Runnable → Executing`, dispatches up to
/// [`MSG_BUDGET`] messages, merges the skip buffer back, and transitions
/// to `Runnable` (more work pending — returns `true` so the caller
/// re-enqueues) or `Blocked`. The blocked transition double-checks the
/// mailbox enqueue sequence: a sender that raced with the quantum failed
/// its own `Blocked → Runnable` CAS, so the worker must pick its message
/// up here.
pub(crate) fn activate(actor: &ActorRef) -> bool {
    let cell = &actor.cell;
    if cell.state() == ActorState::Terminated {
        return false;
    }
    if !cell.transition(ActorState::Runnable, ActorState::Executing) {
        return false;
    }

    ACTIVE_WORKERS.fetch_add(1, Ordering::Relaxed);
    let prev = context::swap_current(Some(actor.clone()));
    let mut runtime = cell.runtime.lock().unwrap_or_else(|e| e.into_inner());

    run_on_start(actor, &mut runtime);

    // `None` means the quantum ended on budget exhaustion with messages
    // still queued; `Some(seq)` records the enqueue sequence at the
    // moment the mailbox drained.
    let mut drained_seq: Option<u64> = None;
    let mut consumed = 0_usize;
    while cell.state() != ActorState::Terminated {
        if consumed >= MSG_BUDGET {
            break;
        }
        let Some(env) = cell.mailbox.try_dequeue() else {
            drained_seq = Some(cell.mailbox.enqueue_seq());
            break;
        };
        match dispatch_one(actor, &mut runtime, env) {
            Dispatch::Consumed => consumed += 1,
            Dispatch::Ignored | Dispatch::Skipped => {}
            Dispatch::Stopped => break,
        }
    }

    // Merge the skip buffer back so the mailbox is a single sequence
    // across scheduling quanta.
    if !runtime.skipped.is_empty() {
        cell.mailbox.requeue_front(std::mem::take(&mut runtime.skipped));
    }
    let terminated = cell.state() == ActorState::Terminated;
    if terminated {
        runtime.behavior = None;
    }
    drop(runtime);
    context::swap_current(prev);

    ACTIVE_WORKERS.fetch_sub(1, Ordering::Relaxed);
    QUANTA_RUN.fetch_add(1, Ordering::Relaxed);

    if terminated {
        return false;
    }
    match drained_seq {
        // Budget exhausted with messages pending: go around again.
        None => cell.transition(ActorState::Executing, ActorState::Runnable),
        Some(seq) => {
            if !cell.transition(ActorState::Executing, ActorState::Blocked) {
                return false;
            }
            // Lost-wakeup double-check.
            if cell.mailbox.enqueue_seq() > seq {
                cell.transition(ActorState::Blocked, ActorState::Runnable)
            } else {
                false
            }
        }
    }
}

fn reason_from_panic(payload: Box<dyn std::any::Any + Send>) -> ExitReason {
    match payload.downcast::<ExitUnwind>() {
        Ok(unwind) => unwind.0,
        Err(payload) => {
            let what = payload
                .downcast_ref::<&str>()
                .copied()
                .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
                .unwrap_or("opaque panic payload");
            debug!("actor behavior panicked: {what}");
            ExitReason::UNHANDLED_EXCEPTION
        }
    }
}

/// Suppress the default panic banner for `quit` unwinds; every other
/// panic still reaches the previously installed hook.
fn install_quit_hook() {
    static HOOK: Once = Once::new();
    HOOK.call_once(|| {
        let default = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if info.payload().downcast_ref::<ExitUnwind>().is_none() {
                default(info);
            }
        }));
    });
}

// ── Spawn API ───────────────────────────────────────────────────────────

/// Exit observer keeping the global actor count accurate.
struct ExitObserver;

impl Attachable for ExitObserver {
    fn actor_exited(&mut self, _reason: ExitReason) {
        registry::dec_actor_count();
    }
}

/// Spawn an event-based actor on the worker pool.
pub fn spawn<B: Behavior>(behavior: B) -> ActorRef {
    spawn_with(Hint::Scheduled, behavior)
}

/// Spawn an event-based actor with an explicit scheduling hint.
pub fn spawn_with<B: Behavior>(hint: Hint, behavior: B) -> ActorRef {
    spawn_actor(hint, Some(Box::new(behavior)), None, None)
}

/// Spawn an event-based actor and run `init` after registration, before
/// the actor sees its first message.
pub fn spawn_init<B, F>(hint: Hint, behavior: B, init: F) -> ActorRef
where
    B: Behavior,
    F: FnOnce(&ActorRef),
{
    spawn_actor(hint, Some(Box::new(behavior)), None, Some(Box::new(init)))
}

/// Spawn an event-based actor atomically linked to the caller.
pub fn spawn_linked<B: Behavior>(behavior: B) -> ActorRef {
    let caller = context::self_ref();
    spawn_actor(
        Hint::Scheduled,
        Some(Box::new(behavior)),
        None,
        Some(Box::new(move |new: &ActorRef| {
            actor::link_cells(&caller, new);
        })),
    )
}

/// Spawn a blocking callable on a dedicated OS thread.
pub fn spawn_fn<F>(f: F) -> ActorRef
where
    F: FnOnce() + Send + 'static,
{
    spawn_fn_with(Hint::Detached, f)
}

/// Spawn a blocking callable with an explicit hint. Callables always get
/// a dedicated thread: a `Scheduled` hint degrades to `Detached`
/// (hidden-ness preserved), since a blocking body cannot be multiplexed.
pub fn spawn_fn_with<F>(hint: Hint, f: F) -> ActorRef
where
    F: FnOnce() + Send + 'static,
{
    let hint = if hint.is_hidden() {
        Hint::DetachedHidden
    } else {
        Hint::Detached
    };
    spawn_actor(hint, None, Some(Box::new(f)), None)
}

fn spawn_actor(
    hint: Hint,
    behavior: Option<Box<dyn Behavior>>,
    body: Option<Box<dyn FnOnce() + Send>>,
    init: Option<Box<dyn FnOnce(&ActorRef) + '_>>,
) -> ActorRef {
    install_quit_hook();

    let actor = ActorRef {
        cell: ActorCell::new(hint, behavior),
    };
    registry::register(&actor);
    if !hint.is_hidden() {
        registry::inc_actor_count();
        actor.attach(Box::new(ExitObserver));
    }
    debug!("spawned actor {} ({hint:?})", actor.id());

    if let Some(init) = init {
        init(&actor);
    }

    if hint.is_scheduled() {
        actor.cell.set_state(ActorState::Runnable);
        get_scheduler().enqueue(&actor);
    } else {
        actor.cell.set_state(ActorState::Executing);
        let thread_actor = actor.clone();
        thread::Builder::new()
            .name(format!("spool-actor-{}", actor.id()))
            .spawn(move || match body {
                Some(f) => detached_callable_main(&thread_actor, f),
                None => detached_event_main(&thread_actor),
            })
            .expect("failed to spawn detached actor thread");
    }
    actor
}

/// Convert the calling thread into a counted actor context. Used the
/// first time a non-actor thread touches the actor API.
pub(crate) fn register_converted_context() -> ActorRef {
    install_quit_hook();
    let actor = ActorRef {
        cell: ActorCell::new(Hint::Detached, None),
    };
    actor.cell.set_state(ActorState::Executing);
    registry::register(&actor);
    registry::inc_actor_count();
    actor.attach(Box::new(ExitObserver));
    debug!("converted thread into actor {}", actor.id());
    actor
}

// ── Detached execution ──────────────────────────────────────────────────

fn detached_callable_main(actor: &ActorRef, f: Box<dyn FnOnce() + Send>) {
    let prev = context::swap_current(Some(actor.clone()));
    let reason = match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(()) => ExitReason::NORMAL,
        Err(payload) => reason_from_panic(payload),
    };
    actor::terminate(actor, reason);
    context::swap_current(prev);
}

fn detached_event_main(actor: &ActorRef) {
    let cell = &actor.cell;
    let prev = context::swap_current(Some(actor.clone()));
    let mut runtime = cell.runtime.lock().unwrap_or_else(|e| e.into_inner());

    run_on_start(actor, &mut runtime);
    while cell.state() != ActorState::Terminated {
        let env = cell.mailbox.dequeue();
        if matches!(dispatch_one(actor, &mut runtime, env), Dispatch::Stopped) {
            break;
        }
    }
    runtime.behavior = None;
    drop(runtime);
    context::swap_current(prev);
}

// ── Tests ───────────────────────────────────────────────────────────────
