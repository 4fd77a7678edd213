//! Quiescence: `await_all_others_done` returns only once every counted
//! actor has terminated.
//!
//! This file holds a single test on purpose: the barrier watches the
//! process-wide actor count, so a concurrent test converting its own
//! thread into a context would stall it.

use spool::{actor_count, await_all_others_done, spawn, Behavior, Envelope, ExitReason, React};

struct QuitOnStart;

impl Behavior for QuitOnStart {
    fn on_start(&mut self) {
        spool::quit(ExitReason::NORMAL);
    }

    fn react(&mut self, _env: Envelope) -> React {
        React::Done
    }
}

#[test]
fn barrier_returns_after_all_actors_quit() {
    let _ = env_logger::builder().is_test(true).try_init();

    const N: usize = 64;
    let actors: Vec<_> = (0..N).map(|_| spawn(QuitOnStart)).collect();

    // The main thread never converted itself (spawn alone does not), so
    // the barrier's baseline is zero.
    await_all_others_done();

    assert_eq!(actor_count(), 0);
    for actor in &actors {
        assert!(actor.is_terminated());
        assert_eq!(actor.exit_reason(), ExitReason::NORMAL);
    }
}
