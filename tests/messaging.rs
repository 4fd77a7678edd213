//! Pairwise FIFO ordering, reply targeting, and blocking-style actors.

use spool::{
    msg, receive, receive_matching, reply, send, spawn, spawn_fn, try_receive, Atom, Envelope,
    React,
};

const ASK: Atom = Atom::new("ASK");
const ACK: Atom = Atom::new("ACK");

#[test]
fn per_pair_fifo_is_preserved() {
    let _ = env_logger::builder().is_test(true).try_init();

    // Echo actor: replies every int straight back to its sender.
    let echo = spawn(|env: Envelope| match env.payload.value::<i32>(0) {
        Some(n) => {
            reply(msg!(*n));
            React::Done
        }
        None => React::Skipped(env),
    });

    const COUNT: i32 = 500;
    for n in 0..COUNT {
        send(&echo, msg!(n));
    }

    let mut got: Vec<i32> = Vec::new();
    while (got.len() as i32) < COUNT {
        receive_matching(|env| match env.payload.value::<i32>(0) {
            Some(&n) => {
                got.push(n);
                true
            }
            None => false,
        });
    }
    // One sender, one receiver, each direction: order must survive.
    assert_eq!(got, (0..COUNT).collect::<Vec<i32>>());
}

#[test]
fn replies_reach_the_requester_with_the_responder_as_sender() {
    let responder = spawn(|env: Envelope| {
        if env.payload.matches_atom(0, ASK) {
            reply(msg!(ACK));
            React::Done
        } else {
            React::Skipped(env)
        }
    });

    send(&responder, msg!(ASK));
    let mut sender_id = None;
    receive_matching(|env| {
        if env.payload.matches_atom(0, ACK) {
            sender_id = env.sender.as_ref().map(spool::ActorRef::id);
            true
        } else {
            false
        }
    });
    assert_eq!(sender_id, Some(responder.id()));
}

#[test]
fn detached_actors_use_blocking_receives() {
    // Blocking style: take two ints, reply their sum to the sender of
    // the most recent one.
    let summer = spawn_fn(|| {
        let a = receive();
        let b = receive();
        let total = a.payload.value::<i32>(0).copied().unwrap_or(0)
            + b.payload.value::<i32>(0).copied().unwrap_or(0);
        reply(msg!(total));
    });

    send(&summer, msg!(20_i32));
    send(&summer, msg!(22_i32));

    let mut total = 0;
    receive_matching(|env| match env.payload.value::<i32>(0) {
        Some(&n) => {
            total = n;
            true
        }
        None => false,
    });
    assert_eq!(total, 42);
}

#[test]
fn try_receive_on_an_idle_context_is_none() {
    // This test thread's converted context has its own empty mailbox.
    assert!(try_receive().is_none());
}
