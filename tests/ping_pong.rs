//! Ping-pong: an event-based countdown actor driven from a converted
//! main context.

use std::sync::mpsc;
use std::time::Duration;

use spool::{msg, receive_matching, reply, send, spawn, Attachable, Envelope, ExitReason, React};

struct ExitProbe(mpsc::Sender<ExitReason>);

impl Attachable for ExitProbe {
    fn actor_exited(&mut self, reason: ExitReason) {
        let _ = self.0.send(reason);
    }
}

#[test]
fn ping_pong_counts_down_in_order() {
    let _ = env_logger::builder().is_test(true).try_init();

    // P: on (0) quit normally; on (n) reply (n - 1).
    let p = spawn(|env: Envelope| match env.payload.value::<i32>(0) {
        Some(0) => React::Quit(ExitReason::NORMAL),
        Some(n) => {
            reply(msg!(n - 1));
            React::Done
        }
        None => React::Skipped(env),
    });
    let (tx, rx) = mpsc::channel();
    p.attach(Box::new(ExitProbe(tx)));

    send(&p, msg!(10_i32));
    let mut got: Vec<i32> = Vec::new();
    while got.len() < 10 {
        receive_matching(|env| match env.payload.value::<i32>(0) {
            Some(&n) => {
                got.push(n);
                true
            }
            None => false,
        });
        // Echo each count back; the last echo carries the 0 that stops P.
        let last = *got.last().expect("just pushed");
        send(&p, msg!(last));
    }

    assert_eq!(got, vec![9, 8, 7, 6, 5, 4, 3, 2, 1, 0]);
    assert_eq!(
        rx.recv_timeout(Duration::from_secs(5)).expect("P terminates"),
        ExitReason::NORMAL
    );
    assert!(p.is_terminated());
}
