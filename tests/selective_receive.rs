//! Selective receive: type-ordered consumption without losing messages.

use spool::{msg, receive_matching, self_ref, send, try_receive_matching, Envelope};

fn take_int(got: &mut Option<i32>) -> impl FnMut(&Envelope) -> bool + '_ {
    move |env| match env.payload.value::<i32>(0) {
        Some(&n) => {
            *got = Some(n);
            true
        }
        None => false,
    }
}

fn take_string(got: &mut Option<String>) -> impl FnMut(&Envelope) -> bool + '_ {
    move |env| match env.payload.value::<String>(0) {
        Some(s) => {
            *got = Some(s.clone());
            true
        }
        None => false,
    }
}

#[test]
fn order_is_preserved_within_each_type() {
    let _ = env_logger::builder().is_test(true).try_init();
    let me = self_ref();

    send(&me, msg!(1_i32));
    send(&me, msg!("a".to_string()));
    send(&me, msg!(2_i32));
    send(&me, msg!("b".to_string()));

    let mut n = None;
    receive_matching(take_int(&mut n));
    assert_eq!(n, Some(1));
    receive_matching(take_int(&mut n));
    assert_eq!(n, Some(2));

    // The strings were scanned and skipped twice; their order held.
    let mut s = None;
    receive_matching(take_string(&mut s));
    assert_eq!(s.as_deref(), Some("a"));
    receive_matching(take_string(&mut s));
    assert_eq!(s.as_deref(), Some("b"));
}

#[test]
fn unmatched_messages_stay_available() {
    let me = self_ref();

    send(&me, msg!("only-strings".to_string()));
    let mut n = None;
    assert!(!try_receive_matching(take_int(&mut n)));
    assert_eq!(n, None);

    // The message is still there for a matcher that wants it.
    let mut s = None;
    assert!(try_receive_matching(take_string(&mut s)));
    assert_eq!(s.as_deref(), Some("only-strings"));
}
