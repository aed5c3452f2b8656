//! Integration tests for the message actor.
//!
//! These tests verify that:
//! - Posted messages are dispatched in FIFO order, one at a time
//! - Delayed messages are not dispatched early, and only the head is checked
//! - Synchronous calls get exactly the handler's reply
//! - Exit, panics and timeouts never leave a sender blocked

use cadence::actor::{ActorConfig, ActorHandle, DispatchTable, Message, MessageActor, MessageParams};
use cadence::error::Error;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

const RECORD: u32 = 1;
const ECHO: u32 = 2;
const SLOW: u32 = 3;
const PANIC: u32 = 4;
const CALL_SELF: u32 = 5;

/// Records `(param1, dispatch time)` for every RECORD message.
fn recorder() -> (MessageActor, Arc<Mutex<Vec<(u64, Instant)>>>) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = log.clone();
    let table = DispatchTable::<()>::new()
        .on(RECORD, move |_, msg, _| {
            sink.lock().unwrap().push((msg.param1(), Instant::now()));
        })
        .on(ECHO, |_, msg, ctx| {
            let params = MessageParams::new()
                .with_param1(msg.param1() * 2)
                .with_param2(-msg.param2())
                .with_object(format!("echo {}", msg.param1()));
            ctx.reply(&msg, params);
        })
        .on(SLOW, |_, msg, ctx| {
            thread::sleep(Duration::from_millis(msg.param1()));
            ctx.reply(&msg, MessageParams::new());
        })
        .on(PANIC, |_, _, _| panic!("handler failure"))
        .on(CALL_SELF, |_, msg, ctx| {
            let result = ctx.handle().send(Message::new(ECHO));
            let deadlocked = matches!(result, Err(Error::InvalidOperation(_)));
            ctx.reply(&msg, MessageParams::new().with_param1(deadlocked as u64));
        });
    let actor = MessageActor::spawn((), table, ActorConfig::named("recorder")).unwrap();
    (actor, log)
}

fn recorded(log: &Mutex<Vec<(u64, Instant)>>) -> Vec<u64> {
    log.lock().unwrap().iter().map(|(v, _)| *v).collect()
}

fn sync(handle: &ActorHandle) {
    handle.send(Message::new(ECHO)).unwrap();
}

#[test]
fn test_fifo_order() {
    let (actor, log) = recorder();
    for i in 0..100 {
        actor.post(Message::new(RECORD).with_param1(i));
    }
    sync(&actor);
    assert_eq!(recorded(&log), (0..100).collect::<Vec<_>>());
}

#[test]
fn test_fifo_order_across_threads() {
    let (actor, log) = recorder();
    let mut workers = Vec::new();
    for t in 0..4u64 {
        let handle = actor.handle();
        workers.push(thread::spawn(move || {
            for i in 0..50u64 {
                handle.post(Message::new(RECORD).with_param1(t * 1000 + i));
            }
        }));
    }
    for w in workers {
        w.join().unwrap();
    }
    sync(&actor);

    let values = recorded(&log);
    assert_eq!(values.len(), 200);
    for t in 0..4u64 {
        let per_thread: Vec<u64> = values.iter().copied().filter(|v| v / 1000 == t).collect();
        assert_eq!(per_thread, (0..50).map(|i| t * 1000 + i).collect::<Vec<_>>());
    }
}

#[test]
fn test_delayed_message_not_early() {
    let (actor, log) = recorder();
    let posted = Instant::now();
    actor.post_delayed(Message::new(RECORD).with_param1(7), Duration::from_millis(80));

    thread::sleep(Duration::from_millis(20));
    assert!(recorded(&log).is_empty());

    let deadline = Instant::now() + Duration::from_secs(2);
    while recorded(&log).is_empty() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    let entries = log.lock().unwrap().clone();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].1.duration_since(posted) >= Duration::from_millis(80));
}

#[test]
fn test_head_only_due_check() {
    let (actor, log) = recorder();
    let posted = Instant::now();
    actor.post_delayed(Message::new(RECORD).with_param1(1), Duration::from_millis(60));
    actor.post(Message::new(RECORD).with_param1(2));

    sync(&actor);
    let entries = log.lock().unwrap().clone();
    assert_eq!(entries.iter().map(|(v, _)| *v).collect::<Vec<_>>(), vec![1, 2]);
    // The immediate message waited behind the delayed head.
    assert!(entries[1].1.duration_since(posted) >= Duration::from_millis(60));
}

#[test]
fn test_send_returns_exact_reply() {
    let (actor, _log) = recorder();
    let reply = actor
        .send(Message::new(ECHO).with_param1(21).with_param2(5))
        .unwrap();
    assert_eq!(reply.param1, 42);
    assert_eq!(reply.param2, -5);
    assert_eq!(reply.object::<String>().map(String::as_str), Some("echo 21"));
}

#[test]
fn test_concurrent_senders_get_own_replies() {
    let (actor, _log) = recorder();
    let mut workers = Vec::new();
    for t in 0..8u64 {
        let handle = actor.handle();
        workers.push(thread::spawn(move || {
            for i in 0..25u64 {
                let value = t * 100 + i;
                let reply = handle.send(Message::new(ECHO).with_param1(value)).unwrap();
                assert_eq!(reply.param1, value * 2);
            }
        }));
    }
    for w in workers {
        w.join().unwrap();
    }
}

#[test]
fn test_post_response_zero_is_noop() {
    let (actor, log) = recorder();
    actor.post_response(0, MessageParams::new().with_param1(99));
    actor.post(Message::new(RECORD).with_param1(1));
    sync(&actor);
    assert_eq!(recorded(&log), vec![1]);
    assert!(actor.is_running());
}

#[test]
fn test_exit_drains_queue() {
    let (actor, log) = recorder();
    actor.post(Message::new(SLOW).with_param1(30));
    for i in 0..10 {
        actor.post(Message::new(RECORD).with_param1(i));
    }
    actor.post_delayed(Message::new(RECORD).with_param1(10), Duration::from_millis(20));
    let handle = actor.handle();
    actor.join().unwrap();

    assert_eq!(recorded(&log), (0..=10).collect::<Vec<_>>());
    assert!(handle.has_exited());

    // Posts after exit are dropped.
    handle.post(Message::new(RECORD).with_param1(11));
    assert_eq!(handle.pending(), 0);
    assert_eq!(recorded(&log).len(), 11);
}

#[test]
fn test_handler_panic_wakes_senders() {
    let (actor, _log) = recorder();
    let handle = actor.handle();
    actor.post(Message::new(SLOW).with_param1(50));
    actor.post(Message::new(PANIC));

    let (tx, rx) = mpsc::channel();
    let blocked = handle.clone();
    thread::spawn(move || {
        let _ = tx.send(blocked.send(Message::new(ECHO).with_param1(1)));
    });

    let result = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(result.unwrap_err(), Error::ActorExited);
    assert!(handle.has_exited());
    assert!(!handle.is_running());
}

#[test]
fn test_send_timeout() {
    let (actor, _log) = recorder();
    actor.post(Message::new(SLOW).with_param1(200));
    let started = Instant::now();
    let err = actor
        .send_timeout(Message::new(ECHO), Duration::from_millis(30))
        .unwrap_err();
    assert!(matches!(err, Error::Timeout(_)));
    assert!(started.elapsed() < Duration::from_millis(200));

    // A late reply to the abandoned call does not disturb later calls.
    let reply = actor.send(Message::new(ECHO).with_param1(3)).unwrap();
    assert_eq!(reply.param1, 6);
}

#[test]
fn test_configured_send_timeout() {
    let table = DispatchTable::<()>::new().on(SLOW, |_, msg, ctx| {
        thread::sleep(Duration::from_millis(msg.param1()));
        ctx.reply(&msg, MessageParams::new());
    });
    let config = ActorConfig::named("bounded").with_send_timeout(Duration::from_millis(20));
    let actor = MessageActor::spawn((), table, config).unwrap();
    let err = actor.send(Message::new(SLOW).with_param1(150)).unwrap_err();
    assert!(matches!(err, Error::Timeout(_)));
}

#[test]
fn test_send_from_actor_thread_rejected() {
    let (actor, _log) = recorder();
    let reply = actor.send(Message::new(CALL_SELF)).unwrap();
    assert_eq!(reply.param1, 1);
}

#[test]
fn test_self_post_from_handler() {
    const COUNTDOWN: u32 = 10;
    const DONE: u32 = 11;

    let (tx, rx) = mpsc::channel::<u64>();
    let tx = Mutex::new(tx);
    let table = DispatchTable::<u64>::new()
        .on(COUNTDOWN, |ticks, msg, ctx| {
            *ticks += 1;
            if msg.param1() > 0 {
                ctx.post_delayed(Message::new(COUNTDOWN).with_param1(msg.param1() - 1), Duration::from_millis(1));
            } else {
                ctx.post(Message::new(DONE));
            }
        })
        .on(DONE, move |ticks, _, ctx| {
            let _ = tx.lock().unwrap().send(*ticks);
            ctx.stop();
        });
    let actor = MessageActor::spawn(0u64, table, ActorConfig::named("countdown")).unwrap();
    actor.post(Message::new(COUNTDOWN).with_param1(5));

    assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 6);
    actor.join().unwrap();
}
