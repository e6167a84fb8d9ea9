//! Agent Tests

use crate::common::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Barrier;
use std::thread;

// ============================================================================
// Basic Operations
// ============================================================================

#[test]
fn send_appends_to_greeting() {
    let rt = runtime();
    let agent = rt.agent(String::from("hello"));
    agent.send(|s| format!("{} world", s)).unwrap();
    agent.await_idle();
    assert_eq!(agent.get().unwrap(), "hello world");
}

#[test]
fn n_sends_from_one_thread() {
    let rt = runtime();
    let agent = rt.agent(0i64);
    let n = 1000;
    for _ in 0..n {
        agent.send(|v| v + 1).unwrap();
    }
    agent.await_idle();
    assert_eq!(agent.get().unwrap(), n);
}

#[test]
fn send_off_keeps_fifo_with_send() {
    let rt = runtime();
    let agent = rt.agent(String::new());
    for c in ['a', 'b', 'c', 'd', 'e', 'f'] {
        let push = move |s: &String| format!("{}{}", s, c);
        if c < 'd' {
            agent.send(push).unwrap();
        } else {
            agent.send_off(push).unwrap();
        }
    }
    agent.await_idle();
    assert_eq!(agent.get().unwrap(), "abcdef");
}

#[test]
fn send_callable_from_symbol_table() {
    let rt = runtime();
    let agent = rt.agent(Value::Int(0));
    let inc = rt.symbols().var("core", "inc").unwrap().value().unwrap();
    for _ in 0..5 {
        agent.send_callable(inc.as_fn().unwrap()).unwrap();
    }
    agent.await_idle();
    assert_eq!(agent.get().unwrap(), Value::Int(5));
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn failed_action_is_surfaced_on_get() {
    let rt = runtime();
    let agent = rt.agent(Value::from("text"));
    agent.send_callable(&adder(1)).unwrap();
    agent.await_idle();

    let err = agent.get().unwrap_err();
    assert!(err.is_agent_failure());
    assert!(agent.send(|v| v.clone()).unwrap_err().is_agent_failure());

    agent.restart(Value::Int(1), true).unwrap();
    agent.send_callable(&adder(1)).unwrap();
    agent.await_idle();
    assert_eq!(agent.get().unwrap(), Value::Int(2));
}

#[test]
fn continue_mode_keeps_working() {
    let rt = Strand::builder()
        .error_mode(ErrorMode::Continue)
        .open()
        .unwrap();
    let agent = rt.agent(0i64);
    agent.send(|v| v + 1).unwrap();
    agent.try_send(|_| Err(Error::callable("skipped"))).unwrap();
    agent.send(|v| v + 1).unwrap();
    agent.await_idle();
    assert_eq!(agent.get().unwrap(), 2);
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn many_senders_one_agent() {
    let rt = runtime();
    let agent = rt.agent(0i64);
    let threads = 4;
    let per_thread = 250;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let agent = agent.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..per_thread {
                    agent.send(|v| v + 1).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    agent.await_idle();

    assert_eq!(agent.get().unwrap(), (threads * per_thread) as i64);
}

#[test]
fn actions_of_one_agent_never_overlap() {
    let rt = runtime();
    let agent = rt.agent(0i64);
    let active = Arc::new(AtomicUsize::new(0));
    let overlaps = Arc::new(AtomicUsize::new(0));
    for i in 0..200 {
        let active = Arc::clone(&active);
        let overlaps = Arc::clone(&overlaps);
        let action = move |v: &i64| {
            if active.fetch_add(1, Ordering::SeqCst) != 0 {
                overlaps.fetch_add(1, Ordering::SeqCst);
            }
            thread::yield_now();
            active.fetch_sub(1, Ordering::SeqCst);
            v + 1
        };
        if i % 2 == 0 {
            agent.send(action).unwrap();
        } else {
            agent.send_off(action).unwrap();
        }
    }
    agent.await_idle();
    assert_eq!(agent.get().unwrap(), 200);
    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
}

#[test]
fn sends_inside_transaction_follow_commit() {
    let rt = runtime();
    let balance = rt.tref(100i64);
    let audit = rt.agent(Vec::<i64>::new());
    rt.dosync(|txn| {
        let next = txn.alter(&balance, |v| v - 10)?;
        audit.send(move |log| {
            let mut log = log.clone();
            log.push(next);
            log
        })
    })
    .unwrap();
    audit.await_idle();
    assert_eq!(audit.get().unwrap(), vec![90]);
}
