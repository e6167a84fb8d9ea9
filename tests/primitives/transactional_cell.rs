//! TransactionalCell Tests
//!
//! Alter, set and commute through the runtime's engine.

use crate::common::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Barrier, Mutex};
use std::thread;

// ============================================================================
// Basic Operations
// ============================================================================

#[test]
fn alter_then_commit() {
    let rt = runtime();
    let cell = rt.tref(10i64);
    rt.dosync(|_| cell.alter(|v| v * 2)).unwrap();
    assert_eq!(cell.get(), 20);
}

#[test]
fn alter_outside_transaction_is_illegal() {
    let rt = runtime();
    let cell = rt.tref(10i64);
    assert!(cell.alter(|v| v * 2).unwrap_err().is_illegal_mutation());
    assert!(cell.set(1).unwrap_err().is_illegal_mutation());
    assert!(cell.commute(|v| v + 1).unwrap_err().is_illegal_mutation());
    assert_eq!(cell.get(), 10);
}

#[test]
fn body_failure_discards_writes() {
    let rt = runtime();
    let a = rt.tref(1i64);
    let b = rt.tref(2i64);
    let err = rt
        .dosync(|txn| {
            txn.set(&a, 100)?;
            txn.set(&b, 200)?;
            Err::<(), _>(Error::callable("insufficient funds"))
        })
        .unwrap_err();

    assert!(matches!(err, Error::TransactionAborted { .. }));
    assert!(err.to_string().contains("insufficient funds"));
    assert_eq!((a.get(), b.get()), (1, 2));
}

#[test]
fn body_runs_once_without_contention() {
    let rt = runtime();
    let cell = rt.tref(0i64);
    let runs = AtomicUsize::new(0);
    rt.dosync(|txn| {
        runs.fetch_add(1, Ordering::SeqCst);
        txn.alter(&cell, |v| v + 1)
    })
    .unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[test]
fn body_failure_under_contention_runs_once_on_one_snapshot() {
    let rt = runtime();
    let a = rt.tref(100i64);
    let b = rt.tref(0i64);
    let (read_tx, read_rx) = mpsc::channel();
    let (go_tx, go_rx) = mpsc::channel::<()>();
    let runs = AtomicUsize::new(0);
    let totals = Mutex::new(Vec::new());

    let result = thread::scope(|s| {
        let (rt, a, b, runs, totals) = (&rt, &a, &b, &runs, &totals);
        let body = s.spawn(move || {
            rt.dosync(|txn| {
                runs.fetch_add(1, Ordering::SeqCst);
                let seen_a = txn.get(a);
                read_tx.send(()).unwrap();
                go_rx.recv().unwrap();
                totals.lock().unwrap().push(seen_a + txn.get(b));
                Err::<(), _>(Error::callable("business rule: refuse"))
            })
        });

        read_rx.recv().unwrap();
        rt.dosync(|txn| {
            txn.alter(a, |v| v - 50)?;
            txn.alter(b, |v| v + 50)
        })
        .unwrap();
        go_tx.send(()).unwrap();
        body.join().unwrap()
    });

    assert!(matches!(result, Err(Error::TransactionAborted { .. })));
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(*totals.lock().unwrap(), vec![100]);
    assert_eq!((a.get(), b.get()), (50, 50));
}

#[test]
fn callable_updates_from_symbol_table() {
    let rt = runtime();
    let cell = rt.tref(Value::Int(1));
    let inc = rt.symbols().var("core", "inc").unwrap().value().unwrap();
    let inc = inc.as_fn().unwrap().clone();
    rt.dosync(|txn| {
        txn.alter_callable(&cell, &inc)?;
        txn.commute_callable(&cell, &adder(10))
    })
    .unwrap();
    assert_eq!(cell.get(), Value::Int(12));
}

#[test]
fn alter_after_commute_is_rejected() {
    let rt = runtime();
    let cell = rt.tref(0i64);
    let err = rt
        .dosync(|txn| {
            txn.commute(&cell, |v| v + 1)?;
            txn.alter(&cell, |v| v * 2)
        })
        .unwrap_err();
    assert!(matches!(err, Error::TransactionAborted { .. }));
    assert_eq!(cell.get(), 0);
}

// ============================================================================
// Conflicts
// ============================================================================

#[test]
fn loser_of_alter_race_retries_on_winner_value() {
    let rt = runtime();
    let cell = rt.tref(0i64);
    let (read_tx, read_rx) = mpsc::channel();
    let (go_tx, go_rx) = mpsc::channel::<()>();
    let attempts = AtomicUsize::new(0);
    let seen = Mutex::new(Vec::new());

    thread::scope(|s| {
        let (rt, cell, attempts, seen) = (&rt, &cell, &attempts, &seen);
        s.spawn(move || {
            rt.dosync(|txn| {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                let v = txn.get(cell);
                seen.lock().unwrap().push(v);
                if n == 0 {
                    read_tx.send(()).unwrap();
                    go_rx.recv().unwrap();
                }
                txn.set(cell, v + 1)
            })
            .unwrap();
        });

        read_rx.recv().unwrap();
        rt.dosync(|txn| txn.set(cell, 100)).unwrap();
        go_tx.send(()).unwrap();
    });

    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(*seen.lock().unwrap(), vec![0, 100]);
    assert_eq!(cell.get(), 101);
    assert!(rt.metrics().transactions_retried >= 1);
}

#[test]
fn concurrent_transfers_preserve_total() {
    let rt = Arc::new(runtime());
    let accounts: Vec<_> = (0..4).map(|_| rt.tref(1000i64)).collect();
    let threads = 4;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let rt = Arc::clone(&rt);
            let accounts = accounts.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..200 {
                    let from = &accounts[(t + i) % 4];
                    let to = &accounts[(t + i + 1) % 4];
                    rt.dosync(|txn| {
                        txn.alter(from, |v| v - 1)?;
                        txn.alter(to, |v| v + 1)
                    })
                    .unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let total: i64 = accounts.iter().map(|a| a.get()).sum();
    assert_eq!(total, 4000);
}

#[test]
fn readers_never_see_a_broken_total() {
    let rt = Arc::new(runtime());
    let a = rt.tref(1000i64);
    let b = rt.tref(1000i64);
    let barrier = Arc::new(Barrier::new(2));

    let writer = {
        let (rt, a, b, barrier) = (Arc::clone(&rt), a.clone(), b.clone(), Arc::clone(&barrier));
        thread::spawn(move || {
            barrier.wait();
            for i in 0..500i64 {
                rt.dosync(|txn| {
                    txn.alter(&a, |v| v - i)?;
                    txn.alter(&b, |v| v + i)
                })
                .unwrap();
            }
        })
    };
    let reader = {
        let (rt, a, b, barrier) = (Arc::clone(&rt), a.clone(), b.clone(), Arc::clone(&barrier));
        thread::spawn(move || {
            barrier.wait();
            let mut broken = Vec::new();
            for _ in 0..500 {
                rt.dosync(|txn| {
                    let first = txn.get(&a);
                    thread::yield_now();
                    let total = first + txn.get(&b);
                    if total != 2000 {
                        broken.push(total);
                    }
                    Ok(())
                })
                .unwrap();
            }
            broken
        })
    };

    writer.join().unwrap();
    assert_eq!(reader.join().unwrap(), Vec::<i64>::new());
    assert_eq!(a.get() + b.get(), 2000);
}

#[test]
fn concurrent_commutes_sum() {
    let rt = Arc::new(runtime());
    let counter = rt.tref(0i64);
    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let rt = Arc::clone(&rt);
            let counter = counter.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..250 {
                    rt.dosync(|txn| txn.commute(&counter, |v| v + 1)).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(counter.get(), 2000);
    // Pure commutes never join the read set.
    assert_eq!(rt.metrics().transactions_retried, 0);
}

#[test]
fn retry_limit_surfaces_error() {
    let rt = Strand::builder().max_retries(3).open().unwrap();
    let runs = AtomicUsize::new(0);
    let err = rt
        .dosync(|_| {
            runs.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(Error::Conflict("forced".into()))
        })
        .unwrap_err();
    assert!(matches!(err, Error::TransactionRetryExhausted { attempts: 3 }));
    assert_eq!(runs.load(Ordering::SeqCst), 3);
}
