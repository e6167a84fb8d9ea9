//! AtomicCell Tests

use crate::common::*;
use std::sync::Barrier;
use std::thread;

// ============================================================================
// Basic Operations
// ============================================================================

#[test]
fn swap_returns_new_value() {
    let rt = runtime();
    let cell = rt.atom(3i64);
    assert_eq!(cell.swap(|n| n + 1), 4);
    assert_eq!(cell.get(), 4);
}

#[test]
fn reset_replaces_unconditionally() {
    let rt = runtime();
    let cell = rt.atom(vec![1, 2]);
    cell.reset(vec![9]);
    assert_eq!(cell.get(), vec![9]);
}

#[test]
fn swap_with_resolved_function() {
    let rt = runtime();
    let cell = rt.atom(Value::Int(41));
    let inc = rt.symbols().var("core", "inc").unwrap().value().unwrap();
    let inc = inc.as_fn().unwrap();
    assert_eq!(cell.swap_callable(inc).unwrap(), Value::Int(42));
}

#[test]
fn failing_callable_leaves_cell_unchanged() {
    let rt = runtime();
    let cell = rt.atom(Value::from("text"));
    let err = cell.swap_callable(&adder(1)).unwrap_err();
    assert!(matches!(err, Error::WrongType { .. }));
    assert_eq!(cell.get(), Value::from("text"));
}

#[test]
fn typed_view_over_value_cell() {
    let rt = runtime();
    let cell = rt.atom(Value::from(vec![1i64, 2]));
    let view = cell.view::<Vec<i64>>();
    let grown = view
        .swap(|mut v| {
            v.push(3);
            v
        })
        .unwrap();
    assert_eq!(grown, vec![1, 2, 3]);
    assert_eq!(cell.get(), Value::from(vec![1i64, 2, 3]));
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn concurrent_increments_are_not_lost() {
    let rt = runtime();
    let cell = rt.atom(0i64);
    let threads = 2;
    let per_thread = 1000;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let cell = cell.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..per_thread {
                    cell.swap(|n| n + 1);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(cell.get(), (threads * per_thread) as i64);
}

#[test]
fn readers_never_see_partial_updates() {
    let rt = runtime();
    // Both halves always change together.
    let cell = rt.atom((0i64, 0i64));
    let writer = {
        let cell = cell.clone();
        thread::spawn(move || {
            for _ in 0..2000 {
                cell.swap(|(a, b)| (a + 1, b - 1));
            }
        })
    };
    for _ in 0..2000 {
        let (a, b) = cell.get();
        assert_eq!(a + b, 0);
    }
    writer.join().unwrap();
    assert_eq!(cell.get(), (2000, -2000));
}
