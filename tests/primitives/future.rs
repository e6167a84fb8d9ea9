//! Future Tests

use crate::common::*;
use std::thread;

#[test]
fn wait_blocks_until_result() {
    let rt = runtime();
    let handle = rt
        .future(|| {
            thread::sleep(Duration::from_millis(20));
            Ok(String::from("slow"))
        })
        .unwrap();
    assert_eq!(handle.wait().unwrap(), "slow");
}

#[test]
fn failure_is_reraised_on_wait() {
    let rt = runtime();
    let handle = rt.future_call(&adder(1)).unwrap();
    // adder takes one argument, the future supplies none
    assert!(matches!(handle.wait(), Err(Error::Arity { .. })));
}

#[test]
fn bounded_wait_expires_distinctly() {
    let rt = runtime();
    let (tx, rx) = std::sync::mpsc::channel::<()>();
    let mut handle = rt
        .future(move || {
            rx.recv().map_err(Error::callable)?;
            Ok(7)
        })
        .unwrap();
    assert!(matches!(
        handle.wait_timeout(Duration::from_millis(10)),
        Err(Error::FutureTimeout(_))
    ));
    tx.send(()).unwrap();
    assert_eq!(handle.wait().unwrap(), 7);
}

#[test]
fn futures_run_in_parallel() {
    let rt = runtime();
    let barrier = Arc::new(std::sync::Barrier::new(3));
    let handles: Vec<_> = (0..3)
        .map(|i| {
            let barrier = Arc::clone(&barrier);
            rt.future(move || {
                barrier.wait();
                Ok(i)
            })
            .unwrap()
        })
        .collect();
    let results: Vec<i32> = handles.into_iter().map(|h| h.wait().unwrap()).collect();
    assert_eq!(results, vec![0, 1, 2]);
}

#[test]
fn process_wide_future() {
    let mut handle = strand::future(|| Ok(1 + 1)).unwrap();
    assert!(eventually(|| handle.is_done()));
    assert_eq!(handle.wait().unwrap(), 2);
}
