//! Property Tests
//!
//! Randomized checks of the ordering and no-lost-update guarantees.

#[path = "../common/mod.rs"]
mod common;

use common::*;
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Barrier;
use std::thread;

fn arb_deltas() -> impl Strategy<Value = Vec<Vec<i64>>> {
    prop::collection::vec(prop::collection::vec(-1000i64..1000, 1..50), 2..5)
}

#[derive(Debug, Clone)]
enum Op {
    Add(i64),
    Mul(i64),
    Neg,
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (-100i64..100).prop_map(Op::Add),
        (-3i64..4).prop_map(Op::Mul),
        Just(Op::Neg),
    ]
}

impl Op {
    fn apply(&self, v: i64) -> i64 {
        match self {
            Op::Add(n) => v.wrapping_add(*n),
            Op::Mul(n) => v.wrapping_mul(*n),
            Op::Neg => v.wrapping_neg(),
        }
    }
}

/// Run one closure per input on its own thread, all released together
fn run_parallel<T, F>(inputs: Vec<T>, f: F)
where
    T: Send + 'static,
    F: Fn(T) + Send + Sync + 'static,
{
    let f = Arc::new(f);
    let barrier = Arc::new(Barrier::new(inputs.len()));
    let handles: Vec<_> = inputs
        .into_iter()
        .map(|input| {
            let f = Arc::clone(&f);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                f(input)
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn atomic_cell_loses_no_update(deltas in arb_deltas()) {
        let cell = AtomicCell::new(0i64);
        let expected: i64 = deltas.iter().flatten().sum();
        let shared = cell.clone();
        run_parallel(deltas, move |mine| {
            for d in mine {
                shared.swap(|v| v + d);
            }
        });
        prop_assert_eq!(cell.get(), expected);
    }

    #[test]
    fn atomic_cell_swaps_serialize(per_thread in prop::collection::vec(1usize..40, 2..5)) {
        let cell = AtomicCell::new(Vec::<(usize, usize)>::new());
        let shared = cell.clone();
        let inputs: Vec<(usize, usize)> = per_thread.iter().copied().enumerate().collect();
        run_parallel(inputs, move |(t, n)| {
            for i in 0..n {
                shared.swap(|log| {
                    let mut log = log.clone();
                    log.push((t, i));
                    log
                });
            }
        });

        let log = cell.get();
        prop_assert_eq!(log.len(), per_thread.iter().sum::<usize>());
        let unique: HashSet<_> = log.iter().copied().collect();
        prop_assert_eq!(unique.len(), log.len());
        for (t, n) in per_thread.iter().enumerate() {
            let mine: Vec<usize> = log.iter().filter(|(o, _)| *o == t).map(|(_, i)| *i).collect();
            prop_assert_eq!(mine, (0..*n).collect::<Vec<_>>());
        }
    }

    #[test]
    fn commutes_sum_regardless_of_order(deltas in arb_deltas()) {
        let stm = Arc::new(Stm::default());
        let total = stm.new_ref(0i64);
        let expected: i64 = deltas.iter().flatten().sum();
        let (stm2, total2) = (Arc::clone(&stm), total.clone());
        run_parallel(deltas, move |mine| {
            for d in mine {
                stm2.dosync(|txn| txn.commute(&total2, move |v| v + d)).unwrap();
            }
        });
        prop_assert_eq!(total.get(), expected);
    }

    #[test]
    fn alters_lose_no_update(deltas in arb_deltas()) {
        let stm = Arc::new(Stm::default());
        let total = stm.new_ref(0i64);
        let count = stm.new_ref(0usize);
        let expected: i64 = deltas.iter().flatten().sum();
        let ops: usize = deltas.iter().map(Vec::len).sum();
        let (stm2, total2, count2) = (Arc::clone(&stm), total.clone(), count.clone());
        run_parallel(deltas, move |mine| {
            for d in mine {
                stm2.dosync(|txn| {
                    txn.alter(&count2, |c| c + 1)?;
                    txn.alter(&total2, |v| v + d)
                })
                .unwrap();
            }
        });
        prop_assert_eq!(total.get(), expected);
        prop_assert_eq!(count.get(), ops);
    }

    #[test]
    fn agent_applies_ops_in_send_order(
        start in -1000i64..1000,
        ops in prop::collection::vec(arb_op(), 0..60),
    ) {
        let agent = Agent::new(start);
        let expected = ops.iter().fold(start, |v, op| op.apply(v));
        for (i, op) in ops.into_iter().enumerate() {
            if i % 2 == 0 {
                agent.send(move |v| op.apply(*v)).unwrap();
            } else {
                agent.send_off(move |v| op.apply(*v)).unwrap();
            }
        }
        agent.await_idle();
        prop_assert_eq!(agent.get().unwrap(), expected);
    }

    #[test]
    fn separator_forms_share_a_binding(parts in prop::collection::vec("[a-z]{1,6}", 1..4)) {
        let canonical = parts.join("-");
        let host = parts.join("_");
        let vars = Arc::new(InMemoryRuntime::new());
        vars.intern("props", &canonical, Value::Int(1));
        let table = SymbolTable::new(vars);

        let a = table.resolve("props", &host).unwrap();
        let b = table.resolve("props", &canonical).unwrap();
        prop_assert!(a.is_bound());
        prop_assert_eq!(a, b);
    }
}
