//! Resolution Tests

use crate::common::*;
use std::sync::atomic::{AtomicUsize, Ordering};

fn app_runtime(loads: Arc<AtomicUsize>) -> Arc<InMemoryRuntime> {
    let vars = Arc::new(InMemoryRuntime::with_core());
    vars.register_loader("app", move |rt| {
        loads.fetch_add(1, Ordering::SeqCst);
        rt.intern("app", "foo-bar", Value::Int(7));
        rt.intern("app", "greet", wrap(|args| Ok(Value::from(format!("hi {}", args[0])))));
        rt.declare("app", "pending");
        Ok(())
    });
    vars
}

// ============================================================================
// Name Normalization
// ============================================================================

#[test]
fn underscore_and_hyphen_resolve_to_same_binding() {
    let rt = runtime_with(app_runtime(Arc::default()));
    let a = rt.symbols().resolve("app", "foo_bar").unwrap();
    let b = rt.symbols().resolve("app", "foo-bar").unwrap();
    assert!(a.is_bound());
    assert_eq!(a.binding(), b.binding());
    assert_eq!(a.binding().unwrap().symbol().to_string(), "app/foo-bar");
}

#[test]
fn resolve_default_uses_current_namespace() {
    let rt = runtime();
    assert_eq!(rt.symbols().current_namespace(), "core");
    assert!(rt.symbols().resolve_default("inc").unwrap().is_bound());

    let rt = runtime_with(app_runtime(Arc::default()));
    rt.symbols().set_current_namespace("app");
    assert!(rt.symbols().resolve_default("foo_bar").unwrap().is_bound());
}

// ============================================================================
// Lazy Loading
// ============================================================================

#[test]
fn namespace_loads_once_on_first_use() {
    let loads = Arc::new(AtomicUsize::new(0));
    let rt = runtime_with(app_runtime(Arc::clone(&loads)));
    assert_eq!(loads.load(Ordering::SeqCst), 0);

    rt.symbols().resolve("app", "foo-bar").unwrap();
    rt.symbols().resolve("app", "greet").unwrap();
    rt.require("app").unwrap();
    assert_eq!(loads.load(Ordering::SeqCst), 1);
}

#[test]
fn unknown_namespace_differs_from_unbound_name() {
    let rt = runtime_with(app_runtime(Arc::default()));

    let err = rt.symbols().resolve("nowhere", "x").unwrap_err();
    assert!(matches!(err, Error::UnknownNamespace { .. }));

    let err = rt.symbols().var("app", "missing").unwrap_err();
    assert!(err.is_unbound());

    let pending = rt.symbols().var("app", "pending").unwrap();
    assert!(!pending.is_bound());
    assert!(pending.value().unwrap_err().is_unbound());
}

#[test]
fn failing_loader_is_unknown_namespace() {
    let vars = Arc::new(InMemoryRuntime::new());
    vars.register_loader("broken", |_| Err(Error::callable("syntax error")));
    let rt = runtime_with(vars);
    let err = rt.require("broken").unwrap_err();
    assert!(matches!(err, Error::UnknownNamespace { .. }));
    assert!(err.to_string().contains("syntax error"));
}

#[test]
fn failed_load_is_not_mistaken_for_success() {
    let vars = Arc::new(InMemoryRuntime::new());
    vars.register_loader("lib", |rt| {
        rt.intern("lib", "x", Value::Int(1));
        Err(Error::callable("syntax error halfway through"))
    });
    let rt = runtime_with(vars);
    for _ in 0..2 {
        let err = rt.symbols().resolve("lib", "x").unwrap_err();
        assert!(matches!(err, Error::UnknownNamespace { .. }));
    }
}

#[test]
fn early_intern_does_not_suppress_loader() {
    let vars = Arc::new(InMemoryRuntime::with_core());
    vars.intern("core", "my-helper", Value::Int(1));
    let rt = runtime_with(vars);
    assert!(rt.symbols().resolve("core", "inc").unwrap().is_bound());
    assert!(rt.symbols().resolve("core", "my-helper").unwrap().is_bound());
}

#[test]
fn concurrent_require_loads_once() {
    let loads = Arc::new(AtomicUsize::new(0));
    let rt = Arc::new(runtime_with(app_runtime(Arc::clone(&loads))));
    let barrier = Arc::new(std::sync::Barrier::new(4));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let rt = Arc::clone(&rt);
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                barrier.wait();
                rt.require("app").unwrap();
                assert!(rt.symbols().resolve("app", "foo-bar").unwrap().is_bound());
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(loads.load(Ordering::SeqCst), 1);
}

// ============================================================================
// Cache
// ============================================================================

#[test]
fn cached_binding_sees_later_definition() {
    let vars = app_runtime(Arc::default());
    let rt = runtime_with(Arc::clone(&vars));

    let before = rt.symbols().var("app", "pending").unwrap();
    assert!(!before.is_bound());
    assert!(rt.metrics().cached_bindings >= 1);

    vars.intern("app", "pending", Value::Int(1));
    assert!(before.is_bound());
    assert!(matches!(
        rt.call("app/pending", &[]),
        Err(Error::WrongType { .. })
    ));
    assert!(rt.symbols().resolve("app", "pending").unwrap().is_bound());
}

#[test]
fn misses_are_not_cached() {
    let vars = app_runtime(Arc::default());
    let rt = runtime_with(Arc::clone(&vars));
    assert!(matches!(
        rt.symbols().resolve("app", "late").unwrap(),
        Resolved::Missing(_)
    ));
    vars.intern("app", "late", Value::Int(2));
    let late = rt.symbols().var("app", "late").unwrap();
    assert_eq!(late.value().unwrap(), Value::Int(2));
}

#[test]
fn namespace_view() {
    let rt = runtime_with(app_runtime(Arc::default()));
    let app = rt.symbols().ns("app").require().unwrap();
    assert_eq!(app.name(), "app");
    assert_eq!(app.var("foo_bar").unwrap().value().unwrap(), Value::Int(7));
    assert_eq!(
        app.call("greet", &[Value::from("ana")]).unwrap(),
        Value::from("hi ana")
    );
}
