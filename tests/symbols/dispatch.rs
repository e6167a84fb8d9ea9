//! Call-by-name Tests

use crate::common::*;

#[test]
fn call_core_functions_by_name() {
    let rt = runtime();
    assert_eq!(
        rt.call("+", &[Value::Int(1), Value::Int(2), Value::Int(3)]).unwrap(),
        Value::Int(6)
    );
    assert_eq!(
        rt.call_by_name("core", "str", &[Value::from("a"), Value::Int(1), Value::Nil])
            .unwrap(),
        Value::from("a1")
    );
    assert_eq!(
        rt.call("core/vector", &[Value::Int(1), Value::keyword("k")]).unwrap(),
        Value::Vector(vec![Value::Int(1), Value::keyword("k")])
    );
}

#[test]
fn unknown_operation_is_an_error() {
    let rt = runtime();
    let err = rt.call("no-such-fn", &[]).unwrap_err();
    assert!(matches!(err, Error::NoSuchOperation { ref name } if name == "core/no-such-fn"));
}

#[test]
fn unbound_operation_is_an_error() {
    let vars = Arc::new(InMemoryRuntime::with_core());
    vars.declare("core", "later");
    let rt = runtime_with(Arc::clone(&vars));
    assert!(matches!(
        rt.call("later", &[]),
        Err(Error::NoSuchOperation { .. })
    ));

    vars.intern("core", "later", Callable::thunk(|| Ok(Value::Bool(true))));
    assert_eq!(rt.call("later", &[]).unwrap(), Value::Bool(true));
}

#[test]
fn callable_failure_propagates_unchanged() {
    let vars = Arc::new(InMemoryRuntime::new());
    vars.intern(
        "app",
        "explode",
        wrap(|_| Err(Error::IllegalMutation("from inside".into()).into())),
    );
    let rt = runtime_with(vars);
    let err = rt.call("app/explode", &[]).unwrap_err();
    assert!(matches!(err, Error::IllegalMutation(ref m) if m == "from inside"));
}

#[test]
fn wrong_arity_is_reported() {
    let rt = runtime();
    let err = rt.call("inc", &[]).unwrap_err();
    assert!(matches!(err, Error::Arity { expected: 1, actual: 0, .. }));
}

#[test]
fn overflow_surfaces_as_callable_failure() {
    let rt = runtime();
    let err = rt.call("inc", &[Value::Int(i64::MAX)]).unwrap_err();
    assert!(matches!(err, Error::CallableInvocation { .. }));
}

#[test]
fn resolved_function_drives_every_primitive() {
    let rt = runtime();
    let inc = rt.symbols().var("core", "inc").unwrap().value().unwrap();
    let inc = inc.as_fn().unwrap().clone();

    let atom = rt.atom(Value::Int(0));
    atom.swap_callable(&inc).unwrap();

    let tref = rt.tref(Value::Int(0));
    rt.dosync(|txn| txn.alter_callable(&tref, &inc)).unwrap();

    let agent = rt.agent(Value::Int(0));
    agent.send_callable(&inc).unwrap();
    agent.await_idle();

    let future = rt.future(move || inc.invoke1(&Value::Int(0))).unwrap();

    assert_eq!(atom.get(), Value::Int(1));
    assert_eq!(tref.get(), Value::Int(1));
    assert_eq!(agent.get().unwrap(), Value::Int(1));
    assert_eq!(future.wait().unwrap(), Value::Int(1));
}
