//! Builtin `core` namespace
//!
//! A handful of functions so call-by-name works on a fresh runtime without a
//! foreign loader. Numeric functions accept `Int` and `Float`; any `Float`
//! argument makes the result a `Float`.

use crate::memory::InMemoryRuntime;
use strand_core::{BoxError, Callable, Error, Result, Value};

/// Name of the builtin namespace
pub const CORE_NAMESPACE: &str = strand_core::DEFAULT_NAMESPACE;

enum Num {
    Int(i64),
    Float(f64),
}

fn num(v: &Value) -> std::result::Result<Num, BoxError> {
    match v {
        Value::Int(i) => Ok(Num::Int(*i)),
        Value::Float(f) => Ok(Num::Float(*f)),
        other => Err(Box::new(Error::WrongType {
            expected: "number",
            actual: other.type_name(),
        })),
    }
}

fn fold(
    args: &[Value],
    init: i64,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> std::result::Result<Value, BoxError> {
    let mut acc = Num::Int(init);
    for arg in args {
        acc = match (acc, num(arg)?) {
            (Num::Int(a), Num::Int(b)) => {
                Num::Int(int_op(a, b).ok_or_else(|| BoxError::from("integer overflow"))?)
            }
            (Num::Int(a), Num::Float(b)) => Num::Float(float_op(a as f64, b)),
            (Num::Float(a), Num::Int(b)) => Num::Float(float_op(a, b as f64)),
            (Num::Float(a), Num::Float(b)) => Num::Float(float_op(a, b)),
        };
    }
    Ok(match acc {
        Num::Int(i) => Value::Int(i),
        Num::Float(f) => Value::Float(f),
    })
}

fn step(v: &Value, delta: i64) -> std::result::Result<Value, BoxError> {
    match num(v)? {
        Num::Int(i) => i
            .checked_add(delta)
            .map(Value::Int)
            .ok_or_else(|| "integer overflow".into()),
        Num::Float(f) => Ok(Value::Float(f + delta as f64)),
    }
}

/// Intern the builtin functions into `core`
pub fn install(runtime: &InMemoryRuntime) -> Result<()> {
    let ns = CORE_NAMESPACE;
    runtime.intern(ns, "identity", Callable::unary(|v| Ok(v.clone())).with_name("identity"));
    runtime.intern(ns, "inc", Callable::unary(|v| step(v, 1)).with_name("inc"));
    runtime.intern(ns, "dec", Callable::unary(|v| step(v, -1)).with_name("dec"));
    runtime.intern(
        ns,
        "+",
        Callable::named("+", |args| fold(args, 0, i64::checked_add, |a, b| a + b)),
    );
    runtime.intern(
        ns,
        "*",
        Callable::named("*", |args| fold(args, 1, i64::checked_mul, |a, b| a * b)),
    );
    runtime.intern(
        ns,
        "str",
        Callable::named("str", |args| {
            let mut out = String::new();
            for arg in args {
                // nil contributes nothing
                if !arg.is_nil() {
                    out.push_str(&arg.to_string());
                }
            }
            Ok(Value::String(out))
        }),
    );
    runtime.intern(
        ns,
        "vector",
        Callable::named("vector", |args| Ok(Value::Vector(args.to_vec()))),
    );
    runtime.intern(
        ns,
        "count",
        Callable::unary(|v| match v {
            Value::Nil => Ok(Value::Int(0)),
            Value::String(s) => Ok(Value::Int(s.chars().count() as i64)),
            Value::Vector(items) => Ok(Value::Int(items.len() as i64)),
            other => Err(Box::new(Error::WrongType {
                expected: "countable",
                actual: other.type_name(),
            })),
        })
        .with_name("count"),
    );
    runtime.intern(
        ns,
        "=",
        Callable::named("=", |args| {
            Ok(Value::Bool(args.windows(2).all(|w| w[0] == w[1])))
        }),
    );
    Ok(())
}
