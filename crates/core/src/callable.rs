//! Callable adapter
//!
//! Wraps host closures behind one variadic calling convention so the symbol
//! table, the transaction engine, atomic cells and agents can all accept user
//! code the same way.
//!
//! ## Failure propagation
//!
//! A closure reports failure by returning `Err(BoxError)`. [`Callable::invoke`]
//! surfaces it as [`Error::CallableInvocation`] with the original failure as its
//! source. A closure that fails with a strand [`Error`] (for example because it
//! called another callable) propagates that error unchanged.

use crate::error::{BoxError, Error, Result};
use crate::value::Value;
use std::fmt;
use std::sync::Arc;

type CallableFn = dyn Fn(&[Value]) -> std::result::Result<Value, BoxError> + Send + Sync;

/// Opaque unit of behavior: takes any number of values, returns one.
///
/// Cheap to clone; clones share the wrapped closure.
#[derive(Clone)]
pub struct Callable {
    f: Arc<CallableFn>,
    name: Option<Arc<str>>,
    arity: Option<usize>,
}

impl Callable {
    /// Wrap a variadic closure.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> std::result::Result<Value, BoxError> + Send + Sync + 'static,
    {
        Self {
            f: Arc::new(f),
            name: None,
            arity: None,
        }
    }

    /// Wrap a variadic closure under a name used in error messages.
    pub fn named<F>(name: &str, f: F) -> Self
    where
        F: Fn(&[Value]) -> std::result::Result<Value, BoxError> + Send + Sync + 'static,
    {
        Self {
            f: Arc::new(f),
            name: Some(Arc::from(name)),
            arity: None,
        }
    }

    /// Wrap a zero-argument closure.
    pub fn thunk<F>(f: F) -> Self
    where
        F: Fn() -> std::result::Result<Value, BoxError> + Send + Sync + 'static,
    {
        Self::fixed(0, move |_| f())
    }

    /// Wrap a one-argument closure.
    pub fn unary<F>(f: F) -> Self
    where
        F: Fn(&Value) -> std::result::Result<Value, BoxError> + Send + Sync + 'static,
    {
        Self::fixed(1, move |args| f(&args[0]))
    }

    /// Wrap a two-argument closure.
    pub fn binary<F>(f: F) -> Self
    where
        F: Fn(&Value, &Value) -> std::result::Result<Value, BoxError> + Send + Sync + 'static,
    {
        Self::fixed(2, move |args| f(&args[0], &args[1]))
    }

    fn fixed<F>(arity: usize, f: F) -> Self
    where
        F: Fn(&[Value]) -> std::result::Result<Value, BoxError> + Send + Sync + 'static,
    {
        Self {
            f: Arc::new(f),
            name: None,
            arity: Some(arity),
        }
    }

    /// Attach a name used in error messages and `Debug` output.
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(Arc::from(name));
        self
    }

    /// Name given at construction, if any
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Invoke with positional arguments.
    pub fn invoke(&self, args: &[Value]) -> Result<Value> {
        if let Some(expected) = self.arity {
            if args.len() != expected {
                return Err(Error::Arity {
                    name: self.name().unwrap_or("fn").to_string(),
                    expected,
                    actual: args.len(),
                });
            }
        }
        (self.f)(args).map_err(Error::from_boxed)
    }

    /// Fixed argument count, `None` when variadic
    pub fn arity(&self) -> Option<usize> {
        self.arity
    }

    /// Invoke with no arguments.
    pub fn invoke0(&self) -> Result<Value> {
        self.invoke(&[])
    }

    /// Invoke with a single argument, the shape every cell update uses.
    pub fn invoke1(&self, arg: &Value) -> Result<Value> {
        self.invoke(std::slice::from_ref(arg))
    }

    /// True if both handles share the same closure
    pub fn ptr_eq(&self, other: &Callable) -> bool {
        Arc::ptr_eq(&self.f, &other.f)
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.f) as *const () as usize
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "#<fn {}>", name),
            None => write!(f, "#<fn@{:x}>", self.addr()),
        }
    }
}

/// Wrap a host closure as a [`Callable`].
///
/// # Examples
///
/// ```
/// use strand_core::{wrap, Value};
///
/// let add = wrap(|args| {
///     let total: i64 = args.iter().filter_map(Value::as_int).sum();
///     Ok(Value::Int(total))
/// });
/// assert_eq!(add.invoke(&[Value::Int(5), Value::Int(6)]).unwrap(), Value::Int(11));
/// assert_eq!(add.invoke(&[]).unwrap(), Value::Int(0));
/// ```
pub fn wrap<F>(f: F) -> Callable
where
    F: Fn(&[Value]) -> std::result::Result<Value, BoxError> + Send + Sync + 'static,
{
    Callable::new(f)
}
