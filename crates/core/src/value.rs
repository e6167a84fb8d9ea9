//! Value types for strand
//!
//! [`Value`] is what flows through callables, symbol bindings and `Value`-typed
//! cells. The core never interprets collection contents: vectors are passed by
//! value, anything richer travels as an opaque [`Foreign`] handle supplied by
//! the foreign runtime.
//!
//! ## Equality Rules
//!
//! - Different types are NEVER equal (no type coercion)
//! - `Int(1)` != `Float(1.0)`
//! - Float uses IEEE-754 equality: `NaN != NaN`, `-0.0 == 0.0`
//! - `Fn` and `Foreign` compare by identity

use crate::callable::Callable;
use crate::error::{Error, Result};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Canonical strand value
#[derive(Debug, Clone)]
pub enum Value {
    /// Absence of value
    Nil,

    /// Boolean true or false
    Bool(bool),

    /// 64-bit signed integer
    Int(i64),

    /// 64-bit IEEE-754 floating point
    Float(f64),

    /// UTF-8 encoded string
    String(String),

    /// Interned-name style keyword, stored without the leading colon
    Keyword(String),

    /// Ordered sequence of values
    Vector(Vec<Value>),

    /// Invokable value
    Fn(Callable),

    /// Opaque value owned by the foreign runtime
    Foreign(Foreign),
}

impl Value {
    /// Returns the type name as a string (for error messages)
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "Nil",
            Value::Bool(_) => "Bool",
            Value::Int(_) => "Int",
            Value::Float(_) => "Float",
            Value::String(_) => "String",
            Value::Keyword(_) => "Keyword",
            Value::Vector(_) => "Vector",
            Value::Fn(_) => "Fn",
            Value::Foreign(_) => "Foreign",
        }
    }

    /// Check if this value is nil
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Truthiness: everything except `Nil` and `Bool(false)`
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    /// Try to get as bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get as i64
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to get as f64
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Try to get as string slice
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as vector slice
    pub fn as_vector(&self) -> Option<&[Value]> {
        match self {
            Value::Vector(v) => Some(v),
            _ => None,
        }
    }

    /// Try to get as callable
    pub fn as_fn(&self) -> Option<&Callable> {
        match self {
            Value::Fn(f) => Some(f),
            _ => None,
        }
    }

    /// Try to borrow the foreign payload as `T`
    pub fn as_foreign<T: Any + Send + Sync>(&self) -> Option<&T> {
        match self {
            Value::Foreign(f) => f.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Build a keyword
    pub fn keyword(name: impl Into<String>) -> Self {
        Value::Keyword(name.into())
    }

    /// Wrap an arbitrary host value as an opaque foreign value
    pub fn foreign<T: Any + Send + Sync>(value: T) -> Self {
        Value::Foreign(Foreign::new(value))
    }

    /// Unwrap an integer or report a type error
    pub fn expect_int(&self) -> Result<i64> {
        self.as_int().ok_or(Error::WrongType {
            expected: "Int",
            actual: self.type_name(),
        })
    }
}

// ============================================================================
// Foreign values
// ============================================================================

/// Opaque handle to a value the core never looks inside
#[derive(Clone)]
pub struct Foreign {
    inner: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl Foreign {
    /// Wrap a host value
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            inner: Arc::new(value),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Borrow the payload as `T`
    pub fn downcast_ref<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    /// Rust type name of the payload
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// True if both handles share the same payload
    pub fn ptr_eq(&self, other: &Foreign) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Foreign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#<foreign {}>", self.type_name)
    }
}

// ============================================================================
// Custom PartialEq Implementation (IEEE-754 semantics, no type coercion)
// ============================================================================

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            // IEEE-754 equality: NaN != NaN, but -0.0 == 0.0
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Keyword(a), Value::Keyword(b)) => a == b,
            (Value::Vector(a), Value::Vector(b)) => a == b,
            (Value::Fn(a), Value::Fn(b)) => a.ptr_eq(b),
            (Value::Foreign(a), Value::Foreign(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::String(s) => write!(f, "{}", s),
            Value::Keyword(k) => write!(f, ":{}", k),
            Value::Vector(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Fn(c) => write!(f, "{:?}", c),
            Value::Foreign(x) => write!(f, "{:?}", x),
        }
    }
}

// ============================================================================
// Host <-> foreign conversion
// ============================================================================

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Nil
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Callable> for Value {
    fn from(c: Callable) -> Self {
        Value::Fn(c)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Vector(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Nil)
    }
}

/// Host types that can be read back out of a [`Value`]
pub trait FromValue: Sized {
    /// Convert, failing with [`Error::WrongType`] on mismatch
    fn from_value(value: &Value) -> Result<Self>;
}

fn wrong_type(expected: &'static str, value: &Value) -> Error {
    Error::WrongType {
        expected,
        actual: value.type_name(),
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self> {
        Ok(value.clone())
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_bool().ok_or_else(|| wrong_type("Bool", value))
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_int().ok_or_else(|| wrong_type("Int", value))
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_float().ok_or_else(|| wrong_type("Float", value))
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self> {
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| wrong_type("String", value))
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: &Value) -> Result<Self> {
        value
            .as_vector()
            .ok_or_else(|| wrong_type("Vector", value))?
            .iter()
            .map(T::from_value)
            .collect()
    }
}

/// Convert a host value into a [`Value`]
pub fn to_foreign<T: Into<Value>>(value: T) -> Value {
    value.into()
}

/// Convert a [`Value`] back into a host value
pub fn to_host<T: FromValue>(value: &Value) -> Result<T> {
    T::from_value(value)
}

// ============================================================================
// Tests
// ============================================================================
