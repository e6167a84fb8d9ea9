//! Atomic cells
//!
//! An [`AtomicCell`] holds one value behind an `Arc`. Readers clone the `Arc`
//! and never see a torn value. `swap` computes the next value outside any lock
//! and installs it only if the cell still holds the exact `Arc` it started
//! from; otherwise it retries against the new value.

use crossbeam_utils::Backoff;
use parking_lot::RwLock;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use strand_core::{Callable, FromValue, Result, Value};

/// Single mutable slot with atomic read-modify-write
pub struct AtomicCell<T> {
    slot: Arc<RwLock<Arc<T>>>,
}

impl<T> Clone for AtomicCell<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> AtomicCell<T> {
    /// Create a cell holding `initial`
    pub fn new(initial: T) -> Self {
        Self {
            slot: Arc::new(RwLock::new(Arc::new(initial))),
        }
    }

    /// Current value
    pub fn get(&self) -> T {
        (*self.load()).clone()
    }

    /// Current value without cloning it
    pub fn load(&self) -> Arc<T> {
        Arc::clone(&self.slot.read())
    }

    /// Replace the value unconditionally, returning the new value
    pub fn reset(&self, value: T) -> T {
        *self.slot.write() = Arc::new(value.clone());
        value
    }

    /// Replace the value, returning the previous one
    pub fn reset_vals(&self, value: T) -> T {
        let old = std::mem::replace(&mut *self.slot.write(), Arc::new(value));
        (*old).clone()
    }

    /// Install `new` only if the cell currently equals `expected`
    pub fn compare_and_set(&self, expected: &T, new: T) -> bool
    where
        T: PartialEq,
    {
        let mut slot = self.slot.write();
        if **slot == *expected {
            *slot = Arc::new(new);
            true
        } else {
            false
        }
    }

    /// Atomically apply `f` to the current value and install the result.
    ///
    /// `f` may run more than once under contention and must not have side
    /// effects beyond computing its result.
    ///
    /// # Examples
    ///
    /// ```
    /// use strand_concurrency::AtomicCell;
    ///
    /// let counter = AtomicCell::new(3);
    /// assert_eq!(counter.swap(|v| v + 1), 4);
    /// assert_eq!(counter.get(), 4);
    /// ```
    pub fn swap<F>(&self, f: F) -> T
    where
        F: Fn(&T) -> T,
    {
        let (_, new) = self
            .swap_inner(|v| Ok::<_, std::convert::Infallible>(f(v)))
            .unwrap_or_else(|e| match e {});
        new
    }

    /// Like [`AtomicCell::swap`] but returns `(old, new)`
    pub fn swap_vals<F>(&self, f: F) -> (T, T)
    where
        F: Fn(&T) -> T,
    {
        self.swap_inner(|v| Ok::<_, std::convert::Infallible>(f(v)))
            .unwrap_or_else(|e| match e {})
    }

    /// Fallible swap; a failure from `f` leaves the cell untouched
    pub fn try_swap<F, E>(&self, f: F) -> std::result::Result<T, E>
    where
        F: Fn(&T) -> std::result::Result<T, E>,
    {
        self.swap_inner(f).map(|(_, new)| new)
    }

    fn swap_inner<F, E>(&self, f: F) -> std::result::Result<(T, T), E>
    where
        F: Fn(&T) -> std::result::Result<T, E>,
    {
        let backoff = Backoff::new();
        loop {
            let current = self.load();
            let next = Arc::new(f(&current)?);
            {
                let mut slot = self.slot.write();
                if Arc::ptr_eq(&slot, &current) {
                    *slot = Arc::clone(&next);
                    return Ok(((*current).clone(), (*next).clone()));
                }
            }
            backoff.spin();
        }
    }
}

impl AtomicCell<Value> {
    /// Swap driven by a callable; the callable receives the current value
    pub fn swap_callable(&self, f: &Callable) -> Result<Value> {
        self.try_swap(|v| f.invoke1(v))
    }

    /// Typed view over a `Value` cell
    pub fn view<U>(&self) -> AtomicCellView<'_, U>
    where
        U: FromValue + Into<Value>,
    {
        AtomicCellView {
            cell: self,
            _marker: PhantomData,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for AtomicCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AtomicCell").field(&*self.slot.read()).finish()
    }
}

/// Host-typed access to an `AtomicCell<Value>`.
///
/// Converts on the way in and out so host code can work with `i64`,
/// `String` or `Vec<_>` while the cell keeps holding a `Value`.
pub struct AtomicCellView<'a, U> {
    cell: &'a AtomicCell<Value>,
    _marker: PhantomData<fn() -> U>,
}

impl<'a, U> AtomicCellView<'a, U>
where
    U: FromValue + Into<Value>,
{
    /// Current value converted to `U`
    pub fn get(&self) -> Result<U> {
        U::from_value(&self.cell.load())
    }

    /// Replace the value
    pub fn reset(&self, value: U) -> Result<U> {
        let value = self.cell.reset(value.into());
        U::from_value(&value)
    }

    /// Swap through `U`; a conversion failure leaves the cell untouched
    pub fn swap<F>(&self, f: F) -> Result<U>
    where
        F: Fn(U) -> U,
    {
        let value = self
            .cell
            .try_swap(|v| -> Result<Value> { Ok(f(U::from_value(v)?).into()) })?;
        U::from_value(&value)
    }
}
