//! One-shot background tasks
//!
//! [`future`] runs a closure on the growable pool and hands back a
//! [`FutureHandle`]. A failure or panic in the closure is held by the handle
//! and returned from `wait`.

use crate::executor::{DispatchKind, Executors};
use crate::pool::panic_message;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, TryRecvError};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;
use strand_core::{Callable, Error, Result, Value};

/// Pending result of a [`future`].
///
/// A handle yields its result once. After that, further waits report
/// [`Error::FutureCancelled`].
pub struct FutureHandle<T> {
    rx: Receiver<Result<T>>,
    ready: Option<Result<T>>,
    taken: bool,
}

impl<T> FutureHandle<T> {
    fn poll(&mut self) {
        if self.ready.is_some() || self.taken {
            return;
        }
        match self.rx.try_recv() {
            Ok(outcome) => self.ready = Some(outcome),
            Err(TryRecvError::Disconnected) => self.ready = Some(Err(Error::FutureCancelled)),
            Err(TryRecvError::Empty) => {}
        }
    }

    fn take(&mut self) -> Result<T> {
        self.taken = true;
        self.ready.take().unwrap_or(Err(Error::FutureCancelled))
    }

    /// True once the task finished, successfully or not
    pub fn is_done(&mut self) -> bool {
        self.poll();
        self.ready.is_some() || self.taken
    }

    /// Block until the task finishes and return its outcome
    pub fn wait(mut self) -> Result<T> {
        self.poll();
        if self.ready.is_some() || self.taken {
            return self.take();
        }
        self.rx.recv().unwrap_or(Err(Error::FutureCancelled))
    }

    /// Block for at most `timeout`.
    ///
    /// Returns [`Error::FutureTimeout`] if the task is still running; the
    /// handle stays usable and can be waited on again.
    pub fn wait_timeout(&mut self, timeout: Duration) -> Result<T> {
        self.poll();
        if self.ready.is_some() || self.taken {
            return self.take();
        }
        match self.rx.recv_timeout(timeout) {
            Ok(outcome) => {
                self.taken = true;
                outcome
            }
            Err(RecvTimeoutError::Timeout) => Err(Error::FutureTimeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => {
                self.taken = true;
                Err(Error::FutureCancelled)
            }
        }
    }

    /// Outcome if already finished, without blocking
    pub fn try_get(&mut self) -> Option<Result<T>> {
        self.poll();
        if self.ready.is_some() {
            Some(self.take())
        } else {
            None
        }
    }
}

impl<T> fmt::Debug for FutureHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FutureHandle")
            .field("ready", &self.ready.is_some())
            .field("taken", &self.taken)
            .finish()
    }
}

/// Run `f` on the process-wide growable pool
///
/// # Examples
///
/// ```
/// use strand_agents::future;
///
/// let handle = future(|| Ok(6 * 7)).unwrap();
/// assert_eq!(handle.wait().unwrap(), 42);
/// ```
pub fn future<T, F>(f: F) -> Result<FutureHandle<T>>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    future_with(&Executors::global(), f)
}

/// Run `f` on the growable pool of `executors`
pub fn future_with<T, F>(executors: &Executors, f: F) -> Result<FutureHandle<T>>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let (tx, rx) = bounded(1);
    executors.submit(
        DispatchKind::Io,
        Box::new(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
                Err(Error::callable(format!(
                    "future panicked: {}",
                    panic_message(payload.as_ref())
                )))
            });
            // The handle may have been dropped already.
            let _ = tx.send(outcome);
        }),
    )?;
    Ok(FutureHandle {
        rx,
        ready: None,
        taken: false,
    })
}

/// Run a zero-argument callable in the background
pub fn future_call(f: &Callable) -> Result<FutureHandle<Value>> {
    let f = f.clone();
    future(move || f.invoke0())
}
