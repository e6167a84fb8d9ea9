//! Asynchronous primitives for strand
//!
//! - Agent: a cell updated by queued actions, one at a time, off-thread
//! - future: a one-shot background task with a blocking handle
//! - FixedPool / CachedPool: the worker pools behind both

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod agent;
pub mod executor;
pub mod future;
pub mod pool;

pub use agent::{Agent, AgentBuilder, ErrorHandler};
pub use executor::{DispatchKind, Executors};
pub use future::{future, future_call, future_with, FutureHandle};
pub use pool::{CachedPool, Executor, FixedPool, Job};
