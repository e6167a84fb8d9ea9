//! # Strand
//!
//! Shared-state concurrency primitives and a dynamic symbol table.
//!
//! ## Quick Start
//!
//! ```
//! use strand::prelude::*;
//!
//! let rt = Strand::new()?;
//!
//! // Atomic cell
//! let hits = rt.atom(3i64);
//! assert_eq!(hits.swap(|n| n + 1), 4);
//!
//! // Transactional cells
//! let from = rt.tref(100i64);
//! let to = rt.tref(0i64);
//! rt.dosync(|txn| {
//!     txn.alter(&from, |n| n - 30)?;
//!     txn.alter(&to, |n| n + 30)
//! })?;
//! assert_eq!(from.get() + to.get(), 100);
//!
//! // Agent
//! let greeting = rt.agent(String::from("hello"));
//! greeting.send(|s| format!("{} world", s))?;
//! greeting.await_idle();
//! assert_eq!(greeting.get()?, "hello world");
//!
//! // Call by name
//! let inc = rt.symbols().var("core", "inc")?;
//! assert_eq!(inc.invoke(&[Value::Int(41)])?, Value::Int(42));
//! # Ok::<(), strand::Error>(())
//! ```
//!
//! ## Primitives
//!
//! - [`AtomicCell`] - one value, updated by compare-and-swap
//! - [`TRef`] - transactional cell, changed only inside [`Stm::dosync`]
//! - [`Agent`] - value updated by queued actions on worker threads
//! - [`future`] - one-shot background task
//! - [`SymbolTable`] - resolves `ns/name` to vars and calls them

#![warn(missing_docs)]

pub mod logging;
mod runtime;

pub mod prelude;

// Re-export main entry points
pub use runtime::{RuntimeMetrics, Strand, StrandBuilder};

// Re-export the component crates
pub use strand_agents::{
    future, future_call, future_with, Agent, AgentBuilder, DispatchKind, Executors, FutureHandle,
};
pub use strand_concurrency::{
    dosync, AtomicCell, AtomicCellView, Stm, StmStats, TRef, Transaction, TransactionStatus,
};
pub use strand_core::{
    to_foreign, to_host, wrap, AgentConfig, Callable, Error, ErrorMode, Foreign, FromValue,
    LoggingConfig, Result, RuntimeConfig, StmConfig, Symbol, SymbolConfig, Value,
};
pub use strand_symbols::{
    Binding, InMemoryRuntime, NamespaceView, Resolved, SymbolTable, VarHandle, VarRuntime,
};
