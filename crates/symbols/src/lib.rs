//! Dynamic symbol resolution for strand
//!
//! This crate resolves namespace-qualified names to values at runtime:
//! - VarRuntime: the collaborator that owns namespaces and vars
//! - InMemoryRuntime: a process-local runtime with lazy namespace loaders
//! - SymbolTable: resolution, binding cache and call-by-name dispatch
//! - NamespaceView: a table scoped to one namespace

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod builtins;
pub mod memory;
pub mod runtime;
pub mod table;

pub use memory::{InMemoryRuntime, Var};
pub use runtime::{VarHandle, VarRuntime};
pub use table::{Binding, NamespaceView, Resolved, SymbolTable};
