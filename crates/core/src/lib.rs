//! Core types for strand
//!
//! This crate defines the types every other strand crate shares:
//! - Value: the opaque value that flows through callables and cells
//! - Callable: the single calling convention for user code
//! - Symbol: namespace-qualified names and lookup normalization
//! - Error: the unified error taxonomy
//! - RuntimeConfig: TOML-backed runtime configuration

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod callable;
pub mod config;
pub mod error;
pub mod symbol;
pub mod value;

pub use callable::{wrap, Callable};
pub use config::{
    AgentConfig, ErrorMode, LoggingConfig, RuntimeConfig, StmConfig, SymbolConfig,
    DEFAULT_NAMESPACE,
};
pub use error::{BoxError, Error, Result, SharedError};
pub use symbol::{normalize_name, Symbol};
pub use value::{to_foreign, to_host, Foreign, FromValue, Value};
