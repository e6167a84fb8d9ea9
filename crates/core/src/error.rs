//! Unified error type for strand.
//!
//! Every primitive reports failures through [`Error`]. User code running inside a
//! callable, a swap, a transaction body or an agent action reports failures as a
//! [`BoxError`]; those are carried inside the matching variant so the original
//! cause stays reachable through [`std::error::Error::source`].

use crate::symbol::Symbol;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Failure raised by user-supplied code.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A failure that must be reported more than once (agent poisoning).
pub type SharedError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// All strand errors.
#[derive(Debug, Error)]
pub enum Error {
    /// The namespace exists but the name does not resolve to a bound value
    #[error("unbound symbol: {symbol}")]
    UnboundSymbol {
        /// Symbol that failed to resolve
        symbol: Symbol,
    },

    /// The namespace was never loaded and loading it failed
    #[error("unknown namespace {namespace}: {reason}")]
    UnknownNamespace {
        /// Namespace that could not be loaded
        namespace: String,
        /// Why the load step failed
        reason: String,
    },

    /// Call-by-name on a name that is not bound in the current namespace
    #[error("no such operation: {name}")]
    NoSuchOperation {
        /// Name that was invoked
        name: String,
    },

    /// Write attempted on a transactional cell outside an active transaction
    #[error("illegal mutation: {0}")]
    IllegalMutation(String),

    /// Transaction body raised a failure; nothing was committed
    #[error("transaction aborted: {source}")]
    TransactionAborted {
        /// Failure raised by the body
        #[source]
        source: Box<Error>,
    },

    /// Validation kept failing past the configured retry cap
    #[error("transaction could not complete after {attempts} attempts")]
    TransactionRetryExhausted {
        /// Number of attempts made
        attempts: u32,
    },

    /// A queued agent action raised a failure
    #[error("agent {agent} failed: {cause}")]
    AgentFailure {
        /// Id of the failed agent
        agent: u64,
        /// Failure raised by the action
        #[source]
        cause: SharedError,
    },

    /// Failure raised inside a wrapped callable
    #[error("callable failed: {source}")]
    CallableInvocation {
        /// Original failure
        #[source]
        source: BoxError,
    },

    /// Callable invoked with the wrong number of arguments
    #[error("wrong number of args ({actual}) passed to {name}, expected {expected}")]
    Arity {
        /// Callable name, or "fn" when anonymous
        name: String,
        /// Expected argument count
        expected: usize,
        /// Supplied argument count
        actual: usize,
    },

    /// Read-set validation failed; the transaction will be retried
    #[error("conflict: {0}")]
    Conflict(String),

    /// Wrong value type for operation
    #[error("wrong type: expected {expected}, got {actual}")]
    WrongType {
        /// Expected type
        expected: &'static str,
        /// Actual type found
        actual: &'static str,
    },

    /// A bounded wait on a future expired
    #[error("future timed out after {0:?}")]
    FutureTimeout(Duration),

    /// The worker running a future went away before producing a result
    #[error("future was dropped before completing")]
    FutureCancelled,

    /// Configuration rejected
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for strand operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Convert a failure raised by user code.
    ///
    /// A failure that already is an [`Error`] passes through unchanged, anything
    /// else is wrapped in [`Error::CallableInvocation`].
    pub fn from_boxed(err: BoxError) -> Self {
        match err.downcast::<Error>() {
            Ok(inner) => *inner,
            Err(other) => Error::CallableInvocation { source: other },
        }
    }

    /// Wrap a failure raised by user code.
    pub fn callable(err: impl Into<BoxError>) -> Self {
        Error::from_boxed(err.into())
    }

    /// Check if this error is retryable.
    ///
    /// Only validation conflicts are retryable; they never escape `dosync`.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }

    /// Check if this is an unbound-symbol error.
    pub fn is_unbound(&self) -> bool {
        matches!(self, Error::UnboundSymbol { .. })
    }

    /// Check if this is an illegal-mutation error.
    pub fn is_illegal_mutation(&self) -> bool {
        matches!(self, Error::IllegalMutation(_))
    }

    /// Check if this is an agent failure.
    pub fn is_agent_failure(&self) -> bool {
        matches!(self, Error::AgentFailure { .. })
    }

    /// Check if this is a serious/unrecoverable error.
    pub fn is_serious(&self) -> bool {
        matches!(self, Error::TransactionRetryExhausted { .. })
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::InvalidConfig(e.to_string())
    }
}
