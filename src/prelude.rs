//! Convenient imports for Strand.
//!
//! ```
//! use strand::prelude::*;
//!
//! let rt = Strand::new()?;
//! let cell = rt.atom(1);
//! cell.swap(|n| n * 2);
//! # Ok::<(), strand::Error>(())
//! ```

// Main entry point
pub use crate::runtime::{Strand, StrandBuilder};

// Error handling
pub use strand_core::{Error, ErrorMode, Result};

// Primitives
pub use strand_agents::{future, Agent, FutureHandle};
pub use strand_concurrency::{dosync, AtomicCell, Stm, TRef, Transaction};

// Dynamic values and symbols
pub use strand_core::{wrap, Callable, FromValue, Symbol, Value};
pub use strand_symbols::{Binding, SymbolTable};
