//! Shared-state primitives for strand
//!
//! This crate implements the synchronous coordination primitives:
//! - AtomicCell: single slot with compare-and-swap update
//! - TRef: transactional reference, written only inside a transaction
//! - Stm: the transaction engine (optimistic, read-set validated, retrying)
//! - Transaction: in-transaction reads, set, alter and commute

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod atom;
pub mod manager;
pub mod transaction;
pub mod tref;
pub mod validation;

pub use atom::{AtomicCell, AtomicCellView};
pub use manager::{Stm, StmMetrics, StmStats};
pub use transaction::{Transaction, TransactionStatus};
pub use tref::{RefId, TRef};
pub use validation::{ConflictType, ValidationResult};

use strand_core::Result;

/// Run `body` as a transaction on the process-wide engine
pub fn dosync<R, F>(body: F) -> Result<R>
where
    F: FnMut(&Transaction) -> Result<R>,
{
    Stm::global().dosync(body)
}
