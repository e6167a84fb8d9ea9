//! Read-set validation for STM commits
//!
//! Rules:
//! - First-committer-wins based on the READ-SET, not the write-set
//! - Every ref read, set or altered joins the read set at its first access
//! - Pure commutes do NOT join the read set
//! - Write skew is ALLOWED (do not try to prevent it)

use crate::tref::{ErasedRef, RefId};
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

/// Types of conflicts that can occur during transaction validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictType {
    /// A ref was read at one version but its committed version has since moved
    ReadWriteConflict {
        /// Ref that has a conflict
        ref_id: RefId,
        /// Version recorded at first access
        read_version: u64,
        /// Committed version at validation time
        current_version: u64,
    },
}

impl fmt::Display for ConflictType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictType::ReadWriteConflict {
                ref_id,
                read_version,
                current_version,
            } => write!(
                f,
                "ref {} read at version {} but is now at {}",
                ref_id, read_version, current_version
            ),
        }
    }
}

/// Result of transaction validation
///
/// A transaction commits only if `is_valid()` returns true.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// All conflicts detected during validation
    pub conflicts: Vec<ConflictType>,
}

impl ValidationResult {
    /// Create a successful validation result (no conflicts)
    pub fn ok() -> Self {
        ValidationResult {
            conflicts: Vec::new(),
        }
    }

    /// Check if validation passed (no conflicts)
    pub fn is_valid(&self) -> bool {
        self.conflicts.is_empty()
    }

    /// Get the number of conflicts
    pub fn conflict_count(&self) -> usize {
        self.conflicts.len()
    }

    /// Merge another validation result into this one
    pub fn merge(&mut self, other: ValidationResult) {
        self.conflicts.extend(other.conflicts);
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.conflicts.as_slice() {
            [] => write!(f, "no conflicts"),
            [only] => write!(f, "{}", only),
            [first, rest @ ..] => write!(f, "{} (and {} more)", first, rest.len()),
        }
    }
}

/// Compare each recorded read version with the ref's committed version
pub(crate) fn validate_read_set(
    reads: &FxHashMap<RefId, u64>,
    refs: &FxHashMap<RefId, Arc<dyn ErasedRef>>,
) -> ValidationResult {
    let mut result = ValidationResult::ok();

    for r in refs.values() {
        let ref_id = r.id();
        // Pure commutes are tracked but never read.
        let Some(&read_version) = reads.get(&ref_id) else {
            continue;
        };
        let current_version = r.version();
        if current_version != read_version {
            result.conflicts.push(ConflictType::ReadWriteConflict {
                ref_id,
                read_version,
                current_version,
            });
        }
    }

    result
}
