//! Transactional references
//!
//! A [`TRef`] holds its committed values together with the versions of the
//! commits that wrote them. Older entries are kept only while a running
//! transaction may still need them, so every transaction reads the values as
//! of its read point. All writes go through a transaction; reads outside a
//! transaction see the newest committed value.

use crate::manager::Stm;
use crate::transaction::Transaction;
use parking_lot::RwLock;
use smallvec::{smallvec, SmallVec};
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use strand_core::{Callable, Result, Value};

/// Process-unique ref identifier
pub type RefId = u64;

static NEXT_REF_ID: AtomicU64 = AtomicU64::new(1);

struct Versioned<T> {
    value: Arc<T>,
    version: u64,
}

/// Committed entries, oldest first; never empty
struct History<T> {
    entries: SmallVec<[Versioned<T>; 2]>,
}

impl<T> History<T> {
    fn newest(&self) -> &Versioned<T> {
        // `entries` is created with one element and only pruned down to one.
        &self.entries[self.entries.len() - 1]
    }

    /// Newest entry written at or before `read_point`
    fn as_of(&self, read_point: u64) -> &Versioned<T> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.version <= read_point)
            .unwrap_or(&self.entries[0])
    }

    /// Append `entry`, dropping entries no reader at or after `oldest_reader` can see
    fn push(&mut self, entry: Versioned<T>, oldest_reader: u64) {
        self.entries.push(entry);
        while self.entries.len() > 1 && self.entries[1].version <= oldest_reader {
            self.entries.remove(0);
        }
    }
}

pub(crate) struct RefInner<T> {
    id: RefId,
    engine: u64,
    history: RwLock<History<T>>,
}

/// Type-erased view of a ref used by the commit path
pub(crate) trait ErasedRef: Send + Sync {
    fn id(&self) -> RefId;
    fn version(&self) -> u64;
    fn committed_any(&self) -> Arc<dyn Any + Send + Sync>;
    fn install(&self, value: Arc<dyn Any + Send + Sync>, version: u64, oldest_reader: u64);
}

impl<T: Send + Sync + 'static> ErasedRef for RefInner<T> {
    fn id(&self) -> RefId {
        self.id
    }

    fn version(&self) -> u64 {
        self.history.read().newest().version
    }

    fn committed_any(&self) -> Arc<dyn Any + Send + Sync> {
        self.history.read().newest().value.clone()
    }

    fn install(&self, value: Arc<dyn Any + Send + Sync>, version: u64, oldest_reader: u64) {
        // Shadow values are keyed by ref id and only written through typed
        // operations on this ref, so the downcast cannot miss.
        if let Ok(value) = value.downcast::<T>() {
            self.history
                .write()
                .push(Versioned { value, version }, oldest_reader);
        }
    }
}

/// A cell that can only be written inside a transaction
pub struct TRef<T> {
    inner: Arc<RefInner<T>>,
}

impl<T> Clone for TRef<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> TRef<T> {
    /// Create a ref on the process-wide engine
    pub fn new(initial: T) -> Self {
        Stm::global().new_ref(initial)
    }

    pub(crate) fn with_engine(engine: u64, initial: T) -> Self {
        Self {
            inner: Arc::new(RefInner {
                id: NEXT_REF_ID.fetch_add(1, Ordering::Relaxed),
                engine,
                history: RwLock::new(History {
                    entries: smallvec![Versioned {
                        value: Arc::new(initial),
                        version: 0,
                    }],
                }),
            }),
        }
    }

    /// Process-unique id of this ref
    pub fn id(&self) -> RefId {
        self.inner.id
    }

    pub(crate) fn engine(&self) -> u64 {
        self.inner.engine
    }

    pub(crate) fn erased(&self) -> Arc<dyn ErasedRef> {
        self.inner.clone()
    }

    /// Newest committed value and the version that wrote it
    pub(crate) fn committed(&self) -> (Arc<T>, u64) {
        let history = self.inner.history.read();
        let newest = history.newest();
        (Arc::clone(&newest.value), newest.version)
    }

    /// Committed value as of `read_point` and the version that wrote it
    pub(crate) fn committed_at(&self, read_point: u64) -> (Arc<T>, u64) {
        let history = self.inner.history.read();
        let entry = history.as_of(read_point);
        (Arc::clone(&entry.value), entry.version)
    }

    /// Version of the last commit that wrote this ref
    pub fn version(&self) -> u64 {
        self.inner.history.read().newest().version
    }

    /// Current value.
    ///
    /// Inside a transaction on this ref's engine, returns the in-transaction
    /// value and records the read; otherwise returns the committed value.
    pub fn get(&self) -> T {
        match Transaction::current() {
            Some(txn) if txn.engine() == self.engine() => txn.get(self),
            _ => (*self.committed().0).clone(),
        }
    }

    /// Replace the value in the current transaction
    pub fn set(&self, value: T) -> Result<T> {
        Transaction::require_current()?.set(self, value)
    }

    /// Apply `f` to the in-transaction value in the current transaction
    pub fn alter<F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&T) -> T,
    {
        Transaction::require_current()?.alter(self, f)
    }

    /// Queue a commutative update in the current transaction
    pub fn commute<F>(&self, f: F) -> Result<T>
    where
        F: Fn(&T) -> T + 'static,
    {
        Transaction::require_current()?.commute(self, f)
    }
}

impl TRef<Value> {
    /// [`TRef::alter`] driven by a callable
    pub fn alter_callable(&self, f: &Callable) -> Result<Value> {
        Transaction::require_current()?.alter_callable(self, f)
    }

    /// [`TRef::commute`] driven by a callable
    pub fn commute_callable(&self, f: &Callable) -> Result<Value> {
        Transaction::require_current()?.commute_callable(self, f)
    }
}

impl<T: fmt::Debug> fmt::Debug for TRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let history = self.inner.history.read();
        let newest = history.newest();
        f.debug_struct("TRef")
            .field("id", &self.inner.id)
            .field("version", &newest.version)
            .field("value", &newest.value)
            .field("history", &history.entries.len())
            .finish()
    }
}
