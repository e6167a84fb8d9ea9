//! Transaction engine
//!
//! Runs transaction bodies and commits them atomically.
//!
//! ## Commit Sequence
//!
//! ```text
//! 1. Acquire commit lock (prevents TOCTOU race)
//! 2. Validate read set (first-committer-wins)
//! 3. IF conflicts: release lock, mark RetryPending, run the body again
//! 4. Re-apply queued commutes to the latest committed values
//! 5. Install every written ref at the next version, pruning history no
//!    running attempt can read
//! 6. Publish the new version, release commit lock, mark Committed
//! 7. Run on-commit hooks (deferred agent sends)
//! ```
//!
//! Each attempt reads every ref as of the version published when it started,
//! so a body never sees half of another commit. A body failure therefore
//! aborts on the spot; only conflicts cause a retry.

use crate::transaction::{CurrentGuard, Transaction, TransactionStatus, TxnState};
use crate::tref::TRef;
use crossbeam_utils::Backoff;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use strand_core::{Error, Result, StmConfig};
use tracing::{debug, warn};

static NEXT_ENGINE_ID: AtomicU64 = AtomicU64::new(1);

static GLOBAL: Lazy<Stm> = Lazy::new(|| Stm::new(StmConfig::default()));

/// Counters kept by an engine
#[derive(Debug, Default)]
pub struct StmMetrics {
    committed: AtomicU64,
    retries: AtomicU64,
    aborted: AtomicU64,
}

/// Point-in-time copy of [`StmMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StmStats {
    /// Transactions committed
    pub committed: u64,
    /// Attempts discarded because of conflicts
    pub retries: u64,
    /// Transactions aborted by a failure
    pub aborted: u64,
}

impl StmMetrics {
    /// Snapshot the counters
    pub fn snapshot(&self) -> StmStats {
        StmStats {
            committed: self.committed.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            aborted: self.aborted.load(Ordering::Relaxed),
        }
    }
}

/// Software transactional memory engine
///
/// Refs created by an engine can only be written by that engine's
/// transactions. Most programs use the process-wide [`Stm::global`] engine;
/// tests construct isolated ones.
///
/// # Thread Safety
///
/// Commits are serialized through an internal lock, so validation and
/// installation happen atomically with respect to other commits. Bodies run
/// concurrently on their callers' threads.
pub struct Stm {
    id: u64,

    /// Global version counter
    ///
    /// Monotonically increasing. Each committed writing transaction
    /// increments it by 1; all refs it writes get the same version.
    version: AtomicU64,

    /// Next transaction ID
    next_txn_id: AtomicU64,

    /// Commit serialization lock
    commit_lock: Mutex<()>,

    /// Read points of running attempts, with how many attempts hold each
    readers: Mutex<BTreeMap<u64, usize>>,

    max_retries: u32,
    metrics: StmMetrics,
}

impl Stm {
    /// Create an isolated engine
    pub fn new(config: StmConfig) -> Self {
        Stm {
            id: NEXT_ENGINE_ID.fetch_add(1, Ordering::Relaxed),
            version: AtomicU64::new(0),
            next_txn_id: AtomicU64::new(1),
            commit_lock: Mutex::new(()),
            readers: Mutex::new(BTreeMap::new()),
            max_retries: config.max_retries.max(1),
            metrics: StmMetrics::default(),
        }
    }

    /// Create an isolated engine with a specific retry cap
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self::new(StmConfig { max_retries })
    }

    /// Process-wide engine used by [`TRef::new`] and [`dosync`](crate::dosync)
    pub fn global() -> &'static Stm {
        &GLOBAL
    }

    /// Create a ref owned by this engine
    pub fn new_ref<T: Clone + Send + Sync + 'static>(&self, initial: T) -> TRef<T> {
        TRef::with_engine(self.id, initial)
    }

    /// Get current global version
    pub fn current_version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Allocate next transaction ID
    pub fn next_txn_id(&self) -> u64 {
        self.next_txn_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Register a new attempt at the current version
    fn begin(&self) -> ReadPoint<'_> {
        let mut readers = self.readers.lock();
        let version = self.current_version();
        *readers.entry(version).or_insert(0) += 1;
        ReadPoint { stm: self, version }
    }

    /// Oldest version a running attempt may still read
    fn oldest_reader(&self) -> u64 {
        let readers = self.readers.lock();
        readers
            .keys()
            .next()
            .copied()
            .unwrap_or_else(|| self.current_version())
    }

    /// Attempts before [`Error::TransactionRetryExhausted`]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Engine counters
    pub fn metrics(&self) -> &StmMetrics {
        &self.metrics
    }

    /// Run `body` as one transaction, retrying it on conflict.
    ///
    /// Called inside a running transaction of the same engine, `body` joins
    /// the outer transaction instead of starting a new one.
    ///
    /// # Errors
    ///
    /// - [`Error::TransactionAborted`] if `body` fails, carrying the failure
    /// - [`Error::TransactionRetryExhausted`] if every attempt conflicted
    ///
    /// # Examples
    ///
    /// ```
    /// use strand_concurrency::Stm;
    ///
    /// let stm = Stm::with_max_retries(100);
    /// let balance = stm.new_ref(10i64);
    /// stm.dosync(|txn| txn.alter(&balance, |v| v * 2)).unwrap();
    /// assert_eq!(balance.get(), 20);
    /// ```
    pub fn dosync<R, F>(&self, mut body: F) -> Result<R>
    where
        F: FnMut(&Transaction) -> Result<R>,
    {
        if let Some(outer) = Transaction::current() {
            if outer.engine() == self.id {
                return body(&outer);
            }
            return Err(Error::IllegalMutation(
                "a transaction on another engine is already running on this thread".to_string(),
            ));
        }

        let backoff = Backoff::new();
        for attempt in 1..=self.max_retries {
            let read_point = self.begin();
            let state = Rc::new(RefCell::new(TxnState::new(
                self.next_txn_id(),
                self.id,
                read_point.version,
            )));
            let txn = Transaction::from_state(Rc::clone(&state));

            let outcome = {
                let _current = CurrentGuard::install(state);
                body(&txn)
            };

            let failure = match outcome {
                Ok(value) => match self.commit(&txn) {
                    Ok(_) => return Ok(value),
                    Err(e) => e,
                },
                Err(e) => e,
            };

            drop(read_point);
            if failure.is_retryable() {
                self.metrics.retries.fetch_add(1, Ordering::Relaxed);
                debug!(
                    txn_id = txn.id(),
                    attempt,
                    reason = %failure,
                    "transaction retry"
                );
                txn.set_status(TransactionStatus::RetryPending {
                    reason: failure.to_string(),
                });
                backoff.snooze();
                continue;
            }

            self.metrics.aborted.fetch_add(1, Ordering::Relaxed);
            txn.set_status(TransactionStatus::Aborted {
                reason: failure.to_string(),
            });
            return Err(Error::TransactionAborted {
                source: Box::new(failure),
            });
        }

        warn!(
            engine = self.id,
            attempts = self.max_retries,
            "transaction could not complete within retry limit"
        );
        Err(Error::TransactionRetryExhausted {
            attempts: self.max_retries,
        })
    }

    /// Validate and install a finished attempt, returning its commit version
    fn commit(&self, txn: &Transaction) -> Result<u64> {
        let mut pending = txn.take_pending();

        let commit_version = {
            // Held from validation through install so no commit can slip in
            // between the check and the write.
            let _commit_guard = self.commit_lock.lock();
            txn.set_status(TransactionStatus::Validating);

            let validation = pending.validate();
            if !validation.is_valid() {
                return Err(Error::Conflict(validation.to_string()));
            }

            pending.apply_commutes()?;

            if pending.sets.is_empty() {
                // Read-only: nothing to install, no version consumed.
                self.current_version()
            } else {
                let version = self.current_version() + 1;
                pending.install(version, self.oldest_reader());
                // Published only after every ref holds its new entry, so an
                // attempt starting at `version` sees all of this commit.
                self.version.store(version, Ordering::SeqCst);
                version
            }
        };

        txn.set_status(TransactionStatus::Committed);
        self.metrics.committed.fetch_add(1, Ordering::Relaxed);

        for hook in pending.on_commit.drain(..) {
            hook();
        }
        Ok(commit_version)
    }
}

/// Keeps an attempt's read point registered until dropped
struct ReadPoint<'a> {
    stm: &'a Stm,
    version: u64,
}

impl Drop for ReadPoint<'_> {
    fn drop(&mut self) {
        let mut readers = self.stm.readers.lock();
        if let Some(count) = readers.get_mut(&self.version) {
            *count -= 1;
            if *count == 0 {
                readers.remove(&self.version);
            }
        }
    }
}

impl Default for Stm {
    fn default() -> Self {
        Self::new(StmConfig::default())
    }
}

impl fmt::Debug for Stm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stm")
            .field("id", &self.id)
            .field("version", &self.current_version())
            .field("max_retries", &self.max_retries)
            .field("stats", &self.metrics.snapshot())
            .finish()
    }
}
