//! Transaction state and in-transaction operations
//!
//! A transaction lives on the thread that runs its body. The state is kept in
//! a thread-local so that [`TRef`] methods can find the transaction they run
//! in without it being passed around. No `RefCell` borrow is ever held while
//! user code runs, so update functions may freely read other refs.
//!
//! ## State machine
//!
//! ```text
//! Active -> Validating -> Committed
//!                      -> RetryPending -> (fresh attempt) Active
//! Active -> Aborted                    (body failed)
//! ```

use crate::tref::{ErasedRef, RefId, TRef};
use crate::validation::{validate_read_set, ValidationResult};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use strand_core::{Callable, Error, Result, Value};

type Shared = Arc<dyn Any + Send + Sync>;
type CommuteFn = Box<dyn Fn(&(dyn Any + Send + Sync)) -> Result<Shared>>;
type CommitHook = Box<dyn FnOnce()>;

thread_local! {
    static CURRENT: RefCell<Option<Rc<RefCell<TxnState>>>> = RefCell::new(None);
}

/// Lifecycle of one transaction attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Body is running
    Active,
    /// Commit lock held, read set being checked
    Validating,
    /// Writes installed
    Committed,
    /// Read set went stale; the body will run again
    RetryPending {
        /// Conflicts that forced the retry
        reason: String,
    },
    /// Body or a commute failed; nothing was installed
    Aborted {
        /// Failure description
        reason: String,
    },
}

pub(crate) struct TxnState {
    pub(crate) id: u64,
    pub(crate) engine: u64,
    pub(crate) read_point: u64,
    pub(crate) status: TransactionStatus,
    /// Version of each ref at first read or write
    reads: FxHashMap<RefId, u64>,
    /// In-transaction value of each touched ref
    values: FxHashMap<RefId, Shared>,
    /// Refs written with set/alter
    sets: FxHashSet<RefId>,
    /// Deferred commute functions per ref, in call order
    commutes: FxHashMap<RefId, SmallVec<[CommuteFn; 2]>>,
    refs: FxHashMap<RefId, Arc<dyn ErasedRef>>,
    on_commit: Vec<CommitHook>,
}

impl TxnState {
    pub(crate) fn new(id: u64, engine: u64, read_point: u64) -> Self {
        Self {
            id,
            engine,
            read_point,
            status: TransactionStatus::Active,
            reads: FxHashMap::default(),
            values: FxHashMap::default(),
            sets: FxHashSet::default(),
            commutes: FxHashMap::default(),
            refs: FxHashMap::default(),
            on_commit: Vec::new(),
        }
    }

    fn track<T: Clone + Send + Sync + 'static>(&mut self, r: &TRef<T>) {
        self.refs.entry(r.id()).or_insert_with(|| r.erased());
    }

    fn shadow<T: Clone + Send + Sync + 'static>(&self, r: &TRef<T>) -> Option<Arc<T>> {
        self.values
            .get(&r.id())
            .and_then(|v| Arc::clone(v).downcast::<T>().ok())
    }
}

/// Writes a validated transaction will install, taken out of the state so
/// the commit path owns them.
pub(crate) struct PendingCommit {
    pub(crate) reads: FxHashMap<RefId, u64>,
    pub(crate) values: FxHashMap<RefId, Shared>,
    pub(crate) sets: FxHashSet<RefId>,
    pub(crate) commutes: FxHashMap<RefId, SmallVec<[CommuteFn; 2]>>,
    pub(crate) refs: FxHashMap<RefId, Arc<dyn ErasedRef>>,
    pub(crate) on_commit: Vec<CommitHook>,
}

impl PendingCommit {
    pub(crate) fn validate(&self) -> ValidationResult {
        validate_read_set(&self.reads, &self.refs)
    }

    /// Re-run queued commutes against the latest committed values
    pub(crate) fn apply_commutes(&mut self) -> Result<()> {
        for (id, fns) in self.commutes.drain() {
            if self.sets.contains(&id) {
                continue;
            }
            let Some(r) = self.refs.get(&id) else {
                continue;
            };
            let mut value = r.committed_any();
            for f in &fns {
                value = f(value.as_ref())?;
            }
            self.values.insert(id, value);
            self.sets.insert(id);
        }
        Ok(())
    }

    pub(crate) fn install(&mut self, version: u64, oldest_reader: u64) {
        for id in &self.sets {
            if let (Some(r), Some(value)) = (self.refs.get(id), self.values.remove(id)) {
                r.install(value, version, oldest_reader);
            }
        }
    }
}

/// Handle to the transaction running on this thread.
///
/// Passed to the body of [`Stm::dosync`](crate::Stm::dosync). It is not
/// `Send`: a transaction never leaves the thread that started it.
#[derive(Clone)]
pub struct Transaction {
    state: Rc<RefCell<TxnState>>,
}

impl Transaction {
    pub(crate) fn from_state(state: Rc<RefCell<TxnState>>) -> Self {
        Self { state }
    }

    /// Transaction running on this thread, if any
    pub fn current() -> Option<Transaction> {
        CURRENT.with(|c| c.borrow().clone().map(Transaction::from_state))
    }

    /// True if a transaction is running on this thread
    pub fn is_running() -> bool {
        CURRENT.with(|c| c.borrow().is_some())
    }

    pub(crate) fn require_current() -> Result<Transaction> {
        Self::current()
            .ok_or_else(|| Error::IllegalMutation("no transaction in progress".to_string()))
    }

    /// Transaction id, unique per engine and per attempt
    pub fn id(&self) -> u64 {
        self.state.borrow().id
    }

    /// Global version the attempt started at
    pub fn read_point(&self) -> u64 {
        self.state.borrow().read_point
    }

    /// Current lifecycle state
    pub fn status(&self) -> TransactionStatus {
        self.state.borrow().status.clone()
    }

    pub(crate) fn engine(&self) -> u64 {
        self.state.borrow().engine
    }

    pub(crate) fn set_status(&self, status: TransactionStatus) {
        self.state.borrow_mut().status = status;
    }

    fn check_engine<T: Clone + Send + Sync + 'static>(&self, r: &TRef<T>) -> Result<()> {
        if r.engine() != self.engine() {
            return Err(Error::IllegalMutation(format!(
                "ref {} belongs to a different transaction engine",
                r.id()
            )));
        }
        Ok(())
    }

    /// In-transaction value, reading the snapshot at the read point and
    /// recording its version on first access
    fn current_value<T: Clone + Send + Sync + 'static>(&self, r: &TRef<T>) -> Arc<T> {
        let mut st = self.state.borrow_mut();
        if let Some(v) = st.shadow(r) {
            return v;
        }
        let (value, version) = r.committed_at(st.read_point);
        st.track(r);
        st.reads.entry(r.id()).or_insert(version);
        st.values.insert(r.id(), value.clone());
        value
    }

    fn install_shadow<T: Clone + Send + Sync + 'static>(&self, r: &TRef<T>, value: T) -> T {
        let mut st = self.state.borrow_mut();
        st.values.insert(r.id(), Arc::new(value.clone()));
        st.sets.insert(r.id());
        value
    }

    /// Read `r` inside this transaction.
    ///
    /// Returns the value committed as of the read point, so all reads in one
    /// attempt agree with each other. Repeated reads see the same value unless
    /// this transaction wrote it.
    pub fn get<T: Clone + Send + Sync + 'static>(&self, r: &TRef<T>) -> T {
        if r.engine() != self.engine() {
            return (*r.committed().0).clone();
        }
        (*self.current_value(r)).clone()
    }

    /// Replace the value of `r`; same as `alter(r, |_| value)`
    pub fn set<T: Clone + Send + Sync + 'static>(&self, r: &TRef<T>, value: T) -> Result<T> {
        self.alter(r, move |_| value)
    }

    /// Apply `f` to the in-transaction value of `r`.
    ///
    /// Commits only if `r` still has the version it had at first access.
    pub fn alter<T, F>(&self, r: &TRef<T>, f: F) -> Result<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce(&T) -> T,
    {
        self.try_alter(r, |v| Ok(f(v)))
    }

    /// Fallible [`Transaction::alter`]; a failure aborts the transaction
    pub fn try_alter<T, F>(&self, r: &TRef<T>, f: F) -> Result<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce(&T) -> Result<T>,
    {
        self.check_engine(r)?;
        if self.state.borrow().commutes.contains_key(&r.id()) {
            return Err(Error::IllegalMutation(format!(
                "cannot set ref {} after commute",
                r.id()
            )));
        }
        let current = self.current_value(r);
        self.check_unchanged(r)?;
        let next = f(&current)?;
        Ok(self.install_shadow(r, next))
    }

    /// Fail early if `r` was committed after this transaction first read it;
    /// the write could never validate.
    fn check_unchanged<T: Clone + Send + Sync + 'static>(&self, r: &TRef<T>) -> Result<()> {
        let read = self.state.borrow().reads.get(&r.id()).copied();
        match read {
            Some(read) if read != r.version() => Err(Error::Conflict(format!(
                "ref {} was committed at version {} after this transaction read it",
                r.id(),
                r.version()
            ))),
            _ => Ok(()),
        }
    }

    /// Apply `f` now and again at commit time to the latest committed value.
    ///
    /// `f` must commute with concurrent updates to `r`; commuted refs do not
    /// join the read set, so other writers never force a retry.
    pub fn commute<T, F>(&self, r: &TRef<T>, f: F) -> Result<T>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn(&T) -> T + 'static,
    {
        self.try_commute(r, move |v| Ok(f(v)))
    }

    /// Fallible [`Transaction::commute`]
    pub fn try_commute<T, F>(&self, r: &TRef<T>, f: F) -> Result<T>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn(&T) -> Result<T> + 'static,
    {
        self.check_engine(r)?;
        let current = {
            let mut st = self.state.borrow_mut();
            st.track(r);
            match st.shadow(r) {
                Some(v) => v,
                None => r.committed().0,
            }
        };
        let next = f(&current)?;

        let mut st = self.state.borrow_mut();
        st.values.insert(r.id(), Arc::new(next.clone()));
        if !st.sets.contains(&r.id()) {
            let deferred: CommuteFn = Box::new(move |any: &(dyn Any + Send + Sync)| -> Result<Shared> {
                let value = any.downcast_ref::<T>().ok_or_else(|| Error::WrongType {
                    expected: std::any::type_name::<T>(),
                    actual: "foreign ref value",
                })?;
                Ok(Arc::new(f(value)?) as Shared)
            });
            st.commutes.entry(r.id()).or_default().push(deferred);
        }
        Ok(next)
    }

    /// Alter a `Value` ref with a callable
    pub fn alter_callable(&self, r: &TRef<Value>, f: &Callable) -> Result<Value> {
        self.try_alter(r, |v| f.invoke1(v))
    }

    /// Commute a `Value` ref with a callable
    pub fn commute_callable(&self, r: &TRef<Value>, f: &Callable) -> Result<Value> {
        let f = f.clone();
        self.try_commute(r, move |v| f.invoke1(v))
    }

    /// Run `hook` after this transaction commits; dropped if it retries or aborts
    pub fn on_commit<F: FnOnce() + 'static>(&self, hook: F) {
        self.state.borrow_mut().on_commit.push(Box::new(hook));
    }

    pub(crate) fn take_pending(&self) -> PendingCommit {
        let mut st = self.state.borrow_mut();
        PendingCommit {
            reads: std::mem::take(&mut st.reads),
            values: std::mem::take(&mut st.values),
            sets: std::mem::take(&mut st.sets),
            commutes: std::mem::take(&mut st.commutes),
            refs: std::mem::take(&mut st.refs),
            on_commit: std::mem::take(&mut st.on_commit),
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.state.borrow();
        f.debug_struct("Transaction")
            .field("id", &st.id)
            .field("read_point", &st.read_point)
            .field("status", &st.status)
            .field("reads", &st.reads.len())
            .field("sets", &st.sets.len())
            .field("commutes", &st.commutes.len())
            .finish()
    }
}

/// Installs a transaction as this thread's current one until dropped
pub(crate) struct CurrentGuard;

impl CurrentGuard {
    pub(crate) fn install(state: Rc<RefCell<TxnState>>) -> Self {
        CURRENT.with(|c| *c.borrow_mut() = Some(state));
        CurrentGuard
    }
}

impl Drop for CurrentGuard {
    fn drop(&mut self) {
        CURRENT.with(|c| c.borrow_mut().take());
    }
}
