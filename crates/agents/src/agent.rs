//! Agents
//!
//! An [`Agent`] owns a value that changes only through actions sent to it.
//! Actions queue in a per-agent mailbox and run one at a time, in send
//! order, on a background pool. Different agents run in parallel.
//!
//! The mailbox never hands the pool an action directly. It submits a job that
//! pops the front action when it runs, so a queued action stays in order even
//! if a submission fails.
//!
//! ## Failures
//!
//! With [`ErrorMode::Fail`] (the default) a failed action stops the agent:
//! the failure is recorded, `get` and new sends report
//! [`Error::AgentFailure`], and queued actions wait until
//! [`Agent::restart`]. Nothing is reported until someone looks at the agent.
//!
//! With [`ErrorMode::Continue`] the failed action is skipped, the state is
//! left unchanged, and the optional error handler is told about it.
//!
//! ## Transactions
//!
//! Sends made inside a running transaction are held until that transaction
//! commits and dropped if it retries or aborts.

use crate::executor::{DispatchKind, Executors};
use crate::pool::panic_message;
use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use strand_concurrency::Transaction;
use strand_core::{Callable, Error, ErrorMode, Result, SharedError, Value};
use tracing::{debug, error, warn};

static NEXT_AGENT_ID: AtomicU64 = AtomicU64::new(1);

type ActionFn<T> = Box<dyn FnOnce(&T) -> Result<T> + Send + 'static>;

/// Called with the agent id and the failure when an action fails in
/// [`ErrorMode::Continue`]
pub type ErrorHandler = Arc<dyn Fn(u64, &Error) + Send + Sync>;

struct Action<T> {
    f: ActionFn<T>,
    kind: DispatchKind,
}

struct Mailbox<T> {
    actions: VecDeque<Action<T>>,
    /// A job for this agent is submitted or running
    running: bool,
    error: Option<SharedError>,
}

struct AgentInner<T> {
    id: u64,
    state: RwLock<Arc<T>>,
    mailbox: Mutex<Mailbox<T>>,
    idle: Condvar,
    executors: Arc<Executors>,
    error_mode: ErrorMode,
    error_handler: Option<ErrorHandler>,
}

impl<T: Clone + Send + Sync + 'static> AgentInner<T> {
    fn failure(&self, mailbox: &Mailbox<T>) -> Option<Error> {
        mailbox.error.as_ref().map(|cause| Error::AgentFailure {
            agent: self.id,
            cause: Arc::clone(cause),
        })
    }

    fn enqueue(this: &Arc<Self>, action: Action<T>) -> Result<()> {
        let mut mailbox = this.mailbox.lock();
        if let Some(err) = this.failure(&mailbox) {
            return Err(err);
        }
        mailbox.actions.push_back(action);
        if mailbox.running {
            return Ok(());
        }
        mailbox.running = true;
        let kind = mailbox.actions.front().map(|a| a.kind);
        drop(mailbox);
        match kind {
            Some(kind) => Self::submit(this, kind),
            None => Ok(()),
        }
    }

    fn submit(this: &Arc<Self>, kind: DispatchKind) -> Result<()> {
        let agent = Arc::clone(this);
        let submitted = this
            .executors
            .submit(kind, Box::new(move || Self::run_next(&agent)));
        if let Err(e) = submitted {
            error!(agent = this.id, error = %e, "could not schedule agent action");
            this.mailbox.lock().running = false;
            this.idle.notify_all();
            return Err(e);
        }
        Ok(())
    }

    fn run_next(this: &Arc<Self>) {
        let next = this.mailbox.lock().actions.pop_front();
        let Some(action) = next else {
            this.finish();
            return;
        };

        let current = Arc::clone(&this.state.read());
        let f = action.f;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| f(&*current))).unwrap_or_else(
            |payload| {
                Err(Error::callable(format!(
                    "agent action panicked: {}",
                    panic_message(payload.as_ref())
                )))
            },
        );

        match outcome {
            Ok(next) => *this.state.write() = Arc::new(next),
            Err(e) => this.record_failure(e),
        }

        let mut mailbox = this.mailbox.lock();
        let next_kind = match mailbox.actions.front() {
            Some(next) if mailbox.error.is_none() => next.kind,
            _ => {
                mailbox.running = false;
                drop(mailbox);
                this.idle.notify_all();
                return;
            }
        };
        drop(mailbox);
        if let Err(e) = Self::submit(this, next_kind) {
            // `submit` logged and marked the agent idle; the queued actions
            // stay put and the next send schedules them again.
            debug!(agent = this.id, error = %e, "agent left idle with queued actions");
        }
    }

    fn finish(&self) {
        self.mailbox.lock().running = false;
        self.idle.notify_all();
    }

    fn record_failure(&self, err: Error) {
        match self.error_mode {
            ErrorMode::Fail => {
                error!(agent = self.id, error = %err, "agent action failed, agent stopped");
                self.mailbox.lock().error = Some(Arc::new(err));
            }
            ErrorMode::Continue => {
                warn!(agent = self.id, error = %err, "agent action failed, continuing");
                if let Some(handler) = &self.error_handler {
                    handler(self.id, &err);
                }
            }
        }
    }
}

/// Asynchronously updated cell with a serialized action queue
pub struct Agent<T> {
    inner: Arc<AgentInner<T>>,
}

impl<T> Clone for Agent<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Agent<T> {
    /// Agent on the process-wide executors with [`ErrorMode::Fail`]
    ///
    /// # Examples
    ///
    /// ```
    /// use strand_agents::Agent;
    ///
    /// let greeting = Agent::new(String::from("hello"));
    /// greeting.send(|s| format!("{} world", s)).unwrap();
    /// greeting.await_idle();
    /// assert_eq!(greeting.get().unwrap(), "hello world");
    /// ```
    pub fn new(initial: T) -> Self {
        Self::builder(initial).build()
    }

    /// Configure an agent before creating it
    pub fn builder(initial: T) -> AgentBuilder<T> {
        AgentBuilder {
            initial,
            executors: None,
            error_mode: ErrorMode::default(),
            error_handler: None,
        }
    }

    /// Process-unique agent id
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Failure policy
    pub fn error_mode(&self) -> ErrorMode {
        self.inner.error_mode
    }

    /// Last computed value, or the failure that stopped the agent.
    ///
    /// Never waits for queued actions.
    pub fn get(&self) -> Result<T> {
        if let Some(err) = self.inner.failure(&self.inner.mailbox.lock()) {
            return Err(err);
        }
        Ok(self.value())
    }

    /// Last computed value, even if the agent has stopped
    pub fn value(&self) -> T {
        (**self.inner.state.read()).clone()
    }

    /// Failure that stopped the agent, if any
    pub fn error(&self) -> Option<SharedError> {
        self.inner.mailbox.lock().error.clone()
    }

    /// Actions queued and not yet started
    pub fn pending(&self) -> usize {
        self.inner.mailbox.lock().actions.len()
    }

    /// Queue `f` on the bounded pool
    pub fn send<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&T) -> T + Send + 'static,
    {
        self.dispatch(DispatchKind::Cpu, Box::new(move |v| Ok(f(v))))
    }

    /// Queue `f` on the growable pool, for actions that may block
    pub fn send_off<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&T) -> T + Send + 'static,
    {
        self.dispatch(DispatchKind::Io, Box::new(move |v| Ok(f(v))))
    }

    /// Queue a fallible action on the bounded pool
    pub fn try_send<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&T) -> Result<T> + Send + 'static,
    {
        self.dispatch(DispatchKind::Cpu, Box::new(f))
    }

    /// Queue a fallible action on the growable pool
    pub fn try_send_off<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&T) -> Result<T> + Send + 'static,
    {
        self.dispatch(DispatchKind::Io, Box::new(f))
    }

    fn dispatch(&self, kind: DispatchKind, f: ActionFn<T>) -> Result<()> {
        if let Some(err) = self.inner.failure(&self.inner.mailbox.lock()) {
            return Err(err);
        }
        let action = Action { f, kind };
        if let Some(txn) = Transaction::current() {
            let inner = Arc::clone(&self.inner);
            txn.on_commit(move || {
                if let Err(e) = AgentInner::enqueue(&inner, action) {
                    warn!(agent = inner.id, error = %e, "dropped action sent in transaction");
                }
            });
            return Ok(());
        }
        AgentInner::enqueue(&self.inner, action)
    }

    /// Clear the failure of a stopped agent and resume it from `state`.
    ///
    /// With `clear_actions` the queued actions are discarded, otherwise they
    /// run against the new state.
    pub fn restart(&self, state: T, clear_actions: bool) -> Result<()> {
        let mut mailbox = self.inner.mailbox.lock();
        if mailbox.error.is_none() {
            return Err(Error::IllegalMutation(format!(
                "agent {} does not need a restart",
                self.inner.id
            )));
        }
        *self.inner.state.write() = Arc::new(state);
        mailbox.error = None;
        if clear_actions {
            mailbox.actions.clear();
        }
        if mailbox.running {
            return Ok(());
        }
        let Some(kind) = mailbox.actions.front().map(|a| a.kind) else {
            return Ok(());
        };
        mailbox.running = true;
        drop(mailbox);
        AgentInner::submit(&self.inner, kind)
    }

    /// Block until no action of this agent is running or runnable.
    ///
    /// Must not be called from inside one of this agent's own actions.
    pub fn await_idle(&self) {
        let mut mailbox = self.inner.mailbox.lock();
        while mailbox.running {
            self.inner.idle.wait(&mut mailbox);
        }
    }

    /// [`Agent::await_idle`] with a bound; false if the agent is still busy
    pub fn await_for(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut mailbox = self.inner.mailbox.lock();
        while mailbox.running {
            if self.inner.idle.wait_until(&mut mailbox, deadline).timed_out() {
                return !mailbox.running;
            }
        }
        true
    }
}

impl Agent<Value> {
    /// Queue a callable on the bounded pool; it receives the current value
    pub fn send_callable(&self, f: &Callable) -> Result<()> {
        let f = f.clone();
        self.try_send(move |v| f.invoke1(v))
    }

    /// Queue a callable on the growable pool
    pub fn send_off_callable(&self, f: &Callable) -> Result<()> {
        let f = f.clone();
        self.try_send_off(move |v| f.invoke1(v))
    }
}

impl<T: fmt::Debug> fmt::Debug for Agent<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.inner.id)
            .field("value", &*self.inner.state.read())
            .field("error_mode", &self.inner.error_mode)
            .finish()
    }
}

/// Builder for [`Agent`]
pub struct AgentBuilder<T> {
    initial: T,
    executors: Option<Arc<Executors>>,
    error_mode: ErrorMode,
    error_handler: Option<ErrorHandler>,
}

impl<T: Clone + Send + Sync + 'static> AgentBuilder<T> {
    /// Run actions on `executors` instead of the process-wide pools
    pub fn executors(mut self, executors: Arc<Executors>) -> Self {
        self.executors = Some(executors);
        self
    }

    /// Set the failure policy
    pub fn error_mode(mut self, mode: ErrorMode) -> Self {
        self.error_mode = mode;
        self
    }

    /// Observe failures in [`ErrorMode::Continue`]
    pub fn error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(u64, &Error) + Send + Sync + 'static,
    {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    /// Create the agent
    pub fn build(self) -> Agent<T> {
        Agent {
            inner: Arc::new(AgentInner {
                id: NEXT_AGENT_ID.fetch_add(1, Ordering::Relaxed),
                state: RwLock::new(Arc::new(self.initial)),
                mailbox: Mutex::new(Mailbox {
                    actions: VecDeque::new(),
                    running: false,
                    error: None,
                }),
                idle: Condvar::new(),
                executors: self.executors.unwrap_or_else(Executors::global),
                error_mode: self.error_mode,
                error_handler: self.error_handler,
            }),
        }
    }
}
