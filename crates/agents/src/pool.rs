//! Worker pools
//!
//! Two pool shapes back agent dispatch and futures:
//! - [`FixedPool`]: a bounded set of threads sized for CPU-bound work
//! - [`CachedPool`]: grows on demand for work that may block, and shrinks
//!   when threads sit idle
//!
//! Both feed workers through a `crossbeam-channel` queue. A panicking job is
//! caught so it never takes a worker down with it.

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use strand_core::Result;
use tracing::{error, trace};

/// Unit of work submitted to a pool
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Something that runs jobs on background threads
pub trait Executor: Send + Sync {
    /// Queue `job`; it runs on some worker thread
    fn execute(&self, job: Job) -> Result<()>;

    /// Pool name, used for thread names and logs
    fn name(&self) -> &str;
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn run_job(pool: &str, job: Job) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
        error!(pool, panic = %panic_message(payload.as_ref()), "job panicked");
    }
}

// ============================================================================
// Fixed pool
// ============================================================================

/// Bounded pool with a fixed number of workers.
///
/// Workers are started on first use and exit when the pool is dropped.
pub struct FixedPool {
    name: String,
    workers: usize,
    sender: Sender<Job>,
    receiver: Receiver<Job>,
    started: OnceCell<()>,
}

impl FixedPool {
    /// Pool of `workers` threads (at least one)
    pub fn new(name: impl Into<String>, workers: usize) -> Self {
        let (sender, receiver) = unbounded();
        Self {
            name: name.into(),
            workers: workers.max(1),
            sender,
            receiver,
            started: OnceCell::new(),
        }
    }

    /// Number of worker threads
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Jobs waiting for a worker
    pub fn queued(&self) -> usize {
        self.receiver.len()
    }

    fn start(&self) -> Result<()> {
        self.started.get_or_try_init(|| -> Result<()> {
            for i in 0..self.workers {
                let rx = self.receiver.clone();
                let name = self.name.clone();
                thread::Builder::new()
                    .name(format!("{}-{}", self.name, i))
                    .spawn(move || {
                        trace!(pool = %name, worker = i, "worker started");
                        while let Ok(job) = rx.recv() {
                            run_job(&name, job);
                        }
                        trace!(pool = %name, worker = i, "worker stopped");
                    })?;
            }
            Ok(())
        })?;
        Ok(())
    }
}

impl Executor for FixedPool {
    fn execute(&self, job: Job) -> Result<()> {
        self.start()?;
        // The pool owns a receiver, so the channel is never disconnected here.
        let _ = self.sender.send(job);
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for FixedPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixedPool")
            .field("name", &self.name)
            .field("workers", &self.workers)
            .field("queued", &self.queued())
            .finish()
    }
}

// ============================================================================
// Cached pool
// ============================================================================

struct CachedInner {
    name: String,
    sender: Sender<Job>,
    receiver: Receiver<Job>,
    idle_timeout: Duration,
    /// Waiting workers not yet claimed by a submitted job
    idle: Mutex<usize>,
    live: AtomicUsize,
    next_worker: AtomicUsize,
}

/// Unbounded pool that reuses idle threads and spawns new ones on demand.
///
/// A thread that stays idle for `idle_timeout` exits.
#[derive(Clone)]
pub struct CachedPool {
    inner: Arc<CachedInner>,
}

impl CachedPool {
    /// Pool whose idle threads exit after `idle_timeout`
    pub fn new(name: impl Into<String>, idle_timeout: Duration) -> Self {
        let (sender, receiver) = unbounded();
        Self {
            inner: Arc::new(CachedInner {
                name: name.into(),
                sender,
                receiver,
                idle_timeout,
                idle: Mutex::new(0),
                live: AtomicUsize::new(0),
                next_worker: AtomicUsize::new(0),
            }),
        }
    }

    /// Worker threads currently alive
    pub fn live_workers(&self) -> usize {
        self.inner.live.load(Ordering::SeqCst)
    }

    /// Worker threads waiting for work
    pub fn idle_workers(&self) -> usize {
        *self.inner.idle.lock()
    }

    fn spawn_worker(&self) -> Result<()> {
        let inner = Arc::clone(&self.inner);
        let id = inner.next_worker.fetch_add(1, Ordering::Relaxed);
        inner.live.fetch_add(1, Ordering::SeqCst);
        let spawned = thread::Builder::new()
            .name(format!("{}-{}", inner.name, id))
            .spawn({
                let inner = Arc::clone(&inner);
                move || worker_loop(inner, id)
            });
        if let Err(e) = spawned {
            inner.live.fetch_sub(1, Ordering::SeqCst);
            return Err(e.into());
        }
        Ok(())
    }
}

fn worker_loop(inner: Arc<CachedInner>, id: usize) {
    trace!(pool = %inner.name, worker = id, "worker started");
    loop {
        match inner.receiver.recv_timeout(inner.idle_timeout) {
            Ok(job) => {
                run_job(&inner.name, job);
                *inner.idle.lock() += 1;
            }
            Err(RecvTimeoutError::Timeout) => {
                // Exit only while holding the idle lock with nothing queued;
                // a submitter holding the lock has either claimed an idle
                // worker or spawned a new one for its job.
                let mut idle = inner.idle.lock();
                if inner.receiver.is_empty() && *idle > 0 {
                    *idle -= 1;
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    inner.live.fetch_sub(1, Ordering::SeqCst);
    trace!(pool = %inner.name, worker = id, "worker stopped");
}

impl Executor for CachedPool {
    fn execute(&self, job: Job) -> Result<()> {
        let mut idle = self.inner.idle.lock();
        let _ = self.inner.sender.send(job);
        if *idle > 0 {
            *idle -= 1;
            Ok(())
        } else {
            drop(idle);
            self.spawn_worker()
        }
    }

    fn name(&self) -> &str {
        &self.inner.name
    }
}

impl fmt::Debug for CachedPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedPool")
            .field("name", &self.inner.name)
            .field("live", &self.live_workers())
            .field("idle", &self.idle_workers())
            .finish()
    }
}
