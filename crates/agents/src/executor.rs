//! Executor pair shared by agents and futures

use crate::pool::{CachedPool, Executor, FixedPool, Job};
use once_cell::sync::Lazy;
use std::fmt;
use std::sync::Arc;
use strand_core::{AgentConfig, Result};

static GLOBAL: Lazy<Arc<Executors>> =
    Lazy::new(|| Arc::new(Executors::new(&AgentConfig::default())));

/// Which pool an action or future runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchKind {
    /// Bounded pool for CPU-bound work (`send`)
    Cpu,
    /// Growable pool for work that may block (`send_off`, futures)
    Io,
}

/// The CPU-bound and IO-bound pools
pub struct Executors {
    cpu: FixedPool,
    io: CachedPool,
}

impl Executors {
    /// Build pools from configuration; threads start on first use
    pub fn new(config: &AgentConfig) -> Self {
        Self {
            cpu: FixedPool::new("strand-send", config.effective_cpu_workers()),
            io: CachedPool::new("strand-send-off", config.io_idle_timeout()),
        }
    }

    /// Process-wide pools used by agents and futures created without explicit executors
    pub fn global() -> Arc<Executors> {
        Arc::clone(&GLOBAL)
    }

    /// Bounded pool
    pub fn cpu(&self) -> &FixedPool {
        &self.cpu
    }

    /// Growable pool
    pub fn io(&self) -> &CachedPool {
        &self.io
    }

    /// Run `job` on the pool for `kind`
    pub fn submit(&self, kind: DispatchKind, job: Job) -> Result<()> {
        match kind {
            DispatchKind::Cpu => self.cpu.execute(job),
            DispatchKind::Io => self.io.execute(job),
        }
    }
}

impl fmt::Debug for Executors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executors")
            .field("cpu", &self.cpu)
            .field("io", &self.io)
            .finish()
    }
}
