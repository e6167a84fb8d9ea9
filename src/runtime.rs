//! Runtime entry point for strand.
//!
//! [`Strand`] ties one transaction engine, one symbol table and one pair of
//! worker pools together, so cells, agents and call-by-name share the same
//! configuration.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use strand_agents::{future_with, Agent, Executors, FutureHandle};
use strand_concurrency::{AtomicCell, Stm, TRef, Transaction};
use strand_core::{Callable, ErrorMode, Result, RuntimeConfig, Value};
use strand_symbols::{InMemoryRuntime, SymbolTable, VarRuntime};
use tracing::info;

/// A configured runtime.
///
/// # Example
///
/// ```
/// use strand::prelude::*;
///
/// let rt = Strand::new()?;
/// let counter = rt.tref(0i64);
/// rt.dosync(|txn| txn.alter(&counter, |n| n + 1))?;
/// assert_eq!(counter.get(), 1);
///
/// let sum = rt.call("core/+", &[Value::Int(1), Value::Int(2)])?;
/// assert_eq!(sum, Value::Int(3));
/// # Ok::<(), strand::Error>(())
/// ```
pub struct Strand {
    config: RuntimeConfig,
    stm: Arc<Stm>,
    symbols: Arc<SymbolTable>,
    executors: Arc<Executors>,
}

impl Strand {
    /// Runtime with default settings and the in-memory symbol runtime
    pub fn new() -> Result<Self> {
        Self::builder().open()
    }

    /// Runtime configured from a TOML file
    pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::builder()
            .config(RuntimeConfig::from_file(path)?)
            .open()
    }

    /// Create a builder for runtime configuration
    pub fn builder() -> StrandBuilder {
        StrandBuilder::new()
    }

    /// Effective configuration
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Transaction engine
    pub fn stm(&self) -> &Stm {
        &self.stm
    }

    /// Symbol table
    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// Worker pools for agents and futures
    pub fn executors(&self) -> &Arc<Executors> {
        &self.executors
    }

    /// New atomic cell
    pub fn atom<T: Clone + Send + Sync + 'static>(&self, initial: T) -> AtomicCell<T> {
        AtomicCell::new(initial)
    }

    /// New transactional cell owned by this runtime's engine
    pub fn tref<T: Clone + Send + Sync + 'static>(&self, initial: T) -> TRef<T> {
        self.stm.new_ref(initial)
    }

    /// New agent on this runtime's pools with the configured error mode
    pub fn agent<T: Clone + Send + Sync + 'static>(&self, initial: T) -> Agent<T> {
        Agent::builder(initial)
            .executors(Arc::clone(&self.executors))
            .error_mode(self.config.agents.error_mode)
            .build()
    }

    /// Run `f` in the background
    pub fn future<T, F>(&self, f: F) -> Result<FutureHandle<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        future_with(&self.executors, f)
    }

    /// Run a zero-argument callable in the background
    pub fn future_call(&self, f: &Callable) -> Result<FutureHandle<Value>> {
        let f = f.clone();
        self.future(move || f.invoke0())
    }

    /// Run `body` as a transaction on this runtime's engine
    pub fn dosync<R, F>(&self, body: F) -> Result<R>
    where
        F: FnMut(&Transaction) -> Result<R>,
    {
        self.stm.dosync(body)
    }

    /// Load a namespace
    pub fn require(&self, namespace: &str) -> Result<()> {
        self.symbols.require(namespace)
    }

    /// Call `ns/name`, or `name` in the current namespace
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value> {
        self.symbols.call(name, args)
    }

    /// Call `name` in `namespace`
    pub fn call_by_name(&self, namespace: &str, name: &str, args: &[Value]) -> Result<Value> {
        self.symbols.call_by_name(namespace, name, args)
    }

    /// Runtime metrics
    pub fn metrics(&self) -> RuntimeMetrics {
        let stats = self.stm.metrics().snapshot();
        let finished = stats.committed + stats.aborted;
        RuntimeMetrics {
            transactions_committed: stats.committed,
            transactions_retried: stats.retries,
            transactions_aborted: stats.aborted,
            commit_rate: if finished == 0 {
                1.0
            } else {
                stats.committed as f64 / finished as f64
            },
            cached_bindings: self.symbols.cached_len(),
        }
    }
}

/// Runtime metrics.
#[derive(Debug, Clone)]
pub struct RuntimeMetrics {
    /// Transactions that committed
    pub transactions_committed: u64,
    /// Attempts restarted after a conflict
    pub transactions_retried: u64,
    /// Transactions that gave up
    pub transactions_aborted: u64,
    /// Committed share of finished transactions (0.0 - 1.0)
    pub commit_rate: f64,
    /// Symbol bindings held in the lookup cache
    pub cached_bindings: usize,
}

/// Builder for runtime configuration.
///
/// # Example
///
/// ```
/// use strand::prelude::*;
///
/// let rt = Strand::builder()
///     .max_retries(100)
///     .cpu_workers(2)
///     .error_mode(ErrorMode::Continue)
///     .open()?;
/// assert_eq!(rt.stm().max_retries(), 100);
/// # Ok::<(), strand::Error>(())
/// ```
pub struct StrandBuilder {
    config: RuntimeConfig,
    runtime: Option<Arc<dyn VarRuntime>>,
    init_logging: bool,
}

impl StrandBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: RuntimeConfig::default(),
            runtime: None,
            init_logging: false,
        }
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Resolve symbols against `runtime` instead of the in-memory one
    pub fn runtime(mut self, runtime: Arc<dyn VarRuntime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Attempts per transaction before giving up
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.config.stm.max_retries = max_retries;
        self
    }

    /// Threads in the bounded pool
    pub fn cpu_workers(mut self, workers: usize) -> Self {
        self.config.agents.cpu_workers = workers;
        self
    }

    /// How long an idle growable-pool thread lingers
    pub fn io_idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.agents.io_idle_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Failure policy for agents created by the runtime
    pub fn error_mode(mut self, mode: ErrorMode) -> Self {
        self.config.agents.error_mode = mode;
        self
    }

    /// Namespace used for unqualified names
    pub fn default_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.config.symbols.default_namespace = namespace.into();
        self
    }

    /// Turn the binding cache on or off
    pub fn cache_bindings(mut self, enabled: bool) -> Self {
        self.config.symbols.cache_bindings = enabled;
        self
    }

    /// Install a `fmt` subscriber at the configured level on open
    pub fn with_logging(mut self) -> Self {
        self.init_logging = true;
        self
    }

    /// Validate the configuration and build the runtime
    pub fn open(self) -> Result<Strand> {
        self.config.validate()?;
        if self.init_logging {
            crate::logging::init(&self.config.logging)?;
        }
        let runtime: Arc<dyn VarRuntime> = match self.runtime {
            Some(runtime) => runtime,
            None => Arc::new(InMemoryRuntime::with_core()),
        };
        let symbols = SymbolTable::with_config(runtime, &self.config.symbols);
        let strand = Strand {
            stm: Arc::new(Stm::new(self.config.stm.clone())),
            symbols: Arc::new(symbols),
            executors: Arc::new(Executors::new(&self.config.agents)),
            config: self.config,
        };
        info!(
            max_retries = strand.config.stm.max_retries,
            cpu_workers = strand.config.agents.effective_cpu_workers(),
            namespace = %strand.config.symbols.default_namespace,
            "strand runtime ready"
        );
        Ok(strand)
    }
}

impl Default for StrandBuilder {
    fn default() -> Self {
        Self::new()
    }
}
