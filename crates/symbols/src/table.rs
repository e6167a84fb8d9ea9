//! Symbol table
//!
//! Resolves `(namespace, name)` pairs against a [`VarRuntime`] and dispatches
//! calls by name.
//!
//! # Caching
//!
//! Var handles are cached by canonical symbol for the life of the table. A
//! handle only says where a var lives, not whether it holds a value, so every
//! use re-checks `is_bound`. Misses are never cached: a name that does not
//! exist yet may be interned by the runtime later.

use crate::memory::InMemoryRuntime;
use crate::runtime::{VarHandle, VarRuntime};
use dashmap::{DashMap, DashSet};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use strand_core::{Error, Result, Symbol, SymbolConfig, Value};
use tracing::{debug, info};

/// A var located through the table, bound or not
#[derive(Clone)]
pub struct Binding {
    symbol: Symbol,
    handle: VarHandle,
    runtime: Arc<dyn VarRuntime>,
}

impl Binding {
    /// Canonical symbol of the var
    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// True if the var currently holds a value
    pub fn is_bound(&self) -> bool {
        self.runtime.is_bound(&self.handle)
    }

    /// Current value, or [`Error::UnboundSymbol`]
    pub fn value(&self) -> Result<Value> {
        self.runtime
            .deref(&self.handle)
            .ok_or_else(|| Error::UnboundSymbol {
                symbol: self.symbol.clone(),
            })
    }

    /// Invoke the bound value with positional arguments
    pub fn invoke(&self, args: &[Value]) -> Result<Value> {
        self.runtime.invoke(&self.handle, args)
    }

    /// Underlying runtime handle
    pub fn handle(&self) -> &VarHandle {
        &self.handle
    }
}

impl PartialEq for Binding {
    fn eq(&self, other: &Self) -> bool {
        self.symbol == other.symbol && self.handle.same_var(&other.handle)
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("symbol", &self.symbol)
            .field("bound", &self.is_bound())
            .finish()
    }
}

/// Outcome of a lookup in a realized namespace
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    /// The var exists and holds a value
    Bound(Binding),
    /// The var exists but has no value yet
    Unbound(Binding),
    /// No var with this name exists in the namespace
    Missing(Symbol),
}

impl Resolved {
    /// True for [`Resolved::Bound`]
    pub fn is_bound(&self) -> bool {
        matches!(self, Resolved::Bound(_))
    }

    /// The binding, bound or not
    pub fn binding(&self) -> Option<&Binding> {
        match self {
            Resolved::Bound(b) | Resolved::Unbound(b) => Some(b),
            Resolved::Missing(_) => None,
        }
    }

    /// The bound binding, or [`Error::UnboundSymbol`]
    pub fn into_bound(self) -> Result<Binding> {
        match self {
            Resolved::Bound(b) => Ok(b),
            Resolved::Unbound(b) => Err(Error::UnboundSymbol { symbol: b.symbol }),
            Resolved::Missing(symbol) => Err(Error::UnboundSymbol { symbol }),
        }
    }
}

/// Namespace-qualified symbol resolution over a [`VarRuntime`]
pub struct SymbolTable {
    runtime: Arc<dyn VarRuntime>,
    current: RwLock<String>,
    cache: Option<DashMap<Symbol, VarHandle>>,
    loaded: DashSet<String>,
}

impl SymbolTable {
    /// Table over `runtime` with default settings
    pub fn new(runtime: Arc<dyn VarRuntime>) -> Self {
        Self::with_config(runtime, &SymbolConfig::default())
    }

    /// Table over `runtime` with explicit settings
    pub fn with_config(runtime: Arc<dyn VarRuntime>, config: &SymbolConfig) -> Self {
        Self {
            runtime,
            current: RwLock::new(config.default_namespace.clone()),
            cache: config.cache_bindings.then(DashMap::new),
            loaded: DashSet::new(),
        }
    }

    /// Isolated table over a fresh [`InMemoryRuntime`] with the builtin namespace
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryRuntime::with_core()))
    }

    /// Runtime the table resolves against
    pub fn runtime(&self) -> &Arc<dyn VarRuntime> {
        &self.runtime
    }

    /// Namespace unqualified names resolve against
    pub fn current_namespace(&self) -> String {
        self.current.read().clone()
    }

    /// Switch the namespace unqualified names resolve against
    pub fn set_current_namespace(&self, namespace: impl Into<String>) {
        *self.current.write() = namespace.into();
    }

    /// Make sure `namespace` is realized, running its load step once
    pub fn require(&self, namespace: &str) -> Result<()> {
        if self.loaded.contains(namespace) {
            return Ok(());
        }
        if !self.runtime.namespace_loaded(namespace) {
            info!(namespace, "loading namespace");
            self.runtime
                .load_namespace(namespace)
                .map_err(|e| match e {
                    Error::UnknownNamespace { .. } => e,
                    other => Error::UnknownNamespace {
                        namespace: namespace.to_string(),
                        reason: other.to_string(),
                    },
                })?;
        }
        self.loaded.insert(namespace.to_string());
        Ok(())
    }

    fn lookup(&self, symbol: &Symbol, raw_name: &str) -> Option<VarHandle> {
        if let Some(cache) = &self.cache {
            if let Some(handle) = cache.get(symbol) {
                return Some(handle.clone());
            }
        }
        let handle = self
            .runtime
            .var_lookup(&symbol.namespace, &symbol.name)
            .or_else(|| {
                // A target name may itself contain the host separator.
                (raw_name != symbol.name)
                    .then(|| self.runtime.var_lookup(&symbol.namespace, raw_name))
                    .flatten()
            })?;
        if let Some(cache) = &self.cache {
            debug!(symbol = %symbol, "caching var handle");
            cache.insert(symbol.clone(), handle.clone());
        }
        Some(handle)
    }

    /// Resolve `name` in `namespace`, loading the namespace if needed.
    ///
    /// `_` in `name` is matched as `-`, so `foo_bar` finds `foo-bar`.
    pub fn resolve(&self, namespace: &str, name: &str) -> Result<Resolved> {
        self.require(namespace)?;
        let symbol = Symbol::canonical(namespace, name);
        let Some(handle) = self.lookup(&symbol, name) else {
            return Ok(Resolved::Missing(Symbol::new(namespace, name)));
        };
        let binding = Binding {
            symbol: handle.symbol().clone(),
            handle,
            runtime: Arc::clone(&self.runtime),
        };
        if binding.is_bound() {
            Ok(Resolved::Bound(binding))
        } else {
            Ok(Resolved::Unbound(binding))
        }
    }

    /// Resolve `name` in the current namespace
    pub fn resolve_default(&self, name: &str) -> Result<Resolved> {
        let namespace = self.current_namespace();
        self.resolve(&namespace, name)
    }

    /// The var for `namespace/name` without invoking it.
    ///
    /// Unbound vars are returned too; only a missing name is an error.
    pub fn var(&self, namespace: &str, name: &str) -> Result<Binding> {
        match self.resolve(namespace, name)? {
            Resolved::Bound(b) | Resolved::Unbound(b) => Ok(b),
            Resolved::Missing(symbol) => Err(Error::UnboundSymbol { symbol }),
        }
    }

    /// Invoke `namespace/name` with `args`.
    ///
    /// Fails with [`Error::NoSuchOperation`] unless the name is bound.
    pub fn call_by_name(&self, namespace: &str, name: &str, args: &[Value]) -> Result<Value> {
        match self.resolve(namespace, name)? {
            Resolved::Bound(binding) => binding.invoke(args),
            Resolved::Unbound(_) | Resolved::Missing(_) => Err(Error::NoSuchOperation {
                name: Symbol::new(namespace, name).to_string(),
            }),
        }
    }

    /// Invoke a possibly qualified name; unqualified names use the current namespace
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value> {
        let symbol = Symbol::parse(name, &self.current_namespace());
        self.call_by_name(&symbol.namespace, &symbol.name, args)
    }

    /// Handle scoped to one namespace
    pub fn ns(&self, namespace: &str) -> NamespaceView<'_> {
        NamespaceView {
            table: self,
            namespace: namespace.to_string(),
        }
    }

    /// Drop all cached var handles
    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }

    /// Number of cached var handles
    pub fn cached_len(&self) -> usize {
        self.cache.as_ref().map(DashMap::len).unwrap_or(0)
    }
}

impl fmt::Debug for SymbolTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymbolTable")
            .field("current", &*self.current.read())
            .field("cached", &self.cached_len())
            .finish()
    }
}

/// A [`SymbolTable`] scoped to one namespace
#[derive(Debug)]
pub struct NamespaceView<'a> {
    table: &'a SymbolTable,
    namespace: String,
}

impl<'a> NamespaceView<'a> {
    /// Namespace this view addresses
    pub fn name(&self) -> &str {
        &self.namespace
    }

    /// Force the namespace to load
    pub fn require(self) -> Result<Self> {
        self.table.require(&self.namespace)?;
        Ok(self)
    }

    /// Resolve `name` in this namespace
    pub fn resolve(&self, name: &str) -> Result<Resolved> {
        self.table.resolve(&self.namespace, name)
    }

    /// The var for `name` without invoking it
    pub fn var(&self, name: &str) -> Result<Binding> {
        self.table.var(&self.namespace, name)
    }

    /// Invoke `name` in this namespace
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value> {
        self.table.call_by_name(&self.namespace, name, args)
    }
}
