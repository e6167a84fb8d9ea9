//! In-process var runtime
//!
//! `InMemoryRuntime` keeps namespaces in a `DashMap` and realizes missing ones
//! through registered loader functions. It is what the runtime facade uses when
//! no foreign runtime is injected, and what tests use to build isolated tables.
//!
//! A namespace with a loader counts as realized only once its loader has
//! returned `Ok`. Loaders run one at a time per namespace, and vars a failed
//! loader interned are rolled back.

use crate::builtins;
use crate::runtime::{VarHandle, VarRuntime};
use dashmap::{DashMap, DashSet};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use strand_core::{Error, Result, Symbol, Value};
use tracing::debug;

type Loader = Arc<dyn Fn(&InMemoryRuntime) -> Result<()> + Send + Sync>;

/// A named slot whose root value may be absent
#[derive(Debug)]
pub struct Var {
    symbol: Symbol,
    root: RwLock<Option<Value>>,
}

impl Var {
    fn new(symbol: Symbol, root: Option<Value>) -> Self {
        Self {
            symbol,
            root: RwLock::new(root),
        }
    }

    /// Symbol the var was interned under
    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// Current root value
    pub fn get(&self) -> Option<Value> {
        self.root.read().clone()
    }

    /// True if the var has a root value
    pub fn is_bound(&self) -> bool {
        self.root.read().is_some()
    }
}

#[derive(Default)]
struct Namespace {
    vars: DashMap<String, Arc<Var>>,
}

/// Var runtime backed by process memory
#[derive(Default)]
pub struct InMemoryRuntime {
    namespaces: DashMap<String, Arc<Namespace>>,
    loaders: DashMap<String, Loader>,
    /// Namespaces whose loader has completed
    realized: DashSet<String>,
    /// Serializes loader runs per namespace
    load_gates: DashMap<String, Arc<Mutex<()>>>,
}

impl InMemoryRuntime {
    /// Empty runtime with no namespaces
    pub fn new() -> Self {
        Self::default()
    }

    /// Runtime with the builtin `core` namespace registered as a lazy loader
    pub fn with_core() -> Self {
        let runtime = Self::new();
        runtime.register_loader(builtins::CORE_NAMESPACE, builtins::install);
        runtime
    }

    /// Register the load step for `namespace`, run the first time it is required
    pub fn register_loader<F>(&self, namespace: &str, loader: F)
    where
        F: Fn(&InMemoryRuntime) -> Result<()> + Send + Sync + 'static,
    {
        self.loaders.insert(namespace.to_string(), Arc::new(loader));
    }

    /// Realize an empty namespace, no-op if it exists
    pub fn create_namespace(&self, namespace: &str) {
        self.namespace(namespace);
    }

    fn namespace(&self, namespace: &str) -> Arc<Namespace> {
        self.namespaces
            .entry(namespace.to_string())
            .or_default()
            .clone()
    }

    fn var(&self, namespace: &str, name: &str) -> Arc<Var> {
        let ns = self.namespace(namespace);
        let var = ns
            .vars
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Var::new(Symbol::new(namespace, name), None)))
            .clone();
        var
    }

    /// Create or rebind `namespace/name` to `value`
    pub fn intern(&self, namespace: &str, name: &str, value: impl Into<Value>) -> Arc<Var> {
        let var = self.var(namespace, name);
        *var.root.write() = Some(value.into());
        var
    }

    /// Create `namespace/name` without a root value
    pub fn declare(&self, namespace: &str, name: &str) -> Arc<Var> {
        self.var(namespace, name)
    }

    /// Remove the root value of an existing var
    pub fn unbind(&self, namespace: &str, name: &str) {
        if let Some(ns) = self.namespaces.get(namespace) {
            if let Some(var) = ns.vars.get(name) {
                *var.root.write() = None;
            }
        }
    }

    /// Names interned in `namespace`, sorted
    pub fn names(&self, namespace: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .namespaces
            .get(namespace)
            .map(|ns| ns.vars.iter().map(|e| e.key().clone()).collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    fn has_loader(&self, namespace: &str) -> bool {
        self.loaders.contains_key(namespace)
    }

    /// Undo what a failed loader did to `namespace`
    fn roll_back(&self, namespace: &str, existed: bool, before: Vec<(Arc<Var>, Option<Value>)>) {
        let Some(ns) = self.namespaces.get(namespace).map(|ns| Arc::clone(ns.value())) else {
            return;
        };
        ns.vars
            .retain(|_, var| before.iter().any(|(kept, _)| Arc::ptr_eq(kept, var)));
        for (var, root) in before {
            *var.root.write() = root;
        }
        if !existed && ns.vars.is_empty() {
            self.namespaces.remove(namespace);
        }
    }

    fn var_of<'a>(&self, handle: &'a VarHandle) -> Option<&'a Var> {
        handle.downcast_ref::<Var>()
    }
}

impl VarRuntime for InMemoryRuntime {
    fn namespace_loaded(&self, namespace: &str) -> bool {
        if self.has_loader(namespace) {
            self.realized.contains(namespace)
        } else {
            self.namespaces.contains_key(namespace)
        }
    }

    fn load_namespace(&self, namespace: &str) -> Result<()> {
        if self.namespace_loaded(namespace) {
            return Ok(());
        }
        // Clone out of the map so the loader can register further loaders.
        let loader = self.loaders.get(namespace).map(|l| Arc::clone(l.value()));
        let loader = loader.ok_or_else(|| Error::UnknownNamespace {
            namespace: namespace.to_string(),
            reason: "no loader registered".to_string(),
        })?;

        let gate = Arc::clone(
            self.load_gates
                .entry(namespace.to_string())
                .or_default()
                .value(),
        );
        let _loading = gate.lock();
        if self.realized.contains(namespace) {
            return Ok(());
        }

        let existing = self.namespaces.get(namespace).map(|ns| Arc::clone(ns.value()));
        let before: Vec<(Arc<Var>, Option<Value>)> = existing
            .as_ref()
            .map(|ns| {
                ns.vars
                    .iter()
                    .map(|e| (Arc::clone(e.value()), e.value().get()))
                    .collect()
            })
            .unwrap_or_default();

        debug!(namespace, "running namespace loader");
        if let Err(e) = loader(self) {
            self.roll_back(namespace, existing.is_some(), before);
            return Err(Error::UnknownNamespace {
                namespace: namespace.to_string(),
                reason: e.to_string(),
            });
        }
        self.create_namespace(namespace);
        self.realized.insert(namespace.to_string());
        Ok(())
    }

    fn var_lookup(&self, namespace: &str, name: &str) -> Option<VarHandle> {
        // Vars of a namespace still being loaded stay hidden.
        if self.has_loader(namespace) && !self.realized.contains(namespace) {
            return None;
        }
        let ns = self.namespaces.get(namespace)?.clone();
        let var = ns.vars.get(name)?.clone();
        Some(VarHandle::new(var.symbol.clone(), var))
    }

    fn is_bound(&self, handle: &VarHandle) -> bool {
        self.var_of(handle).map(Var::is_bound).unwrap_or(false)
    }

    fn deref(&self, handle: &VarHandle) -> Option<Value> {
        self.var_of(handle).and_then(Var::get)
    }

    fn invoke(&self, handle: &VarHandle, args: &[Value]) -> Result<Value> {
        match self.deref(handle) {
            Some(Value::Fn(f)) => f.invoke(args),
            Some(other) => Err(Error::WrongType {
                expected: "Fn",
                actual: other.type_name(),
            }),
            None => Err(Error::UnboundSymbol {
                symbol: handle.symbol().clone(),
            }),
        }
    }
}
