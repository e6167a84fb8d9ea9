//! Foreign runtime collaborator
//!
//! The symbol table never stores bindings itself. It asks a [`VarRuntime`] to
//! load namespaces, look up vars and invoke them. Any runtime that can answer
//! these questions can sit behind a [`SymbolTable`](crate::SymbolTable).

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use strand_core::{Result, Symbol, Value};

/// Opaque handle to a var owned by a [`VarRuntime`]
///
/// Handles are stable: once returned by [`VarRuntime::var_lookup`] the same
/// var is addressed even if it is later bound, rebound or unbound.
#[derive(Clone)]
pub struct VarHandle {
    symbol: Symbol,
    inner: Arc<dyn Any + Send + Sync>,
}

impl VarHandle {
    /// Wrap a runtime-specific var
    pub fn new<T: Any + Send + Sync>(symbol: Symbol, var: Arc<T>) -> Self {
        Self { symbol, inner: var }
    }

    /// Symbol the var was looked up under
    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// Borrow the runtime-specific var
    pub fn downcast_ref<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    /// True if both handles address the same var
    pub fn same_var(&self, other: &VarHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for VarHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#'{}", self.symbol)
    }
}

/// Namespace and var storage the symbol table queries
pub trait VarRuntime: Send + Sync {
    /// True if `namespace` has been realized
    fn namespace_loaded(&self, namespace: &str) -> bool;

    /// Realize `namespace`, failing if it cannot be found or its load step fails
    fn load_namespace(&self, namespace: &str) -> Result<()>;

    /// Look up `name` in an already loaded namespace
    fn var_lookup(&self, namespace: &str, name: &str) -> Option<VarHandle>;

    /// True if the var currently holds a value
    fn is_bound(&self, handle: &VarHandle) -> bool;

    /// Current value of the var, `None` while unbound
    fn deref(&self, handle: &VarHandle) -> Option<Value>;

    /// Invoke the var's value with positional arguments
    fn invoke(&self, handle: &VarHandle, args: &[Value]) -> Result<Value>;
}
