//! Namespace-qualified symbols
//!
//! A [`Symbol`] is a `(namespace, name)` pair. Namespaces are flat string-keyed
//! tables; the separator normalization applied by [`normalize_name`] is a lookup
//! convenience only and never changes a symbol's identity.

use std::borrow::Cow;
use std::fmt;

/// Separator host identifiers use where target names use [`TARGET_SEPARATOR`]
pub const HOST_SEPARATOR: char = '_';

/// Separator used by canonical target names
pub const TARGET_SEPARATOR: char = '-';

/// Namespace-qualified name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol {
    /// Namespace the name lives in
    pub namespace: String,
    /// Name within the namespace
    pub name: String,
}

impl Symbol {
    /// Create a symbol exactly as given.
    ///
    /// # Examples
    ///
    /// ```
    /// use strand_core::Symbol;
    ///
    /// let sym = Symbol::new("core", "inc");
    /// assert_eq!(sym.to_string(), "core/inc");
    /// ```
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Create a symbol with its name normalized for lookup.
    ///
    /// # Examples
    ///
    /// ```
    /// use strand_core::Symbol;
    ///
    /// assert_eq!(Symbol::canonical("core", "foo_bar").name, "foo-bar");
    /// ```
    pub fn canonical(namespace: impl Into<String>, name: &str) -> Self {
        Self {
            namespace: namespace.into(),
            name: normalize_name(name).into_owned(),
        }
    }

    /// Parse `ns/name`, falling back to `default_namespace` when unqualified.
    ///
    /// The split happens at the last `/`; a bare `/` and `ns//` both name `/`.
    pub fn parse(qualified: &str, default_namespace: &str) -> Self {
        if let Some(ns) = qualified.strip_suffix("//") {
            if !ns.is_empty() {
                return Self::new(ns, "/");
            }
        }
        match qualified.rfind('/') {
            Some(idx) if idx > 0 && idx + 1 < qualified.len() => {
                Self::new(&qualified[..idx], &qualified[idx + 1..])
            }
            _ => Self::new(default_namespace, qualified),
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Rewrite host separators to target separators.
///
/// Borrows when nothing needs rewriting, which is the common case.
pub fn normalize_name(name: &str) -> Cow<'_, str> {
    if name.contains(HOST_SEPARATOR) {
        Cow::Owned(name.replace(HOST_SEPARATOR, &TARGET_SEPARATOR.to_string()))
    } else {
        Cow::Borrowed(name)
    }
}
