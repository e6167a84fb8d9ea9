//! Runtime configuration
//!
//! Every field has a default, so an empty TOML document is a valid config.
//!
//! ```toml
//! [stm]
//! max_retries = 10000
//!
//! [agents]
//! cpu_workers = 0          # 0 => num_cpus + 2
//! io_idle_timeout_ms = 60000
//! error_mode = "fail"      # or "continue"
//!
//! [symbols]
//! default_namespace = "core"
//! cache_bindings = true
//!
//! [logging]
//! level = "info"
//! ```

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Namespace unqualified names resolve against unless changed at runtime
pub const DEFAULT_NAMESPACE: &str = "core";

/// Default cap on transaction attempts
pub const DEFAULT_MAX_RETRIES: u32 = 10_000;

/// Default idle lifetime of an IO pool thread
pub const DEFAULT_IO_IDLE_TIMEOUT_MS: u64 = 60_000;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

/// Top-level runtime configuration
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Transaction engine settings
    pub stm: StmConfig,
    /// Agent and future executor settings
    pub agents: AgentConfig,
    /// Symbol table settings
    pub symbols: SymbolConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

/// Transaction engine settings
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct StmConfig {
    /// Attempts before a transaction gives up with a retry-exhausted error
    pub max_retries: u32,
}

impl Default for StmConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

/// What an agent does after one of its actions fails
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ErrorMode {
    /// Record the failure, refuse new work and pause the queue until restarted
    #[default]
    Fail,
    /// Report the failure to the error handler and keep going with the old state
    Continue,
}

/// Agent and future executor settings
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AgentConfig {
    /// Size of the bounded pool used by `send`; 0 selects `num_cpus + 2`
    pub cpu_workers: usize,
    /// Idle lifetime of IO pool threads, in milliseconds
    pub io_idle_timeout_ms: u64,
    /// Failure policy for new agents
    pub error_mode: ErrorMode,
}

impl AgentConfig {
    /// Resolved size of the bounded pool
    pub fn effective_cpu_workers(&self) -> usize {
        if self.cpu_workers == 0 {
            num_cpus::get() + 2
        } else {
            self.cpu_workers
        }
    }

    /// Idle lifetime of IO pool threads
    pub fn io_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.io_idle_timeout_ms)
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            cpu_workers: 0,
            io_idle_timeout_ms: DEFAULT_IO_IDLE_TIMEOUT_MS,
            error_mode: ErrorMode::Fail,
        }
    }
}

/// Symbol table settings
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SymbolConfig {
    /// Namespace used for unqualified lookups
    pub default_namespace: String,
    /// Cache var handles by symbol for the lifetime of the table
    pub cache_bindings: bool,
}

impl Default for SymbolConfig {
    fn default() -> Self {
        Self {
            default_namespace: DEFAULT_NAMESPACE.to_string(),
            cache_bindings: true,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// One of trace, debug, info, warn, error, off
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl RuntimeConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: RuntimeConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Reject settings no runtime can honor
    pub fn validate(&self) -> Result<()> {
        if self.stm.max_retries == 0 {
            return Err(Error::InvalidConfig(
                "stm.max_retries must be at least 1".into(),
            ));
        }
        if self.symbols.default_namespace.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "symbols.default_namespace must not be empty".into(),
            ));
        }
        if !LOG_LEVELS.contains(&self.logging.level.to_ascii_lowercase().as_str()) {
            return Err(Error::InvalidConfig(format!(
                "logging.level must be one of {:?}, got {:?}",
                LOG_LEVELS, self.logging.level
            )));
        }
        Ok(())
    }
}
