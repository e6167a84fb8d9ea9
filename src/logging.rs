//! Structured logging setup
//!
//! Library crates only emit `tracing` events. Installing a subscriber is left
//! to the application; [`init`] is a convenience for binaries and tests.

use strand_core::{Error, LoggingConfig, Result};
use tracing::debug;
use tracing_subscriber::filter::LevelFilter;

/// Install a `fmt` subscriber at the configured level.
///
/// Does nothing if a global subscriber is already installed.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let level: LevelFilter = config.level.to_ascii_lowercase().parse().map_err(|_| {
        Error::InvalidConfig(format!("unknown log level {:?}", config.level))
    })?;
    if tracing_subscriber::fmt()
        .with_max_level(level)
        .with_thread_names(true)
        .try_init()
        .is_err()
    {
        debug!("tracing subscriber already installed");
    }
    Ok(())
}
