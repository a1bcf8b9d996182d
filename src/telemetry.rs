//! Logging setup for applications embedding the conductor

use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;
use crate::{Error, Result};

/// Filter directive for a `-v` count
#[must_use]
pub const fn filter_for_verbosity(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "info,beacon_conductor=info",
        1 => "info,beacon_conductor=debug",
        2 => "debug",
        _ => "trace",
    }
}

/// Install a fmt subscriber for the given verbosity
///
/// Does nothing if a global subscriber is already set.
pub fn init(verbosity: u8) {
    let _ = try_init_with_filter(filter_for_verbosity(verbosity));
}

/// Install a fmt subscriber from an explicit filter directive
///
/// Does nothing if a global subscriber is already set.
///
/// # Errors
///
/// Returns error if the directive does not parse
pub fn init_with_filter(filter: &str) -> Result<()> {
    match try_init_with_filter(filter) {
        Err(InitError::Filter(e)) => Err(e),
        Err(InitError::AlreadySet) => {
            tracing::debug!(filter, "subscriber already installed, keeping it");
            Ok(())
        }
        Ok(()) => Ok(()),
    }
}

/// Install a fmt subscriber using the configured filter
///
/// # Errors
///
/// Returns error if the configured directive does not parse
pub fn init_from_config(config: &LogConfig) -> Result<()> {
    init_with_filter(&config.filter)
}

enum InitError {
    Filter(Error),
    AlreadySet,
}

fn try_init_with_filter(filter: &str) -> std::result::Result<(), InitError> {
    let filter = EnvFilter::try_new(filter)
        .map_err(|e| InitError::Filter(Error::Config(format!("invalid log filter: {e}"))))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|_| InitError::AlreadySet)
}
