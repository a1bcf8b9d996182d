//! Configuration file loading
//!
//! Supports `~/.config/omni/conductor/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.
//! A `.json` file with the same schema is accepted when loaded explicitly.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::Result;

/// Top-level configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct ConductorConfigFile {
    /// Task queue configuration
    #[serde(default)]
    pub queue: QueueFileConfig,

    /// Automated fetch configuration
    #[serde(default)]
    pub fetch: FetchFileConfig,

    /// Logging configuration
    #[serde(default)]
    pub log: LogFileConfig,
}

/// Task queue configuration
#[derive(Debug, Default, Deserialize)]
pub struct QueueFileConfig {
    /// Interrupt a task that stays current longer than this many seconds
    pub task_timeout_secs: Option<u64>,

    /// Broadcast capacity for runner events
    pub event_capacity: Option<usize>,
}

/// Automated fetch configuration
#[derive(Debug, Default, Deserialize)]
pub struct FetchFileConfig {
    /// Start with automatic triggering on
    pub enabled: Option<bool>,

    /// Minimum seconds between fetch attempts
    pub interval_secs: Option<u64>,

    /// Broadcast capacity for trigger signals
    pub trigger_capacity: Option<usize>,
}

/// Logging configuration
#[derive(Debug, Default, Deserialize)]
pub struct LogFileConfig {
    /// `tracing` filter directive (e.g. "info,beacon_conductor=debug")
    pub filter: Option<String>,
}

impl ConductorConfigFile {
    /// Parse a TOML document
    ///
    /// # Errors
    ///
    /// Returns error if the document is not valid TOML for this schema
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Parse a JSON document
    ///
    /// # Errors
    ///
    /// Returns error if the document is not valid JSON for this schema
    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Read and parse a file, choosing the format by extension
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        if is_json {
            Self::from_json_str(&content)
        } else {
            Self::from_toml_str(&content)
        }
    }
}

/// Load the config file from the standard path
///
/// Returns `ConductorConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> ConductorConfigFile {
    let Some(path) = config_file_path() else {
        return ConductorConfigFile::default();
    };

    if !path.exists() {
        return ConductorConfigFile::default();
    }

    match ConductorConfigFile::from_path(&path) {
        Ok(config) => {
            tracing::info!(path = %path.display(), "loaded config file");
            config
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to load config file, using defaults"
            );
            ConductorConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/omni/conductor/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| {
        d.config_dir()
            .join("omni")
            .join("conductor")
            .join("config.toml")
    })
}
