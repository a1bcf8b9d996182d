//! Configuration management for Beacon conductor
//!
//! Defaults are overlaid by the optional config file. The core reads no
//! environment variables; embedding applications pass a [`Config`] in.

pub mod file;

use std::path::Path;
use std::time::Duration;

use crate::Result;
use crate::queue::DEFAULT_EVENT_CAPACITY;

pub use file::{ConductorConfigFile, config_file_path, load_config_file};

/// Default minimum time between automated fetches (5 minutes)
pub const DEFAULT_FETCH_INTERVAL: Duration = Duration::from_secs(300);

/// Default broadcast capacity for fetch triggers
pub const DEFAULT_TRIGGER_CAPACITY: usize = 16;

/// Default log filter
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Beacon conductor configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    /// Task queue configuration
    pub queue: QueueConfig,

    /// Automated fetch configuration
    pub fetch: FetchConfig,

    /// Logging configuration
    pub log: LogConfig,
}

/// Task queue configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// Interrupt a task that stays current longer than this; `None` trusts
    /// every task to finish on its own
    pub task_timeout: Option<Duration>,

    /// Broadcast capacity for runner events
    pub event_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            task_timeout: None,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// Automated fetch configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchConfig {
    /// Start with automatic triggering on
    pub enabled: bool,

    /// Minimum time between fetch attempts
    pub interval: Duration,

    /// Broadcast capacity for trigger signals
    pub trigger_capacity: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: DEFAULT_FETCH_INTERVAL,
            trigger_capacity: DEFAULT_TRIGGER_CAPACITY,
        }
    }
}

impl FetchConfig {
    /// Config with the given interval and other fields defaulted
    #[must_use]
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            ..Self::default()
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// `tracing` filter directive
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl Config {
    /// Defaults overlaid with the standard config file, if present
    #[must_use]
    pub fn load() -> Self {
        let mut config = Self::default();
        config.apply(load_config_file());
        config
    }

    /// Defaults overlaid with a specific file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn from_path(path: &Path) -> Result<Self> {
        let mut config = Self::default();
        config.apply(ConductorConfigFile::from_path(path)?);
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Merge a file overlay; unset fields keep their current value
    pub fn apply(&mut self, file: ConductorConfigFile) {
        if let Some(secs) = file.queue.task_timeout_secs {
            // Zero disables the watchdog
            self.queue.task_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(capacity) = file.queue.event_capacity {
            self.queue.event_capacity = capacity.max(1);
        }

        if let Some(enabled) = file.fetch.enabled {
            self.fetch.enabled = enabled;
        }
        if let Some(secs) = file.fetch.interval_secs {
            self.fetch.interval = Duration::from_secs(secs);
        }
        if let Some(capacity) = file.fetch.trigger_capacity {
            self.fetch.trigger_capacity = capacity.max(1);
        }

        if let Some(filter) = file.log.filter {
            self.log.filter = filter;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tokio_test::{assert_err, assert_ok};

    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.queue.task_timeout, None);
        assert_eq!(config.queue.event_capacity, DEFAULT_EVENT_CAPACITY);
        assert!(config.fetch.enabled);
        assert_eq!(config.fetch.interval, DEFAULT_FETCH_INTERVAL);
        assert_eq!(config.log.filter, "info");
    }

    #[test]
    fn overlay_keeps_unset_fields() {
        let mut config = Config::default();
        let file = ConductorConfigFile::from_toml_str(
            r"
            [queue]
            task_timeout_secs = 45

            [fetch]
            enabled = false
            ",
        )
        .unwrap();

        config.apply(file);

        assert_eq!(config.queue.task_timeout, Some(Duration::from_secs(45)));
        assert!(!config.fetch.enabled);
        assert_eq!(config.fetch.interval, DEFAULT_FETCH_INTERVAL);
    }

    #[test]
    fn zero_timeout_disables_watchdog() {
        let mut config = Config::default();
        config.queue.task_timeout = Some(Duration::from_secs(5));

        config.apply(ConductorConfigFile::from_toml_str("[queue]\ntask_timeout_secs = 0").unwrap());

        assert_eq!(config.queue.task_timeout, None);
    }

    #[test]
    fn from_path_reads_toml_and_json() {
        let dir = tempfile::tempdir().unwrap();

        let toml_path = dir.path().join("config.toml");
        let mut f = std::fs::File::create(&toml_path).unwrap();
        writeln!(f, "[fetch]\ninterval_secs = 90").unwrap();

        let json_path = dir.path().join("config.json");
        std::fs::write(&json_path, r#"{"log": {"filter": "trace"}}"#).unwrap();

        let from_toml = assert_ok!(Config::from_path(&toml_path));
        assert_eq!(from_toml.fetch.interval, Duration::from_secs(90));

        let from_json = assert_ok!(Config::from_path(&json_path));
        assert_eq!(from_json.log.filter, "trace");
    }

    #[test]
    fn from_path_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert_err!(Config::from_path(&dir.path().join("absent.toml")));
    }

    #[test]
    fn fetch_config_with_interval() {
        let config = FetchConfig::with_interval(Duration::from_secs(60));
        assert_eq!(config.interval, Duration::from_secs(60));
        assert!(config.enabled);
    }
}
