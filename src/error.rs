//! Error types for Beacon conductor

use thiserror::Error;

use crate::queue::TaskId;

/// Result type alias for conductor operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Beacon conductor
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// The runner actor has shut down and no longer accepts work
    #[error("task runner is closed")]
    RunnerClosed,

    /// A timer had to be spawned outside a tokio runtime
    #[error("no tokio runtime available: {0}")]
    NoRuntime(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Audio device is owned by another task
    #[error("audio busy: held by task {holder}")]
    AudioBusy {
        /// Task currently holding the audio device
        holder: TaskId,
    },

    /// Activity was interrupted before it produced output
    #[error("interrupted")]
    Interrupted,

    /// Fetch error reported by a data owner
    #[error("fetch error: {0}")]
    Fetch(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
