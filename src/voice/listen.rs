//! Speech input tasks

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::activity::{Activity, ActivityTask, Outcome};
use super::control::ControlReceiver;
use crate::{Error, Result};

/// How to listen
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenOptions {
    /// BCP 47 language hint; `None` lets the engine detect
    #[serde(default)]
    pub language: Option<String>,
    /// Give up after this long without a result
    #[serde(default)]
    pub timeout: Option<Duration>,
}

impl ListenOptions {
    /// Set a language hint
    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Set a timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Recognized speech
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    /// Recognized text
    pub text: String,
    /// Engine confidence in `0.0..=1.0`, if reported
    pub confidence: Option<f32>,
}

impl Transcript {
    /// Transcript without a confidence score
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            confidence: None,
        }
    }

    /// Whether nothing was heard
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Speech recognition engine
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Listen once and return what was heard
    ///
    /// # Errors
    ///
    /// Returns error if capture or recognition fails
    async fn listen(&self, options: &ListenOptions, control: ControlReceiver) -> Result<Transcript>;
}

/// One listening session on one recognizer
pub struct Listen {
    recognizer: Arc<dyn Recognizer>,
    options: ListenOptions,
}

impl Listen {
    /// Session options
    #[must_use]
    pub const fn options(&self) -> &ListenOptions {
        &self.options
    }
}

#[async_trait]
impl Activity for Listen {
    type Output = Transcript;

    fn kind(&self) -> &'static str {
        "listen"
    }

    async fn perform(&self, control: ControlReceiver) -> Result<Transcript> {
        tracing::debug!(language = ?self.options.language, timeout = ?self.options.timeout, "listening");

        let listening = self.recognizer.listen(&self.options, control);
        let transcript = match self.options.timeout {
            Some(timeout) => tokio::time::timeout(timeout, listening)
                .await
                .map_err(|_| Error::Stt(format!("no speech within {timeout:?}")))??,
            None => listening.await?,
        };

        tracing::debug!(chars = transcript.text.len(), "heard");
        Ok(transcript)
    }
}

/// Queue task listening once
pub type ListenTask = ActivityTask<Listen>;

impl ActivityTask<Listen> {
    /// Build a listening task and the receiver for its transcript
    #[must_use]
    pub fn new(recognizer: Arc<dyn Recognizer>, options: ListenOptions) -> (Self, Outcome<Transcript>) {
        Self::from_activity(Listen {
            recognizer,
            options,
        })
    }
}
