//! Speech output tasks

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::activity::{Activity, ActivityTask, Outcome};
use super::control::ControlReceiver;
use crate::{Error, Result};

/// Default synthesis voice
pub const DEFAULT_VOICE: &str = "alloy";

/// Default speaking rate
pub const DEFAULT_SPEED: f32 = 1.0;

/// Text to be spoken
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Utterance {
    /// Text to speak
    pub text: String,
    /// Engine voice name
    #[serde(default = "default_voice")]
    pub voice: String,
    /// Speaking rate; 1.0 is normal
    #[serde(default = "default_speed")]
    pub speed: f32,
}

fn default_voice() -> String {
    DEFAULT_VOICE.to_string()
}

const fn default_speed() -> f32 {
    DEFAULT_SPEED
}

impl Utterance {
    /// Utterance with default voice and speed
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            voice: default_voice(),
            speed: DEFAULT_SPEED,
        }
    }

    /// Override the voice
    #[must_use]
    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = voice.into();
        self
    }

    /// Override the speaking rate
    #[must_use]
    pub const fn with_speed(mut self, speed: f32) -> Self {
        self.speed = speed;
        self
    }
}

/// Speech synthesis engine
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Speak `utterance` to the end, or until `control` says stop
    ///
    /// # Errors
    ///
    /// Returns error if synthesis or playback fails
    async fn speak(&self, utterance: &Utterance, control: ControlReceiver) -> Result<()>;
}

/// One utterance on one synthesizer
pub struct Speak {
    synth: Arc<dyn Synthesizer>,
    utterance: Utterance,
}

impl Speak {
    /// What will be spoken
    #[must_use]
    pub const fn utterance(&self) -> &Utterance {
        &self.utterance
    }
}

#[async_trait]
impl Activity for Speak {
    type Output = ();

    fn kind(&self) -> &'static str {
        "speak"
    }

    async fn perform(&self, control: ControlReceiver) -> Result<()> {
        if self.utterance.text.trim().is_empty() {
            return Err(Error::Tts("nothing to speak".to_string()));
        }

        tracing::debug!(
            voice = %self.utterance.voice,
            speed = self.utterance.speed,
            chars = self.utterance.text.len(),
            "speaking"
        );
        self.synth.speak(&self.utterance, control).await
    }
}

/// Queue task speaking one utterance
pub type SpeakTask = ActivityTask<Speak>;

impl ActivityTask<Speak> {
    /// Build a speech task and the receiver for its outcome
    #[must_use]
    pub fn new(synth: Arc<dyn Synthesizer>, utterance: Utterance) -> (Self, Outcome<()>) {
        Self::from_activity(Speak { synth, utterance })
    }
}
