//! Play/pause/stop signalling between a task and its engine

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Requested playback state for a running engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackControl {
    /// Keep going
    #[default]
    Play,
    /// Hold position until resumed
    Pause,
    /// Give up as soon as possible
    Stop,
}

/// Create a linked control pair starting in [`PlaybackControl::Play`]
#[must_use]
pub fn control_channel() -> (ControlHandle, ControlReceiver) {
    let (tx, rx) = watch::channel(PlaybackControl::Play);
    (ControlHandle { tx }, ControlReceiver { rx })
}

/// Task side of the control channel
#[derive(Debug)]
pub struct ControlHandle {
    tx: watch::Sender<PlaybackControl>,
}

impl ControlHandle {
    /// Request pause; returns whether the state changed
    pub fn pause(&self) -> bool {
        self.set(PlaybackControl::Pause)
    }

    /// Request play; returns whether the state changed
    pub fn play(&self) -> bool {
        self.set(PlaybackControl::Play)
    }

    /// Request stop; final, later requests are ignored
    pub fn stop(&self) -> bool {
        self.set(PlaybackControl::Stop)
    }

    /// Current requested state
    #[must_use]
    pub fn current(&self) -> PlaybackControl {
        *self.tx.borrow()
    }

    /// Another receiver for an engine
    #[must_use]
    pub fn receiver(&self) -> ControlReceiver {
        ControlReceiver {
            rx: self.tx.subscribe(),
        }
    }

    fn set(&self, next: PlaybackControl) -> bool {
        self.tx.send_if_modified(|state| {
            if *state == next || *state == PlaybackControl::Stop {
                return false;
            }
            *state = next;
            true
        })
    }
}

/// Engine side of the control channel
#[derive(Debug, Clone)]
pub struct ControlReceiver {
    rx: watch::Receiver<PlaybackControl>,
}

impl ControlReceiver {
    /// Current requested state
    #[must_use]
    pub fn current(&self) -> PlaybackControl {
        *self.rx.borrow()
    }

    /// Whether the engine should give up
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.current() == PlaybackControl::Stop
    }

    /// Whether the engine should hold position
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.current() == PlaybackControl::Pause
    }

    /// Wait out a pause
    ///
    /// Returns `true` when the engine may continue, `false` when it should
    /// stop (explicit stop, or the task side went away).
    pub async fn wait_while_paused(&mut self) -> bool {
        match self
            .rx
            .wait_for(|state| *state != PlaybackControl::Pause)
            .await
        {
            Ok(state) => *state == PlaybackControl::Play,
            Err(_) => false,
        }
    }

    /// Wait until stop is requested or the task side goes away
    pub async fn stopped(&mut self) {
        let _ = self
            .rx
            .wait_for(|state| *state == PlaybackControl::Stop)
            .await;
    }
}
