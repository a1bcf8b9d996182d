//! Exclusive ownership of the audio device

use std::sync::{Arc, Mutex};

use crate::queue::TaskId;
use crate::{Error, Result};

/// Token deciding which task may use the speaker or microphone
///
/// Clones share the same ownership state. The runner guarantees at most one
/// task is active; the arbiter catches anything outside the runner that
/// grabs the device.
#[derive(Debug, Clone, Default)]
pub struct AudioArbiter {
    holder: Arc<Mutex<Option<TaskId>>>,
}

impl AudioArbiter {
    /// Create a free arbiter
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership for `task`
    ///
    /// Claiming again as the current holder succeeds.
    ///
    /// # Errors
    ///
    /// Returns `AudioBusy` if another task holds the device
    pub fn claim(&self, task: TaskId) -> Result<()> {
        let mut holder = self.holder.lock().unwrap_or_else(|e| e.into_inner());
        match *holder {
            Some(current) if current != task => Err(Error::AudioBusy { holder: current }),
            _ => {
                *holder = Some(task);
                tracing::trace!(task = %task, "audio claimed");
                Ok(())
            }
        }
    }

    /// Give up ownership; ignored unless `task` is the holder
    pub fn release(&self, task: TaskId) {
        let mut holder = self.holder.lock().unwrap_or_else(|e| e.into_inner());
        if *holder == Some(task) {
            *holder = None;
            tracing::trace!(task = %task, "audio released");
        }
    }

    /// Current holder, if any
    #[must_use]
    pub fn holder(&self) -> Option<TaskId> {
        *self.holder.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Whether nobody holds the device
    #[must_use]
    pub fn is_free(&self) -> bool {
        self.holder().is_none()
    }
}
