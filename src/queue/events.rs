//! Runner lifecycle events
//!
//! Published on a broadcast channel. Publishing is best-effort: a missing or
//! lagging subscriber never affects queue operations.

use serde::Serialize;
use tokio::sync::broadcast;

use super::TaskId;

/// Default broadcast capacity for runner events
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Something the runner did to a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunnerEvent {
    /// Task was run for the first time
    Started { task: TaskId, kind: &'static str },
    /// Task was paused to make room for an interjection
    Paused { task: TaskId },
    /// Paused task was resumed
    Resumed { task: TaskId },
    /// Task fired its completion signal
    Finished { task: TaskId },
    /// Task was forcibly interrupted
    Interrupted { task: TaskId },
    /// Task exceeded the configured timeout and was interrupted
    TimedOut { task: TaskId },
    /// Queue drained and went idle
    Idle,
    /// Queue was cleared
    Cleared { dropped: usize },
}

impl RunnerEvent {
    /// Task the event refers to, if any
    #[must_use]
    pub const fn task(&self) -> Option<TaskId> {
        match self {
            Self::Started { task, .. }
            | Self::Paused { task }
            | Self::Resumed { task }
            | Self::Finished { task }
            | Self::Interrupted { task }
            | Self::TimedOut { task } => Some(*task),
            Self::Idle | Self::Cleared { .. } => None,
        }
    }
}

/// Broadcast publisher for runner events
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<RunnerEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventBus {
    /// Create a bus with the given capacity (minimum 1)
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to events published from now on
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RunnerEvent> {
        self.tx.subscribe()
    }

    /// Publish an event, ignoring the absence of subscribers
    pub fn publish(&self, event: RunnerEvent) {
        let _ = self.tx.send(event);
    }
}
