//! Task capability and its single-fire completion signal

use std::fmt;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Sender half used to deliver completions back to the queue
pub type CompletionSender = mpsc::UnboundedSender<TaskId>;

/// Receiver half drained by whoever owns the queue
pub type CompletionReceiver = mpsc::UnboundedReceiver<TaskId>;

/// Unique, stable task identifier
///
/// Generated once per task and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Generate a fresh identifier
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Underlying UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let simple = self.0.simple().to_string();
        f.write_str(&simple[..8])
    }
}

/// Lifecycle state of a task as seen by the runner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Waiting in the queue, never started
    Pending,
    /// Currently running
    Running,
    /// Started, then paused by an interjection
    Paused,
    /// Ended on its own
    Finished,
    /// Ended by a forced interrupt
    Interrupted,
}

impl TaskState {
    /// Whether the state is terminal
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Interrupted)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
            Self::Finished => write!(f, "finished"),
            Self::Interrupted => write!(f, "interrupted"),
        }
    }
}

/// Single-fire completion signal handed to a task when it is enqueued
///
/// `fire` consumes the handle, so one handle can only signal once. An unfired
/// handle signals on drop, which keeps the queue moving when a task is
/// discarded without reporting.
#[derive(Debug)]
pub struct Completion {
    id: TaskId,
    tx: Option<CompletionSender>,
}

impl Completion {
    /// Create a completion that reports to the given queue channel
    #[must_use]
    pub const fn new(id: TaskId, tx: CompletionSender) -> Self {
        Self { id, tx: Some(tx) }
    }

    /// Create a completion with no listener
    ///
    /// Useful for driving a task outside a runner.
    #[must_use]
    pub const fn detached(id: TaskId) -> Self {
        Self { id, tx: None }
    }

    /// Task this completion belongs to
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Whether a live queue is still listening
    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.tx.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    /// Signal that the task has fully ended
    pub fn fire(mut self) {
        self.send();
    }

    /// Drop without signalling
    fn disarm(mut self) {
        self.tx = None;
    }

    fn send(&mut self) {
        if let Some(tx) = self.tx.take() {
            // Queue gone means nobody is waiting; nothing to report
            let _ = tx.send(self.id);
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if self.tx.is_some() {
            tracing::debug!(task = %self.id, "completion dropped unfired, signalling");
            self.send();
        }
    }
}

/// Holder for a task's [`Completion`] that tolerates racing end paths
///
/// Natural completion and forced interruption often run on different
/// threads; whichever calls [`CompletionSlot::fire`] first wins and every
/// later call is a no-op.
#[derive(Debug, Clone, Default)]
pub struct CompletionSlot {
    inner: Arc<Mutex<SlotState>>,
}

#[derive(Debug, Default)]
enum SlotState {
    #[default]
    Empty,
    Armed(Completion),
    Fired,
}

impl CompletionSlot {
    /// Create an empty slot
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the completion handed over by the runner
    ///
    /// If the task already ended, the completion fires immediately.
    pub fn arm(&self, completion: Completion) {
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match std::mem::take(&mut *state) {
            SlotState::Empty => *state = SlotState::Armed(completion),
            SlotState::Fired => {
                *state = SlotState::Fired;
                completion.fire();
            }
            SlotState::Armed(existing) => {
                tracing::warn!(
                    task = %existing.id(),
                    "completion already armed, ignoring second subscription"
                );
                *state = SlotState::Armed(existing);
                completion.disarm();
            }
        }
    }

    /// Fire the stored completion; returns `true` only for the first call
    pub fn fire(&self) -> bool {
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match std::mem::replace(&mut *state, SlotState::Fired) {
            SlotState::Armed(completion) => {
                completion.fire();
                true
            }
            SlotState::Empty => true,
            SlotState::Fired => false,
        }
    }

    /// Whether the task has already signalled its end
    #[must_use]
    pub fn is_fired(&self) -> bool {
        matches!(
            *self.inner.lock().unwrap_or_else(|e| e.into_inner()),
            SlotState::Fired
        )
    }
}

/// A single-use unit of exclusive work
///
/// Every method is fire-and-forget: implementations must return promptly and
/// report the end of their work through the [`Completion`] received in
/// [`Task::subscribe`]. A task must always eventually fire its completion
/// (or be interrupted), otherwise the queue stalls unless a task timeout is
/// configured.
pub trait Task: Send {
    /// Stable identifier
    fn id(&self) -> TaskId;

    /// Short label for logs
    fn kind(&self) -> &'static str {
        "task"
    }

    /// Receive the completion signal; called once, before `run`
    fn subscribe(&mut self, completion: Completion);

    /// Begin work from a fresh state
    fn run(&mut self);

    /// Suspend in place; must be a no-op if already paused
    fn pause(&mut self);

    /// Undo a pause
    fn resume(&mut self);

    /// Terminate immediately, firing the completion if not yet fired
    fn interrupt(&mut self);
}

impl fmt::Debug for dyn Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .finish()
    }
}
