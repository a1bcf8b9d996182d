//! Queue tasks backed by an async audio activity
//!
//! [`ActivityTask`] adapts any [`Activity`] to the [`Task`] surface: `run`
//! claims the audio device and spawns the activity, `pause`/`resume` go out
//! over the control channel and hand the device back and forth, and
//! `interrupt` stops and aborts the activity.
//! Whichever of natural completion or interruption happens first resolves
//! the caller's result and fires the queue completion; the other is ignored.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::arbiter::AudioArbiter;
use super::control::{ControlHandle, ControlReceiver, control_channel};
use crate::queue::{Completion, CompletionSlot, Task, TaskId};
use crate::{Error, Result};

/// Receiver for an activity's outcome
pub type Outcome<T> = oneshot::Receiver<Result<T>>;

/// Long-running work on the audio device
#[async_trait]
pub trait Activity: Send + Sync + 'static {
    /// Value handed back to the submitter
    type Output: Send + 'static;

    /// Short label for logs
    fn kind(&self) -> &'static str;

    /// Do the work, honouring pause and stop requests on `control`
    ///
    /// # Errors
    ///
    /// Returns the engine's error; it reaches the submitter, never the queue
    async fn perform(&self, control: ControlReceiver) -> Result<Self::Output>;
}

/// Everything needed to end an activity exactly once
struct Finisher<T> {
    id: TaskId,
    result: Arc<Mutex<Option<oneshot::Sender<Result<T>>>>>,
    completion: CompletionSlot,
    arbiter: Option<AudioArbiter>,
}

impl<T> Clone for Finisher<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            result: Arc::clone(&self.result),
            completion: self.completion.clone(),
            arbiter: self.arbiter.clone(),
        }
    }
}

impl<T> Finisher<T> {
    /// Free the device, resolve the result, then signal the queue
    ///
    /// Returns `false` if the activity had already ended.
    fn finish(&self, outcome: Result<T>) -> bool {
        let sender = self
            .result
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        let Some(sender) = sender else {
            return false;
        };

        // A refused claim leaves the device with its holder
        if let Some(arbiter) = &self.arbiter {
            arbiter.release(self.id);
        }

        // Submitter may have stopped caring
        let _ = sender.send(outcome);
        self.completion.fire();
        true
    }
}

/// [`Task`] wrapper around an [`Activity`]
pub struct ActivityTask<A: Activity> {
    id: TaskId,
    activity: Arc<A>,
    control: ControlHandle,
    finisher: Finisher<A::Output>,
    handle: Option<JoinHandle<()>>,
}

impl<A: Activity> ActivityTask<A> {
    /// Wrap an activity; the receiver resolves when the task ends
    #[must_use]
    pub fn from_activity(activity: A) -> (Self, Outcome<A::Output>) {
        let id = TaskId::new();
        let (tx, rx) = oneshot::channel();
        let (control, _) = control_channel();

        let task = Self {
            id,
            activity: Arc::new(activity),
            control,
            finisher: Finisher {
                id,
                result: Arc::new(Mutex::new(Some(tx))),
                completion: CompletionSlot::new(),
                arbiter: None,
            },
            handle: None,
        };
        (task, rx)
    }

    /// Require ownership of the audio device while running
    #[must_use]
    pub fn with_arbiter(mut self, arbiter: AudioArbiter) -> Self {
        self.finisher.arbiter = Some(arbiter);
        self
    }

    /// The wrapped activity
    #[must_use]
    pub fn activity(&self) -> &A {
        &self.activity
    }

    /// Whether the task has ended by either path
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finisher.completion.is_fired()
    }

    fn start(&mut self) -> Result<()> {
        if let Some(arbiter) = &self.finisher.arbiter {
            arbiter.claim(self.id)?;
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::NoRuntime(e.to_string()))?;

        let activity = Arc::clone(&self.activity);
        let control = self.control.receiver();
        let finisher = self.finisher.clone();

        self.handle = Some(runtime.spawn(async move {
            let outcome = activity.perform(control).await;
            if let Err(e) = &outcome {
                tracing::warn!(
                    task = %finisher.id,
                    kind = activity.kind(),
                    error = %e,
                    "activity failed"
                );
            }
            finisher.finish(outcome);
        }));
        Ok(())
    }

    /// End the activity early with `reason`; `false` if it had already ended
    fn stop(&mut self, reason: Error) -> bool {
        self.control.stop();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
        self.finisher.finish(Err(reason))
    }
}

impl<A: Activity> Task for ActivityTask<A> {
    fn id(&self) -> TaskId {
        self.id
    }

    fn kind(&self) -> &'static str {
        self.activity.kind()
    }

    fn subscribe(&mut self, completion: Completion) {
        self.finisher.completion.arm(completion);
    }

    fn run(&mut self) {
        if self.is_finished() || self.handle.is_some() {
            return;
        }

        tracing::debug!(task = %self.id, kind = self.kind(), "activity starting");
        if let Err(e) = self.start() {
            tracing::warn!(
                task = %self.id,
                kind = self.kind(),
                error = %e,
                "activity could not start"
            );
            self.finisher.finish(Err(e));
        }
    }

    fn pause(&mut self) {
        if self.handle.is_none() || !self.control.pause() {
            return;
        }
        // Let the interjection use the device
        if let Some(arbiter) = &self.finisher.arbiter {
            arbiter.release(self.id);
        }
        tracing::debug!(task = %self.id, "activity paused");
    }

    fn resume(&mut self) {
        if self.handle.is_none() || self.is_finished() {
            return;
        }
        if let Some(arbiter) = &self.finisher.arbiter
            && let Err(e) = arbiter.claim(self.id)
        {
            tracing::warn!(task = %self.id, error = %e, "device taken while paused, giving up");
            self.stop(e);
            return;
        }
        if self.control.play() {
            tracing::debug!(task = %self.id, "activity resumed");
        }
    }

    fn interrupt(&mut self) {
        if self.stop(Error::Interrupted) {
            tracing::debug!(task = %self.id, kind = self.kind(), "activity interrupted");
        }
    }
}

impl<A: Activity> std::fmt::Debug for ActivityTask<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityTask")
            .field("id", &self.id)
            .field("kind", &self.activity.kind())
            .field("control", &self.control.current())
            .field("finished", &self.is_finished())
            .finish_non_exhaustive()
    }
}
