//! Task runner actor
//!
//! Wraps a [`TaskQueue`] in a single tokio task. Every mutation arrives as a
//! command on one channel and every completion on another; the actor applies
//! them one at a time, so callers on any thread see a serialized queue.
//!
//! ```text
//! TaskRunner (clone) ──commands──┐
//!                                ├─► RunnerActor ─► TaskQueue ─► Task::run / pause / resume / interrupt
//! Completion::fire ───task ids───┘        │
//!                                         └─► EventBus (RunnerEvent)
//! ```

use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;

use super::events::{EventBus, RunnerEvent};
use super::state::{RunnerSnapshot, TaskQueue};
use super::task::{CompletionReceiver, Task};
use crate::config::QueueConfig;
use crate::{Error, Result};

/// Batch of tasks travelling to the actor
type Batch = Vec<Box<dyn Task>>;

enum Command {
    Enqueue(Batch),
    Interrupt(Batch),
    Interject(Batch),
    Clear,
    Snapshot(oneshot::Sender<RunnerSnapshot>),
    Shutdown(oneshot::Sender<()>),
}

/// Handle to a running task queue
///
/// Cheap to clone. All submission methods are synchronous and never block;
/// they fail only once the actor has shut down.
#[derive(Debug, Clone)]
pub struct TaskRunner {
    commands: mpsc::UnboundedSender<Command>,
    events: EventBus,
}

impl TaskRunner {
    /// Spawn the runner actor on the current tokio runtime
    ///
    /// # Errors
    ///
    /// Returns error if called outside a tokio runtime
    pub fn spawn(config: &QueueConfig) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::NoRuntime(e.to_string()))?;

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let events = EventBus::new(config.event_capacity);

        let actor = RunnerActor {
            queue: TaskQueue::new(completions_tx, events.clone()),
            commands: commands_rx,
            completions: completions_rx,
            task_timeout: config.task_timeout,
        };
        drop(runtime.spawn(actor.run()));

        tracing::debug!(task_timeout = ?config.task_timeout, "task runner started");

        Ok(Self {
            commands: commands_tx,
            events,
        })
    }

    /// Append a task; runs it immediately if idle
    ///
    /// # Errors
    ///
    /// Returns error if the runner has shut down
    pub fn enqueue(&self, task: Box<dyn Task>) -> Result<()> {
        self.enqueue_all(vec![task])
    }

    /// Append tasks contiguously at the tail, preserving order
    ///
    /// # Errors
    ///
    /// Returns error if the runner has shut down
    pub fn enqueue_all(&self, tasks: Vec<Box<dyn Task>>) -> Result<()> {
        self.send(Command::Enqueue(tasks))
    }

    /// Interrupt everything queued or running, then run `task`
    ///
    /// # Errors
    ///
    /// Returns error if the runner has shut down
    pub fn interrupt(&self, task: Box<dyn Task>) -> Result<()> {
        self.interrupt_all(vec![task])
    }

    /// Interrupt everything queued or running, then run `tasks` in order
    ///
    /// # Errors
    ///
    /// Returns error if the runner has shut down
    pub fn interrupt_all(&self, tasks: Vec<Box<dyn Task>>) -> Result<()> {
        self.send(Command::Interrupt(tasks))
    }

    /// Pause the current task, run `task`, then resume the paused one
    ///
    /// # Errors
    ///
    /// Returns error if the runner has shut down
    pub fn interject(&self, task: Box<dyn Task>) -> Result<()> {
        self.interject_all(vec![task])
    }

    /// Pause the current task, run `tasks` in order, then resume the paused one
    ///
    /// # Errors
    ///
    /// Returns error if the runner has shut down
    pub fn interject_all(&self, tasks: Vec<Box<dyn Task>>) -> Result<()> {
        self.send(Command::Interject(tasks))
    }

    /// Interrupt every task and empty the queue
    ///
    /// # Errors
    ///
    /// Returns error if the runner has shut down
    pub fn clear(&self) -> Result<()> {
        self.send(Command::Clear)
    }

    /// Current and pending tasks, as seen after all earlier commands
    ///
    /// # Errors
    ///
    /// Returns error if the runner has shut down
    pub async fn snapshot(&self) -> Result<RunnerSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Snapshot(tx))?;
        rx.await.map_err(|_| Error::RunnerClosed)
    }

    /// Subscribe to runner lifecycle events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RunnerEvent> {
        self.events.subscribe()
    }

    /// Interrupt everything and stop the actor
    ///
    /// # Errors
    ///
    /// Returns error if the runner had already shut down
    pub async fn shutdown(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Shutdown(tx))?;
        rx.await.map_err(|_| Error::RunnerClosed)
    }

    /// Whether the actor has stopped
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| Error::RunnerClosed)
    }
}

/// Owner of the queue; the only place it is mutated
struct RunnerActor {
    queue: TaskQueue,
    commands: mpsc::UnboundedReceiver<Command>,
    completions: CompletionReceiver,
    task_timeout: Option<Duration>,
}

impl RunnerActor {
    async fn run(mut self) {
        loop {
            let deadline = self.deadline();

            tokio::select! {
                biased;

                Some(id) = self.completions.recv() => {
                    self.queue.on_completed(id);
                }
                command = self.commands.recv() => {
                    let Some(command) = command else {
                        tracing::debug!("all runner handles dropped");
                        self.queue.clear();
                        break;
                    };
                    if !self.handle(command) {
                        break;
                    }
                }
                () = sleep_until(deadline) => {
                    self.queue.expire_current();
                }
            }
        }

        tracing::debug!("task runner stopped");
    }

    /// Apply one command; returns `false` once the actor should stop
    fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Enqueue(tasks) => self.queue.enqueue_all(tasks),
            Command::Interrupt(tasks) => self.queue.interrupt_all(tasks),
            Command::Interject(tasks) => self.queue.interject_all(tasks),
            Command::Clear => {
                self.queue.clear();
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.queue.snapshot());
            }
            Command::Shutdown(ack) => {
                self.queue.clear();
                let _ = ack.send(());
                return false;
            }
        }
        true
    }

    /// When the current task's time budget runs out
    ///
    /// A budget too large to represent as an instant means no deadline.
    fn deadline(&self) -> Option<Instant> {
        let timeout = self.task_timeout?;
        self.queue.current_since()?.checked_add(timeout)
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
