//! Synchronous queue state machine
//!
//! `TaskQueue` owns the pending tasks and the current one. It never blocks:
//! every operation mutates in-memory state, issues fire-and-forget calls on
//! tasks and returns. Completions arrive through a [`CompletionSender`] and
//! must be fed back with [`TaskQueue::on_completed`] by the single owner of
//! the queue, which keeps mutation and completion handling serialized.
//!
//! ```text
//! enqueue      pending: [A B] + [C]          → [A B C]
//! interject    current: A, pending: [B]      → pause A, pending: [X A B], run X
//! interrupt    current: A, pending: [B]      → interrupt A B, run X
//! ```

use std::collections::{HashSet, VecDeque};

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::events::{EventBus, RunnerEvent};
use super::task::{Completion, CompletionReceiver, CompletionSender, Task, TaskId, TaskState};

/// Queued task plus whether it has been run before
struct Entry {
    task: Box<dyn Task>,
    started: bool,
}

impl Entry {
    fn new(task: Box<dyn Task>) -> Self {
        Self {
            task,
            started: false,
        }
    }

    fn id(&self) -> TaskId {
        self.task.id()
    }

    fn summary(&self, state: TaskState) -> TaskSummary {
        TaskSummary {
            id: self.id(),
            kind: self.task.kind(),
            state,
        }
    }
}

/// Point-in-time view of one queued task
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskSummary {
    /// Task identifier
    pub id: TaskId,
    /// Task kind label
    pub kind: &'static str,
    /// State as seen by the queue
    pub state: TaskState,
}

/// Point-in-time view of the whole queue
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunnerSnapshot {
    /// Task currently running, if any
    pub current: Option<TaskSummary>,
    /// Tasks waiting, in run order
    pub pending: Vec<TaskSummary>,
}

impl RunnerSnapshot {
    /// Ids in execution order, current first
    #[must_use]
    pub fn order(&self) -> Vec<TaskId> {
        self.current
            .iter()
            .chain(self.pending.iter())
            .map(|t| t.id)
            .collect()
    }

    /// Whether nothing is running or waiting
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.current.is_none() && self.pending.is_empty()
    }
}

/// Priority task queue with enqueue / interject / interrupt disciplines
pub struct TaskQueue {
    pending: VecDeque<Entry>,
    current: Option<Entry>,
    /// When the current task last started or resumed
    current_since: Option<Instant>,
    /// Tasks whose completion the queue still honours
    subscriptions: HashSet<TaskId>,
    completions: CompletionSender,
    events: EventBus,
}

impl TaskQueue {
    /// Create a queue reporting completions to `completions`
    #[must_use]
    pub fn new(completions: CompletionSender, events: EventBus) -> Self {
        Self {
            pending: VecDeque::new(),
            current: None,
            current_since: None,
            subscriptions: HashSet::new(),
            completions,
            events,
        }
    }

    /// Create a queue with its own completion channel and a default event bus
    #[must_use]
    pub fn channel() -> (Self, CompletionReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx, EventBus::default()), rx)
    }

    /// Event bus the queue publishes to
    #[must_use]
    pub const fn events(&self) -> &EventBus {
        &self.events
    }

    /// Append one task; runs it immediately if idle
    pub fn enqueue(&mut self, task: Box<dyn Task>) {
        self.enqueue_all(std::iter::once(task));
    }

    /// Append tasks contiguously at the tail, preserving their order
    pub fn enqueue_all(&mut self, tasks: impl IntoIterator<Item = Box<dyn Task>>) {
        for task in tasks {
            let entry = self.subscribe(task);
            tracing::debug!(task = %entry.id(), kind = entry.task.kind(), "enqueued");
            self.pending.push_back(entry);
        }
        self.promote();
    }

    /// Drop everything queued or running, then run `task`
    pub fn interrupt(&mut self, task: Box<dyn Task>) {
        self.interrupt_all(std::iter::once(task));
    }

    /// Drop everything queued or running, then run `tasks` in order
    pub fn interrupt_all(&mut self, tasks: impl IntoIterator<Item = Box<dyn Task>>) {
        let dropped = self.interrupt_everything();
        tracing::debug!(dropped, "interrupting queue");
        self.enqueue_all(tasks);
    }

    /// Pause the current task, run `task`, then resume the paused one
    pub fn interject(&mut self, task: Box<dyn Task>) {
        self.interject_all(std::iter::once(task));
    }

    /// Pause the current task, run `tasks` in order, then resume the paused one
    ///
    /// Behaves like [`TaskQueue::enqueue_all`] when nothing is running.
    pub fn interject_all(&mut self, tasks: impl IntoIterator<Item = Box<dyn Task>>) {
        let Some(mut paused) = self.current.take() else {
            self.enqueue_all(tasks);
            return;
        };

        self.current_since = None;
        paused.task.pause();
        tracing::debug!(task = %paused.id(), "paused for interjection");
        self.events.publish(RunnerEvent::Paused { task: paused.id() });

        let mut front: Vec<Entry> = tasks.into_iter().map(|t| self.subscribe(t)).collect();
        front.push(paused);
        for entry in front.into_iter().rev() {
            self.pending.push_front(entry);
        }

        self.promote();
    }

    /// Interrupt every task and empty the queue
    ///
    /// Returns the number of tasks that were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.interrupt_everything();
        tracing::debug!(dropped, "queue cleared");
        self.events.publish(RunnerEvent::Cleared { dropped });
        dropped
    }

    /// Handle a completion signal
    ///
    /// Signals for tasks the queue no longer tracks (duplicates, late fires
    /// after an interrupt) are ignored. Returns whether the signal was applied.
    pub fn on_completed(&mut self, id: TaskId) -> bool {
        if !self.subscriptions.remove(&id) {
            tracing::debug!(task = %id, "ignoring completion for untracked task");
            return false;
        }

        if self.current.as_ref().is_some_and(|c| c.id() == id) {
            self.current = None;
            self.current_since = None;
            tracing::debug!(task = %id, "current task finished");
        } else if let Some(pos) = self.pending.iter().position(|e| e.id() == id) {
            // Ended while waiting, e.g. a paused task that gave up on its own
            self.pending.remove(pos);
            tracing::debug!(task = %id, "pending task finished before its turn");
        }

        self.events.publish(RunnerEvent::Finished { task: id });
        self.promote();

        if self.is_idle() {
            self.events.publish(RunnerEvent::Idle);
        }
        true
    }

    /// Interrupt the current task after it overran its time budget
    ///
    /// Returns the id of the expired task, if one was running.
    pub fn expire_current(&mut self) -> Option<TaskId> {
        let mut entry = self.current.take()?;
        let id = entry.id();
        self.current_since = None;
        self.subscriptions.remove(&id);

        tracing::warn!(task = %id, kind = entry.task.kind(), "task timed out, interrupting");
        entry.task.interrupt();
        self.events.publish(RunnerEvent::TimedOut { task: id });

        self.promote();
        if self.is_idle() {
            self.events.publish(RunnerEvent::Idle);
        }
        Some(id)
    }

    /// Run or resume the front task if nothing is current
    ///
    /// Idempotent; safe to call after any mutation.
    pub fn promote(&mut self) {
        if self.current.is_some() {
            return;
        }
        let Some(mut entry) = self.pending.pop_front() else {
            return;
        };

        let id = entry.id();
        if entry.started {
            tracing::debug!(task = %id, "resuming");
            entry.task.resume();
            self.events.publish(RunnerEvent::Resumed { task: id });
        } else {
            tracing::debug!(task = %id, kind = entry.task.kind(), "running");
            entry.started = true;
            entry.task.run();
            self.events.publish(RunnerEvent::Started {
                task: id,
                kind: entry.task.kind(),
            });
        }

        self.current = Some(entry);
        self.current_since = Some(Instant::now());
    }

    /// Id of the running task
    #[must_use]
    pub fn current(&self) -> Option<TaskId> {
        self.current.as_ref().map(Entry::id)
    }

    /// Ids of waiting tasks, in run order
    #[must_use]
    pub fn pending(&self) -> Vec<TaskId> {
        self.pending.iter().map(Entry::id).collect()
    }

    /// When the current task last started or resumed
    #[must_use]
    pub const fn current_since(&self) -> Option<Instant> {
        self.current_since
    }

    /// Number of tasks running or waiting
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len() + usize::from(self.current.is_some())
    }

    /// Whether nothing is running or waiting
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.current.is_none() && self.pending.is_empty()
    }

    /// Alias of [`TaskQueue::is_idle`]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.is_idle()
    }

    /// Point-in-time view of the queue
    #[must_use]
    pub fn snapshot(&self) -> RunnerSnapshot {
        RunnerSnapshot {
            current: self.current.as_ref().map(|e| e.summary(TaskState::Running)),
            pending: self
                .pending
                .iter()
                .map(|e| {
                    let state = if e.started {
                        TaskState::Paused
                    } else {
                        TaskState::Pending
                    };
                    e.summary(state)
                })
                .collect(),
        }
    }

    /// Register interest in a task's completion before it can ever run
    fn subscribe(&mut self, mut task: Box<dyn Task>) -> Entry {
        let id = task.id();
        if !self.subscriptions.insert(id) {
            tracing::warn!(task = %id, "task id already queued; ids must be unique");
        }
        task.subscribe(Completion::new(id, self.completions.clone()));
        Entry::new(task)
    }

    /// Interrupt current then pending tasks, forgetting all subscriptions
    fn interrupt_everything(&mut self) -> usize {
        // Forget first so the completions fired by `interrupt` are ignored
        self.subscriptions.clear();
        self.current_since = None;

        let mut dropped = 0;
        for mut entry in self.current.take().into_iter().chain(self.pending.drain(..)) {
            let id = entry.id();
            entry.task.interrupt();
            self.events.publish(RunnerEvent::Interrupted { task: id });
            dropped += 1;
        }
        dropped
    }
}

impl Drop for TaskQueue {
    fn drop(&mut self) {
        if !self.is_idle() {
            tracing::debug!(remaining = self.len(), "queue dropped with work, interrupting");
            self.interrupt_everything();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::queue::CompletionSlot;

    /// Minimal task that records calls into a shared log
    struct Probe {
        id: TaskId,
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        slot: CompletionSlot,
    }

    impl Probe {
        fn boxed(name: &'static str, log: &Arc<Mutex<Vec<String>>>) -> (Box<dyn Task>, TaskId, CompletionSlot) {
            let id = TaskId::new();
            let slot = CompletionSlot::new();
            let probe = Self {
                id,
                name,
                log: Arc::clone(log),
                slot: slot.clone(),
            };
            (Box::new(probe), id, slot)
        }

        fn record(&self, call: &str) {
            self.log.lock().unwrap().push(format!("{}.{call}", self.name));
        }
    }

    impl Task for Probe {
        fn id(&self) -> TaskId {
            self.id
        }

        fn subscribe(&mut self, completion: Completion) {
            self.slot.arm(completion);
        }

        fn run(&mut self) {
            self.record("run");
        }

        fn pause(&mut self) {
            self.record("pause");
        }

        fn resume(&mut self) {
            self.record("resume");
        }

        fn interrupt(&mut self) {
            self.record("interrupt");
            self.slot.fire();
        }
    }

    fn drain(queue: &mut TaskQueue, rx: &mut CompletionReceiver) {
        while let Ok(id) = rx.try_recv() {
            queue.on_completed(id);
        }
    }

    #[test]
    fn first_task_runs_immediately() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (mut queue, _rx) = TaskQueue::channel();
        let (a, a_id, _) = Probe::boxed("a", &log);

        queue.enqueue(a);

        assert_eq!(queue.current(), Some(a_id));
        assert!(queue.pending().is_empty());
        assert_eq!(*log.lock().unwrap(), ["a.run"]);
    }

    #[test]
    fn completion_promotes_next() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (mut queue, mut rx) = TaskQueue::channel();
        let (a, _, a_slot) = Probe::boxed("a", &log);
        let (b, b_id, _) = Probe::boxed("b", &log);

        queue.enqueue_all([a, b]);
        a_slot.fire();
        drain(&mut queue, &mut rx);

        assert_eq!(queue.current(), Some(b_id));
        assert_eq!(*log.lock().unwrap(), ["a.run", "b.run"]);
    }

    #[test]
    fn interject_when_idle_is_enqueue() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (mut queue, _rx) = TaskQueue::channel();
        let (a, a_id, _) = Probe::boxed("a", &log);

        queue.interject(a);

        assert_eq!(queue.current(), Some(a_id));
        assert_eq!(*log.lock().unwrap(), ["a.run"]);
    }

    #[test]
    fn snapshot_marks_paused_tasks() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (mut queue, _rx) = TaskQueue::channel();
        let (a, a_id, _) = Probe::boxed("a", &log);
        let (b, b_id, _) = Probe::boxed("b", &log);
        let (c, c_id, _) = Probe::boxed("c", &log);

        queue.enqueue_all([a, c]);
        queue.interject(b);

        let snapshot = queue.snapshot();
        assert_eq!(snapshot.order(), vec![b_id, a_id, c_id]);
        assert_eq!(snapshot.pending[0].state, TaskState::Paused);
        assert_eq!(snapshot.pending[1].state, TaskState::Pending);
    }

    #[test]
    fn pending_task_ending_early_leaves_queue() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (mut queue, mut rx) = TaskQueue::channel();
        let (a, a_id, _) = Probe::boxed("a", &log);
        let (b, _, b_slot) = Probe::boxed("b", &log);

        queue.enqueue_all([a, b]);
        b_slot.fire();
        drain(&mut queue, &mut rx);

        assert_eq!(queue.current(), Some(a_id));
        assert!(queue.pending().is_empty());
    }

    #[test]
    fn expire_current_moves_on() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (mut queue, mut rx) = TaskQueue::channel();
        let (a, a_id, _) = Probe::boxed("a", &log);
        let (b, b_id, _) = Probe::boxed("b", &log);

        queue.enqueue_all([a, b]);
        assert_eq!(queue.expire_current(), Some(a_id));
        drain(&mut queue, &mut rx);

        assert_eq!(queue.current(), Some(b_id));
        assert_eq!(*log.lock().unwrap(), ["a.run", "a.interrupt", "b.run"]);
    }

    #[test]
    fn dropping_queue_interrupts_work() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (mut queue, _rx) = TaskQueue::channel();
        let (a, _, a_slot) = Probe::boxed("a", &log);
        let (b, _, b_slot) = Probe::boxed("b", &log);

        queue.enqueue_all([a, b]);
        drop(queue);

        assert!(a_slot.is_fired());
        assert!(b_slot.is_fired());
    }
}
