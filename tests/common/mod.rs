//! Shared test utilities
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use beacon_conductor::queue::{Completion, CompletionSlot, Task, TaskId};
use beacon_conductor::voice::{ControlReceiver, ListenOptions, Recognizer, Synthesizer, Transcript, Utterance};
use beacon_conductor::{Error, Result};

/// Ordered record of task calls, e.g. `"A.run"`
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: String) {
        self.0.lock().unwrap().push(entry);
    }

    /// Every recorded call so far
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    /// Recorded calls matching `suffix`, e.g. `".run"`
    #[must_use]
    pub fn only(&self, suffix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.ends_with(suffix))
            .collect()
    }

    /// Number of times `entry` was recorded
    #[must_use]
    pub fn count(&self, entry: &str) -> usize {
        self.calls().iter().filter(|c| *c == entry).count()
    }

    pub fn reset(&self) {
        self.0.lock().unwrap().clear();
    }
}

/// Task that records every call and finishes only when told to
pub struct MockTask {
    id: TaskId,
    name: &'static str,
    log: CallLog,
    slot: CompletionSlot,
    /// Fire the completion from inside `run`
    instant: bool,
}

/// Test-side handle to a [`MockTask`] owned by the queue
#[derive(Debug, Clone)]
pub struct MockHandle {
    pub id: TaskId,
    pub name: &'static str,
    slot: CompletionSlot,
}

impl MockHandle {
    /// Fire the task's completion; `false` if it already ended
    pub fn finish(&self) -> bool {
        self.slot.fire()
    }

    /// Whether the completion has fired
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.slot.is_fired()
    }
}

impl MockTask {
    /// Task that runs until [`MockHandle::finish`] or an interrupt
    #[must_use]
    pub fn new(name: &'static str, log: &CallLog) -> (Box<dyn Task>, MockHandle) {
        Self::build(name, log, false)
    }

    /// Task that completes synchronously inside `run`
    #[must_use]
    pub fn instant(name: &'static str, log: &CallLog) -> (Box<dyn Task>, MockHandle) {
        Self::build(name, log, true)
    }

    fn build(name: &'static str, log: &CallLog, instant: bool) -> (Box<dyn Task>, MockHandle) {
        let id = TaskId::new();
        let slot = CompletionSlot::new();
        let task = Self {
            id,
            name,
            log: log.clone(),
            slot: slot.clone(),
            instant,
        };
        (Box::new(task), MockHandle { id, name, slot })
    }

    fn record(&self, call: &str) {
        self.log.push(format!("{}.{call}", self.name));
    }
}

impl Task for MockTask {
    fn id(&self) -> TaskId {
        self.id
    }

    fn kind(&self) -> &'static str {
        "mock"
    }

    fn subscribe(&mut self, completion: Completion) {
        self.slot.arm(completion);
    }

    fn run(&mut self) {
        self.record("run");
        if self.instant {
            self.slot.fire();
        }
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

/// Synthesizer that "speaks" for a fixed time, honouring pause and stop
pub struct FakeSynth {
    pub log: CallLog,
    pub duration: std::time::Duration,
}

#[async_trait]
impl Synthesizer for FakeSynth {
    async fn speak(&self, utterance: &Utterance, mut control: ControlReceiver) -> Result<()> {
        self.log.push(format!("speak:{}", utterance.text));
        let step = self.duration / 10;
        for _ in 0..10 {
            if !control.wait_while_paused().await {
                self.log.push(format!("stopped:{}", utterance.text));
                return Ok(());
            }
            tokio::time::sleep(step).await;
        }
        self.log.push(format!("spoke:{}", utterance.text));
        Ok(())
    }
}

/// Recognizer returning a canned transcript after a delay
pub struct FakeRecognizer {
    pub heard: Option<String>,
    pub delay: std::time::Duration,
}

#[async_trait]
impl Recognizer for FakeRecognizer {
    async fn listen(&self, _options: &ListenOptions, mut control: ControlReceiver) -> Result<Transcript> {
        tokio::select! {
            () = tokio::time::sleep(self.delay) => {}
            () = control.stopped() => return Err(Error::Interrupted),
        }
        self.heard
            .as_ref()
            .map(Transcript::new)
            .ok_or_else(|| Error::Stt("no speech detected".to_string()))
    }
}
