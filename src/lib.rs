//! Beacon Conductor - exclusive-activity scheduling for voice assistants
//!
//! This library decides when voice activities run and when background data
//! gets refreshed:
//! - Priority task queue with enqueue, interject and interrupt disciplines
//! - Speech output and input tasks sharing one audio device
//! - Periodic fetch scheduling with a freshness gate
//!
//! # Architecture
//!
//! ```text
//!   assistant / UI                      data owners
//!        │ Speak, Listen tasks                │ started / completed / failed
//! ┌──────▼───────────────┐        ┌───────────▼──────────┐
//! │      TaskRunner      │        │    FetchScheduler    │
//! │  TaskQueue, events   │        │  FetchGate, triggers │
//! └──────┬───────────────┘        └───────────┬──────────┘
//!        │ run / pause / interrupt            │ FetchTrigger
//! ┌──────▼───────────────┐        ┌───────────▼──────────┐
//! │ Synthesizer          │        │ Fetcher              │
//! │ Recognizer           │        │ (spawn_driver)       │
//! │ AudioArbiter         │        │                      │
//! └──────────────────────┘        └──────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod fetch;
pub mod queue;
pub mod telemetry;
pub mod voice;

pub use config::Config;
pub use error::{Error, Result};
pub use fetch::{FetchScheduler, FetchTrigger, Fetcher, TriggerReason};
pub use queue::{Completion, CompletionSlot, RunnerEvent, Task, TaskId, TaskQueue, TaskRunner};
pub use voice::{AudioArbiter, ListenTask, SpeakTask};
