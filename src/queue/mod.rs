//! Priority task queue for mutually exclusive activities
//!
//! At most one task runs at a time. Work is submitted with one of three
//! disciplines:
//! - **enqueue**: strict FIFO
//! - **interject**: pause the current task, run the new work, then resume
//! - **interrupt**: drop everything and run the new work now
//!
//! [`TaskQueue`] is the synchronous state machine; [`TaskRunner`] runs one in
//! a tokio actor so callers on any thread are serialized.

mod events;
mod runner;
mod state;
mod task;

pub use events::{DEFAULT_EVENT_CAPACITY, EventBus, RunnerEvent};
pub use runner::TaskRunner;
pub use state::{RunnerSnapshot, TaskQueue, TaskSummary};
pub use task::{
    Completion, CompletionReceiver, CompletionSender, CompletionSlot, Task, TaskId, TaskState,
};
