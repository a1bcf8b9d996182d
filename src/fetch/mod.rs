//! Automated periodic fetching
//!
//! [`FetchScheduler`] decides when data is worth refreshing; the owner does
//! the actual fetch, either by hand through the lifecycle hooks or with
//! [`spawn_driver`] and a [`Fetcher`].

mod driver;
mod gate;
mod scheduler;

pub use driver::{Fetcher, refresh, spawn_driver};
pub use gate::FetchGate;
pub use scheduler::{FetchScheduler, FetchStatus, FetchTrigger, TriggerReason};
