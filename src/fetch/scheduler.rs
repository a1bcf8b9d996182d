//! Automated fetch scheduler
//!
//! Decides when an owner should refresh externally sourced data. The
//! scheduler never fetches anything itself: it keeps the freshness gate,
//! holds the latest value for consumers, and emits [`FetchTrigger`]s on a
//! timer, when automatic fetching is switched on, and when a consumer
//! attaches.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::gate::FetchGate;
use crate::config::{DEFAULT_TRIGGER_CAPACITY, FetchConfig};
use crate::{Error, Result};

/// Shortest timer period, whatever the configured interval
const MIN_TIMER_PERIOD: Duration = Duration::from_secs(1);

/// Why a trigger was emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerReason {
    /// Periodic timer tick
    Timer,
    /// Automatic fetching was switched on with consumers attached
    Enabled,
    /// A consumer subscribed to the data
    ConsumerAttached,
    /// Explicit request from the owner
    Manual,
}

/// "Now would be a good time to fetch"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FetchTrigger {
    /// Why the trigger fired
    pub reason: TriggerReason,
    /// Skip the interval check (in-flight attempts still win)
    pub force: bool,
}

/// Serializable view of a scheduler
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchStatus {
    /// Automatic triggering on
    pub enabled: bool,
    /// Minimum seconds between attempts
    pub interval_secs: u64,
    /// Attempt outstanding
    pub in_flight: bool,
    /// Regular fetch allowed right now
    pub due: bool,
    /// Seconds until the interval elapses
    pub due_in_secs: u64,
    /// Wall-clock time of the last success
    pub last_fetch_at: Option<DateTime<Utc>>,
    /// Successful attempts so far
    pub completed: u64,
    /// Failed attempts so far
    pub failed: u64,
    /// Attached data consumers
    pub consumers: usize,
}

struct Shared<T> {
    gate: Mutex<FetchGate>,
    enabled: Mutex<bool>,
    subject: watch::Sender<Option<T>>,
    triggers: broadcast::Sender<FetchTrigger>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.get_mut().unwrap_or_else(|e| e.into_inner()).take() {
            timer.abort();
        }
    }
}

/// Gate and trigger source for one periodically refreshed value
///
/// Cheap to clone; clones share state. State is guarded by mutexes, so the
/// lifecycle hooks may be called from any thread.
pub struct FetchScheduler<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for FetchScheduler<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Non-owning handle; lets a driver loop end once every scheduler is gone
pub(super) struct WeakScheduler<T>(Weak<Shared<T>>);

impl<T> WeakScheduler<T> {
    pub(super) fn upgrade(&self) -> Option<FetchScheduler<T>> {
        self.0.upgrade().map(|shared| FetchScheduler { shared })
    }
}

impl<T> std::fmt::Debug for FetchScheduler<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let gate = self.gate();
        f.debug_struct("FetchScheduler")
            .field("enabled", &self.is_enabled())
            .field("interval", &gate.interval())
            .field("in_flight", &gate.in_flight())
            .finish_non_exhaustive()
    }
}

impl<T> FetchScheduler<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a scheduler; starts the timer if `config.enabled`
    ///
    /// # Errors
    ///
    /// Returns error if the timer must start outside a tokio runtime
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let scheduler = Self::build(config.interval, config.trigger_capacity);
        if config.enabled {
            scheduler.set_enabled(true)?;
        }
        Ok(scheduler)
    }

    /// Create a disabled scheduler with the given interval
    ///
    /// Never needs a runtime; call [`FetchScheduler::set_enabled`] later.
    #[must_use]
    pub fn disabled(interval: Duration) -> Self {
        Self::build(interval, DEFAULT_TRIGGER_CAPACITY)
    }

    fn build(interval: Duration, trigger_capacity: usize) -> Self {
        let (subject, _) = watch::channel(None);
        let (triggers, _) = broadcast::channel(trigger_capacity.max(1));

        Self {
            shared: Arc::new(Shared {
                gate: Mutex::new(FetchGate::new(interval)),
                enabled: Mutex::new(false),
                subject,
                triggers,
                timer: Mutex::new(None),
            }),
        }
    }

    // -- Lifecycle hooks --

    /// The owner began a fetch attempt
    pub fn started(&self) {
        let mut gate = self.gate();
        if gate.in_flight() {
            tracing::debug!("fetch started while another attempt is in flight");
        }
        gate.started();
    }

    /// The in-flight attempt succeeded
    pub fn completed(&self) {
        if self.gate().completed(Instant::now()) {
            tracing::debug!("fetch completed");
        } else {
            tracing::debug!("fetch completed with nothing in flight, ignoring");
        }
    }

    /// The in-flight attempt failed; the last success still counts
    pub fn failed(&self) {
        if self.gate().failed() {
            tracing::debug!("fetch failed, retry allowed once interval elapses");
        } else {
            tracing::debug!("fetch failed with nothing in flight, ignoring");
        }
    }

    /// Atomically check [`FetchScheduler::may_fetch`] and mark started
    ///
    /// Returns whether the caller now owns the attempt.
    pub fn try_start(&self, force: bool) -> bool {
        let mut gate = self.gate();
        if gate.may_fetch(Instant::now(), force) {
            gate.started();
            true
        } else {
            false
        }
    }

    // -- Queries --

    /// Not in flight and the interval has elapsed since the last success
    #[must_use]
    pub fn should_fetch(&self) -> bool {
        self.gate().is_due(Instant::now())
    }

    /// Like [`FetchScheduler::should_fetch`]; `force` skips the interval
    #[must_use]
    pub fn may_fetch(&self, force: bool) -> bool {
        self.gate().may_fetch(Instant::now(), force)
    }

    /// Whether an attempt is outstanding
    #[must_use]
    pub fn in_flight(&self) -> bool {
        self.gate().in_flight()
    }

    /// Snapshot for reporting
    #[must_use]
    pub fn status(&self) -> FetchStatus {
        let now = Instant::now();
        let gate = self.gate();
        FetchStatus {
            enabled: self.is_enabled(),
            interval_secs: gate.interval().as_secs(),
            in_flight: gate.in_flight(),
            due: gate.is_due(now),
            due_in_secs: gate.remaining(now).as_secs(),
            last_fetch_at: gate.last_fetch_wall(),
            completed: gate.completed_count(),
            failed: gate.failed_count(),
            consumers: self.consumer_count(),
        }
    }

    // -- Settings --

    /// Switch automatic triggering on or off
    ///
    /// Switching on starts the timer and, if a consumer is attached, emits an
    /// [`TriggerReason::Enabled`] trigger immediately. Switching off stops the
    /// timer; an attempt already in flight is left alone.
    ///
    /// # Errors
    ///
    /// Returns error if switching on outside a tokio runtime
    pub fn set_enabled(&self, enabled: bool) -> Result<()> {
        let mut current = self.shared.enabled.lock().unwrap_or_else(|e| e.into_inner());
        if *current == enabled {
            return Ok(());
        }

        if enabled {
            let runtime = tokio::runtime::Handle::try_current()
                .map_err(|e| Error::NoRuntime(e.to_string()))?;
            let timer = runtime.spawn(tick_loop(Arc::downgrade(&self.shared)));
            self.replace_timer(Some(timer));
            *current = true;
            drop(current);

            tracing::debug!(interval = ?self.interval(), "automatic fetching enabled");
            if self.consumer_count() > 0 {
                self.emit(TriggerReason::Enabled, false);
            }
        } else {
            *current = false;
            drop(current);
            self.replace_timer(None);
            tracing::debug!("automatic fetching disabled");
        }
        Ok(())
    }

    /// Minimum time between attempts
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.gate().interval()
    }

    /// Change the minimum time between attempts; the timer picks it up on
    /// its next tick
    pub fn set_interval(&self, interval: Duration) {
        self.gate().set_interval(interval);
        tracing::debug!(?interval, "fetch interval changed");
    }

    /// Pretend the last success happened at `at`
    pub fn seed_last_fetch(&self, at: Instant) {
        self.gate().seed(at);
    }

    // -- Data subject --

    /// Attach a consumer to the data
    ///
    /// While enabled, every fresh subscription emits a
    /// [`TriggerReason::ConsumerAttached`] trigger so data gets primed
    /// without waiting for the timer.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<T>> {
        let rx = self.shared.subject.subscribe();
        if self.is_enabled() {
            self.emit(TriggerReason::ConsumerAttached, false);
        }
        rx
    }

    /// Number of attached consumers
    #[must_use]
    pub fn consumer_count(&self) -> usize {
        self.shared.subject.receiver_count()
    }

    /// Store freshly fetched data and notify consumers
    pub fn publish(&self, value: T) {
        self.shared.subject.send_replace(Some(value));
    }

    /// Latest published value
    #[must_use]
    pub fn latest(&self) -> Option<T> {
        self.shared.subject.borrow().clone()
    }

    // -- Triggers --

    /// Listen for "go fetch now" signals
    #[must_use]
    pub fn triggered(&self) -> broadcast::Receiver<FetchTrigger> {
        self.shared.triggers.subscribe()
    }

    /// Emit a manual trigger, regardless of the enabled switch
    pub fn trigger_now(&self, force: bool) {
        self.emit(TriggerReason::Manual, force);
    }

    fn emit(&self, reason: TriggerReason, force: bool) {
        self.shared.emit(FetchTrigger { reason, force });
    }

    fn replace_timer(&self, timer: Option<JoinHandle<()>>) {
        let mut slot = self.shared.timer.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(old) = std::mem::replace(&mut *slot, timer) {
            old.abort();
        }
    }
}

impl<T> FetchScheduler<T> {
    /// Whether automatic triggering is on
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        *self.shared.enabled.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(super) fn downgrade(&self) -> WeakScheduler<T> {
        WeakScheduler(Arc::downgrade(&self.shared))
    }

    fn gate(&self) -> MutexGuard<'_, FetchGate> {
        self.shared.gate()
    }
}

impl<T> Shared<T> {
    fn gate(&self) -> MutexGuard<'_, FetchGate> {
        self.gate.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, trigger: FetchTrigger) {
        tracing::debug!(reason = ?trigger.reason, force = trigger.force, "fetch triggered");
        // No listeners is fine: the owner may not be driving yet
        let _ = self.triggers.send(trigger);
    }
}

/// Emit a timer trigger every interval until disabled or dropped
async fn tick_loop<T>(shared: Weak<Shared<T>>) {
    loop {
        let period = match shared.upgrade() {
            Some(shared) => shared.gate().interval().max(MIN_TIMER_PERIOD),
            None => return,
        };

        tokio::time::sleep(period).await;

        let Some(shared) = shared.upgrade() else {
            return;
        };
        if !*shared.enabled.lock().unwrap_or_else(|e| e.into_inner()) {
            return;
        }
        shared.emit(FetchTrigger {
            reason: TriggerReason::Timer,
            force: false,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);

    #[test]
    fn disabled_scheduler_needs_no_runtime() {
        let scheduler = FetchScheduler::<u32>::disabled(MINUTE);
        assert!(!scheduler.is_enabled());
        assert!(scheduler.should_fetch());
    }

    #[test]
    fn enabling_outside_runtime_fails() {
        let scheduler = FetchScheduler::<u32>::disabled(MINUTE);
        let err = scheduler.set_enabled(true).unwrap_err();
        assert!(matches!(err, Error::NoRuntime(_)));
        assert!(!scheduler.is_enabled());
    }

    #[test]
    fn try_start_claims_once() {
        let scheduler = FetchScheduler::<u32>::disabled(MINUTE);
        assert!(scheduler.try_start(false));
        assert!(!scheduler.try_start(true));
        scheduler.failed();
        assert!(scheduler.try_start(false));
    }

    #[test]
    fn publish_updates_latest() {
        let scheduler = FetchScheduler::disabled(MINUTE);
        assert_eq!(scheduler.latest(), None);
        scheduler.publish("weather");
        assert_eq!(scheduler.latest(), Some("weather"));
    }

    #[test]
    fn subscribe_while_disabled_emits_nothing() {
        let scheduler = FetchScheduler::<u32>::disabled(MINUTE);
        let mut triggers = scheduler.triggered();
        let _data = scheduler.subscribe();

        assert_eq!(scheduler.consumer_count(), 1);
        assert!(triggers.try_recv().is_err());
    }

    #[tokio::test]
    async fn subscribe_while_enabled_triggers() {
        let scheduler = FetchScheduler::<u32>::new(&FetchConfig::with_interval(MINUTE)).unwrap();
        let mut triggers = scheduler.triggered();
        let _data = scheduler.subscribe();

        let trigger = triggers.try_recv().unwrap();
        assert_eq!(trigger.reason, TriggerReason::ConsumerAttached);
        assert!(!trigger.force);
    }

    #[tokio::test]
    async fn enabling_with_consumers_triggers() {
        let scheduler = FetchScheduler::<u32>::disabled(MINUTE);
        let _data = scheduler.subscribe();
        let mut triggers = scheduler.triggered();

        scheduler.set_enabled(true).unwrap();
        assert_eq!(triggers.try_recv().unwrap().reason, TriggerReason::Enabled);

        // Enabling twice is a no-op
        scheduler.set_enabled(true).unwrap();
        assert!(triggers.try_recv().is_err());
    }

    #[test]
    fn manual_trigger_ignores_switch() {
        let scheduler = FetchScheduler::<u32>::disabled(MINUTE);
        let mut triggers = scheduler.triggered();
        scheduler.trigger_now(true);

        let trigger = triggers.try_recv().unwrap();
        assert_eq!(trigger.reason, TriggerReason::Manual);
        assert!(trigger.force);
    }

    #[test]
    fn status_reports_counts() {
        let scheduler = FetchScheduler::<u32>::disabled(MINUTE);
        scheduler.started();
        scheduler.completed();

        let status = scheduler.status();
        assert!(!status.enabled);
        assert_eq!(status.interval_secs, 60);
        assert!(!status.due);
        assert_eq!(status.completed, 1);
        assert!(status.last_fetch_at.is_some());

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["interval_secs"], 60);
    }
}
