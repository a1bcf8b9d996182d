//! Owner-side fetch loop
//!
//! Turns scheduler triggers into actual fetches: check the gate, mark the
//! attempt started, run the [`Fetcher`], then record the outcome and publish
//! the value.

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

use super::scheduler::{FetchScheduler, FetchTrigger, TriggerReason};
use crate::Result;

/// Source of periodically refreshed data
#[async_trait]
pub trait Fetcher<T>: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Fetch a fresh value
    ///
    /// # Errors
    ///
    /// Returns error if the source is unreachable or returns bad data
    async fn fetch(&self) -> Result<T>;
}

/// Run one gated fetch
///
/// Returns `Ok(true)` if a fetch ran and its value was published, `Ok(false)`
/// if the gate refused (in flight, or not due and not forced).
///
/// # Errors
///
/// Returns the fetcher's error; the scheduler records the failure first
pub async fn refresh<T, F>(scheduler: &FetchScheduler<T>, fetcher: &F, force: bool) -> Result<bool>
where
    T: Clone + Send + Sync + 'static,
    F: Fetcher<T> + ?Sized,
{
    if !scheduler.try_start(force) {
        tracing::trace!(fetcher = fetcher.name(), force, "fetch not due");
        return Ok(false);
    }

    let attempt = Attempt::new(scheduler);
    match fetcher.fetch().await {
        Ok(value) => {
            attempt.succeed(value);
            tracing::debug!(fetcher = fetcher.name(), "fetched");
            Ok(true)
        }
        Err(e) => {
            attempt.fail();
            Err(e)
        }
    }
}

/// Outstanding fetch attempt; dropping it unresolved records a failure
///
/// Covers a fetch future that is cancelled mid-flight (aborted driver,
/// caller-side timeout), which would otherwise leave the gate in flight.
struct Attempt<'a, T>
where
    T: Clone + Send + Sync + 'static,
{
    scheduler: &'a FetchScheduler<T>,
    resolved: bool,
}

impl<'a, T> Attempt<'a, T>
where
    T: Clone + Send + Sync + 'static,
{
    const fn new(scheduler: &'a FetchScheduler<T>) -> Self {
        Self {
            scheduler,
            resolved: false,
        }
    }

    fn succeed(mut self, value: T) {
        self.resolved = true;
        self.scheduler.publish(value);
        self.scheduler.completed();
    }

    fn fail(mut self) {
        self.resolved = true;
        self.scheduler.failed();
    }
}

impl<T> Drop for Attempt<'_, T>
where
    T: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if !self.resolved {
            tracing::debug!("fetch cancelled while in flight");
            self.scheduler.failed();
        }
    }
}

/// Spawn a task that fetches whenever the scheduler triggers
///
/// The task ends once every handle to the scheduler has been dropped, or when
/// the returned handle is aborted. Fetch errors are logged and recorded on
/// the scheduler; they never stop the loop.
///
/// # Panics
///
/// Panics if called outside a tokio runtime
pub fn spawn_driver<T, F>(scheduler: &FetchScheduler<T>, fetcher: F) -> JoinHandle<()>
where
    T: Clone + Send + Sync + 'static,
    F: Fetcher<T> + 'static,
{
    let mut triggers = BroadcastStream::new(scheduler.triggered());
    let weak = scheduler.downgrade();

    tokio::spawn(async move {
        tracing::debug!(fetcher = fetcher.name(), "fetch driver started");

        while let Some(item) = triggers.next().await {
            let trigger = match item {
                Ok(trigger) => trigger,
                // Missed triggers collapse into one regular attempt
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    tracing::debug!(fetcher = fetcher.name(), skipped, "fetch triggers lagged");
                    FetchTrigger {
                        reason: TriggerReason::Timer,
                        force: false,
                    }
                }
            };

            let Some(scheduler) = weak.upgrade() else {
                break;
            };

            if let Err(e) = refresh(&scheduler, &fetcher, trigger.force).await {
                tracing::warn!(
                    fetcher = fetcher.name(),
                    reason = ?trigger.reason,
                    error = %e,
                    "fetch failed"
                );
            }
        }

        tracing::debug!(fetcher = fetcher.name(), "fetch driver stopped");
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::Error;

    struct Counter {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl Fetcher<usize> for Counter {
        fn name(&self) -> &str {
            "counter"
        }

        async fn fetch(&self) -> Result<usize> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail {
                Err(Error::Fetch("offline".to_string()))
            } else {
                Ok(n)
            }
        }
    }

    fn counter(fail: bool) -> (Counter, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Counter {
                calls: Arc::clone(&calls),
                fail,
            },
            calls,
        )
    }

    #[tokio::test]
    async fn refresh_respects_interval() {
        let scheduler = FetchScheduler::disabled(Duration::from_secs(60));
        let (fetcher, calls) = counter(false);

        assert!(refresh(&scheduler, &fetcher, false).await.unwrap());
        assert!(!refresh(&scheduler, &fetcher, false).await.unwrap());
        assert!(refresh(&scheduler, &fetcher, true).await.unwrap());

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(scheduler.latest(), Some(2));
    }

    #[tokio::test]
    async fn refresh_error_records_failure() {
        let scheduler = FetchScheduler::<usize>::disabled(Duration::from_secs(60));
        let (fetcher, _) = counter(true);

        let err = refresh(&scheduler, &fetcher, false).await.unwrap_err();
        assert!(matches!(err, Error::Fetch(_)));
        assert!(!scheduler.in_flight());
        assert_eq!(scheduler.status().failed, 1);
        // Never succeeded, so still due
        assert!(scheduler.should_fetch());
    }

    /// Fetcher that never answers within a test's patience
    struct Hanging;

    #[async_trait]
    impl Fetcher<usize> for Hanging {
        fn name(&self) -> &str {
            "hanging"
        }

        async fn fetch(&self) -> Result<usize> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(0)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_refresh_frees_the_gate() {
        let scheduler = FetchScheduler::disabled(Duration::from_secs(60));

        let cancelled =
            tokio::time::timeout(Duration::from_secs(1), refresh(&scheduler, &Hanging, false)).await;
        assert!(cancelled.is_err());
        assert!(!scheduler.in_flight());
        assert!(scheduler.should_fetch());
        assert_eq!(scheduler.status().failed, 1);

        let (fetcher, calls) = counter(false);
        assert!(refresh(&scheduler, &fetcher, true).await.unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.latest(), Some(1));
    }
}
