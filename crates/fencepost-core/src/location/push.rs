//! A position provider fed by fixes pushed from outside the process.
//!
//! The server receives fixes from the employee's device over HTTP and pushes
//! them here; the presence engine consumes them like any hardware provider.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use futures::future::{self, BoxFuture, FutureExt};
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::{timeout, Instant};
use tracing::{debug, warn};

use super::{AcquisitionOptions, LocationError, LocationResult, PositionProvider, RawFix};

/// Pushed results buffered per subscriber before the oldest are dropped.
const CHANNEL_CAPACITY: usize = 64;

/// Fan-out of externally reported fixes to one-shot requests and watches.
pub struct PushPositionProvider {
    latest: Mutex<Option<(Instant, RawFix)>>,
    tx: broadcast::Sender<LocationResult<RawFix>>,
}

impl Default for PushPositionProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl PushPositionProvider {
    /// Create a provider with no cached fix.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            latest: Mutex::new(None),
            tx,
        }
    }

    /// Publish a fix or a device-side failure.
    ///
    /// Returns how many subscribers received it.
    pub fn push(&self, result: LocationResult<RawFix>) -> usize {
        if let Ok(fix) = &result {
            *self.latest.lock().unwrap_or_else(PoisonError::into_inner) =
                Some((Instant::now(), fix.clone()));
        }
        let delivered = self.tx.send(result).unwrap_or(0);
        debug!(subscribers = delivered, "Pushed location update");
        delivered
    }

    /// The most recently pushed fix, regardless of age.
    #[must_use]
    pub fn latest(&self) -> Option<RawFix> {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|(_, fix)| fix.clone())
    }

    fn cached(&self, maximum_age: Duration) -> Option<RawFix> {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .filter(|(received, _)| received.elapsed() <= maximum_age)
            .map(|(_, fix)| fix.clone())
    }
}

async fn next_result(
    rx: &mut broadcast::Receiver<LocationResult<RawFix>>,
    wait: Duration,
) -> Option<LocationResult<RawFix>> {
    loop {
        match timeout(wait, rx.recv()).await {
            Err(_) => return Some(Err(LocationError::TimedOut)),
            Ok(Ok(result)) => return Some(result),
            Ok(Err(RecvError::Lagged(skipped))) => {
                warn!(skipped, "Location subscriber lagged, dropping stale updates");
            }
            Ok(Err(RecvError::Closed)) => return None,
        }
    }
}

impl PositionProvider for PushPositionProvider {
    // The high-accuracy hint has no meaning for pushed fixes and is ignored.
    fn current_fix(&self, options: AcquisitionOptions) -> BoxFuture<'_, LocationResult<RawFix>> {
        // Subscribe first so a push racing with the cache check is not lost.
        let mut rx = self.tx.subscribe();
        if let Some(fix) = self.cached(options.maximum_age) {
            return future::ready(Ok(fix)).boxed();
        }

        async move {
            next_result(&mut rx, options.timeout)
                .await
                .unwrap_or(Err(LocationError::Unavailable))
        }
        .boxed()
    }

    fn watch(&self, options: AcquisitionOptions) -> BoxStream<'static, LocationResult<RawFix>> {
        let rx = self.tx.subscribe();
        stream::unfold(rx, move |mut rx| async move {
            next_result(&mut rx, options.timeout)
                .await
                .map(|result| (result, rx))
        })
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::testing::fix_at;
    use crate::location::AcquisitionPolicy;

    #[tokio::test(start_paused = true)]
    async fn test_fresh_cached_fix_is_returned_immediately() {
        let provider = PushPositionProvider::new();
        provider.push(Ok(fix_at(22.3188, 73.1874, 10.0)));

        let fix = provider
            .current_fix(AcquisitionPolicy::default().primary())
            .await
            .unwrap();
        assert_eq!(fix.accuracy_m, Some(10.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_fix_waits_then_times_out() {
        let provider = PushPositionProvider::new();
        provider.push(Ok(fix_at(22.3188, 73.1874, 10.0)));
        tokio::time::advance(Duration::from_secs(61)).await;

        let result = provider
            .current_fix(AcquisitionPolicy::default().primary())
            .await;
        assert_eq!(result, Err(LocationError::TimedOut));

        // A relaxed request accepts the older fix.
        let fix = provider
            .current_fix(AcquisitionPolicy::default().relaxed(1))
            .await;
        assert!(fix.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_shot_receives_next_push() {
        let provider = std::sync::Arc::new(PushPositionProvider::new());
        let pusher = std::sync::Arc::clone(&provider);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            pusher.push(Ok(fix_at(22.3188, 73.1874, 42.0)));
        });

        let fix = provider
            .current_fix(AcquisitionPolicy::default().primary())
            .await
            .unwrap();
        assert_eq!(fix.accuracy_m, Some(42.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_forwards_pushes_and_reports_silence() {
        let provider = PushPositionProvider::new();
        let mut watch = provider.watch(AcquisitionPolicy::default().primary());

        provider.push(Ok(fix_at(22.3188, 73.1874, 10.0)));
        provider.push(Err(LocationError::PermissionDenied));

        assert!(watch.next().await.unwrap().is_ok());
        assert_eq!(
            watch.next().await.unwrap(),
            Err(LocationError::PermissionDenied)
        );
        assert_eq!(watch.next().await.unwrap(), Err(LocationError::TimedOut));
    }

    #[test]
    fn test_push_without_subscribers_still_caches() {
        let provider = PushPositionProvider::new();
        assert_eq!(provider.push(Ok(fix_at(1.0, 2.0, 5.0))), 0);
        assert_eq!(provider.latest().map(|f| f.latitude), Some(1.0));
    }
}
