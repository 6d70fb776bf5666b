//! Device positioning with graceful degradation.
//!
//! This module provides:
//! - The [`PositionProvider`] seam over a platform positioning capability
//! - [`LocationSource`], which acquires one-shot fixes with a small retry
//!   budget and runs a continuous, restartable watch
//! - Optional reverse-geocoding enrichment that never fails acquisition
//!
//! Consumer hardware frequently cannot produce a high-accuracy fix indoors, so
//! a timed-out or unavailable request is retried with relaxed accuracy, a
//! longer timeout and a larger cache window. A denied permission is terminal.

pub mod push;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::stream::{BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use crate::geocode::ReverseGeocoder;
use crate::types::{
    sanitize_accuracy, Coordinate, PositionSample, SessionError, SessionErrorKind,
};

// =============================================================================
// ERRORS
// =============================================================================

/// Why a fix could not be obtained.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LocationError {
    /// The user refused location access. Never retried.
    #[error("Location access denied by user")]
    PermissionDenied,

    /// The positioning hardware could not determine a position.
    #[error("Location information is unavailable")]
    Unavailable,

    /// No fix arrived within the acquisition timeout.
    #[error("Location request timed out")]
    TimedOut,
}

impl LocationError {
    /// Whether acquisition should be retried with relaxed parameters.
    #[inline]
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::Unavailable | Self::TimedOut)
    }
}

impl From<LocationError> for SessionError {
    fn from(err: LocationError) -> Self {
        let kind = match err {
            LocationError::PermissionDenied => SessionErrorKind::PermissionDenied,
            LocationError::Unavailable => SessionErrorKind::Unavailable,
            LocationError::TimedOut => SessionErrorKind::TimedOut,
        };
        Self {
            kind,
            message: err.to_string(),
        }
    }
}

/// Result type for location acquisition.
pub type LocationResult<T> = std::result::Result<T, LocationError>;

// =============================================================================
// PROVIDER SEAM
// =============================================================================

/// A raw fix as reported by the positioning capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "latitude": 22.31882,
    "longitude": 73.187437,
    "accuracy_m": 35.0,
    "captured_at": "2025-01-15T05:30:00Z"
}))]
pub struct RawFix {
    /// Latitude in degrees.
    pub latitude: f64,

    /// Longitude in degrees.
    pub longitude: f64,

    /// Horizontal accuracy in meters, if reported.
    #[serde(default)]
    pub accuracy_m: Option<f64>,

    /// Altitude in meters, if reported.
    #[serde(default)]
    pub altitude_m: Option<f64>,

    /// Heading in degrees, if reported.
    #[serde(default)]
    pub heading_deg: Option<f64>,

    /// Speed in meters per second, if reported.
    #[serde(default)]
    pub speed_mps: Option<f64>,

    /// Device capture time. Defaults to the time of receipt.
    #[serde(default)]
    pub captured_at: Option<DateTime<Utc>>,
}

impl RawFix {
    /// Convert into an immutable sample, stamping it now if the device did not.
    #[must_use]
    pub fn into_sample(self) -> PositionSample {
        PositionSample {
            coordinate: Coordinate::new(self.latitude, self.longitude),
            accuracy_m: sanitize_accuracy(self.accuracy_m),
            altitude_m: self.altitude_m,
            heading_deg: self.heading_deg,
            speed_mps: self.speed_mps,
            captured_at: self.captured_at.unwrap_or_else(Utc::now),
            address: None,
        }
    }
}

/// Parameters for a single acquisition request or watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquisitionOptions {
    /// Ask the hardware for its most accurate (and slowest) mode.
    pub high_accuracy: bool,

    /// How long to wait for a fix before failing with `TimedOut`.
    pub timeout: Duration,

    /// How old a cached fix may be and still be returned.
    pub maximum_age: Duration,
}

/// A device or platform positioning capability.
///
/// `watch` models the platform's push-style subscription as a lazy, infinite
/// stream; dropping the stream cancels the subscription.
pub trait PositionProvider: Send + Sync + 'static {
    /// Request a single fix.
    fn current_fix(&self, options: AcquisitionOptions) -> BoxFuture<'_, LocationResult<RawFix>>;

    /// Subscribe to continuous fixes and failures.
    fn watch(&self, options: AcquisitionOptions) -> BoxStream<'static, LocationResult<RawFix>>;
}

// =============================================================================
// ACQUISITION POLICY
// =============================================================================

/// Timeouts, cache windows and retry budget for acquisition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct AcquisitionPolicy {
    /// Timeout of the first, high-accuracy attempt.
    #[schema(example = 20)]
    pub primary_timeout_secs: u64,

    /// Cache window of the first attempt.
    #[schema(example = 60)]
    pub primary_maximum_age_secs: u64,

    /// Minimum timeout of relaxed attempts.
    #[schema(example = 30)]
    pub relaxed_timeout_secs: u64,

    /// Minimum cache window of the first relaxed attempt.
    #[schema(example = 120)]
    pub relaxed_maximum_age_secs: u64,

    /// Extra cache window granted to each further relaxed attempt.
    #[schema(example = 60)]
    pub relaxed_age_step_secs: u64,

    /// Relaxed attempts after the primary one before a failure surfaces.
    #[schema(example = 2)]
    pub max_retries: u32,

    /// Upper bound on a reverse-geocoding lookup.
    #[schema(example = 5)]
    pub geocode_timeout_secs: u64,
}

impl Default for AcquisitionPolicy {
    fn default() -> Self {
        Self {
            primary_timeout_secs: 20,
            primary_maximum_age_secs: 60,
            relaxed_timeout_secs: 30,
            relaxed_maximum_age_secs: 120,
            relaxed_age_step_secs: 60,
            max_retries: 2,
            geocode_timeout_secs: 5,
        }
    }
}

impl AcquisitionPolicy {
    /// Options for the first, high-accuracy attempt.
    #[must_use]
    pub const fn primary(&self) -> AcquisitionOptions {
        AcquisitionOptions {
            high_accuracy: true,
            timeout: Duration::from_secs(self.primary_timeout_secs),
            maximum_age: Duration::from_secs(self.primary_maximum_age_secs),
        }
    }

    /// Options for the `retry`-th relaxed attempt (1-based).
    #[must_use]
    pub fn relaxed(&self, retry: u32) -> AcquisitionOptions {
        let step = self
            .relaxed_age_step_secs
            .saturating_mul(u64::from(retry.saturating_sub(1)));
        AcquisitionOptions {
            high_accuracy: false,
            timeout: Duration::from_secs(self.primary_timeout_secs.max(self.relaxed_timeout_secs)),
            maximum_age: Duration::from_secs(
                self.primary_maximum_age_secs
                    .max(self.relaxed_maximum_age_secs.saturating_add(step)),
            ),
        }
    }

    fn geocode_timeout(&self) -> Duration {
        Duration::from_secs(self.geocode_timeout_secs)
    }
}

// =============================================================================
// LOCATION SOURCE
// =============================================================================

/// Receives every fix (as `Ok`) or failure (as `Err`) from a running watch.
pub type SampleHandler = Arc<dyn Fn(LocationResult<PositionSample>) + Send + Sync>;

#[derive(Clone)]
struct Acquirer {
    provider: Arc<dyn PositionProvider>,
    geocoder: Option<Arc<dyn ReverseGeocoder>>,
    policy: AcquisitionPolicy,
}

impl Acquirer {
    async fn current(&self) -> LocationResult<PositionSample> {
        let mut options = self.policy.primary();
        let mut retries = 0;

        loop {
            match self.provider.current_fix(options).await {
                Ok(fix) => return Ok(self.enrich(fix.into_sample()).await),
                Err(err) if err.is_transient() && retries < self.policy.max_retries => {
                    retries += 1;
                    options = self.policy.relaxed(retries);
                    warn!(
                        error = %err,
                        retry = retries,
                        timeout_secs = options.timeout.as_secs(),
                        "Location fix failed, retrying with relaxed accuracy"
                    );
                }
                Err(err) => {
                    warn!(error = %err, attempts = retries + 1, "Location fix failed");
                    return Err(err);
                }
            }
        }
    }

    /// Attach an address when a geocoder is configured. Never fails.
    async fn enrich(&self, sample: PositionSample) -> PositionSample {
        let Some(geocoder) = &self.geocoder else {
            return sample;
        };

        let lookup = geocoder.reverse(sample.coordinate);
        match tokio::time::timeout(self.policy.geocode_timeout(), lookup).await {
            Ok(Ok(address)) => sample.with_address(address),
            Ok(Err(err)) => {
                debug!(error = %err, "Reverse geocoding failed, keeping sample unaddressed");
                sample
            }
            Err(_) => {
                debug!("Reverse geocoding timed out, keeping sample unaddressed");
                sample
            }
        }
    }

    async fn run_watch(self, live: Arc<AtomicBool>, on_sample: SampleHandler) {
        let deliver = |result: LocationResult<PositionSample>| {
            if live.load(Ordering::Acquire) {
                on_sample(result);
                true
            } else {
                false
            }
        };

        let mut options = self.policy.primary();
        let mut restarts = 0;

        loop {
            let mut stream = self.provider.watch(options);
            let mut restart = false;

            while let Some(result) = stream.next().await {
                match result {
                    Ok(fix) => {
                        restarts = 0;
                        let sample = self.enrich(fix.into_sample()).await;
                        if !deliver(Ok(sample)) {
                            return;
                        }
                    }
                    Err(err) => {
                        if !deliver(Err(err)) {
                            return;
                        }
                        if err.is_transient() && restarts < self.policy.max_retries {
                            restarts += 1;
                            options = self.policy.relaxed(restarts);
                            restart = true;
                            break;
                        }
                    }
                }
            }

            if restart {
                info!(restart = restarts, "Restarting location watch with relaxed accuracy");
                continue;
            }

            // The provider ended the subscription.
            if !deliver(Err(LocationError::Unavailable)) {
                return;
            }
            if restarts >= self.policy.max_retries {
                warn!("Location watch ended and the restart budget is exhausted");
                return;
            }
            restarts += 1;
            options = self.policy.relaxed(restarts);
        }
    }
}

struct WatchHandle {
    live: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

/// Acquires position samples from a [`PositionProvider`].
pub struct LocationSource {
    acquirer: Acquirer,
    watch: Mutex<Option<WatchHandle>>,
}

impl LocationSource {
    /// Create a source over the given provider.
    #[must_use]
    pub fn new(provider: Arc<dyn PositionProvider>, policy: AcquisitionPolicy) -> Self {
        Self {
            acquirer: Acquirer {
                provider,
                geocoder: None,
                policy,
            },
            watch: Mutex::new(None),
        }
    }

    /// Enrich samples with addresses from the given geocoder.
    #[must_use]
    pub fn with_geocoder(mut self, geocoder: Arc<dyn ReverseGeocoder>) -> Self {
        self.acquirer.geocoder = Some(geocoder);
        self
    }

    /// The acquisition policy in use.
    #[must_use]
    pub const fn policy(&self) -> &AcquisitionPolicy {
        &self.acquirer.policy
    }

    /// Obtain a single fix.
    ///
    /// Makes at most `1 + max_retries` requests. Transient failures are
    /// retried with relaxed options; `PermissionDenied` surfaces immediately.
    ///
    /// # Errors
    ///
    /// Returns the last [`LocationError`] once the budget is exhausted.
    pub async fn get_current_location(&self) -> LocationResult<PositionSample> {
        self.acquirer.current().await
    }

    /// Begin a continuous subscription delivering every fix or failure.
    ///
    /// Returns `false` without doing anything if already tracking. Must be
    /// called from within a Tokio runtime.
    pub fn start_tracking(&self, on_sample: SampleHandler) -> bool {
        let mut watch = self.watch.lock().unwrap_or_else(PoisonError::into_inner);
        if watch.as_ref().is_some_and(|w| !w.task.is_finished()) {
            return false;
        }

        let live = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn(self.acquirer.clone().run_watch(Arc::clone(&live), on_sample));
        *watch = Some(WatchHandle { live, task });
        true
    }

    /// Cancel the subscription. No handler invocation starts after this returns.
    ///
    /// Safe to call when not tracking.
    pub fn stop_tracking(&self) {
        let handle = self
            .watch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.live.store(false, Ordering::Release);
            handle.task.abort();
        }
    }

    /// Whether a subscription is running.
    #[must_use]
    pub fn is_tracking(&self) -> bool {
        self.watch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|w| !w.task.is_finished())
    }
}

impl Drop for LocationSource {
    fn drop(&mut self) {
        self.stop_tracking();
    }
}

// =============================================================================
// TEST SUPPORT
// =============================================================================
