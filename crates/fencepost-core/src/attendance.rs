//! Check-in and check-out on top of the presence engine.
//!
//! [`AttendanceDesk`] gates punches on the engine's current session, stamps
//! them with the local time of day, classifies them with the
//! [`TimingValidator`] and hands the resulting [`AttendanceEntry`] to an
//! [`AttendanceRecorder`].

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, NaiveDate, NaiveTime, Timelike, Utc};
use chrono_tz::Tz;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::presence::PresenceEngine;
use crate::registry::{GeofenceCallbacks, Registration};
use crate::storage::StorageError;
use crate::timing::{
    calculate_work_duration, hhmm, CheckInStatus, CheckOutStatus, TimingValidator, WorkDuration,
};
use crate::types::PositionSample;

/// Label used for a punch whose sample has no resolved address.
pub const DEFAULT_LOCATION_LABEL: &str = "Office Location";

// =============================================================================
// RECORDS
// =============================================================================

/// Which punch an entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PunchKind {
    /// Arrival.
    CheckIn,
    /// Departure.
    CheckOut,
}

/// Classification stored with a punch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum AttendanceStatus {
    /// On time, or a full day.
    Present,
    /// Checked in after the late threshold.
    Late,
    /// Fewer than the minimum full-day hours.
    HalfDay,
    /// Left before the early-leave threshold.
    EarlyLeave,
}

impl From<CheckInStatus> for AttendanceStatus {
    fn from(status: CheckInStatus) -> Self {
        match status {
            CheckInStatus::Present => Self::Present,
            CheckInStatus::Late => Self::Late,
        }
    }
}

impl From<CheckOutStatus> for AttendanceStatus {
    fn from(status: CheckOutStatus) -> Self {
        match status {
            CheckOutStatus::Present => Self::Present,
            CheckOutStatus::HalfDay => Self::HalfDay,
            CheckOutStatus::EarlyLeave => Self::EarlyLeave,
        }
    }
}

/// Where a punch was made.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PunchLocation {
    /// Latitude in degrees.
    pub latitude: f64,

    /// Longitude in degrees.
    pub longitude: f64,

    /// Reported accuracy in meters.
    pub accuracy_m: Option<f64>,

    /// Resolved address, or [`DEFAULT_LOCATION_LABEL`].
    #[schema(example = "Vadodara, Gujarat, India")]
    pub label: String,

    /// When the underlying fix was taken.
    pub captured_at: DateTime<Utc>,
}

impl From<&PositionSample> for PunchLocation {
    fn from(sample: &PositionSample) -> Self {
        Self {
            latitude: sample.coordinate.latitude,
            longitude: sample.coordinate.longitude,
            accuracy_m: sample.accuracy_m,
            label: sample
                .address
                .clone()
                .unwrap_or_else(|| DEFAULT_LOCATION_LABEL.to_string()),
            captured_at: sample.captured_at,
        }
    }
}

/// A single recorded punch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AttendanceEntry {
    /// Unique, time-ordered identifier.
    pub id: Uuid,

    /// Check-in or check-out.
    pub kind: PunchKind,

    /// Local calendar date.
    pub date: NaiveDate,

    /// Local time of day, to the minute.
    #[serde(with = "hhmm")]
    #[schema(value_type = String, example = "11:05")]
    pub time: NaiveTime,

    /// Where the punch was made.
    pub location: PunchLocation,

    /// Classification of the punch.
    pub status: AttendanceStatus,

    /// Message from the classification.
    #[schema(example = "On time")]
    pub message: String,

    /// When the punch was accepted (UTC).
    pub recorded_at: DateTime<Utc>,
}

/// Both punches of one local day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DayRecord {
    /// Local calendar date.
    pub date: NaiveDate,

    /// The day's check-in, if any.
    pub check_in: Option<AttendanceEntry>,

    /// The day's check-out, if any.
    pub check_out: Option<AttendanceEntry>,
}

impl DayRecord {
    /// An empty record for `date`.
    #[must_use]
    pub const fn new(date: NaiveDate) -> Self {
        Self {
            date,
            check_in: None,
            check_out: None,
        }
    }

    /// Store `entry` in the slot for its kind.
    pub fn apply(&mut self, entry: AttendanceEntry) {
        match entry.kind {
            PunchKind::CheckIn => self.check_in = Some(entry),
            PunchKind::CheckOut => self.check_out = Some(entry),
        }
    }

    /// Time between the punches, once both exist.
    #[must_use]
    pub fn work_duration(&self) -> Option<WorkDuration> {
        calculate_work_duration(
            self.check_in.as_ref().map(|e| e.time),
            self.check_out.as_ref().map(|e| e.time),
        )
    }

    /// Status of the latest punch.
    #[must_use]
    pub fn status(&self) -> Option<AttendanceStatus> {
        self.check_out
            .as_ref()
            .or(self.check_in.as_ref())
            .map(|e| e.status)
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// A recorder failed to persist or load attendance.
#[derive(Debug, Error)]
pub enum RecorderError {
    /// The journal failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The recorder could not be reached.
    #[error("Attendance recorder unavailable: {0}")]
    Unavailable(String),
}

/// Why a punch was refused or failed.
#[derive(Debug, Error)]
pub enum AttendanceError {
    /// No position sample has been received yet.
    #[error("Location not available. Please enable location access and refresh your location.")]
    NoCurrentFix,

    /// Check-in attempted outside the office fence.
    #[error("You must be within the office premises to check in")]
    NotWithinOffice,

    /// A check-in already exists for today.
    #[error("Already checked in today")]
    AlreadyCheckedIn,

    /// Check-out attempted without a check-in.
    #[error("You have not checked in today")]
    NotCheckedIn,

    /// A check-out already exists for today.
    #[error("Already checked out today")]
    AlreadyCheckedOut,

    /// The recorder failed.
    #[error("Failed to record attendance: {0}")]
    Recorder(#[from] RecorderError),
}

impl AttendanceError {
    /// Whether this is a refusal due to the current state rather than a failure.
    #[inline]
    #[must_use]
    pub const fn is_expected_state(&self) -> bool {
        !matches!(self, Self::Recorder(_))
    }
}

// =============================================================================
// RECORDERS
// =============================================================================

/// Persists punches and restores a day's record.
pub trait AttendanceRecorder: Send + Sync + 'static {
    /// Persist a punch.
    fn record(&self, entry: AttendanceEntry) -> BoxFuture<'_, Result<(), RecorderError>>;

    /// The record for `date`, if anything was recorded.
    fn day(&self, date: NaiveDate) -> BoxFuture<'_, Result<Option<DayRecord>, RecorderError>>;
}

/// In-memory [`AttendanceRecorder`]; nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    days: Mutex<BTreeMap<NaiveDate, DayRecord>>,
}

impl MemoryRecorder {
    /// An empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl AttendanceRecorder for MemoryRecorder {
    fn record(&self, entry: AttendanceEntry) -> BoxFuture<'_, Result<(), RecorderError>> {
        self.days
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(entry.date)
            .or_insert_with(|| DayRecord::new(entry.date))
            .apply(entry);
        Box::pin(async { Ok(()) })
    }

    fn day(&self, date: NaiveDate) -> BoxFuture<'_, Result<Option<DayRecord>, RecorderError>> {
        let record = self
            .days
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&date)
            .cloned();
        Box::pin(async move { Ok(record) })
    }
}

// =============================================================================
// DESK
// =============================================================================

/// Result of a successful check-out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CheckOutReceipt {
    /// The recorded punch.
    pub entry: AttendanceEntry,

    /// Time since the day's check-in.
    pub work_duration: WorkDuration,
}

struct DeskInner {
    engine: PresenceEngine,
    validator: TimingValidator,
    recorder: Arc<dyn AttendanceRecorder>,
    timezone: Tz,
    // Held across a whole punch so concurrent punches are serialized.
    today: tokio::sync::Mutex<Option<DayRecord>>,
}

/// Records check-ins and check-outs for one employee.
#[derive(Clone)]
pub struct AttendanceDesk {
    inner: Arc<DeskInner>,
}

impl std::fmt::Debug for AttendanceDesk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttendanceDesk")
            .field("timezone", &self.inner.timezone)
            .finish_non_exhaustive()
    }
}

impl AttendanceDesk {
    /// Create a desk over `engine`, classifying in `timezone`.
    #[must_use]
    pub fn new(
        engine: PresenceEngine,
        validator: TimingValidator,
        recorder: Arc<dyn AttendanceRecorder>,
        timezone: Tz,
    ) -> Self {
        Self {
            inner: Arc::new(DeskInner {
                engine,
                validator,
                recorder,
                timezone,
                today: tokio::sync::Mutex::new(None),
            }),
        }
    }

    /// The presence engine punches are gated on.
    #[must_use]
    pub fn engine(&self) -> &PresenceEngine {
        &self.inner.engine
    }

    /// The timezone punches are stamped in.
    #[must_use]
    pub fn timezone(&self) -> Tz {
        self.inner.timezone
    }

    /// Local date and minute-precision time of day for `now`.
    #[must_use]
    pub fn local_date_time(&self, now: DateTime<Utc>) -> (NaiveDate, NaiveTime) {
        let local = now.with_timezone(&self.inner.timezone);
        let time = NaiveTime::from_hms_opt(local.hour(), local.minute(), 0).unwrap_or_default();
        (local.date_naive(), time)
    }

    /// Check in at `now`.
    ///
    /// # Errors
    ///
    /// Refuses with [`AttendanceError::NoCurrentFix`],
    /// [`AttendanceError::NotWithinOffice`] or
    /// [`AttendanceError::AlreadyCheckedIn`]; fails with
    /// [`AttendanceError::Recorder`] if the punch cannot be persisted.
    pub async fn check_in(&self, now: DateTime<Utc>) -> Result<AttendanceEntry, AttendanceError> {
        let session = self.inner.engine.snapshot();
        let sample = session
            .last_sample
            .as_ref()
            .ok_or(AttendanceError::NoCurrentFix)?;
        if !session.is_within_office() {
            return Err(AttendanceError::NotWithinOffice);
        }

        let (date, time) = self.local_date_time(now);
        let mut today = self.inner.today.lock().await;
        let record = self.inner.day_slot(&mut today, date).await?;
        if record.check_in.is_some() {
            return Err(AttendanceError::AlreadyCheckedIn);
        }

        let verdict = self.inner.validator.validate_check_in(time);
        let entry = new_entry(
            PunchKind::CheckIn,
            date,
            time,
            sample,
            verdict.status.into(),
            verdict.message,
            now,
        );

        self.inner.recorder.record(entry.clone()).await?;
        record.apply(entry.clone());

        info!(
            time = %entry.time.format("%H:%M"),
            status = ?entry.status,
            "Checked in"
        );
        Ok(entry)
    }

    /// Check out at `now`. Allowed from anywhere.
    ///
    /// # Errors
    ///
    /// Refuses with [`AttendanceError::NoCurrentFix`],
    /// [`AttendanceError::NotCheckedIn`] or
    /// [`AttendanceError::AlreadyCheckedOut`]; fails with
    /// [`AttendanceError::Recorder`] if the punch cannot be persisted.
    pub async fn check_out(&self, now: DateTime<Utc>) -> Result<CheckOutReceipt, AttendanceError> {
        let session = self.inner.engine.snapshot();
        let sample = session
            .last_sample
            .as_ref()
            .ok_or(AttendanceError::NoCurrentFix)?;

        let (date, time) = self.local_date_time(now);
        let mut today = self.inner.today.lock().await;
        let record = self.inner.day_slot(&mut today, date).await?;
        let check_in_time = record
            .check_in
            .as_ref()
            .map(|e| e.time)
            .ok_or(AttendanceError::NotCheckedIn)?;
        if record.check_out.is_some() {
            return Err(AttendanceError::AlreadyCheckedOut);
        }

        let verdict = self.inner.validator.validate_check_out(time, check_in_time);
        let entry = new_entry(
            PunchKind::CheckOut,
            date,
            time,
            sample,
            verdict.status.into(),
            verdict.message,
            now,
        );

        self.inner.recorder.record(entry.clone()).await?;
        record.apply(entry.clone());

        let work_duration = WorkDuration::between(check_in_time, time);
        info!(
            time = %entry.time.format("%H:%M"),
            status = ?entry.status,
            worked = %work_duration,
            "Checked out"
        );
        Ok(CheckOutReceipt {
            entry,
            work_duration,
        })
    }

    /// The record for the local day containing `now`.
    ///
    /// # Errors
    ///
    /// Returns [`AttendanceError::Recorder`] if the day cannot be loaded.
    pub async fn today(&self, now: DateTime<Utc>) -> Result<DayRecord, AttendanceError> {
        let (date, _) = self.local_date_time(now);
        let mut today = self.inner.today.lock().await;
        let record = self.inner.day_slot(&mut today, date).await?;
        Ok(record.clone())
    }

    /// Check in on entering and check out on leaving the office.
    ///
    /// Punches run on a background task; refusals are logged at debug level
    /// and failures as warnings. Unregistering the returned handle ends the
    /// task. Must be called from within a Tokio runtime.
    pub fn enable_auto_attendance(&self) -> Registration {
        let (tx, mut rx) = mpsc::unbounded_channel::<PunchKind>();
        let enter_tx = tx.clone();

        let callbacks = GeofenceCallbacks::new()
            .on_enter(move |_| {
                let _ = enter_tx.send(PunchKind::CheckIn);
            })
            .on_exit(move |_| {
                let _ = tx.send(PunchKind::CheckOut);
            });

        let desk = self.clone();
        tokio::spawn(async move {
            while let Some(kind) = rx.recv().await {
                let now = Utc::now();
                let result = match kind {
                    PunchKind::CheckIn => desk.check_in(now).await.map(drop),
                    PunchKind::CheckOut => desk.check_out(now).await.map(drop),
                };
                match result {
                    Ok(()) => info!(?kind, "Automatic attendance recorded"),
                    Err(err) if err.is_expected_state() => {
                        debug!(?kind, reason = %err, "Automatic attendance skipped");
                    }
                    Err(err) => warn!(?kind, error = %err, "Automatic attendance failed"),
                }
            }
            debug!("Automatic attendance disabled");
        });

        info!("Automatic attendance enabled");
        self.inner.engine.register(callbacks)
    }
}

impl DeskInner {
    async fn day_slot<'a>(
        &self,
        slot: &'a mut Option<DayRecord>,
        date: NaiveDate,
    ) -> Result<&'a mut DayRecord, RecorderError> {
        if slot.as_ref().map_or(true, |r| r.date != date) {
            let record = self
                .recorder
                .day(date)
                .await?
                .unwrap_or_else(|| DayRecord::new(date));
            *slot = Some(record);
        }
        Ok(slot.get_or_insert_with(|| DayRecord::new(date)))
    }
}

fn new_entry(
    kind: PunchKind,
    date: NaiveDate,
    time: NaiveTime,
    sample: &PositionSample,
    status: AttendanceStatus,
    message: String,
    now: DateTime<Utc>,
) -> AttendanceEntry {
    AttendanceEntry {
        id: Uuid::now_v7(),
        kind,
        date,
        time,
        location: PunchLocation::from(sample),
        status,
        message,
        recorded_at: now,
    }
}
