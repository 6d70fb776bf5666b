//! Check-in and check-out classification against a work schedule.
//!
//! All comparisons are time-of-day only; both punches are assumed to fall on
//! the same calendar day.

use std::fmt;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Errors from parsing schedule times.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TimingError {
    /// The string is not a valid `HH:MM` or `HH:MM:SS` time of day.
    #[error("Invalid time of day '{0}'. Expected HH:MM (e.g., '09:30').")]
    InvalidTimeOfDay(String),
}

/// Parse `HH:MM` or `HH:MM:SS` into a time of day.
///
/// # Errors
///
/// Returns [`TimingError::InvalidTimeOfDay`] if neither format matches.
pub fn parse_time_of_day(value: &str) -> Result<NaiveTime, TimingError> {
    let trimmed = value.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
        .map_err(|_| TimingError::InvalidTimeOfDay(value.to_string()))
}

/// The work schedule punches are classified against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct TimingPolicy {
    /// Start of the work day.
    #[serde(with = "hhmm")]
    #[schema(value_type = String, example = "11:00")]
    pub work_start: NaiveTime,

    /// End of the work day.
    #[serde(with = "hhmm")]
    #[schema(value_type = String, example = "18:30")]
    pub work_end: NaiveTime,

    /// Minutes after `work_start` before a check-in counts as late.
    #[schema(example = 15)]
    pub late_threshold_minutes: u32,

    /// Minutes before `work_end` a check-out may happen without counting as early.
    #[schema(example = 30)]
    pub early_leave_threshold_minutes: u32,

    /// Hours worked below which the day is a half day.
    #[schema(example = 4.0)]
    pub min_full_day_hours: f64,
}

impl Default for TimingPolicy {
    fn default() -> Self {
        Self {
            work_start: NaiveTime::from_hms_opt(11, 0, 0).unwrap_or_default(),
            work_end: NaiveTime::from_hms_opt(18, 30, 0).unwrap_or_default(),
            late_threshold_minutes: 15,
            early_leave_threshold_minutes: 30,
            min_full_day_hours: 4.0,
        }
    }
}

/// Classification of a check-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum CheckInStatus {
    /// Within the late threshold.
    Present,
    /// Beyond the late threshold.
    Late,
}

/// Classification of a check-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum CheckOutStatus {
    /// A full day, leaving no earlier than the threshold allows.
    Present,
    /// Fewer than the minimum full-day hours were worked.
    HalfDay,
    /// A full day, but leaving earlier than the threshold allows.
    EarlyLeave,
}

/// Verdict for a single punch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict<S> {
    /// Classification.
    pub status: S,

    /// Message suitable for showing to the employee.
    pub message: String,
}

/// Elapsed wall-clock time between two punches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct WorkDuration {
    /// Whole hours.
    pub hours: i64,
    /// Remaining whole minutes (0-59).
    pub minutes: i64,
}

impl WorkDuration {
    /// Time from `check_in` to `check_out`, zero if the order is reversed.
    #[must_use]
    pub fn between(check_in: NaiveTime, check_out: NaiveTime) -> Self {
        let total_minutes = check_out
            .signed_duration_since(check_in)
            .num_minutes()
            .max(0);
        Self {
            hours: total_minutes / 60,
            minutes: total_minutes % 60,
        }
    }
}

impl fmt::Display for WorkDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}h {}m", self.hours, self.minutes)
    }
}

/// Classifies punches against a [`TimingPolicy`].
#[derive(Debug, Clone, Default)]
pub struct TimingValidator {
    policy: TimingPolicy,
}

impl TimingValidator {
    /// Create a validator for the given schedule.
    #[must_use]
    pub const fn new(policy: TimingPolicy) -> Self {
        Self { policy }
    }

    /// The schedule in use.
    #[must_use]
    pub const fn policy(&self) -> &TimingPolicy {
        &self.policy
    }

    /// Classify a check-in time.
    #[must_use]
    pub fn validate_check_in(&self, check_in: NaiveTime) -> Verdict<CheckInStatus> {
        let late_by = minutes_between(self.policy.work_start, check_in);

        if late_by > f64::from(self.policy.late_threshold_minutes) {
            return Verdict {
                status: CheckInStatus::Late,
                message: format!("You are {:.0} minutes late", late_by.round()),
            };
        }

        Verdict {
            status: CheckInStatus::Present,
            message: "On time".to_string(),
        }
    }

    /// Classify a check-out time given the same day's check-in.
    ///
    /// A half day takes priority over an early leave.
    #[must_use]
    pub fn validate_check_out(
        &self,
        check_out: NaiveTime,
        check_in: NaiveTime,
    ) -> Verdict<CheckOutStatus> {
        let worked_hours = minutes_between(check_in, check_out) / 60.0;
        if worked_hours < self.policy.min_full_day_hours {
            return Verdict {
                status: CheckOutStatus::HalfDay,
                message: format!(
                    "Less than {} hours worked",
                    self.policy.min_full_day_hours
                ),
            };
        }

        let early_by = minutes_between(check_out, self.policy.work_end);
        if early_by > f64::from(self.policy.early_leave_threshold_minutes) {
            return Verdict {
                status: CheckOutStatus::EarlyLeave,
                message: format!("Left {:.0} minutes early", early_by.round()),
            };
        }

        Verdict {
            status: CheckOutStatus::Present,
            message: "Full day completed".to_string(),
        }
    }
}

/// Elapsed time between two punches, or `None` if either is missing.
///
/// A check-out before the check-in yields zero rather than a negative span.
#[must_use]
pub fn calculate_work_duration(
    check_in: Option<NaiveTime>,
    check_out: Option<NaiveTime>,
) -> Option<WorkDuration> {
    Some(WorkDuration::between(check_in?, check_out?))
}

/// Signed minutes from `from` to `to`, with second precision.
#[allow(clippy::cast_precision_loss)]
fn minutes_between(from: NaiveTime, to: NaiveTime) -> f64 {
    to.signed_duration_since(from).num_seconds() as f64 / 60.0
}

/// Serde helpers for `HH:MM` times of day.
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{self, Deserialize, Deserializer, Serializer};

    /// Serialize as `HH:MM`.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn serialize<S>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    /// Deserialize from `HH:MM` or `HH:MM:SS`.
    ///
    /// # Errors
    ///
    /// Fails if the string is not a valid time of day.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        super::parse_time_of_day(&s).map_err(serde::de::Error::custom)
    }
}
