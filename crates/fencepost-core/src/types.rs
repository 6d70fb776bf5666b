//! Shared value types for the presence engine.
//!
//! Everything here is plain data: coordinates, position samples, fence
//! definitions and the tracking session snapshot that consumers read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Text shown wherever a position would be rendered but none is known yet.
pub const LOCATION_NOT_AVAILABLE: &str = "Location not available";

/// Address placeholder for a sample whose reverse lookup has not resolved.
pub const ADDRESS_PENDING: &str = "Getting address...";

/// A point on the Earth's surface in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({"latitude": 22.31882, "longitude": 73.187437}))]
pub struct Coordinate {
    /// Latitude in degrees, positive north.
    pub latitude: f64,

    /// Longitude in degrees, positive east.
    pub longitude: f64,
}

impl Coordinate {
    /// Create a coordinate from latitude and longitude in degrees.
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Whether both components are finite and within their degree ranges.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Render as `"lat, lon"` with six decimal places.
    #[must_use]
    pub fn to_fixed_string(&self) -> String {
        format!("{:.6}, {:.6}", self.latitude, self.longitude)
    }
}

/// A single resolved device position reading.
///
/// Samples are never mutated once published; a newer fix replaces the old
/// one wholesale. `accuracy_m` is `None` when the device did not report an
/// accuracy, which the geofence evaluator treats as maximally uncertain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PositionSample {
    /// Where the device is.
    pub coordinate: Coordinate,

    /// Reported horizontal accuracy radius in meters (never negative).
    #[schema(example = 35.0)]
    pub accuracy_m: Option<f64>,

    /// Altitude in meters, if reported.
    pub altitude_m: Option<f64>,

    /// Direction of travel in degrees clockwise from true north, if reported.
    pub heading_deg: Option<f64>,

    /// Ground speed in meters per second, if reported.
    pub speed_mps: Option<f64>,

    /// When the fix was taken (UTC).
    pub captured_at: DateTime<Utc>,

    /// Human-readable address from reverse geocoding, if resolved.
    #[schema(example = "Vadodara, Gujarat, India")]
    pub address: Option<String>,
}

impl PositionSample {
    /// Create a sample with no optional motion data and no address.
    ///
    /// A NaN accuracy is dropped and a negative one is clamped to zero so the
    /// `accuracy_m >= 0` invariant always holds.
    #[must_use]
    pub fn new(coordinate: Coordinate, accuracy_m: Option<f64>, captured_at: DateTime<Utc>) -> Self {
        Self {
            coordinate,
            accuracy_m: sanitize_accuracy(accuracy_m),
            altitude_m: None,
            heading_deg: None,
            speed_mps: None,
            captured_at,
            address: None,
        }
    }

    /// Return a copy of this sample carrying the given address.
    #[must_use]
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }
}

pub(crate) fn sanitize_accuracy(accuracy_m: Option<f64>) -> Option<f64> {
    accuracy_m.filter(|a| !a.is_nan()).map(|a| a.max(0.0))
}

/// A circular region used to test device presence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GeofenceDefinition {
    /// Center of the fence.
    pub center: Coordinate,

    /// Radius in meters (strictly positive).
    #[schema(example = 250.0)]
    pub radius_m: f64,
}

impl GeofenceDefinition {
    /// Create a fence around `center` with the given radius.
    #[must_use]
    pub const fn new(center: Coordinate, radius_m: f64) -> Self {
        Self { center, radius_m }
    }
}

/// Whether the device is inside the active fence.
///
/// `Unknown` only exists before the first sample is evaluated and is never
/// re-entered afterwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MembershipState {
    /// No sample has been evaluated yet.
    #[default]
    Unknown,
    /// The last evaluated sample was within the fence.
    Inside,
    /// The last evaluated sample was outside the fence.
    Outside,
}

impl MembershipState {
    /// Map an evaluator verdict to a membership state.
    #[must_use]
    pub const fn from_within(within: bool) -> Self {
        if within {
            Self::Inside
        } else {
            Self::Outside
        }
    }
}

/// Category of the most recent failure recorded on the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionErrorKind {
    /// The user refused location access.
    PermissionDenied,
    /// The positioning hardware could not produce a fix.
    Unavailable,
    /// No fix arrived within the acquisition timeout.
    TimedOut,
    /// The auto-logout fired but the logout capability failed.
    Logout,
}

/// The most recent failure recorded on the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SessionError {
    /// Failure category, used to pick a remediation.
    pub kind: SessionErrorKind,

    /// Human-readable description.
    #[schema(example = "Location request timed out")]
    pub message: String,
}

/// What a consumer can tell the user about the current fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FixStatus {
    /// A fix is available.
    Available,
    /// Nothing has been received yet.
    NoFix,
    /// Location access was denied; the user must re-grant permission.
    Denied,
    /// The fix is unavailable or timed out; retry or move to better signal.
    Unavailable,
}

/// Snapshot of the presence engine's state.
///
/// Owned by the engine; consumers only ever receive clones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TrackingSession {
    /// Whether continuous tracking is running.
    pub active: bool,

    /// The most recently processed sample. Survives stop/start.
    pub last_sample: Option<PositionSample>,

    /// The most recent failure, cleared by the next good sample.
    pub last_error: Option<SessionError>,

    /// Membership of `last_sample` in the active fence.
    pub membership: MembershipState,

    /// When the pending auto-logout fires, if one is pending.
    pub logout_deadline: Option<DateTime<Utc>>,
}

impl TrackingSession {
    /// Classify the session's fix for display.
    #[must_use]
    pub fn fix_status(&self) -> FixStatus {
        match self.last_error.as_ref().map(|e| e.kind) {
            Some(SessionErrorKind::PermissionDenied) => FixStatus::Denied,
            Some(SessionErrorKind::Unavailable | SessionErrorKind::TimedOut) => {
                FixStatus::Unavailable
            }
            Some(SessionErrorKind::Logout) | None => {
                if self.last_sample.is_some() {
                    FixStatus::Available
                } else {
                    FixStatus::NoFix
                }
            }
        }
    }

    /// Whether the last evaluated sample was inside the fence.
    #[must_use]
    pub fn is_within_office(&self) -> bool {
        self.membership == MembershipState::Inside
    }

    /// Whether the last evaluated sample was outside the fence.
    #[must_use]
    pub fn is_outside_office(&self) -> bool {
        self.membership == MembershipState::Outside
    }

    /// One-line description of where the device was last seen.
    #[must_use]
    pub fn location_text(&self) -> String {
        self.last_sample.as_ref().map_or_else(
            || LOCATION_NOT_AVAILABLE.to_string(),
            |s| {
                s.address
                    .clone()
                    .unwrap_or_else(|| s.coordinate.to_fixed_string())
            },
        )
    }
}

/// Display strings for a position sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "coords": "22.318820, 73.187437",
    "accuracy": "35m",
    "timestamp": "2025-01-15T05:30:00+00:00",
    "address": "Vadodara, Gujarat, India"
}))]
pub struct LocationDisplay {
    /// Coordinates with six decimal places.
    pub coords: String,

    /// Accuracy rounded to whole meters.
    pub accuracy: String,

    /// RFC 3339 capture time.
    pub timestamp: String,

    /// Resolved address or a pending placeholder.
    pub address: String,
}

impl From<&PositionSample> for LocationDisplay {
    fn from(sample: &PositionSample) -> Self {
        Self {
            coords: sample.coordinate.to_fixed_string(),
            accuracy: sample
                .accuracy_m
                .map_or_else(|| "unknown".to_string(), |a| format!("{}m", a.round())),
            timestamp: sample.captured_at.to_rfc3339(),
            address: sample
                .address
                .clone()
                .unwrap_or_else(|| ADDRESS_PENDING.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> PositionSample {
        PositionSample::new(
            Coordinate::new(22.318_82, 73.187_437),
            Some(34.6),
            Utc.with_ymd_and_hms(2025, 1, 15, 5, 30, 0).unwrap(),
        )
    }

    #[test]
    fn test_accuracy_is_never_negative() {
        let s = PositionSample::new(Coordinate::new(0.0, 0.0), Some(-3.0), Utc::now());
        assert_eq!(s.accuracy_m, Some(0.0));

        let s = PositionSample::new(Coordinate::new(0.0, 0.0), Some(f64::NAN), Utc::now());
        assert_eq!(s.accuracy_m, None);
    }

    #[test]
    fn test_coordinate_validity() {
        assert!(Coordinate::new(22.3, 73.1).is_valid());
        assert!(!Coordinate::new(91.0, 0.0).is_valid());
        assert!(!Coordinate::new(0.0, -180.5).is_valid());
        assert!(!Coordinate::new(f64::NAN, 0.0).is_valid());
    }

    #[test]
    fn test_fix_status_distinguishes_failures() {
        let mut session = TrackingSession::default();
        assert_eq!(session.fix_status(), FixStatus::NoFix);

        session.last_sample = Some(sample());
        assert_eq!(session.fix_status(), FixStatus::Available);

        session.last_error = Some(SessionError {
            kind: SessionErrorKind::PermissionDenied,
            message: "denied".into(),
        });
        assert_eq!(session.fix_status(), FixStatus::Denied);

        session.last_error = Some(SessionError {
            kind: SessionErrorKind::TimedOut,
            message: "timeout".into(),
        });
        assert_eq!(session.fix_status(), FixStatus::Unavailable);

        session.last_error = Some(SessionError {
            kind: SessionErrorKind::Logout,
            message: "logout failed".into(),
        });
        assert_eq!(session.fix_status(), FixStatus::Available);
    }

    #[test]
    fn test_location_display() {
        let display = LocationDisplay::from(&sample());
        assert_eq!(display.coords, "22.318820, 73.187437");
        assert_eq!(display.accuracy, "35m");
        assert_eq!(display.address, ADDRESS_PENDING);

        let display = LocationDisplay::from(&sample().with_address("Vadodara, Gujarat, India"));
        assert_eq!(display.address, "Vadodara, Gujarat, India");
    }

    #[test]
    fn test_location_text() {
        let mut session = TrackingSession::default();
        assert_eq!(session.location_text(), LOCATION_NOT_AVAILABLE);

        session.last_sample = Some(sample());
        assert_eq!(session.location_text(), "22.318820, 73.187437");

        session.last_sample = Some(sample().with_address("Vadodara, Gujarat, India"));
        assert_eq!(session.location_text(), "Vadodara, Gujarat, India");
    }

    #[test]
    fn test_membership_serialization() {
        let json = serde_json::to_string(&MembershipState::Outside).unwrap();
        assert_eq!(json, "\"outside\"");
        assert_eq!(MembershipState::default(), MembershipState::Unknown);
    }
}
