//! Unified error types for the fencepost core library.
//!
//! This module provides a unified error type [`FencepostError`] that covers all
//! failure modes across the presence engine. Each module also has its own
//! specific error type (`LocationError`, `ConfigError`, `AttendanceError`,
//! `StorageError`, `GeocodeError`, `LogoutError`) for internal use.
//!
//! # Design Principles
//!
//! - **Specific variants**: Each error variant captures exactly one failure mode
//! - **Actionable messages**: Error messages guide users toward resolution
//! - **HTTP-ready**: Error types include HTTP status codes and error codes
//!
//! # Example
//!
//! ```rust
//! use fencepost_core::error::{FencepostError, Result};
//! use fencepost_core::types::TrackingSession;
//!
//! fn require_fix(session: &TrackingSession) -> Result<()> {
//!     if session.last_sample.is_none() {
//!         return Err(FencepostError::NoCurrentFix);
//!     }
//!     Ok(())
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// The unified error type for all fencepost operations.
#[derive(Debug, Error)]
pub enum FencepostError {
    // =========================================================================
    // LOCATION ERRORS
    // =========================================================================
    /// The user refused location access.
    #[error("Location access denied. Re-enable location permission for this app.")]
    LocationPermissionDenied,

    /// The positioning hardware could not produce a fix.
    #[error("Location unavailable. Move to an area with better signal and try again.")]
    LocationUnavailable,

    /// No fix arrived in time, even after relaxed retries.
    #[error("Location request timed out. Try again in a moment.")]
    LocationTimedOut,

    /// Reverse geocoding failed.
    #[error("Geocoding failed: {0}")]
    GeocodingFailed(String),

    // =========================================================================
    // ATTENDANCE ERRORS
    // =========================================================================
    /// No position sample is available yet.
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

    /// A schedule time could not be parsed.
    #[error("Invalid time of day: '{0}'. Expected HH:MM (e.g., '09:30').")]
    InvalidTimeOfDay(String),

    // =========================================================================
    // SESSION ERRORS
    // =========================================================================
    /// The logout capability failed.
    #[error("Logout failed: {0}")]
    LogoutFailed(String),

    // =========================================================================
    // CONFIGURATION ERRORS
    // =========================================================================
    /// The configuration file was not found at the expected path.
    #[error("Configuration file not found at: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// The configuration could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    ConfigParseError(String),

    /// The configuration was parsed but contains invalid values.
    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    // =========================================================================
    // PERSISTENCE & I/O ERRORS
    // =========================================================================
    /// An error occurred while persisting or reading data.
    #[error("Persistence error: {0}")]
    PersistenceError(String),

    /// A low-level I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A specialized [`Result`] type for fencepost operations.
pub type Result<T> = std::result::Result<T, FencepostError>;

impl FencepostError {
    /// Returns `true` if this error is related to location acquisition.
    #[inline]
    #[must_use]
    pub const fn is_location_error(&self) -> bool {
        matches!(
            self,
            Self::LocationPermissionDenied
                | Self::LocationUnavailable
                | Self::LocationTimedOut
                | Self::GeocodingFailed(_)
        )
    }

    /// Returns `true` if this error is related to check-in or check-out.
    #[inline]
    #[must_use]
    pub const fn is_attendance_error(&self) -> bool {
        matches!(
            self,
            Self::NoCurrentFix
                | Self::NotWithinOffice
                | Self::AlreadyCheckedIn
                | Self::NotCheckedIn
                | Self::AlreadyCheckedOut
                | Self::InvalidTimeOfDay(_)
        )
    }

    /// Returns `true` if this error is related to configuration.
    #[inline]
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound(_) | Self::ConfigParseError(_) | Self::ConfigValidationError(_)
        )
    }

    /// Returns `true` if this error is related to I/O or persistence.
    #[inline]
    #[must_use]
    pub const fn is_io_error(&self) -> bool {
        matches!(self, Self::PersistenceError(_) | Self::IoError(_))
    }

    /// Returns `true` if this error represents an expected operational state.
    ///
    /// Refused punches are not system failures.
    #[inline]
    #[must_use]
    pub const fn is_expected_state(&self) -> bool {
        matches!(
            self,
            Self::NoCurrentFix
                | Self::NotWithinOffice
                | Self::AlreadyCheckedIn
                | Self::NotCheckedIn
                | Self::AlreadyCheckedOut
        )
    }

    /// Returns `true` if retrying later may succeed without user intervention.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::LocationUnavailable | Self::LocationTimedOut | Self::GeocodingFailed(_)
        )
    }

    /// Returns an HTTP-appropriate status code for this error.
    #[inline]
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - malformed input
            Self::InvalidTimeOfDay(_) => 400,

            // 403 Forbidden - understood but refused
            Self::LocationPermissionDenied | Self::NotWithinOffice => 403,

            // 404 Not Found
            Self::ConfigNotFound(_) => 404,

            // 409 Conflict - the day's record is in the wrong state
            Self::AlreadyCheckedIn | Self::NotCheckedIn | Self::AlreadyCheckedOut => 409,

            // 422 Unprocessable Entity - semantic errors
            Self::NoCurrentFix | Self::ConfigParseError(_) | Self::ConfigValidationError(_) => {
                422
            }

            // 500 Internal Server Error - server-side issues
            Self::LogoutFailed(_) | Self::PersistenceError(_) | Self::IoError(_) => 500,

            // 502 Bad Gateway - upstream geocoder failed
            Self::GeocodingFailed(_) => 502,

            // 503 Service Unavailable - no fix could be obtained
            Self::LocationUnavailable => 503,

            // 504 Gateway Timeout
            Self::LocationTimedOut => 504,
        }
    }

    /// Returns a machine-readable error code for API responses.
    #[inline]
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::LocationPermissionDenied => "LOCATION_PERMISSION_DENIED",
            Self::LocationUnavailable => "LOCATION_UNAVAILABLE",
            Self::LocationTimedOut => "LOCATION_TIMED_OUT",
            Self::GeocodingFailed(_) => "GEOCODING_FAILED",
            Self::NoCurrentFix => "NO_CURRENT_FIX",
            Self::NotWithinOffice => "NOT_WITHIN_OFFICE",
            Self::AlreadyCheckedIn => "ALREADY_CHECKED_IN",
            Self::NotCheckedIn => "NOT_CHECKED_IN",
            Self::AlreadyCheckedOut => "ALREADY_CHECKED_OUT",
            Self::InvalidTimeOfDay(_) => "INVALID_TIME_OF_DAY",
            Self::LogoutFailed(_) => "LOGOUT_FAILED",
            Self::ConfigNotFound(_) => "CONFIG_NOT_FOUND",
            Self::ConfigParseError(_) => "CONFIG_PARSE_ERROR",
            Self::ConfigValidationError(_) => "CONFIG_VALIDATION_ERROR",
            Self::PersistenceError(_) => "PERSISTENCE_ERROR",
            Self::IoError(_) => "IO_ERROR",
        }
    }
}

// =============================================================================
// CONVERSIONS FROM MODULE-SPECIFIC ERRORS
// =============================================================================

impl From<crate::location::LocationError> for FencepostError {
    fn from(err: crate::location::LocationError) -> Self {
        use crate::location::LocationError;
        match err {
            LocationError::PermissionDenied => Self::LocationPermissionDenied,
            LocationError::Unavailable => Self::LocationUnavailable,
            LocationError::TimedOut => Self::LocationTimedOut,
        }
    }
}

impl From<crate::geocode::GeocodeError> for FencepostError {
    fn from(err: crate::geocode::GeocodeError) -> Self {
        Self::GeocodingFailed(err.to_string())
    }
}

impl From<crate::timing::TimingError> for FencepostError {
    fn from(err: crate::timing::TimingError) -> Self {
        use crate::timing::TimingError;
        match err {
            TimingError::InvalidTimeOfDay(value) => Self::InvalidTimeOfDay(value),
        }
    }
}

impl From<crate::presence::LogoutError> for FencepostError {
    fn from(err: crate::presence::LogoutError) -> Self {
        Self::LogoutFailed(err.0)
    }
}

impl From<crate::storage::StorageError> for FencepostError {
    fn from(err: crate::storage::StorageError) -> Self {
        Self::PersistenceError(err.to_string())
    }
}

impl From<crate::attendance::AttendanceError> for FencepostError {
    fn from(err: crate::attendance::AttendanceError) -> Self {
        use crate::attendance::{AttendanceError, RecorderError};
        match err {
            AttendanceError::NoCurrentFix => Self::NoCurrentFix,
            AttendanceError::NotWithinOffice => Self::NotWithinOffice,
            AttendanceError::AlreadyCheckedIn => Self::AlreadyCheckedIn,
            AttendanceError::NotCheckedIn => Self::NotCheckedIn,
            AttendanceError::AlreadyCheckedOut => Self::AlreadyCheckedOut,
            AttendanceError::Recorder(RecorderError::Storage(e)) => e.into(),
            AttendanceError::Recorder(e @ RecorderError::Unavailable(_)) => {
                Self::PersistenceError(e.to_string())
            }
        }
    }
}

impl From<crate::config::ConfigError> for FencepostError {
    fn from(err: crate::config::ConfigError) -> Self {
        use crate::config::ConfigError;
        match err {
            ConfigError::NotFound(path) => Self::ConfigNotFound(path.into()),
            ConfigError::ReadError { path, source } => {
                Self::PersistenceError(format!("Failed to read {path}: {source}"))
            }
            ConfigError::WriteError { path, source } => {
                Self::PersistenceError(format!("Failed to write {path}: {source}"))
            }
            ConfigError::ParseError(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::SerializeError(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::ValidationError { field, message } => {
                Self::ConfigValidationError(format!("{field}: {message}"))
            }
            ConfigError::MultipleValidationErrors(errors) => {
                let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
                Self::ConfigValidationError(messages.join("; "))
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attendance::AttendanceError;
    use crate::config::ConfigError;
    use crate::location::LocationError;
    use std::io::{Error as IoErr, ErrorKind};

    #[test]
    fn test_location_error_classification() {
        assert!(FencepostError::LocationPermissionDenied.is_location_error());
        assert!(FencepostError::LocationTimedOut.is_location_error());
        assert!(FencepostError::GeocodingFailed("503".into()).is_location_error());

        assert!(!FencepostError::NoCurrentFix.is_location_error());
    }

    #[test]
    fn test_attendance_error_classification() {
        assert!(FencepostError::NotWithinOffice.is_attendance_error());
        assert!(FencepostError::AlreadyCheckedOut.is_attendance_error());
        assert!(FencepostError::InvalidTimeOfDay("25:00".into()).is_attendance_error());

        assert!(!FencepostError::LocationUnavailable.is_attendance_error());
    }

    #[test]
    fn test_config_and_io_classification() {
        assert!(FencepostError::ConfigNotFound(PathBuf::from("/etc")).is_config_error());
        assert!(FencepostError::ConfigValidationError("bad".into()).is_config_error());
        assert!(FencepostError::IoError(IoErr::new(ErrorKind::NotFound, "x")).is_io_error());
        assert!(FencepostError::PersistenceError("disk full".into()).is_io_error());

        assert!(!FencepostError::NotCheckedIn.is_io_error());
    }

    #[test]
    fn test_expected_state_and_recoverable() {
        assert!(FencepostError::AlreadyCheckedIn.is_expected_state());
        assert!(!FencepostError::LocationTimedOut.is_expected_state());

        assert!(FencepostError::LocationTimedOut.is_recoverable());
        assert!(!FencepostError::LocationPermissionDenied.is_recoverable());
    }

    #[test]
    fn test_http_status_codes() {
        assert_eq!(FencepostError::InvalidTimeOfDay("x".into()).http_status_code(), 400);
        assert_eq!(FencepostError::NotWithinOffice.http_status_code(), 403);
        assert_eq!(FencepostError::AlreadyCheckedIn.http_status_code(), 409);
        assert_eq!(FencepostError::NoCurrentFix.http_status_code(), 422);
        assert_eq!(FencepostError::LogoutFailed("x".into()).http_status_code(), 500);
        assert_eq!(FencepostError::LocationUnavailable.http_status_code(), 503);
        assert_eq!(FencepostError::LocationTimedOut.http_status_code(), 504);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            FencepostError::NotWithinOffice.error_code(),
            "NOT_WITHIN_OFFICE"
        );
        assert_eq!(
            FencepostError::LocationPermissionDenied.error_code(),
            "LOCATION_PERMISSION_DENIED"
        );
    }

    #[test]
    fn test_from_module_errors() {
        let err: FencepostError = LocationError::TimedOut.into();
        assert!(matches!(err, FencepostError::LocationTimedOut));

        let err: FencepostError = AttendanceError::AlreadyCheckedOut.into();
        assert!(matches!(err, FencepostError::AlreadyCheckedOut));

        let err: FencepostError = ConfigError::ValidationError {
            field: "tracking.buffer_max_m".into(),
            message: "too small".into(),
        }
        .into();
        assert!(err.to_string().contains("tracking.buffer_max_m: too small"));

        let err: FencepostError = IoErr::new(ErrorKind::NotFound, "gone").into();
        assert!(err.is_io_error());
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<FencepostError>();
        assert_sync::<FencepostError>();
    }
}
