//! # fencepost-core
//!
//! Core business logic for the fencepost attendance tracker.
//!
//! This crate provides:
//! - Position acquisition with retry budgets and relaxed restarts
//! - Geofence evaluation with an accuracy-scaled buffer
//! - A presence state machine with enter/exit callbacks and auto-logout
//! - Check-in/check-out timing validation and an attendance journal
//! - Configuration management (office fences, schedule, timezone)
//!
//! ## Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`types`] - Shared types and OpenAPI schemas
//! - [`distance`] - Great-circle distance between coordinates
//! - [`location`] - Position providers and the location source
//! - [`geocode`] - Reverse geocoding of samples into addresses
//! - [`geofence`] - Fence membership and accuracy checks
//! - [`timing`] - Work schedule validation
//! - [`scheduler`] - Cancellable delayed tasks
//! - [`registry`] - Geofence enter/exit callback registry
//! - [`presence`] - The presence engine
//! - [`attendance`] - Check-in/check-out desk
//! - [`storage`] - Persistent attendance journal using JSON files
//! - [`config`] - Application configuration loading, saving, and validation
//! - [`error`] - Unified error types for the crate

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod attendance;
pub mod config;
pub mod distance;
pub mod error;
pub mod geocode;
pub mod geofence;
pub mod location;
pub mod presence;
pub mod registry;
pub mod scheduler;
pub mod storage;
pub mod timing;
pub mod types;

// Re-export primary types for convenience
pub use attendance::{
    AttendanceDesk, AttendanceEntry, AttendanceError, AttendanceRecorder, AttendanceStatus,
    CheckOutReceipt, DayRecord, MemoryRecorder, PunchKind, PunchLocation, RecorderError,
};
pub use config::{
    Config, ConfigError, ConfigResult, GeocodingConfig, OfficeConfig, OfficeLocation,
    SystemConfig, TrackingConfig,
};
pub use distance::distance;
pub use error::{FencepostError, Result};
#[cfg(feature = "http-geocoder")]
pub use geocode::HttpReverseGeocoder;
pub use geocode::{GeocodeError, ReverseGeocoder};
pub use geofence::GeofenceEvaluator;
pub use location::push::PushPositionProvider;
pub use location::{
    AcquisitionOptions, AcquisitionPolicy, LocationError, LocationResult, LocationSource,
    PositionProvider, RawFix,
};
pub use presence::{LogoutError, LogoutHandler, PresenceEngine, PresenceSettings};
pub use registry::{CallbackRegistry, GeofenceCallbacks, Registration};
pub use scheduler::{CancelToken, Scheduler, TokioScheduler};
pub use storage::{default_data_dir, JournalRecorder, StorageError};
pub use timing::{
    CheckInStatus, CheckOutStatus, TimingError, TimingPolicy, TimingValidator, Verdict,
    WorkDuration,
};
pub use types::{
    Coordinate, FixStatus, GeofenceDefinition, LocationDisplay, MembershipState, PositionSample,
    SessionError, SessionErrorKind, TrackingSession,
};
