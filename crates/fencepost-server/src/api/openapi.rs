//! OpenAPI specification for the fencepost API.
//!
//! Served at `/api/openapi.json` and written to disk by the `gen-openapi`
//! binary for client generation.

use axum::Json;
use fencepost_core::{
    AttendanceEntry, AttendanceStatus, CheckOutReceipt, Coordinate, DayRecord, FixStatus,
    LocationDisplay, LocationError, MembershipState, OfficeLocation, PositionSample,
    PunchKind, PunchLocation, RawFix, SessionError, SessionErrorKind, TimingPolicy,
    TrackingConfig, TrackingSession, WorkDuration,
};
use utoipa::OpenApi;

use super::attendance::TodayResponse;
use super::config::ConfigResponse;
use super::error::ErrorResponse;
use super::health::HealthResponse;
use super::location::{LocationReport, PushLocationResponse};
use super::session::SessionResponse;
use super::tracking::{LifecycleResponse, TrackingResponse};

/// Serve the OpenAPI specification as JSON.
pub async fn get_openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Returns the OpenAPI specification as pretty JSON.
///
/// # Errors
///
/// Returns an error if the document cannot be serialized.
pub fn get_openapi_json() -> serde_json::Result<String> {
    ApiDoc::openapi().to_pretty_json()
}

/// Main OpenAPI document structure for fencepost.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "fencepost API",
        version = "0.1.0",
        description = r#"
# fencepost API

fencepost tracks whether an employee is at the office and records their
attendance.

## Overview

1. **Location**: the employee's device reports fixes (or failures) to `POST /api/location`
2. **Tracking**: each fix is evaluated against the office fence, widened by a buffer that grows with the fix's inaccuracy
3. **Auto-logout**: staying outside the office past the configured delay closes the session
4. **Attendance**: check-in inside the office, check-out anywhere, classified against the work schedule
"#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "/", description = "Local fencepost server")
    ),
    tags(
        (name = "system", description = "Health checks"),
        (name = "tracking", description = "Presence session and tracking lifecycle"),
        (name = "location", description = "Fixes reported by the employee's device"),
        (name = "attendance", description = "Check-in, check-out and today's record"),
        (name = "session", description = "Session closed by auto-logout"),
        (name = "config", description = "Running configuration")
    ),
    paths(
        super::health::health_check,
        super::tracking::get_tracking,
        super::tracking::start_tracking,
        super::tracking::stop_tracking,
        super::tracking::refresh_location,
        super::location::push_location,
        super::attendance::check_in,
        super::attendance::check_out,
        super::attendance::get_today,
        super::session::get_session,
        super::session::login,
        super::config::get_config,
    ),
    components(
        schemas(
            ErrorResponse,
            HealthResponse,
            TrackingResponse,
            LifecycleResponse,
            LocationReport,
            PushLocationResponse,
            TodayResponse,
            SessionResponse,
            ConfigResponse,
            Coordinate,
            PositionSample,
            MembershipState,
            SessionError,
            SessionErrorKind,
            FixStatus,
            TrackingSession,
            LocationDisplay,
            LocationError,
            RawFix,
            PunchKind,
            PunchLocation,
            AttendanceStatus,
            AttendanceEntry,
            DayRecord,
            CheckOutReceipt,
            WorkDuration,
            OfficeLocation,
            TrackingConfig,
            TimingPolicy,
        )
    )
)]
pub struct ApiDoc;
