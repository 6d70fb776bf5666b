//! Presence tracking API endpoints.
//!
//! Expose the presence engine's session and lifecycle: where the device was
//! last seen, whether it is inside the office, and any pending auto-logout.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use fencepost_core::{FixStatus, LocationDisplay, TrackingSession};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::error::ApiResult;
use crate::state::{AppState, SharedState};

/// Creates the tracking router with all endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(get_tracking))
        .route("/start", post(start_tracking))
        .route("/stop", post(stop_tracking))
        .route("/refresh", post(refresh_location))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// The presence session with display helpers.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TrackingResponse {
    /// Raw engine state.
    pub session: TrackingSession,

    /// What can be told about the current fix.
    pub fix_status: FixStatus,

    /// Display strings for the last sample, if any.
    #[schema(nullable)]
    pub display: Option<LocationDisplay>,

    /// One-line description of the last known location.
    #[schema(example = "Vadodara, Gujarat, India")]
    pub location_text: String,

    /// Whether the last sample meets the accuracy threshold.
    #[schema(example = true)]
    pub accurate: bool,

    /// Name of the office being tracked.
    #[schema(example = "Main Office")]
    pub office: String,
}

impl TrackingResponse {
    fn from_state(state: &AppState) -> Self {
        let session = state.engine.snapshot();
        let evaluator = &state.engine.settings().evaluator;
        Self {
            fix_status: session.fix_status(),
            display: session.last_sample.as_ref().map(LocationDisplay::from),
            location_text: session.location_text(),
            accurate: evaluator.is_accurate(session.last_sample.as_ref()),
            office: state
                .config
                .active_office()
                .map(|o| o.name.clone())
                .unwrap_or_default(),
            session,
        }
    }
}

/// Result of a start or stop request.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({ "changed": true, "active": true }))]
pub struct LifecycleResponse {
    /// Whether the request changed the tracking state.
    pub changed: bool,

    /// Whether tracking is running now.
    pub active: bool,
}

// ============================================================================
// Handlers
// ============================================================================

/// Get the current presence session.
#[utoipa::path(
    get,
    path = "/api/tracking",
    tag = "tracking",
    operation_id = "getTracking",
    summary = "Get the presence session",
    description = "Returns the last sample, membership in the office fence, the \
        most recent acquisition failure and any pending auto-logout deadline.",
    responses(
        (status = 200, description = "Session retrieved", body = TrackingResponse)
    )
)]
pub async fn get_tracking(State(state): State<SharedState>) -> Json<TrackingResponse> {
    Json(TrackingResponse::from_state(&state))
}

/// Start continuous tracking.
#[utoipa::path(
    post,
    path = "/api/tracking/start",
    tag = "tracking",
    operation_id = "startTracking",
    summary = "Start continuous tracking",
    description = "Subscribes to pushed fixes and begins evaluating office \
        membership. Starting while already tracking changes nothing.",
    responses(
        (status = 200, description = "Tracking running", body = LifecycleResponse)
    )
)]
pub async fn start_tracking(State(state): State<SharedState>) -> Json<LifecycleResponse> {
    let changed = state.engine.start();
    Json(LifecycleResponse {
        changed,
        active: state.engine.is_active(),
    })
}

/// Stop continuous tracking.
#[utoipa::path(
    post,
    path = "/api/tracking/stop",
    tag = "tracking",
    operation_id = "stopTracking",
    summary = "Stop continuous tracking",
    description = "Stops evaluation and cancels any pending auto-logout. The \
        last sample and membership are kept.",
    responses(
        (status = 200, description = "Tracking stopped", body = LifecycleResponse)
    )
)]
pub async fn stop_tracking(State(state): State<SharedState>) -> Json<LifecycleResponse> {
    let changed = state.engine.stop();
    Json(LifecycleResponse {
        changed,
        active: state.engine.is_active(),
    })
}

/// Acquire a fresh fix.
#[utoipa::path(
    post,
    path = "/api/tracking/refresh",
    tag = "tracking",
    operation_id = "refreshLocation",
    summary = "Refresh the location",
    description = "Acquires a one-shot fix (retrying with relaxed settings) \
        and evaluates it. While tracking this may fire enter/exit events.",
    responses(
        (status = 200, description = "Fix acquired", body = TrackingResponse),
        (status = 403, description = "Location permission denied", body = crate::api::ErrorResponse),
        (status = 503, description = "Location unavailable", body = crate::api::ErrorResponse),
        (status = 504, description = "Location request timed out", body = crate::api::ErrorResponse)
    )
)]
pub async fn refresh_location(
    State(state): State<SharedState>,
) -> ApiResult<Json<TrackingResponse>> {
    state.engine.refresh().await?;
    Ok(Json(TrackingResponse::from_state(&state)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing::{test_config, test_state};
    use axum_test::TestServer;
    use fencepost_core::location::RawFix;
    use fencepost_core::MembershipState;

    fn fix(latitude: f64, longitude: f64) -> RawFix {
        RawFix {
            latitude,
            longitude,
            accuracy_m: Some(10.0),
            altitude_m: None,
            heading_deg: None,
            speed_mps: None,
            captured_at: None,
        }
    }

    #[tokio::test]
    async fn test_idle_session_has_no_fix() {
        let state = test_state(test_config());
        let server = TestServer::new(router().with_state(state)).unwrap();

        let body: TrackingResponse = server.get("/").await.json();
        assert_eq!(body.fix_status, FixStatus::NoFix);
        assert_eq!(body.location_text, "Location not available");
        assert_eq!(body.office, "Main Office");
        assert!(body.display.is_none());
    }

    #[tokio::test]
    async fn test_start_and_stop_are_idempotent() {
        let state = test_state(test_config());
        let server = TestServer::new(router().with_state(state)).unwrap();

        let body: LifecycleResponse = server.post("/start").await.json();
        assert!(body.changed && body.active);
        let body: LifecycleResponse = server.post("/start").await.json();
        assert!(!body.changed && body.active);

        let body: LifecycleResponse = server.post("/stop").await.json();
        assert!(body.changed && !body.active);
        let body: LifecycleResponse = server.post("/stop").await.json();
        assert!(!body.changed && !body.active);
    }

    #[tokio::test]
    async fn test_refresh_evaluates_pushed_fix() {
        let state = test_state(test_config());
        state.provider.push(Ok(fix(22.318_82, 73.187_437)));
        let server = TestServer::new(router().with_state(state)).unwrap();

        let response = server.post("/refresh").await;
        response.assert_status_ok();
        let body: TrackingResponse = response.json();
        assert_eq!(body.session.membership, MembershipState::Inside);
        assert_eq!(body.fix_status, FixStatus::Available);
        assert!(body.accurate);
        assert_eq!(body.location_text, "22.318820, 73.187437");
    }

    #[tokio::test]
    async fn test_refresh_reports_pushed_failure() {
        let state = test_state(test_config());
        // Failures are not cached, so keep reporting until the one-shot is waiting.
        let provider = state.provider.clone();
        let reporter = tokio::spawn(async move {
            loop {
                provider.push(Err(fencepost_core::LocationError::PermissionDenied));
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        });
        let server = TestServer::new(router().with_state(state.clone())).unwrap();

        let response = server.post("/refresh").await;
        reporter.abort();
        assert_eq!(
            state.engine.snapshot().fix_status(),
            FixStatus::Denied
        );
        response.assert_status_forbidden();
        let body: crate::api::ErrorResponse = response.json();
        assert_eq!(body.error, "location_permission_denied");
    }
}
