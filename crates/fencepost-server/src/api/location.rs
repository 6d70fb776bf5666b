//! Location push endpoint.
//!
//! The employee's device owns the positioning hardware. It reports each fix,
//! or the reason it could not get one, to this endpoint; the presence engine
//! consumes the reports through the push provider.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use fencepost_core::{Coordinate, LocationError, RawFix};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::error::{ApiError, ApiResult};
use crate::state::SharedState;

/// Creates the location router.
pub fn router() -> Router<SharedState> {
    Router::new().route("/", post(push_location))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// A report from the device: a fix, or why there is none.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
#[schema(example = json!({
    "type": "fix",
    "latitude": 22.31882,
    "longitude": 73.187437,
    "accuracy_m": 35.0
}))]
pub enum LocationReport {
    /// A position fix.
    Fix(RawFix),

    /// The device could not produce a fix.
    Failure {
        /// Why acquisition failed.
        error: LocationError,
    },
}

/// Acknowledgement of a report.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({ "accepted": true, "subscribers": 1 }))]
pub struct PushLocationResponse {
    /// The report was accepted.
    pub accepted: bool,

    /// How many waiting acquisitions received it.
    #[schema(example = 1)]
    pub subscribers: usize,
}

// ============================================================================
// Handlers
// ============================================================================

/// Report a fix or acquisition failure from the device.
#[utoipa::path(
    post,
    path = "/api/location",
    tag = "location",
    operation_id = "pushLocation",
    summary = "Report the device location",
    description = "Delivers a position fix (or a failure such as denied \
        permission) from the employee's device. While tracking, fixes are \
        evaluated against the office fence immediately.",
    request_body = LocationReport,
    responses(
        (status = 200, description = "Report accepted", body = PushLocationResponse),
        (status = 400, description = "Coordinates out of range", body = crate::api::ErrorResponse)
    )
)]
pub async fn push_location(
    State(state): State<SharedState>,
    Json(report): Json<LocationReport>,
) -> ApiResult<Json<PushLocationResponse>> {
    let result = match report {
        LocationReport::Fix(fix) => {
            if !Coordinate::new(fix.latitude, fix.longitude).is_valid() {
                return Err(ApiError::bad_request(
                    "invalid_coordinate",
                    format!(
                        "({}, {}) is not a valid latitude/longitude pair",
                        fix.latitude, fix.longitude
                    ),
                ));
            }
            Ok(fix)
        }
        LocationReport::Failure { error } => Err(error),
    };

    let subscribers = state.provider.push(result);
    Ok(Json(PushLocationResponse {
        accepted: true,
        subscribers,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing::{test_config, test_state};
    use axum_test::TestServer;
    use serde_json::json;

    #[test]
    fn test_report_deserialization() {
        let report: LocationReport = serde_json::from_value(json!({
            "type": "fix",
            "latitude": 1.5,
            "longitude": 2.5
        }))
        .unwrap();
        assert!(matches!(report, LocationReport::Fix(f) if f.accuracy_m.is_none()));

        let report: LocationReport = serde_json::from_value(json!({
            "type": "failure",
            "error": "timed_out"
        }))
        .unwrap();
        assert!(matches!(
            report,
            LocationReport::Failure { error: LocationError::TimedOut }
        ));
    }

    #[tokio::test]
    async fn test_pushed_fix_is_cached() {
        let state = test_state(test_config());
        let server = TestServer::new(router().with_state(state.clone())).unwrap();

        let response = server
            .post("/")
            .json(&json!({ "type": "fix", "latitude": 22.3, "longitude": 73.1, "accuracy_m": 20.0 }))
            .await;
        response.assert_status_ok();

        let latest = state.provider.latest().unwrap();
        assert!((latest.latitude - 22.3).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_out_of_range_fix_is_rejected() {
        let state = test_state(test_config());
        let server = TestServer::new(router().with_state(state.clone())).unwrap();

        let response = server
            .post("/")
            .json(&json!({ "type": "fix", "latitude": 91.0, "longitude": 0.0 }))
            .await;
        response.assert_status_bad_request();
        assert!(state.provider.latest().is_none());
    }

    #[tokio::test]
    async fn test_tracking_engine_ingests_pushed_fix() {
        let state = test_state(test_config());
        state.engine.start();
        let server = TestServer::new(router().with_state(state.clone())).unwrap();

        // Give the watch task a chance to subscribe.
        for _ in 0..50 {
            let body: PushLocationResponse = server
                .post("/")
                .json(&json!({ "type": "fix", "latitude": 22.31882, "longitude": 73.187437, "accuracy_m": 10.0 }))
                .await
                .json();
            if body.subscribers > 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        for _ in 0..50 {
            if state.engine.snapshot().is_within_office() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(state.engine.snapshot().is_within_office());
        state.engine.stop();
    }
}
