//! Attendance API endpoints.
//!
//! Check-in requires the device to be inside the office fence; check-out is
//! allowed anywhere once checked in. Both are refused while the session is
//! logged out.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use fencepost_core::{AttendanceEntry, AttendanceStatus, CheckOutReceipt, DayRecord, WorkDuration};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::error::{ApiError, ApiResult};
use crate::state::SharedState;

/// Creates the attendance router with all endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/check-in", post(check_in))
        .route("/check-out", post(check_out))
        .route("/today", get(get_today))
}

/// Today's attendance.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TodayResponse {
    /// Punches recorded today.
    pub record: DayRecord,

    /// Time between check-in and check-out, once both exist.
    #[schema(nullable)]
    pub work_duration: Option<WorkDuration>,

    /// The day's classification so far.
    #[schema(nullable)]
    pub status: Option<AttendanceStatus>,
}

fn require_session(state: &SharedState) -> ApiResult<()> {
    if state.session.is_logged_out() {
        return Err(ApiError::session_logged_out());
    }
    Ok(())
}

/// Check in.
#[utoipa::path(
    post,
    path = "/api/attendance/check-in",
    tag = "attendance",
    operation_id = "checkIn",
    summary = "Check in",
    description = "Records today's check-in at the last known location, \
        classified as present or late against the work schedule. Requires a \
        current fix inside the office fence.",
    responses(
        (status = 200, description = "Checked in", body = AttendanceEntry),
        (status = 401, description = "Session logged out", body = crate::api::ErrorResponse),
        (status = 403, description = "Not within the office", body = crate::api::ErrorResponse),
        (status = 409, description = "Already checked in", body = crate::api::ErrorResponse),
        (status = 422, description = "No current fix", body = crate::api::ErrorResponse)
    )
)]
pub async fn check_in(State(state): State<SharedState>) -> ApiResult<Json<AttendanceEntry>> {
    require_session(&state)?;
    let entry = state.desk.check_in(Utc::now()).await?;
    Ok(Json(entry))
}

/// Check out.
#[utoipa::path(
    post,
    path = "/api/attendance/check-out",
    tag = "attendance",
    operation_id = "checkOut",
    summary = "Check out",
    description = "Records today's check-out, classified as present, half \
        day or early leave, and reports the hours worked.",
    responses(
        (status = 200, description = "Checked out", body = CheckOutReceipt),
        (status = 401, description = "Session logged out", body = crate::api::ErrorResponse),
        (status = 409, description = "Not checked in, or already checked out", body = crate::api::ErrorResponse),
        (status = 422, description = "No current fix", body = crate::api::ErrorResponse)
    )
)]
pub async fn check_out(State(state): State<SharedState>) -> ApiResult<Json<CheckOutReceipt>> {
    require_session(&state)?;
    let receipt = state.desk.check_out(Utc::now()).await?;
    Ok(Json(receipt))
}

/// Get today's attendance.
#[utoipa::path(
    get,
    path = "/api/attendance/today",
    tag = "attendance",
    operation_id = "getToday",
    summary = "Get today's attendance",
    description = "Returns today's check-in and check-out in the configured \
        timezone, with the work duration once both exist.",
    responses(
        (status = 200, description = "Attendance retrieved", body = TodayResponse)
    )
)]
pub async fn get_today(State(state): State<SharedState>) -> ApiResult<Json<TodayResponse>> {
    let record = state.desk.today(Utc::now()).await?;
    Ok(Json(TodayResponse {
        work_duration: record.work_duration(),
        status: record.status(),
        record,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing::{test_config, test_state};
    use axum_test::TestServer;
    use fencepost_core::location::RawFix;
    use fencepost_core::{LogoutHandler, PunchKind};

    fn office_fix() -> RawFix {
        RawFix {
            latitude: 22.318_82,
            longitude: 73.187_437,
            accuracy_m: Some(10.0),
            altitude_m: None,
            heading_deg: None,
            speed_mps: None,
            captured_at: None,
        }
    }

    async fn server_at_office() -> (SharedState, TestServer) {
        let state = test_state(test_config());
        state.provider.push(Ok(office_fix()));
        state.engine.refresh().await.unwrap();
        let server = TestServer::new(router().with_state(state.clone())).unwrap();
        (state, server)
    }

    #[tokio::test]
    async fn test_check_in_without_fix_is_refused() {
        let state = test_state(test_config());
        let server = TestServer::new(router().with_state(state)).unwrap();

        let response = server.post("/check-in").await;
        response.assert_status(axum::http::StatusCode::UNPROCESSABLE_ENTITY);
        let body: crate::api::ErrorResponse = response.json();
        assert_eq!(body.error, "no_current_fix");
    }

    #[tokio::test]
    async fn test_full_day_flow() {
        let (_state, server) = server_at_office().await;

        let entry: AttendanceEntry = server.post("/check-in").await.json();
        assert_eq!(entry.kind, PunchKind::CheckIn);

        let response = server.post("/check-in").await;
        response.assert_status(axum::http::StatusCode::CONFLICT);

        let receipt: CheckOutReceipt = server.post("/check-out").await.json();
        assert_eq!(receipt.entry.kind, PunchKind::CheckOut);

        let today: TodayResponse = server.get("/today").await.json();
        assert!(today.record.check_in.is_some());
        assert!(today.record.check_out.is_some());
        assert!(today.work_duration.is_some());
    }

    #[tokio::test]
    async fn test_check_out_before_check_in_is_refused() {
        let (_state, server) = server_at_office().await;

        let response = server.post("/check-out").await;
        response.assert_status(axum::http::StatusCode::CONFLICT);
        let body: crate::api::ErrorResponse = response.json();
        assert_eq!(body.error, "not_checked_in");
    }

    #[tokio::test]
    async fn test_logged_out_session_refuses_punches() {
        let (state, server) = server_at_office().await;
        state.session.logout().unwrap();

        let response = server.post("/check-in").await;
        response.assert_status_unauthorized();
        let body: crate::api::ErrorResponse = response.json();
        assert_eq!(body.error, "session_logged_out");

        // Reading today's record is still allowed.
        server.get("/today").await.assert_status_ok();
    }
}
