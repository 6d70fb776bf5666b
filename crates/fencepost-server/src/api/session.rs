//! Session endpoints.
//!
//! Auto-logout closes the session when the employee stays outside the
//! office; these endpoints report and re-open it.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use crate::state::SharedState;

/// Creates the session router.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(get_session))
        .route("/login", post(login))
}

/// Session status.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({ "logged_out": false }))]
pub struct SessionResponse {
    /// Whether auto-logout has closed the session.
    pub logged_out: bool,
}

/// Get the session status.
#[utoipa::path(
    get,
    path = "/api/session",
    tag = "session",
    operation_id = "getSession",
    summary = "Get session status",
    responses(
        (status = 200, description = "Session status", body = SessionResponse)
    )
)]
pub async fn get_session(State(state): State<SharedState>) -> Json<SessionResponse> {
    Json(SessionResponse {
        logged_out: state.session.is_logged_out(),
    })
}

/// Re-open the session after an auto-logout.
#[utoipa::path(
    post,
    path = "/api/session/login",
    tag = "session",
    operation_id = "login",
    summary = "Log in again",
    description = "Re-opens a session closed by auto-logout so punches are \
        accepted again.",
    responses(
        (status = 200, description = "Session open", body = SessionResponse)
    )
)]
pub async fn login(State(state): State<SharedState>) -> Json<SessionResponse> {
    if state.session.login() {
        info!("Session re-opened");
    }
    Json(SessionResponse {
        logged_out: state.session.is_logged_out(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing::{test_config, test_state};
    use axum_test::TestServer;
    use fencepost_core::LogoutHandler;

    #[tokio::test]
    async fn test_login_reopens_closed_session() {
        let state = test_state(test_config());
        state.session.logout().unwrap();
        let server = TestServer::new(router().with_state(state)).unwrap();

        let body: SessionResponse = server.get("/").await.json();
        assert!(body.logged_out);

        let body: SessionResponse = server.post("/login").await.json();
        assert!(!body.logged_out);
    }
}
