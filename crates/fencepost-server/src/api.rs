//! HTTP API routes and handlers.
//!
//! This module contains all HTTP endpoint implementations organized by domain:
//! - `attendance` - Check-in, check-out and today's record
//! - `config` - Running configuration
//! - `health` - Service health checks
//! - `location` - Fixes pushed by the employee's device
//! - `session` - Session closed by auto-logout
//! - `tracking` - Presence session and tracking lifecycle
//! - `error` - API error types
//! - `openapi` - OpenAPI specification generation

use axum::routing::get;
use axum::Router;

use crate::state::SharedState;

pub mod attendance;
pub mod config;
pub mod error;
pub mod health;
pub mod location;
pub mod openapi;
pub mod session;
pub mod tracking;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use openapi::{get_openapi_json, ApiDoc};

/// Creates the combined API router with all endpoints.
///
/// # Route Structure
///
/// ```text
/// /health                - Health check
/// /api
/// ├── /tracking          - Session snapshot, start, stop, refresh
/// ├── /location          - Device location reports
/// ├── /attendance        - Check-in, check-out, today
/// ├── /session           - Session status and login
/// ├── /config            - Running configuration
/// └── /openapi.json      - OpenAPI specification
/// ```
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .nest("/health", health::router())
        .nest(
            "/api",
            Router::new()
                .route("/openapi.json", get(openapi::get_openapi_spec))
                .nest("/tracking", tracking::router())
                .nest("/location", location::router())
                .nest("/attendance", attendance::router())
                .nest("/session", session::router())
                .nest("/config", config::router()),
        )
        .with_state(state)
}
