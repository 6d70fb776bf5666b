//! Configuration API endpoint.
//!
//! Read-only view of the settings the running engine was built from.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use fencepost_core::{OfficeLocation, TimingPolicy, TrackingConfig};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::SharedState;

/// Creates the config router.
pub fn router() -> Router<SharedState> {
    Router::new().route("/", get(get_config))
}

/// Current configuration response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConfigResponse {
    /// All configured office fences.
    pub offices: Vec<OfficeLocation>,

    /// Name of the fence presence is evaluated against.
    #[schema(example = "Main Office")]
    pub active_office: String,

    /// Tracking timings and tolerances.
    pub tracking: TrackingConfig,

    /// The work schedule.
    pub schedule: TimingPolicy,

    /// Configured timezone (IANA format).
    #[schema(example = "Asia/Kolkata")]
    pub timezone: String,

    /// Whether samples are reverse geocoded.
    #[schema(example = true)]
    pub geocoding_enabled: bool,

    /// Whether entering and leaving the office punches automatically.
    #[schema(example = false)]
    pub auto_attendance: bool,
}

/// Get current configuration.
#[utoipa::path(
    get,
    path = "/api/config",
    tag = "config",
    operation_id = "getConfig",
    summary = "Get current configuration",
    description = "Returns the office fences, tracking settings, work \
        schedule and timezone the server is running with.",
    responses(
        (status = 200, description = "Configuration retrieved", body = ConfigResponse)
    )
)]
pub async fn get_config(State(state): State<SharedState>) -> Json<ConfigResponse> {
    let config = &state.config;
    Json(ConfigResponse {
        offices: config.office.locations.clone(),
        active_office: config
            .active_office()
            .map(|o| o.name.clone())
            .unwrap_or_default(),
        tracking: config.tracking.clone(),
        schedule: config.schedule.clone(),
        timezone: config.system.timezone.name().to_string(),
        geocoding_enabled: config.geocoding.enabled,
        auto_attendance: state.auto_attendance_enabled(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing::{test_config, test_state};
    use axum_test::TestServer;

    #[tokio::test]
    async fn test_config_reflects_loaded_settings() {
        let state = test_state(test_config());
        let server = TestServer::new(router().with_state(state)).unwrap();

        let body: ConfigResponse = server.get("/").await.json();
        assert_eq!(body.active_office, "Main Office");
        assert_eq!(body.offices.len(), 1);
        assert_eq!(body.timezone, "Asia/Kolkata");
        assert!(!body.geocoding_enabled);
        assert!(!body.auto_attendance);
    }
}
