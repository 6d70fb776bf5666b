//! # fencepost-server
//!
//! HTTP server for the fencepost attendance tracker.
//!
//! This binary provides:
//! - REST API for location reports, presence tracking and attendance
//! - OpenAPI documentation via Swagger UI at `/docs`
//! - Structured logging to file and stdout
//!
//! ## Running
//!
//! ```bash
//! # Development
//! cargo run --package fencepost-server
//!
//! # Production
//! FENCEPOST_ENV=production ./fencepost-server
//! ```
//!
//! The configuration file defaults to the platform config path and can be
//! overridden with `FENCEPOST_CONFIG`; the listen address with
//! `FENCEPOST_BIND` (default `0.0.0.0:3000`).

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use fencepost_core::Config;
use fencepost_server::api::{self, ApiDoc};
use fencepost_server::logging::{self, LogMode};
use fencepost_server::state::AppState;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

const DEFAULT_BIND: &str = "0.0.0.0:3000";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mode = LogMode::from_env();
    logging::init(mode)?;

    info!(?mode, version = env!("CARGO_PKG_VERSION"), "Starting fencepost-server");

    let config_path = match std::env::var_os("FENCEPOST_CONFIG") {
        Some(path) => PathBuf::from(path),
        None => Config::default_path()?,
    };
    let config = Config::load_or_default(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    let state = Arc::new(AppState::new(config)?);
    let engine = state.engine.clone();

    let app = api::create_router(state)
        .merge(SwaggerUi::new("/docs").url("/docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let bind = std::env::var("FENCEPOST_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string());
    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid FENCEPOST_BIND '{bind}'"))?;
    let listener = TcpListener::bind(addr).await?;

    info!(%addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown requested");
        })
        .await?;

    engine.stop();
    info!("fencepost-server stopped");
    Ok(())
}
