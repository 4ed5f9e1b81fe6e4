//! REST API surface
//!
//! ## Responsibilities
//!
//! - HTTP routes for the custody, intercom and system surfaces
//! - Request validation and response formatting
//! - Device-facing monitor endpoints (push acknowledgement + relay)

mod custody_routes;
mod intercom_routes;
mod monitor_routes;
mod routes;
mod system_routes;

pub use monitor_routes::MonitorRelay;
pub use routes::create_router;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::models::HealthResponse;
use crate::state::AppState;

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let session_valid = state.session.is_session_valid().await;
    let firmware = state.firmware.cached().await.map(|f| f.version);

    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        device_session_valid: session_valid,
        firmware,
    })
}
