//! Device system routes: info, session inspection, reboot, monitor
//! registration.

use std::collections::BTreeMap;

use axum::{
    extract::State,
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::device::DeviceApi;
use crate::error::Result;
use crate::models::SuccessResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct MonitorConfigRequest {
    hostname: String,
    port: u16,
    #[serde(default)]
    path: String,
    #[serde(default = "default_request_timeout")]
    request_timeout: u32,
}

fn default_request_timeout() -> u32 {
    5000
}

pub fn system_routes() -> Router<AppState> {
    Router::new()
        .route("/info", get(system_info))
        .route("/session", get(session_info))
        .route("/reboot", post(reboot))
        .route("/monitor", post(configure_monitor))
}

/// GET /api/system/info
async fn system_info(State(state): State<AppState>) -> Result<Json<Value>> {
    Ok(Json(state.device.system_information().await?))
}

/// GET /api/system/session
async fn session_info(State(state): State<AppState>) -> Result<Json<Value>> {
    let valid = state.session.is_session_valid().await;
    Ok(Json(json!({
        "session": state.session.masked_token().await,
        "valid": valid,
    })))
}

/// POST /api/system/reboot (api-key protected)
async fn reboot(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<SuccessResponse>> {
    state.config.check_api_key(&headers)?;
    info!("rebooting device");
    let data = state.device.reboot().await?;
    Ok(Json(SuccessResponse::with_data(data)))
}

/// POST /api/system/monitor (api-key protected)
///
/// Points the device's monitor module at an event receiver, usually
/// this gateway itself.
async fn configure_monitor(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<MonitorConfigRequest>,
) -> Result<Json<SuccessResponse>> {
    state.config.check_api_key(&headers)?;

    let monitor: BTreeMap<String, String> = BTreeMap::from([
        ("hostname".to_string(), request.hostname.clone()),
        ("port".to_string(), request.port.to_string()),
        ("path".to_string(), request.path.clone()),
        ("request_timeout".to_string(), request.request_timeout.to_string()),
    ]);
    info!(hostname = %request.hostname, port = request.port, "registering monitor receiver");

    let data = state
        .device
        .set_configuration(BTreeMap::from([("monitor".to_string(), monitor)]))
        .await?;
    Ok(Json(SuccessResponse::with_data(data)))
}
