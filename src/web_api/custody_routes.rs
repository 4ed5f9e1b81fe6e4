//! Custody workflow routes

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};

use crate::custody::{
    CustodySetupResponse, CustodyTestParams, CustodyTestReport, DualCustodyParams,
    IdentificationConfig, SimpleCustodyParams,
};
use crate::error::Result;
use crate::state::AppState;

pub fn custody_routes() -> Router<AppState> {
    Router::new()
        .route("/config", get(identification_config))
        .route("/setup/simple", post(setup_simple))
        .route("/setup/dual", post(setup_dual))
        .route("/setup/reset", post(reset_to_default))
        .route("/test", post(test_flow))
}

/// GET /api/custody/config
async fn identification_config(
    State(state): State<AppState>,
) -> Result<Json<IdentificationConfig>> {
    Ok(Json(state.custody.identification_config().await?))
}

/// POST /api/custody/setup/simple - body optional
async fn setup_simple(
    State(state): State<AppState>,
    params: Option<Json<SimpleCustodyParams>>,
) -> Result<Json<CustodySetupResponse>> {
    let params = params.map(|Json(p)| p).unwrap_or_default();
    Ok(Json(state.custody.setup_simple(params).await?))
}

/// POST /api/custody/setup/dual - requires `sip_target`
async fn setup_dual(
    State(state): State<AppState>,
    params: Option<Json<DualCustodyParams>>,
) -> Result<Json<CustodySetupResponse>> {
    let params = params.map(|Json(p)| p).unwrap_or_default();
    Ok(Json(state.custody.setup_dual(params).await?))
}

/// POST /api/custody/setup/reset
async fn reset_to_default(State(state): State<AppState>) -> Result<Json<CustodySetupResponse>> {
    Ok(Json(state.custody.reset_to_default().await?))
}

/// POST /api/custody/test - read-only diagnostic
async fn test_flow(
    State(state): State<AppState>,
    params: Option<Json<CustodyTestParams>>,
) -> Result<Json<CustodyTestReport>> {
    let params = params.map(|Json(p)| p).unwrap_or_default();
    Ok(Json(state.custody.test_dual_custody_flow(params).await?))
}
