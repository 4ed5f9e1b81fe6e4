//! SIP intercom routes

use axum::{
    body::Bytes,
    extract::State,
    http::header,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::models::SuccessResponse;
use crate::state::AppState;

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct SetConfigRequest {
    pjsip: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct AutoCallRequest {
    #[serde(default = "default_true")]
    enabled: bool,
    target: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AutoAnswerRequest {
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default)]
    delay: u32,
}

#[derive(Debug, Deserialize)]
struct VolumesRequest {
    mic_volume: i64,
    speaker_volume: i64,
}

#[derive(Debug, Deserialize)]
struct DoorReleaseRequest {
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default = "default_door_command")]
    command: String,
}

fn default_door_command() -> String {
    "#1234".to_string()
}

#[derive(Debug, Deserialize)]
struct EnabledRequest {
    enabled: bool,
}

#[derive(Debug, Default, Deserialize)]
struct CallRequest {
    target: Option<String>,
}

pub fn intercom_routes() -> Router<AppState> {
    Router::new()
        .route("/config", get(get_config).post(set_config))
        .route("/status", get(get_status))
        // Alias kept for older clients
        .route("/call/status", get(get_status).post(get_status))
        .route("/call", post(make_call))
        .route("/call/end", post(end_call))
        .route("/volumes", post(set_volumes))
        .route("/auto-call", post(configure_auto_call))
        .route("/auto-answer", post(configure_auto_answer))
        .route("/door/open", post(configure_door_release))
        .route("/video", post(configure_video))
        .route("/facial-id", post(configure_facial_id))
        .route("/audio", get(download_audio).post(upload_audio))
        .route("/audio/exists", get(has_audio))
}

/// GET /api/interfonia-sip/config
async fn get_config(State(state): State<AppState>) -> Result<Json<Value>> {
    Ok(Json(state.intercom.get_config().await?))
}

/// POST /api/interfonia-sip/config - raw PJSIP write
async fn set_config(
    State(state): State<AppState>,
    Json(request): Json<SetConfigRequest>,
) -> Result<Json<SuccessResponse>> {
    let pjsip = request
        .pjsip
        .as_ref()
        .and_then(|p| p.as_object())
        .ok_or_else(|| Error::validation("pjsip object is required"))?;
    let data = state.intercom.set_config(pjsip).await?;
    Ok(Json(SuccessResponse::with_data(data)))
}

/// GET /api/interfonia-sip/status
async fn get_status(State(state): State<AppState>) -> Result<impl IntoResponse> {
    Ok(Json(state.intercom.sip_status().await?))
}

/// POST /api/interfonia-sip/call
async fn make_call(
    State(state): State<AppState>,
    request: Option<Json<CallRequest>>,
) -> Result<Json<SuccessResponse>> {
    let target = request
        .and_then(|Json(r)| r.target)
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| Error::validation("target is required"))?;
    let data = state.intercom.make_call(&target).await?;
    Ok(Json(SuccessResponse::with_data(data)))
}

/// POST /api/interfonia-sip/call/end
async fn end_call(State(state): State<AppState>) -> Result<Json<SuccessResponse>> {
    let data = state.intercom.finalize_call().await?;
    Ok(Json(SuccessResponse::with_data(data)))
}

/// POST /api/interfonia-sip/volumes
async fn set_volumes(
    State(state): State<AppState>,
    Json(request): Json<VolumesRequest>,
) -> Result<Json<Value>> {
    let applied = state
        .intercom
        .set_volumes(request.mic_volume, request.speaker_volume)
        .await?;
    Ok(Json(serde_json::json!({ "success": true, "applied": applied })))
}

/// POST /api/interfonia-sip/auto-call
async fn configure_auto_call(
    State(state): State<AppState>,
    Json(request): Json<AutoCallRequest>,
) -> Result<Json<SuccessResponse>> {
    let data = state
        .intercom
        .configure_auto_call(request.enabled, request.target.as_deref())
        .await?;
    Ok(Json(SuccessResponse::with_data(data)))
}

/// POST /api/interfonia-sip/auto-answer
async fn configure_auto_answer(
    State(state): State<AppState>,
    Json(request): Json<AutoAnswerRequest>,
) -> Result<Json<SuccessResponse>> {
    let data = state
        .intercom
        .configure_auto_answer(request.enabled, request.delay)
        .await?;
    Ok(Json(SuccessResponse::with_data(data)))
}

/// POST /api/interfonia-sip/door/open
async fn configure_door_release(
    State(state): State<AppState>,
    Json(request): Json<DoorReleaseRequest>,
) -> Result<Json<SuccessResponse>> {
    let data = state
        .intercom
        .configure_door_release(request.enabled, &request.command)
        .await?;
    Ok(Json(SuccessResponse::with_data(data)))
}

/// POST /api/interfonia-sip/video
async fn configure_video(
    State(state): State<AppState>,
    Json(request): Json<EnabledRequest>,
) -> Result<Json<SuccessResponse>> {
    let data = state.intercom.configure_video(request.enabled).await?;
    Ok(Json(SuccessResponse::with_data(data)))
}

/// POST /api/interfonia-sip/facial-id
async fn configure_facial_id(
    State(state): State<AppState>,
    Json(request): Json<EnabledRequest>,
) -> Result<Json<SuccessResponse>> {
    let data = state.intercom.configure_facial_id(request.enabled).await?;
    Ok(Json(SuccessResponse::with_data(data)))
}

/// POST /api/interfonia-sip/audio - raw octet-stream upload
async fn upload_audio(State(state): State<AppState>, body: Bytes) -> Result<Json<SuccessResponse>> {
    let data = state.intercom.upload_audio(body.to_vec()).await?;
    Ok(Json(SuccessResponse::with_data(data)))
}

/// GET /api/interfonia-sip/audio - raw download
async fn download_audio(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let bytes = state.intercom.download_audio().await?;
    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        bytes,
    ))
}

/// GET /api/interfonia-sip/audio/exists
async fn has_audio(State(state): State<AppState>) -> Result<Json<Value>> {
    Ok(Json(state.intercom.has_audio().await?))
}
