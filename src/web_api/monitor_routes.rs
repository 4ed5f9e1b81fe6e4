//! Device-facing monitor callbacks.
//!
//! Once the monitor module is pointed at this gateway, the device
//! pushes identification events and keepalives here. Each event is
//! acknowledged immediately and optionally relayed to an external
//! listener in the background.

use std::time::Duration;

use axum::{extract::State, routing::post, Json, Router};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::state::AppState;

/// Fire-and-forget forwarder for device push events.
#[derive(Debug, Clone)]
pub struct MonitorRelay {
    http: reqwest::Client,
    listener_url: Option<String>,
}

impl MonitorRelay {
    pub fn new(listener_url: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();
        Self { http, listener_url }
    }

    /// Forward an event without blocking the device's request. The
    /// device retries delivery on its own schedule, so relay failures
    /// are only logged.
    pub fn relay(&self, kind: &'static str, event: Value) {
        let Some(url) = self.listener_url.clone() else {
            return;
        };
        let http = self.http.clone();
        tokio::spawn(async move {
            let payload = json!({ "event": kind, "data": event });
            if let Err(err) = http.post(&url).json(&payload).send().await {
                warn!(%url, event = kind, error = %err, "monitor relay failed");
            }
        });
    }
}

pub fn monitor_routes() -> Router<AppState> {
    Router::new()
        .route("/device_is_alive.fcgi", post(device_is_alive))
        .route("/new_user_identified.fcgi", post(user_identified))
        .route("/user_not_identified.fcgi", post(user_not_identified))
        // The monitor path is configurable; keep the REST-prefixed
        // variants some deployments use.
        .route("/api/notifications/new_user_identified.fcgi", post(user_identified))
        .route("/api/notifications/user_not_identified.fcgi", post(user_not_identified))
}

/// Keepalive ping from the device.
async fn device_is_alive(State(_state): State<AppState>, body: Option<Json<Value>>) -> Json<Value> {
    debug!(body = ?body.map(|Json(b)| b), "device keepalive");
    Json(json!({}))
}

/// The device sends `user_id` as a string on most firmware and as a
/// number on some older pushes; normalize to the bare string either way.
fn event_user_id(event: &Value) -> String {
    event
        .get("user_id")
        .and_then(|v| {
            v.as_str()
                .map(ToOwned::to_owned)
                .or_else(|| v.as_i64().map(|n| n.to_string()))
        })
        .unwrap_or_else(|| "-1".to_string())
}

/// A user was recognized. Reply with an empty action list so the
/// device applies its own access rules.
async fn user_identified(State(state): State<AppState>, Json(event): Json<Value>) -> Json<Value> {
    let user_id = event_user_id(&event);
    let user_name = event
        .get("user_name")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    info!(%user_id, %user_name, "user identified");

    state.monitor.relay("new_user_identified", event);

    Json(json!({
        "result": {
            "user_id": user_id,
            "user_name": user_name,
            "event": "identified",
            "actions": [],
        }
    }))
}

/// An identification attempt failed.
async fn user_not_identified(
    State(state): State<AppState>,
    Json(event): Json<Value>,
) -> Json<Value> {
    info!(event = %event, "identification failed");

    state.monitor.relay("user_not_identified", event);

    Json(json!({
        "result": {
            "user_id": "-1",
            "user_name": "",
            "event": "not_identified",
            "actions": [],
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_echoes_string_events_unquoted() {
        assert_eq!(event_user_id(&json!({ "user_id": "12" })), "12");
        assert_eq!(event_user_id(&json!({ "user_id": 12 })), "12");
    }

    #[test]
    fn user_id_defaults_when_missing_or_malformed() {
        assert_eq!(event_user_id(&json!({})), "-1");
        assert_eq!(event_user_id(&json!({ "user_id": null })), "-1");
        assert_eq!(event_user_id(&json!({ "user_id": [1] })), "-1");
    }
}
