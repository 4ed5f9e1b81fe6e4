//! Device transport - iDFace FCGI adapter
//!
//! ## Responsibilities
//!
//! - Build authenticated request URLs (session token as query parameter)
//! - Execute POST calls against the device's `*.fcgi` endpoints
//! - Retry exactly once after forced re-authentication on 401/403
//! - Normalize transport failures into the shared error shape

mod session;
mod types;

pub use session::{SessionManager, SESSION_CHECK_INTERVAL};
pub use types::{DeviceUser, LoginRequest, LoginResponse, SipStatus};

use crate::error::{Error, Result};
use crate::state::AppConfig;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Timeout for bulk transfers (audio message upload/download)
pub const BULK_TIMEOUT: Duration = Duration::from_secs(60);

/// The device surface consumed by the firmware, custody and intercom
/// layers. Tests substitute a scripted implementation.
#[async_trait]
pub trait DeviceApi: Send + Sync {
    /// POST a JSON payload to an FCGI endpoint and return the JSON body
    async fn post_fcgi(&self, endpoint: &str, payload: Value) -> Result<Value>;

    /// POST a raw binary payload (audio upload and the like)
    async fn post_fcgi_raw(&self, endpoint: &str, body: Vec<u8>) -> Result<Value>;

    /// POST with an empty body and return the raw response bytes
    async fn fetch_fcgi_bytes(&self, endpoint: &str) -> Result<Vec<u8>>;

    /// `system_information.fcgi`
    async fn system_information(&self) -> Result<Value> {
        self.post_fcgi("system_information.fcgi", json!({})).await
    }

    /// `get_configuration.fcgi`: module name -> list of field names
    async fn get_configuration(&self, query: Value) -> Result<Value> {
        self.post_fcgi("get_configuration.fcgi", query).await
    }

    /// `set_configuration.fcgi`: module name -> string-valued field map.
    ///
    /// The string-typed map is the wire contract; callers go through
    /// [`crate::firmware::wire_map`] so no native value leaks out untyped.
    async fn set_configuration(
        &self,
        modules: BTreeMap<String, BTreeMap<String, String>>,
    ) -> Result<Value> {
        let payload = serde_json::to_value(&modules)?;
        self.post_fcgi("set_configuration.fcgi", payload).await
    }

    /// `load_objects.fcgi`
    async fn load_objects(&self, object: &str, options: Value) -> Result<Value> {
        let mut payload = json!({ "object": object });
        if let (Some(map), Some(extra)) = (payload.as_object_mut(), options.as_object()) {
            for (k, v) in extra {
                map.insert(k.clone(), v.clone());
            }
        }
        self.post_fcgi("load_objects.fcgi", payload).await
    }

    /// `create_objects.fcgi`
    async fn create_objects(&self, object: &str, values: Value) -> Result<Value> {
        let values = if values.is_array() {
            values
        } else {
            Value::Array(vec![values])
        };
        self.post_fcgi("create_objects.fcgi", json!({ "object": object, "values": values }))
            .await
    }

    /// `modify_objects.fcgi`
    async fn modify_objects(&self, object: &str, values: Value, where_clause: Value) -> Result<Value> {
        self.post_fcgi(
            "modify_objects.fcgi",
            json!({ "object": object, "values": values, "where": where_clause }),
        )
        .await
    }

    /// `destroy_objects.fcgi`
    async fn destroy_objects(&self, object: &str, where_clause: Value) -> Result<Value> {
        self.post_fcgi(
            "destroy_objects.fcgi",
            json!({ "object": object, "where": where_clause }),
        )
        .await
    }

    /// `get_sip_status.fcgi` - parsed leniently, unknown fields default
    /// to the disabled state
    async fn get_sip_status(&self) -> Result<SipStatus> {
        let body = self.post_fcgi("get_sip_status.fcgi", json!({})).await?;
        Ok(serde_json::from_value(body).unwrap_or_default())
    }

    /// `make_sip_call.fcgi`
    async fn make_sip_call(&self, target: &str) -> Result<Value> {
        self.post_fcgi("make_sip_call.fcgi", json!({ "target": target }))
            .await
    }

    /// `finalize_sip_call.fcgi`
    async fn finalize_sip_call(&self) -> Result<Value> {
        self.post_fcgi("finalize_sip_call.fcgi", json!({})).await
    }
}

enum Payload<'a> {
    Json(&'a Value),
    Bytes(&'a [u8]),
    Empty,
}

/// Real device transport over reqwest
pub struct DeviceClient {
    http: reqwest::Client,
    base_url: String,
    session: Arc<SessionManager>,
}

impl DeviceClient {
    pub fn new(config: &AppConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.device_timeout)
            .build()
            .expect("Failed to build HTTP client");

        let base_url = format!("http://{}", config.device_ip);
        let session = Arc::new(SessionManager::new(
            http.clone(),
            base_url.clone(),
            config.device_login.clone(),
            config.device_password.clone(),
        ));

        Self {
            http,
            base_url,
            session,
        }
    }

    /// Shared session manager, for the background check task and the
    /// session status route
    pub fn session(&self) -> Arc<SessionManager> {
        self.session.clone()
    }

    /// Reboot the device and drop the session; the token dies with the
    /// device anyway
    pub async fn reboot(&self) -> Result<Value> {
        let result = self.post_fcgi("reboot.fcgi", json!({})).await;
        self.session.invalidate().await;
        result
    }

    fn url(&self, endpoint: &str, token: &str) -> String {
        // Some endpoints carry their own query string
        let separator = if endpoint.contains('?') { '&' } else { '?' };
        format!("{}/{}{}session={}", self.base_url, endpoint, separator, token)
    }

    async fn send(
        &self,
        endpoint: &str,
        payload: &Payload<'_>,
        timeout: Option<Duration>,
    ) -> Result<reqwest::Response> {
        let token = self.session.token().await?;
        let response = self.send_once(endpoint, payload, timeout, &token).await?;

        // Auth rejection: force a fresh login and retry exactly once
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED
            || status == reqwest::StatusCode::FORBIDDEN
        {
            debug!(endpoint, status = status.as_u16(), "Auth rejected, retrying once");
            self.session.invalidate().await;
            let token = self.session.token().await?;
            return self.send_once(endpoint, payload, timeout, &token).await;
        }

        Ok(response)
    }

    async fn send_once(
        &self,
        endpoint: &str,
        payload: &Payload<'_>,
        timeout: Option<Duration>,
        token: &str,
    ) -> Result<reqwest::Response> {
        let mut request = self.http.post(self.url(endpoint, token));
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        request = match payload {
            Payload::Json(value) => request.json(value),
            Payload::Bytes(bytes) => request
                .header("Content-Type", "application/octet-stream")
                .body(bytes.to_vec()),
            Payload::Empty => request,
        };
        Ok(request.send().await?)
    }

    /// Shape a non-2xx response body into `Error::Device`, preferring
    /// the device's own `error`/`message` text when the body carries one
    fn device_error(status: reqwest::StatusCode, body: &str) -> Error {
        let details: Option<Value> = serde_json::from_str(body).ok();
        let message = details
            .as_ref()
            .and_then(|d| {
                d.get("error")
                    .or_else(|| d.get("message"))
                    .and_then(|m| m.as_str())
            })
            .map(|m| m.to_string())
            .unwrap_or_else(|| format!("request failed with status {}", status.as_u16()));

        Error::Device {
            status: status.as_u16(),
            message,
            details,
        }
    }

    async fn into_json(response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status.is_success() {
            if body.trim().is_empty() {
                return Ok(json!({}));
            }
            return serde_json::from_str(&body)
                .map_err(|e| Error::Transport(format!("malformed device response: {}", e)));
        }

        Err(Self::device_error(status, &body))
    }
}

#[async_trait]
impl DeviceApi for DeviceClient {
    async fn post_fcgi(&self, endpoint: &str, payload: Value) -> Result<Value> {
        let response = self.send(endpoint, &Payload::Json(&payload), None).await?;
        Self::into_json(response).await
    }

    async fn post_fcgi_raw(&self, endpoint: &str, body: Vec<u8>) -> Result<Value> {
        let response = self
            .send(endpoint, &Payload::Bytes(&body), Some(BULK_TIMEOUT))
            .await?;
        Self::into_json(response).await
    }

    async fn fetch_fcgi_bytes(&self, endpoint: &str) -> Result<Vec<u8>> {
        let response = self
            .send(endpoint, &Payload::Empty, Some(BULK_TIMEOUT))
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::device_error(status, &body));
        }

        Ok(response.bytes().await?.to_vec())
    }
}
