//! Shared REST response types

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub device_session_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firmware: Option<String>,
}

/// Wrapper for write operations that passthrough the device response
#[derive(Debug, Clone, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl SuccessResponse {
    pub fn with_data(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
        }
    }
}
