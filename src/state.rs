//! Application state
//!
//! Holds configuration and all shared services

use crate::custody::CustodyEngine;
use crate::device::{DeviceClient, SessionManager};
use crate::error::{Error, Result};
use crate::firmware::FirmwareService;
use crate::intercom::IntercomService;
use crate::web_api::MonitorRelay;
use axum::http::HeaderMap;
use std::sync::Arc;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// iDFace device address (IP or host)
    pub device_ip: String,
    /// Device login
    pub device_login: String,
    /// Device password
    pub device_password: String,
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Per-call device timeout
    pub device_timeout: Duration,
    /// Optional API key guarding mutating system routes
    pub api_key: Option<String>,
    /// Optional URL that receives relayed monitor-mode events
    pub monitor_listener_url: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            device_ip: std::env::var("DEVICE_IP").unwrap_or_else(|_| "192.168.0.129".to_string()),
            device_login: std::env::var("DEVICE_LOGIN").unwrap_or_else(|_| "admin".to_string()),
            device_password: std::env::var("DEVICE_PASSWORD")
                .unwrap_or_else(|_| "admin".to_string()),
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3001),
            device_timeout: std::env::var("DEVICE_TIMEOUT_SECS")
                .ok()
                .and_then(|t| t.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(Duration::from_secs(10)),
            api_key: std::env::var("API_KEY").ok().filter(|k| !k.is_empty()),
            monitor_listener_url: std::env::var("MONITOR_LISTENER_URL")
                .ok()
                .filter(|u| !u.is_empty()),
        }
    }
}

impl AppConfig {
    /// Enforce the optional `x-api-key` guard.
    ///
    /// When no key is configured, every request passes.
    pub fn check_api_key(&self, headers: &HeaderMap) -> Result<()> {
        let Some(expected) = &self.api_key else {
            return Ok(());
        };

        let supplied = headers.get("x-api-key").and_then(|v| v.to_str().ok());
        if supplied == Some(expected.as_str()) {
            Ok(())
        } else {
            Err(Error::Unauthorized("invalid or missing x-api-key".to_string()))
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application config
    pub config: AppConfig,
    /// Device transport (raw FCGI access for passthrough routes)
    pub device: Arc<DeviceClient>,
    /// Session manager (exposed for the session status route)
    pub session: Arc<SessionManager>,
    /// Firmware detection and compatibility
    pub firmware: Arc<FirmwareService>,
    /// Custody workflow engine
    pub custody: Arc<CustodyEngine>,
    /// SIP intercom configuration
    pub intercom: Arc<IntercomService>,
    /// Monitor-mode event relay
    pub monitor: Arc<MonitorRelay>,
}
