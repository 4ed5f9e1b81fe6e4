//! Request and response types for the custody workflows

use crate::custody::steps::StepOutcome;
use crate::device::SipStatus;
use serde::{Deserialize, Serialize};
use serde_json::Value;

fn default_simple_rule_name() -> String {
    "Simple Custody - PIN + Face".to_string()
}

fn default_dual_rule_name() -> String {
    "Dual Custody - SOC".to_string()
}

fn default_min_score() -> u32 {
    80
}

fn default_identification_timeout() -> u32 {
    30
}

fn default_open_door_command() -> String {
    "#1234".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_call_time() -> u32 {
    120
}

/// Body for `POST /api/custody/setup/simple`
#[derive(Debug, Clone, Deserialize)]
pub struct SimpleCustodyParams {
    #[serde(default = "default_simple_rule_name")]
    pub access_rule_name: String,
    /// Minimum face match score, percent
    #[serde(default = "default_min_score")]
    pub min_score: u32,
    /// Identification timeout, seconds
    #[serde(default = "default_identification_timeout")]
    pub identification_timeout: u32,
}

impl Default for SimpleCustodyParams {
    fn default() -> Self {
        Self {
            access_rule_name: default_simple_rule_name(),
            min_score: default_min_score(),
            identification_timeout: default_identification_timeout(),
        }
    }
}

/// Body for `POST /api/custody/setup/dual`
#[derive(Debug, Clone, Deserialize)]
pub struct DualCustodyParams {
    /// Extension the device auto-dials after face verification.
    /// The one hard precondition of the whole engine.
    pub sip_target: Option<String>,
    /// DTMF code the operator dials to release the door
    #[serde(default = "default_open_door_command")]
    pub open_door_command: String,
    #[serde(default = "default_true")]
    pub video_enabled: bool,
    /// Maximum call duration, seconds
    #[serde(default = "default_max_call_time")]
    pub max_call_time: u32,
    #[serde(default = "default_min_score")]
    pub min_score: u32,
    #[serde(default = "default_identification_timeout")]
    pub identification_timeout: u32,
    #[serde(default = "default_dual_rule_name")]
    pub access_rule_name: String,
}

impl Default for DualCustodyParams {
    fn default() -> Self {
        Self {
            sip_target: None,
            open_door_command: default_open_door_command(),
            video_enabled: true,
            max_call_time: default_max_call_time(),
            min_score: default_min_score(),
            identification_timeout: default_identification_timeout(),
            access_rule_name: default_dual_rule_name(),
        }
    }
}

/// Body for `POST /api/custody/test`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustodyTestParams {
    /// When given, the diagnostic requires the configured auto-call
    /// target to match exactly
    pub sip_target: Option<String>,
}

/// Response for the three setup workflows
#[derive(Debug, Serialize)]
pub struct CustodySetupResponse {
    /// "success" when every step succeeded, "partial" otherwise
    pub status: &'static str,
    pub mode: &'static str,
    pub description: &'static str,
    pub firmware: String,
    pub firmware_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
    pub steps: Vec<StepOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warnings: Option<Vec<String>>,
    /// Menu paths the operator must set by hand on 6.23+ firmware,
    /// where the API cannot reach these fields
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manual_config_required: Option<Vec<String>>,
    /// Operator documentation of the physical-world dual-custody flow
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flow_description: Option<Vec<String>>,
}

/// Response for `GET /api/custody/config`
#[derive(Debug, Serialize)]
pub struct IdentificationConfig {
    pub firmware: String,
    pub firmware_type: &'static str,
    pub pjsip: Value,
    pub sip_status: SipStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub general: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub face_id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub legacy_config_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<&'static str>,
}

/// Menu paths for enabling custody identification on 6.23+ firmware
pub fn manual_custody_menu(min_score: u32) -> Vec<String> {
    vec![
        "Menu > Settings > Access > Identification mode = Verify (1:1)".to_string(),
        "Menu > Settings > Access > PIN enabled = Yes".to_string(),
        "Menu > Settings > Access > Multi-factor = Face + PIN".to_string(),
        format!("Menu > Settings > Face > Minimum score = {}%", min_score),
    ]
}

/// Menu paths for reverting to the default 1:N mode on 6.23+ firmware
pub fn manual_reset_menu() -> Vec<String> {
    vec![
        "Menu > Settings > Access > Identification mode = Identify (1:N)".to_string(),
        "Menu > Settings > Access > PIN enabled = No".to_string(),
        "Menu > Settings > Access > Multi-factor = Disabled".to_string(),
    ]
}

/// Fixed narration of the dual-custody physical sequence; part of the
/// response contract clients rely on for UI display
pub fn dual_custody_flow_description(sip_target: &str, open_door_command: &str) -> Vec<String> {
    vec![
        "1. User enters PIN".to_string(),
        "2. Device verifies face (1:1 against the PIN)".to_string(),
        format!("3. Device automatically dials extension {}", sip_target),
        "4. Operator watches the user's video feed".to_string(),
        format!("5. Operator dials {} to release the door", open_door_command),
        "6. Door opens and the call ends automatically".to_string(),
    ]
}
