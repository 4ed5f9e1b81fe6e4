//! Read-only dual-custody diagnostic
//!
//! Re-reads live device state, scores it against the expected custody
//! invariants, and produces remediation recommendations per failing
//! check. Never mutates the device.

use crate::custody::types::CustodyTestParams;
use crate::custody::{CustodyEngine, PJSIP_FIELDS};
use crate::device::{DeviceUser, SipStatus};
use crate::error::Result;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::warn;

/// One diagnostic check with its expected and observed values
#[derive(Debug, Clone, Serialize)]
pub struct Check {
    pub check: &'static str,
    pub description: &'static str,
    pub expected: Value,
    pub actual: Value,
    pub pass: bool,
    /// Sample of ready users, attached to the readiness check only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub users: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Check {
    fn new(
        check: &'static str,
        description: &'static str,
        expected: Value,
        actual: Value,
        pass: bool,
    ) -> Self {
        Self {
            check,
            description,
            expected,
            actual,
            pass,
            users: None,
            error: None,
        }
    }
}

/// Aggregated pass/fail counts
#[derive(Debug, Clone, Serialize)]
pub struct TestSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub users_ready: usize,
}

/// Enrollment counts observed during the diagnostic
#[derive(Debug, Clone, Serialize)]
pub struct UsersOverview {
    pub with_face: usize,
    pub with_pin: usize,
    pub ready_for_custody: usize,
    pub sample: Vec<Value>,
}

/// Manual-configuration note for 6.23+ firmware
#[derive(Debug, Clone, Serialize)]
pub struct ManualConfigNote {
    pub note: &'static str,
    pub steps: Vec<String>,
}

/// Full diagnostic report
#[derive(Debug, Serialize)]
pub struct CustodyTestReport {
    pub success: bool,
    pub firmware: String,
    pub firmware_type: &'static str,
    pub summary: TestSummary,
    pub users: UsersOverview,
    pub checks: Vec<Check>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_checks: Option<Vec<Check>>,
    pub pjsip_config: Value,
    pub sip_status: SipStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendations: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manual_config: Option<ManualConfigNote>,
}

/// Fixed remediation lookup keyed by check name
fn recommendation_for(check: &Check) -> String {
    match check.check {
        "users_with_face" => "Enroll faces for your users on the device".to_string(),
        "users_with_pin" => {
            "Assign PINs to your users (the PIN lives in the user's password field)".to_string()
        }
        "users_ready_for_custody" => {
            "Make sure the same users have both a face and a PIN".to_string()
        }
        "sip_registered" => {
            "Configure the SIP server at /api/interfonia-sip/config".to_string()
        }
        "auto_call_target" => {
            "Set the target extension via /api/custody/setup/dual".to_string()
        }
        "open_door_command" => "Configure the DTMF door-release code".to_string(),
        "identification_mode" | "pin_enabled" | "multi_factor" => {
            "Configure manually on the device (Menu > Settings > Access)".to_string()
        }
        _ => format!("Check: {}", check.description),
    }
}

fn str_field<'a>(config: &'a Value, key: &str) -> Option<&'a str> {
    config.get(key).and_then(|v| v.as_str())
}

fn actual_of(config: &Value, key: &str) -> Value {
    config.get(key).cloned().unwrap_or(Value::Null)
}

fn is_wire_true(config: &Value, key: &str) -> bool {
    str_field(config, key) == Some("1")
}

impl CustodyEngine {
    /// POST /api/custody/test
    ///
    /// Read-only diagnostic of the dual-custody policy: user readiness,
    /// PJSIP configuration, SIP registration, and (on legacy firmware)
    /// the identification-mode fields.
    pub async fn test_dual_custody_flow(
        &self,
        params: CustodyTestParams,
    ) -> Result<CustodyTestReport> {
        let firmware = self.firmware.detect().await;
        let mut checks = Vec::new();

        // User readiness: both firmware shapes for face enrollment
        let users = match self.device.load_objects("users", json!({ "limit": 1000 })).await {
            Ok(body) => body
                .get("users")
                .and_then(|u| u.as_array())
                .map(|list| {
                    list.iter()
                        .filter_map(|u| serde_json::from_value::<DeviceUser>(u.clone()).ok())
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "User scan failed during custody diagnostic");
                Vec::new()
            }
        };

        let with_face = users.iter().filter(|u| u.has_face()).count();
        let with_pin = users.iter().filter(|u| u.has_pin()).count();
        let ready: Vec<&DeviceUser> = users
            .iter()
            .filter(|u| u.has_face() && u.has_pin())
            .collect();
        let ready_sample: Vec<Value> = ready
            .iter()
            .take(5)
            .map(|u| json!({ "id": u.id, "name": u.name }))
            .collect();

        checks.push(Check::new(
            "users_with_face",
            "Users with an enrolled face",
            json!(">0"),
            json!(with_face),
            with_face > 0,
        ));
        checks.push(Check::new(
            "users_with_pin",
            "Users with a PIN",
            json!(">0"),
            json!(with_pin),
            with_pin > 0,
        ));
        let mut readiness = Check::new(
            "users_ready_for_custody",
            "Users ready for custody (face + PIN)",
            json!(">0"),
            json!(ready.len()),
            !ready.is_empty(),
        );
        readiness.users = Some(ready_sample.clone());
        checks.push(readiness);

        // Live PJSIP configuration; a failure here is a real error, not
        // a failed check
        let pjsip = self
            .device
            .get_configuration(json!({ "pjsip": PJSIP_FIELDS }))
            .await?
            .get("pjsip")
            .cloned()
            .unwrap_or(json!({}));

        let sip_status = self.device.get_sip_status().await.unwrap_or_default();

        checks.push(Check::new(
            "pjsip_enabled",
            "PJSIP enabled",
            json!("1"),
            actual_of(&pjsip, "enabled"),
            is_wire_true(&pjsip, "enabled"),
        ));
        checks.push(Check::new(
            "sip_registered",
            "SIP registered with the server",
            json!(200),
            json!(sip_status.status),
            sip_status.is_registered(),
        ));
        checks.push(Check::new(
            "auto_call_enabled",
            "Auto-call enabled",
            json!("1"),
            actual_of(&pjsip, "auto_call_button_enabled"),
            is_wire_true(&pjsip, "auto_call_button_enabled"),
        ));

        let configured_target = str_field(&pjsip, "auto_call_target").unwrap_or("");
        let target_check = match params.sip_target.as_deref() {
            Some(requested) => Check::new(
                "auto_call_target",
                "Target extension configured",
                json!(requested),
                actual_of(&pjsip, "auto_call_target"),
                configured_target == requested,
            ),
            None => Check::new(
                "auto_call_target",
                "Target extension configured",
                json!("(any)"),
                actual_of(&pjsip, "auto_call_target"),
                !configured_target.trim().is_empty(),
            ),
        };
        checks.push(target_check);

        checks.push(Check::new(
            "open_door_enabled",
            "DTMF door release enabled",
            json!("1"),
            actual_of(&pjsip, "open_door_enabled"),
            is_wire_true(&pjsip, "open_door_enabled"),
        ));
        let door_command = str_field(&pjsip, "open_door_command").unwrap_or("");
        checks.push(Check::new(
            "open_door_command",
            "DTMF code configured",
            json!("(non-empty)"),
            actual_of(&pjsip, "open_door_command"),
            !door_command.trim().is_empty(),
        ));
        checks.push(Check::new(
            "video_enabled",
            "SIP video enabled",
            json!("1"),
            actual_of(&pjsip, "video_enabled"),
            is_wire_true(&pjsip, "video_enabled"),
        ));
        checks.push(Check::new(
            "facial_id_during_call",
            "Facial ID during call",
            json!("1"),
            actual_of(&pjsip, "facial_id_during_call_enabled"),
            is_wire_true(&pjsip, "facial_id_during_call_enabled"),
        ));
        let dialing = str_field(&pjsip, "dialing_display_mode");
        checks.push(Check::new(
            "dialing_display_mode",
            "Dialing display mode defined",
            json!("0 or 1"),
            actual_of(&pjsip, "dialing_display_mode"),
            dialing.map(|d| !d.is_empty()).unwrap_or(false),
        ));

        // Legacy-only identification checks
        if firmware.is_legacy() {
            match self
                .device
                .get_configuration(json!({
                    "general": ["identification_mode", "multi_factor_authentication"],
                    "identifier": ["pin_enabled"],
                }))
                .await
            {
                Ok(legacy) => {
                    let general = legacy.get("general").cloned().unwrap_or(json!({}));
                    let identifier = legacy.get("identifier").cloned().unwrap_or(json!({}));

                    checks.push(Check::new(
                        "identification_mode",
                        "Identification mode (1 = verify)",
                        json!("1"),
                        actual_of(&general, "identification_mode"),
                        is_wire_true(&general, "identification_mode"),
                    ));
                    checks.push(Check::new(
                        "pin_enabled",
                        "PIN enabled",
                        json!("1"),
                        actual_of(&identifier, "pin_enabled"),
                        is_wire_true(&identifier, "pin_enabled"),
                    ));
                    checks.push(Check::new(
                        "multi_factor",
                        "Multi-factor enabled",
                        json!("1"),
                        actual_of(&general, "multi_factor_authentication"),
                        is_wire_true(&general, "multi_factor_authentication"),
                    ));
                }
                Err(e) => {
                    let mut check = Check::new(
                        "legacy_config",
                        "Legacy identification config readable",
                        json!("readable"),
                        Value::Null,
                        false,
                    );
                    check.error = Some(e.to_string());
                    checks.push(check);
                }
            }
        }

        let failed: Vec<Check> = checks.iter().filter(|c| !c.pass).cloned().collect();
        let passed = checks.len() - failed.len();
        let success = failed.is_empty();

        // Deduplicated recommendations, one per failing check name
        let mut recommendations: Vec<String> = Vec::new();
        for check in &failed {
            let recommendation = recommendation_for(check);
            if !recommendations.contains(&recommendation) {
                recommendations.push(recommendation);
            }
        }

        let manual_config = firmware.is_623_or_higher().then(|| ManualConfigNote {
            note: "Firmware 6.23+ requires MANUAL configuration on the device:",
            steps: crate::custody::types::manual_custody_menu(80),
        });

        Ok(CustodyTestReport {
            success,
            firmware: firmware.version.clone(),
            firmware_type: firmware.tier().label(),
            summary: TestSummary {
                total: checks.len(),
                passed,
                failed: failed.len(),
                users_ready: ready.len(),
            },
            users: UsersOverview {
                with_face,
                with_pin,
                ready_for_custody: ready.len(),
                sample: ready_sample,
            },
            checks,
            failed_checks: if failed.is_empty() { None } else { Some(failed) },
            pjsip_config: pjsip,
            sip_status,
            recommendations: if recommendations.is_empty() {
                None
            } else {
                Some(recommendations)
            },
            manual_config,
        })
    }
}
