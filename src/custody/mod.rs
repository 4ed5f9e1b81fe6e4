//! Custody workflow engine
//!
//! ## Responsibilities
//!
//! - Sequence the device calls implementing a custody policy
//!   (simple: PIN + face 1:1; dual: adds SIP auto-call + DTMF release)
//! - Tolerate and report partial failure per step
//! - Validate a target policy against live device state (read-only)
//!
//! Identification-mode / PIN / multi-factor writes only exist on legacy
//! firmware; on 6.23+ the engine reports the menu paths the operator
//! must set by hand instead of guessing.

mod steps;
pub mod types;
mod validation;

pub use steps::{StepOutcome, StepRecorder};
pub use types::{
    CustodySetupResponse, CustodyTestParams, DualCustodyParams, IdentificationConfig,
    SimpleCustodyParams,
};
pub use validation::{Check, CustodyTestReport, ManualConfigNote, TestSummary, UsersOverview};

use crate::device::DeviceApi;
use crate::error::Result;
use crate::firmware::{guarded_pjsip, wire_bool, FirmwareService};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

/// PJSIP fields the custody surface reads back
const PJSIP_FIELDS: &[&str] = &[
    "enabled",
    "auto_call_target",
    "auto_call_button_enabled",
    "open_door_enabled",
    "open_door_command",
    "facial_id_during_call_enabled",
    "dialing_display_mode",
    "video_enabled",
    "max_call_time",
    "auto_answer_enabled",
];

/// Warning attached when 6.23+ firmware prevents API-side
/// identification config
const MANUAL_CONFIG_WARNING: &str = "Firmware 6.23+: identification_mode, pin_enabled and \
     face_id.min_score must be configured manually on the device";

/// Custody workflow engine
pub struct CustodyEngine {
    device: Arc<dyn DeviceApi>,
    firmware: Arc<FirmwareService>,
}

impl CustodyEngine {
    pub fn new(device: Arc<dyn DeviceApi>, firmware: Arc<FirmwareService>) -> Self {
        Self { device, firmware }
    }

    /// GET /api/custody/config - firmware-aware composite read
    pub async fn identification_config(&self) -> Result<IdentificationConfig> {
        let firmware = self.firmware.detect().await;

        let pjsip_result = self
            .device
            .get_configuration(json!({ "pjsip": PJSIP_FIELDS }))
            .await?;
        let pjsip = pjsip_result.get("pjsip").cloned().unwrap_or(json!({}));

        let sip_status = self.device.get_sip_status().await.unwrap_or_default();

        let mut config = IdentificationConfig {
            firmware: firmware.version.clone(),
            firmware_type: firmware.tier().label(),
            pjsip,
            sip_status,
            general: None,
            identifier: None,
            face_id: None,
            legacy_config_error: None,
            note: None,
        };

        if firmware.is_legacy() {
            match self
                .device
                .get_configuration(json!({
                    "general": ["identification_mode", "multi_factor_authentication", "identification_timeout"],
                    "identifier": ["face_identify_enabled", "pin_enabled"],
                    "face_id": ["min_score", "anti_spoofing"],
                }))
                .await
            {
                Ok(legacy) => {
                    config.general = Some(legacy.get("general").cloned().unwrap_or(json!({})));
                    config.identifier =
                        Some(legacy.get("identifier").cloned().unwrap_or(json!({})));
                    config.face_id = Some(legacy.get("face_id").cloned().unwrap_or(json!({})));
                }
                Err(e) => config.legacy_config_error = Some(e.to_string()),
            }
        } else {
            config.note = Some(
                "Firmware 6.23+ does not expose general/identifier via get_configuration. \
                 Configure manually on the device.",
            );
        }

        Ok(config)
    }

    /// POST /api/custody/setup/simple
    ///
    /// PIN + face 1:1 verification; no auto-dial (a simple-custody door
    /// does not call anyone).
    pub async fn setup_simple(&self, params: SimpleCustodyParams) -> Result<CustodySetupResponse> {
        let firmware = self.firmware.detect().await;
        let mut steps = StepRecorder::new();
        let mut warnings = Vec::new();

        if firmware.is_legacy() {
            let result = self
                .write_legacy_identification(params.min_score, params.identification_timeout)
                .await;
            steps.record("1:1 mode + PIN configured", &result);
        } else {
            warnings.push(MANUAL_CONFIG_WARNING.to_string());
        }

        let pjsip = BTreeMap::from([
            ("enabled".to_string(), "1".to_string()),
            ("facial_id_during_call_enabled".to_string(), "1".to_string()),
            ("auto_call_button_enabled".to_string(), "0".to_string()),
            ("auto_call_target".to_string(), String::new()),
        ]);
        let detail = serde_json::to_value(guarded_pjsip(pjsip.clone()))?;
        let result = self.write_pjsip(pjsip).await;
        steps.record_with_detail("PJSIP configured", &result, detail);

        self.create_access_rule(&params.access_rule_name, &mut steps)
            .await;

        Ok(CustodySetupResponse {
            status: if steps.all_succeeded() { "success" } else { "partial" },
            mode: "simple_custody",
            description: "PIN + Face 1:1 (verify)",
            firmware: firmware.version.clone(),
            firmware_type: firmware.tier().label(),
            config: None,
            steps: steps.into_steps(),
            warnings: if warnings.is_empty() { None } else { Some(warnings) },
            manual_config_required: firmware
                .is_623_or_higher()
                .then(|| types::manual_custody_menu(params.min_score)),
            flow_description: None,
        })
    }

    /// POST /api/custody/setup/dual
    ///
    /// Simple custody plus automatic SIP call and DTMF-authorized door
    /// release. `sip_target` is the one hard precondition: without it no
    /// device write is issued.
    pub async fn setup_dual(&self, params: DualCustodyParams) -> Result<CustodySetupResponse> {
        let Some(sip_target) = params
            .sip_target
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .map(|t| t.to_string())
        else {
            return Err(crate::error::Error::validation_with_example(
                "sip_target is required",
                json!({ "sip_target": "503", "open_door_command": "#1234" }),
            ));
        };

        let firmware = self.firmware.detect().await;
        let mut steps = StepRecorder::new();
        let mut warnings = Vec::new();

        // Informational only: a dead SIP registration warns but never
        // blocks the setup.
        match self.device.get_sip_status().await {
            Ok(status) => {
                if !status.is_registered() {
                    warnings.push(
                        "SIP is not registered (status != 200). Configure the SIP server first."
                            .to_string(),
                    );
                }
                steps.succeed_with(
                    "SIP registration check",
                    json!({ "status": status.status, "registered": status.is_registered() }),
                );
            }
            Err(e) => {
                warnings.push(
                    "SIP is not registered (status != 200). Configure the SIP server first."
                        .to_string(),
                );
                steps.succeed_with("SIP registration check", json!({ "error": e.to_string() }));
            }
        }

        let pjsip = BTreeMap::from([
            ("enabled".to_string(), "1".to_string()),
            ("auto_call_button_enabled".to_string(), "1".to_string()),
            ("auto_call_target".to_string(), sip_target.clone()),
            ("open_door_enabled".to_string(), "1".to_string()),
            ("open_door_command".to_string(), params.open_door_command.clone()),
            ("facial_id_during_call_enabled".to_string(), "1".to_string()),
            ("video_enabled".to_string(), wire_bool(params.video_enabled)),
            ("max_call_time".to_string(), params.max_call_time.to_string()),
        ]);
        let result = self.write_pjsip(pjsip).await;
        steps.record_with_detail(
            "PJSIP configured (auto-call + DTMF)",
            &result,
            json!({
                "auto_call_target": sip_target,
                "auto_call_button_enabled": "1",
                "open_door_command": params.open_door_command,
                "open_door_enabled": "1",
            }),
        );

        if firmware.is_legacy() {
            let result = self
                .write_legacy_identification(params.min_score, params.identification_timeout)
                .await;
            steps.record("1:1 mode + PIN configured via API", &result);
        }
        // 6.23+ reports the gap through manual_config_required below

        self.create_access_rule(&params.access_rule_name, &mut steps)
            .await;

        Ok(CustodySetupResponse {
            status: if steps.all_succeeded() { "success" } else { "partial" },
            mode: "dual_custody",
            description: "PIN + Face 1:1 + SIP call + DTMF release",
            firmware: firmware.version.clone(),
            firmware_type: firmware.tier().label(),
            config: Some(json!({
                "sip_target": sip_target,
                "auto_call_button_enabled": "1",
                "open_door_command": params.open_door_command,
                "open_door_enabled": "1",
                "video_enabled": wire_bool(params.video_enabled),
                "max_call_time": params.max_call_time.to_string(),
            })),
            steps: steps.into_steps(),
            warnings: if warnings.is_empty() { None } else { Some(warnings) },
            manual_config_required: firmware
                .is_623_or_higher()
                .then(|| types::manual_custody_menu(params.min_score)),
            flow_description: Some(types::dual_custody_flow_description(
                &sip_target,
                &params.open_door_command,
            )),
        })
    }

    /// POST /api/custody/setup/reset - back to plain 1:N face
    /// identification, no custody
    pub async fn reset_to_default(&self) -> Result<CustodySetupResponse> {
        let firmware = self.firmware.detect().await;
        let mut steps = StepRecorder::new();

        // Auto-call and DTMF release go away on every firmware
        let pjsip = BTreeMap::from([
            ("auto_call_button_enabled".to_string(), "0".to_string()),
            ("auto_call_target".to_string(), String::new()),
            ("open_door_enabled".to_string(), "0".to_string()),
            ("open_door_command".to_string(), String::new()),
        ]);
        let result = self.write_pjsip(pjsip).await;
        steps.record("Auto-call and DTMF release disabled", &result);

        if firmware.is_legacy() {
            let result = self
                .device
                .set_configuration(BTreeMap::from([
                    (
                        "general".to_string(),
                        BTreeMap::from([("identification_mode".to_string(), "0".to_string())]),
                    ),
                    (
                        "identifier".to_string(),
                        BTreeMap::from([
                            ("face_identify_enabled".to_string(), "1".to_string()),
                            ("pin_enabled".to_string(), "0".to_string()),
                            ("multi_factor_authentication".to_string(), "0".to_string()),
                        ]),
                    ),
                ]))
                .await;
            steps.record("1:N mode restored", &result);
        }

        Ok(CustodySetupResponse {
            status: if steps.all_succeeded() { "success" } else { "partial" },
            mode: "default",
            description: "Face 1:N (plain identification)",
            firmware: firmware.version.clone(),
            firmware_type: firmware.tier().label(),
            config: None,
            steps: steps.into_steps(),
            warnings: None,
            manual_config_required: firmware
                .is_623_or_higher()
                .then(types::manual_reset_menu),
            flow_description: None,
        })
    }

    /// Every PJSIP write goes through the firmware guard: the safe
    /// defaults are merged first, caller values win.
    async fn write_pjsip(&self, overrides: BTreeMap<String, String>) -> Result<Value> {
        self.device
            .set_configuration(BTreeMap::from([(
                "pjsip".to_string(),
                guarded_pjsip(overrides),
            )]))
            .await
    }

    /// Legacy-only identification write: 1:1 verify mode, PIN,
    /// multi-factor, face score and anti-spoofing
    async fn write_legacy_identification(
        &self,
        min_score: u32,
        identification_timeout: u32,
    ) -> Result<Value> {
        self.device
            .set_configuration(BTreeMap::from([
                (
                    "general".to_string(),
                    BTreeMap::from([
                        ("identification_mode".to_string(), "1".to_string()),
                        (
                            "identification_timeout".to_string(),
                            identification_timeout.to_string(),
                        ),
                    ]),
                ),
                (
                    "identifier".to_string(),
                    BTreeMap::from([
                        ("face_identify_enabled".to_string(), "1".to_string()),
                        ("pin_enabled".to_string(), "1".to_string()),
                        ("multi_factor_authentication".to_string(), "1".to_string()),
                    ]),
                ),
                (
                    "face_id".to_string(),
                    BTreeMap::from([
                        ("min_score".to_string(), min_score.to_string()),
                        ("anti_spoofing".to_string(), "1".to_string()),
                    ]),
                ),
            ]))
            .await
    }

    /// Create the custody access rule, tolerating an existing record
    async fn create_access_rule(&self, name: &str, steps: &mut StepRecorder) {
        match self
            .device
            .create_objects(
                "access_rules",
                json!([{ "name": name, "type": 0, "priority": 0 }]),
            )
            .await
        {
            Ok(body) => {
                let id = body.get("ids").and_then(|ids| ids.get(0)).cloned();
                match id {
                    Some(id) => steps.succeed_with("Access rule created", json!({ "id": id })),
                    None => steps.succeed("Access rule created"),
                }
            }
            Err(e) => {
                let message = e.to_string();
                if message.contains("already exists") || message.contains("duplicate") {
                    steps.succeed("Access rule already exists");
                } else {
                    warn!(error = %message, "Access rule creation failed");
                    steps.fail("Access rule", &e);
                }
            }
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockDevice;

    fn engine_with_firmware(device: Arc<MockDevice>, version: &str) -> CustodyEngine {
        device.respond("system_information.fcgi", json!({ "version": version }));
        let firmware = Arc::new(FirmwareService::new(device.clone()));
        CustodyEngine::new(device, firmware)
    }

    #[tokio::test]
    async fn legacy_simple_custody_writes_identification_and_pjsip() {
        let device = MockDevice::new();
        let engine = engine_with_firmware(device.clone(), "6.20.0");

        let response = engine
            .setup_simple(SimpleCustodyParams::default())
            .await
            .unwrap();

        assert_eq!(response.mode, "simple_custody");
        assert_eq!(response.firmware_type, "legacy");
        assert!(response.manual_config_required.is_none());
        assert!(response.steps.iter().all(|s| s.success));

        let writes = device.calls_to("set_configuration.fcgi");
        assert_eq!(writes.len(), 2);

        // Identification write goes first on legacy firmware
        let legacy = &writes[0];
        assert_eq!(legacy["general"]["identification_mode"], "1");
        assert_eq!(legacy["identifier"]["pin_enabled"], "1");
        assert_eq!(legacy["identifier"]["multi_factor_authentication"], "1");
        assert_eq!(legacy["face_id"]["min_score"], "80");
        assert_eq!(legacy["face_id"]["anti_spoofing"], "1");

        let pjsip = &writes[1]["pjsip"];
        assert_eq!(pjsip["facial_id_during_call_enabled"], "1");
        assert_eq!(pjsip["auto_call_button_enabled"], "0");
        assert_eq!(pjsip["dialing_display_mode"], "0");
    }

    #[tokio::test]
    async fn v623_simple_custody_skips_identification_write() {
        let device = MockDevice::new();
        let engine = engine_with_firmware(device.clone(), "6.23.0");

        let response = engine
            .setup_simple(SimpleCustodyParams::default())
            .await
            .unwrap();

        assert_eq!(response.firmware_type, "6.23+");

        let writes = device.calls_to("set_configuration.fcgi");
        assert_eq!(writes.len(), 1, "only the PJSIP write");
        assert!(writes[0].get("general").is_none());

        let manual = response.manual_config_required.expect("menu paths");
        assert!(manual.iter().any(|m| m.contains("Menu")));
        assert!(response.warnings.is_some());
    }

    #[tokio::test]
    async fn dual_custody_requires_sip_target_and_writes_nothing_without_it() {
        let device = MockDevice::new();
        let engine = engine_with_firmware(device.clone(), "6.23.0");

        let err = engine
            .setup_dual(DualCustodyParams::default())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("sip_target"));
        assert_eq!(
            err.status_code(),
            axum::http::StatusCode::BAD_REQUEST
        );
        // The validation error precedes any device traffic, firmware
        // detection included
        assert_eq!(device.total_calls(), 0);
    }

    #[tokio::test]
    async fn dual_custody_warns_on_unregistered_sip_but_still_configures() {
        let device = MockDevice::new();
        device.respond("get_sip_status.fcgi", json!({ "status": 408, "in_call": false }));
        let engine = engine_with_firmware(device.clone(), "6.23.0");

        let params = DualCustodyParams {
            sip_target: Some("503".to_string()),
            ..DualCustodyParams::default()
        };
        let response = engine.setup_dual(params).await.unwrap();

        let warnings = response.warnings.expect("warning list");
        assert!(warnings.iter().any(|w| w.contains("SIP is not registered")));

        // The auto-call write still went out
        let writes = device.calls_to("set_configuration.fcgi");
        assert_eq!(writes.len(), 1);
        let pjsip = &writes[0]["pjsip"];
        assert_eq!(pjsip["auto_call_button_enabled"], "1");
        assert_eq!(pjsip["auto_call_target"], "503");
        assert_eq!(pjsip["open_door_enabled"], "1");
        assert_eq!(pjsip["dialing_display_mode"], "0");

        assert!(response.flow_description.is_some());
        assert_eq!(response.flow_description.unwrap().len(), 6);
    }

    #[tokio::test]
    async fn dual_custody_on_legacy_also_writes_identification() {
        let device = MockDevice::new();
        device.respond("get_sip_status.fcgi", json!({ "status": 200, "in_call": false }));
        let engine = engine_with_firmware(device.clone(), "6.22.0");

        let params = DualCustodyParams {
            sip_target: Some("200".to_string()),
            ..DualCustodyParams::default()
        };
        let response = engine.setup_dual(params).await.unwrap();

        assert_eq!(response.status, "success");
        assert!(response.warnings.is_none());
        assert!(response.manual_config_required.is_none());

        let writes = device.calls_to("set_configuration.fcgi");
        assert_eq!(writes.len(), 2);
        assert!(writes[1].get("general").is_some());
    }

    #[tokio::test]
    async fn partial_failure_keeps_remaining_steps_running() {
        let device = MockDevice::new();
        device.respond("get_sip_status.fcgi", json!({ "status": 200 }));
        device.fail("set_configuration.fcgi", "write rejected");
        let engine = engine_with_firmware(device.clone(), "6.23.0");

        let params = DualCustodyParams {
            sip_target: Some("503".to_string()),
            ..DualCustodyParams::default()
        };
        let response = engine.setup_dual(params).await.unwrap();

        assert_eq!(response.status, "partial");
        let failed: Vec<_> = response.steps.iter().filter(|s| !s.success).collect();
        assert_eq!(failed.len(), 1);
        // Access rule step still executed after the failed write
        assert!(device.call_count("create_objects.fcgi") == 1);
    }

    #[tokio::test]
    async fn access_rule_duplicate_is_tolerated() {
        let device = MockDevice::new();
        device.fail_with_status(
            "create_objects.fcgi",
            400,
            "access rule already exists",
        );
        let engine = engine_with_firmware(device.clone(), "6.23.0");

        let response = engine
            .setup_simple(SimpleCustodyParams::default())
            .await
            .unwrap();

        assert!(response.steps.iter().all(|s| s.success));
        assert!(response
            .steps
            .iter()
            .any(|s| s.description.contains("already exists")));
    }

    #[tokio::test]
    async fn reset_disables_autocall_everywhere_and_restores_1n_on_legacy() {
        let device = MockDevice::new();
        let engine = engine_with_firmware(device.clone(), "6.20.0");

        let response = engine.reset_to_default().await.unwrap();
        assert_eq!(response.mode, "default");
        assert!(response.manual_config_required.is_none());

        let writes = device.calls_to("set_configuration.fcgi");
        assert_eq!(writes.len(), 2);
        let pjsip = &writes[0]["pjsip"];
        assert_eq!(pjsip["auto_call_button_enabled"], "0");
        assert_eq!(pjsip["open_door_enabled"], "0");
        assert_eq!(pjsip["dialing_display_mode"], "0");
        assert_eq!(writes[1]["general"]["identification_mode"], "0");
        assert_eq!(writes[1]["identifier"]["pin_enabled"], "0");
    }

    #[tokio::test]
    async fn reset_on_623_reports_inverse_menu_paths() {
        let device = MockDevice::new();
        let engine = engine_with_firmware(device.clone(), "7.0.0");

        let response = engine.reset_to_default().await.unwrap();
        let manual = response.manual_config_required.expect("menu paths");
        assert!(manual.iter().any(|m| m.contains("Identify (1:N)")));
        assert_eq!(device.calls_to("set_configuration.fcgi").len(), 1);
    }

    #[tokio::test]
    async fn identification_config_reads_legacy_modules_only_on_legacy() {
        let device = MockDevice::new();
        device.respond(
            "get_configuration.fcgi",
            json!({
                "pjsip": { "enabled": "1" },
                "general": { "identification_mode": "1" },
                "identifier": { "pin_enabled": "1" },
                "face_id": { "min_score": "80" },
            }),
        );
        device.respond("get_sip_status.fcgi", json!({ "status": 200 }));

        let engine = engine_with_firmware(device.clone(), "6.20.0");
        let config = engine.identification_config().await.unwrap();
        assert_eq!(config.firmware_type, "legacy");
        assert!(config.general.is_some());
        assert!(config.note.is_none());

        let device = MockDevice::new();
        device.respond("get_configuration.fcgi", json!({ "pjsip": { "enabled": "1" } }));
        let engine = engine_with_firmware(device.clone(), "6.23.0");
        let config = engine.identification_config().await.unwrap();
        assert!(config.general.is_none());
        assert!(config.note.is_some());
        assert_eq!(device.call_count("get_configuration.fcgi"), 1);
    }
}
