//! SIP intercom configuration
//!
//! Narrow setters/getters for individual PJSIP concerns, each
//! independently callable outside the custody workflows. Every write is
//! merged over the firmware guard so `dialing_display_mode` is never
//! omitted, and every value leaves as a wire string.

use crate::device::{DeviceApi, SipStatus};
use crate::error::{Error, Result};
use crate::firmware::{guarded_pjsip, wire_bool, wire_map};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// PJSIP fields returned by the config read
const PJSIP_READ_FIELDS: &[&str] = &[
    "enabled",
    "server_ip",
    "server_port",
    "branch",
    "login",
    "password",
    "auto_answer_enabled",
    "auto_answer_delay",
    "dialing_display_mode",
    "auto_call_target",
    "auto_call_button_enabled",
    "rex_enabled",
    "video_enabled",
    "max_call_time",
    "mic_volume",
    "speaker_volume",
    "open_door_enabled",
    "open_door_command",
    "facial_id_during_call_enabled",
    "reg_status_query_period",
    "custom_ringtone_enabled",
];

/// Device volume range; out-of-range input is corrected, not rejected,
/// matching the device's own tolerance
const VOLUME_RANGE: (i64, i64) = (1, 10);

/// Volumes as actually transmitted after clamping
#[derive(Debug, Clone, Serialize)]
pub struct AppliedVolumes {
    pub mic_volume: i64,
    pub speaker_volume: i64,
}

/// SIP intercom configuration service
pub struct IntercomService {
    device: Arc<dyn DeviceApi>,
}

impl IntercomService {
    pub fn new(device: Arc<dyn DeviceApi>) -> Self {
        Self { device }
    }

    /// Full PJSIP read plus the push server address
    pub async fn get_config(&self) -> Result<Value> {
        self.device
            .get_configuration(json!({
                "general": ["push_server"],
                "pjsip": PJSIP_READ_FIELDS,
            }))
            .await
    }

    /// Raw PJSIP write: caller supplies any subset of fields, the guard
    /// and the wire coercion are applied here
    pub async fn set_config(&self, pjsip: &Map<String, Value>) -> Result<Value> {
        self.write_pjsip(wire_map(pjsip)).await
    }

    /// Enable/disable auto-call. Enabling requires a target extension.
    pub async fn configure_auto_call(&self, enabled: bool, target: Option<&str>) -> Result<Value> {
        let target = target.unwrap_or("").trim().to_string();
        if enabled && target.is_empty() {
            return Err(Error::validation_with_example(
                "target is required to enable auto-call",
                json!({ "enabled": true, "target": "503" }),
            ));
        }

        info!(enabled, target = %target, "Configuring auto-call");
        self.write_pjsip(BTreeMap::from([
            ("auto_call_button_enabled".to_string(), wire_bool(enabled)),
            (
                "auto_call_target".to_string(),
                if enabled { target } else { String::new() },
            ),
        ]))
        .await
    }

    /// Auto-answer with a delay in seconds
    pub async fn configure_auto_answer(&self, enabled: bool, delay_secs: u32) -> Result<Value> {
        self.write_pjsip(BTreeMap::from([
            ("auto_answer_enabled".to_string(), wire_bool(enabled)),
            ("auto_answer_delay".to_string(), delay_secs.to_string()),
        ]))
        .await
    }

    /// Mic/speaker volumes, silently clamped to the device range
    pub async fn set_volumes(&self, mic: i64, speaker: i64) -> Result<AppliedVolumes> {
        let (min, max) = VOLUME_RANGE;
        let applied = AppliedVolumes {
            mic_volume: mic.clamp(min, max),
            speaker_volume: speaker.clamp(min, max),
        };

        self.write_pjsip(BTreeMap::from([
            ("mic_volume".to_string(), applied.mic_volume.to_string()),
            (
                "speaker_volume".to_string(),
                applied.speaker_volume.to_string(),
            ),
        ]))
        .await?;

        Ok(applied)
    }

    /// DTMF door release
    pub async fn configure_door_release(&self, enabled: bool, command: &str) -> Result<Value> {
        self.write_pjsip(BTreeMap::from([
            ("open_door_enabled".to_string(), wire_bool(enabled)),
            ("open_door_command".to_string(), command.to_string()),
        ]))
        .await
    }

    /// SIP video on/off
    pub async fn configure_video(&self, enabled: bool) -> Result<Value> {
        self.write_pjsip(BTreeMap::from([(
            "video_enabled".to_string(),
            wire_bool(enabled),
        )]))
        .await
    }

    /// Facial identification during an active call
    pub async fn configure_facial_id(&self, enabled: bool) -> Result<Value> {
        self.write_pjsip(BTreeMap::from([(
            "facial_id_during_call_enabled".to_string(),
            wire_bool(enabled),
        )]))
        .await
    }

    pub async fn sip_status(&self) -> Result<SipStatus> {
        self.device.get_sip_status().await
    }

    pub async fn make_call(&self, target: &str) -> Result<Value> {
        info!(target, "Starting SIP call");
        self.device.make_sip_call(target).await
    }

    pub async fn finalize_call(&self) -> Result<Value> {
        info!("Finalizing SIP call");
        self.device.finalize_sip_call().await
    }

    /// Upload the custom audio message played during access events
    pub async fn upload_audio(&self, body: Vec<u8>) -> Result<Value> {
        self.device
            .post_fcgi_raw("set_pjsip_audio_message.fcgi?current=1&total=1", body)
            .await
    }

    /// Download the current custom audio message
    pub async fn download_audio(&self) -> Result<Vec<u8>> {
        self.device
            .fetch_fcgi_bytes("get_pjsip_audio_message.fcgi")
            .await
    }

    /// Whether a custom audio message exists on the device
    pub async fn has_audio(&self) -> Result<Value> {
        self.device
            .post_fcgi("has_audio_access_messages.fcgi", json!({}))
            .await
    }

    async fn write_pjsip(&self, overrides: BTreeMap<String, String>) -> Result<Value> {
        self.device
            .set_configuration(BTreeMap::from([(
                "pjsip".to_string(),
                guarded_pjsip(overrides),
            )]))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockDevice;

    fn service(device: Arc<MockDevice>) -> IntercomService {
        IntercomService::new(device)
    }

    #[tokio::test]
    async fn volumes_clamp_to_device_range() {
        let device = MockDevice::new();
        let intercom = service(device.clone());

        let applied = intercom.set_volumes(15, 0).await.unwrap();
        assert_eq!(applied.mic_volume, 10);
        assert_eq!(applied.speaker_volume, 1);

        let applied = intercom.set_volumes(7, 7).await.unwrap();
        assert_eq!(applied.mic_volume, 7);

        let writes = device.calls_to("set_configuration.fcgi");
        assert_eq!(writes[0]["pjsip"]["mic_volume"], "10");
        assert_eq!(writes[0]["pjsip"]["speaker_volume"], "1");
        assert_eq!(writes[1]["pjsip"]["mic_volume"], "7");
        assert_eq!(writes[1]["pjsip"]["speaker_volume"], "7");
    }

    #[tokio::test]
    async fn every_setter_carries_the_guard_key() {
        let device = MockDevice::new();
        let intercom = service(device.clone());

        intercom.configure_auto_call(true, Some("503")).await.unwrap();
        intercom.configure_auto_answer(true, 5).await.unwrap();
        intercom.set_volumes(5, 5).await.unwrap();
        intercom.configure_door_release(true, "#1234").await.unwrap();
        intercom.configure_video(true).await.unwrap();
        intercom.configure_facial_id(false).await.unwrap();

        let writes = device.calls_to("set_configuration.fcgi");
        assert_eq!(writes.len(), 6);
        for write in &writes {
            assert_eq!(
                write["pjsip"]["dialing_display_mode"], "0",
                "missing guard in {:?}",
                write
            );
        }
    }

    #[tokio::test]
    async fn caller_supplied_guard_value_wins() {
        let device = MockDevice::new();
        let intercom = service(device.clone());

        let raw = json!({ "dialing_display_mode": 1, "enabled": true });
        intercom.set_config(raw.as_object().unwrap()).await.unwrap();

        let writes = device.calls_to("set_configuration.fcgi");
        assert_eq!(writes[0]["pjsip"]["dialing_display_mode"], "1");
        assert_eq!(writes[0]["pjsip"]["enabled"], "1");
    }

    #[tokio::test]
    async fn raw_config_values_are_coerced_to_strings() {
        let device = MockDevice::new();
        let intercom = service(device.clone());

        let raw = json!({ "server_port": 5060, "video_enabled": false, "branch": "1000" });
        intercom.set_config(raw.as_object().unwrap()).await.unwrap();

        let pjsip = &device.calls_to("set_configuration.fcgi")[0]["pjsip"];
        assert_eq!(pjsip["server_port"], "5060");
        assert_eq!(pjsip["video_enabled"], "0");
        assert_eq!(pjsip["branch"], "1000");
    }

    #[tokio::test]
    async fn enabling_auto_call_without_target_is_a_client_error() {
        let device = MockDevice::new();
        let intercom = service(device.clone());

        let err = intercom.configure_auto_call(true, None).await.unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
        assert_eq!(device.total_calls(), 0);

        // Disabling without a target is fine and clears it
        intercom.configure_auto_call(false, None).await.unwrap();
        let writes = device.calls_to("set_configuration.fcgi");
        assert_eq!(writes[0]["pjsip"]["auto_call_button_enabled"], "0");
        assert_eq!(writes[0]["pjsip"]["auto_call_target"], "");
    }
}
