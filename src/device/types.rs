//! Wire types for the device's FCGI API
//!
//! The device speaks JSON over HTTP, but every configuration value is
//! string-typed on the wire. Typed structs here stay native; the string
//! conversion happens once at the transport edge.

use serde::{Deserialize, Serialize};

/// Body for `login.fcgi`
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub login: String,
    pub password: String,
}

/// Response from `login.fcgi`
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub session: String,
}

/// Response from `session_is_valid.fcgi`
#[derive(Debug, Clone, Deserialize)]
pub struct SessionIsValidResponse {
    #[serde(default)]
    pub session_is_valid: bool,
}

/// Response from `get_sip_status.fcgi`
///
/// `status` is the SIP registration code: 200 registered, 408 timeout,
/// -1 disabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SipStatus {
    #[serde(default = "default_sip_status")]
    pub status: i64,
    #[serde(default)]
    pub in_call: bool,
}

fn default_sip_status() -> i64 {
    -1
}

impl Default for SipStatus {
    fn default() -> Self {
        Self {
            status: -1,
            in_call: false,
        }
    }
}

impl SipStatus {
    /// 200 is the device's "registered with the SIP server" code
    pub fn is_registered(&self) -> bool {
        self.status == 200
    }
}

/// A user record as returned by `load_objects` for `users`.
///
/// Only the fields the custody diagnostics need; the two firmware
/// generations signal an enrolled face differently (`image_timestamp`
/// on 6.23+, `templates` on legacy).
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceUser {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub image_timestamp: Option<i64>,
    #[serde(default)]
    pub templates: Option<Vec<serde_json::Value>>,
}

impl DeviceUser {
    /// Whether the user has an enrolled face, on either firmware shape
    pub fn has_face(&self) -> bool {
        self.image_timestamp.map(|t| t > 0).unwrap_or(false)
            || self.templates.as_ref().map(|t| !t.is_empty()).unwrap_or(false)
    }

    /// PINs are stored in the user's password attribute
    pub fn has_pin(&self) -> bool {
        self.password.as_ref().map(|p| !p.is_empty()).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sip_status_defaults_to_disabled() {
        let status: SipStatus = serde_json::from_value(json!({})).unwrap();
        assert_eq!(status.status, -1);
        assert!(!status.in_call);
        assert!(!status.is_registered());
    }

    #[test]
    fn sip_status_registered_at_200() {
        let status: SipStatus = serde_json::from_value(json!({"status": 200})).unwrap();
        assert!(status.is_registered());

        let status: SipStatus = serde_json::from_value(json!({"status": 408})).unwrap();
        assert!(!status.is_registered());
    }

    #[test]
    fn user_face_detection_covers_both_firmware_shapes() {
        // 6.23+ shape: image_timestamp
        let user: DeviceUser =
            serde_json::from_value(json!({"id": 1, "name": "a", "image_timestamp": 1700000000}))
                .unwrap();
        assert!(user.has_face());

        // Legacy shape: templates list
        let user: DeviceUser =
            serde_json::from_value(json!({"id": 2, "name": "b", "templates": [{"t": 1}]})).unwrap();
        assert!(user.has_face());

        // Neither
        let user: DeviceUser =
            serde_json::from_value(json!({"id": 3, "name": "c", "image_timestamp": 0, "templates": []}))
                .unwrap();
        assert!(!user.has_face());
    }

    #[test]
    fn user_pin_is_the_password_field() {
        let user: DeviceUser =
            serde_json::from_value(json!({"id": 1, "password": "1234"})).unwrap();
        assert!(user.has_pin());

        let user: DeviceUser = serde_json::from_value(json!({"id": 1, "password": ""})).unwrap();
        assert!(!user.has_pin());

        let user: DeviceUser = serde_json::from_value(json!({"id": 1})).unwrap();
        assert!(!user.has_pin());
    }
}
