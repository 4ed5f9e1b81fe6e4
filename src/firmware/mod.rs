//! Firmware compatibility layer
//!
//! The iDFace line split its configuration API at firmware 6.23:
//! legacy firmware exposes identification-mode / PIN / multi-factor
//! through `general`/`identifier`/`face_id` configuration modules,
//! while 6.23+ removed API access to those fields entirely (operator
//! must use the device's physical menu). Everything above the transport
//! asks this layer which of the two realities applies.
//!
//! The layer also owns the one invariant the device cannot survive us
//! getting wrong: every PJSIP write must carry `dialing_display_mode`.

use crate::device::DeviceApi;
use crate::error::Result;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Version string reported when detection fails or the device omits it
pub const UNKNOWN_VERSION: &str = "unknown";

/// The two behavioral generations of the device API.
///
/// The boundary is a hardcoded compatibility threshold, not configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirmwareTier {
    /// Below 6.23: identification config reachable via API
    Legacy,
    /// 6.23 and above: identification config is menu-only
    V623Plus,
}

impl FirmwareTier {
    /// Label used in REST responses (`firmware_type`)
    pub fn label(&self) -> &'static str {
        match self {
            FirmwareTier::Legacy => "legacy",
            FirmwareTier::V623Plus => "6.23+",
        }
    }
}

/// Detected firmware descriptor, immutable for the process lifetime
/// once cached
#[derive(Debug, Clone)]
pub struct FirmwareInfo {
    pub version: String,
    pub major: u32,
    pub minor: u32,
}

impl FirmwareInfo {
    pub fn unknown() -> Self {
        Self {
            version: UNKNOWN_VERSION.to_string(),
            major: 0,
            minor: 0,
        }
    }

    /// Parse `major.minor` out of a raw version string, tolerantly.
    /// Unparsable input collapses to the unknown descriptor rather than
    /// failing the caller.
    pub fn parse(raw: &str) -> Self {
        let mut parts = raw.split('.');
        let major = parts.next().and_then(|p| p.trim().parse::<u32>().ok());
        let minor = parts.next().and_then(|p| p.trim().parse::<u32>().ok());

        match (major, minor) {
            (Some(major), Some(minor)) => Self {
                version: raw.to_string(),
                major,
                minor,
            },
            _ => Self::unknown(),
        }
    }

    pub fn tier(&self) -> FirmwareTier {
        if self.major > 6 || (self.major == 6 && self.minor >= 23) {
            FirmwareTier::V623Plus
        } else {
            FirmwareTier::Legacy
        }
    }

    pub fn is_legacy(&self) -> bool {
        self.tier() == FirmwareTier::Legacy
    }

    pub fn is_623_or_higher(&self) -> bool {
        self.tier() == FirmwareTier::V623Plus
    }
}

/// Detects and caches the device firmware version.
///
/// The device's firmware does not change during the gateway's
/// operational lifetime, so detection happens at most once per process
/// unless the cache is explicitly cleared.
pub struct FirmwareService {
    device: Arc<dyn DeviceApi>,
    cache: RwLock<Option<FirmwareInfo>>,
}

impl FirmwareService {
    pub fn new(device: Arc<dyn DeviceApi>) -> Self {
        Self {
            device,
            cache: RwLock::new(None),
        }
    }

    /// Detect the firmware version, hitting the device at most once.
    ///
    /// Never errors: transport failure logs and yields the unknown
    /// descriptor (which classifies as legacy).
    pub async fn detect(&self) -> FirmwareInfo {
        if let Some(info) = self.cache.read().await.as_ref() {
            return info.clone();
        }

        let mut cache = self.cache.write().await;
        // Another caller may have won the race while we waited
        if let Some(info) = cache.as_ref() {
            return info.clone();
        }

        let info = match self.device.system_information().await {
            Ok(body) => {
                let raw = body
                    .get("version")
                    .or_else(|| body.get("firmware"))
                    .and_then(|v| v.as_str());
                match raw {
                    Some(raw) => {
                        let info = FirmwareInfo::parse(raw);
                        info!(
                            version = %info.version,
                            tier = info.tier().label(),
                            "Firmware detected"
                        );
                        info
                    }
                    None => {
                        warn!("Device reported no firmware version");
                        FirmwareInfo::unknown()
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Firmware detection failed");
                FirmwareInfo::unknown()
            }
        };

        *cache = Some(info.clone());
        info
    }

    /// Cached descriptor, if detection already ran; never triggers I/O
    pub async fn cached(&self) -> Option<FirmwareInfo> {
        self.cache.read().await.clone()
    }

    /// Drop the cached descriptor so the next `detect` queries the
    /// device again
    pub async fn clear_cache(&self) {
        *self.cache.write().await = None;
    }
}

/// The minimal PJSIP fragment that must be merged into every write to
/// that module. Omitting `dialing_display_mode` is documented to crash
/// the device firmware.
pub fn safe_pjsip_defaults() -> BTreeMap<String, String> {
    BTreeMap::from([("dialing_display_mode".to_string(), "0".to_string())])
}

/// Merge a PJSIP payload over the safe defaults. Caller-supplied values
/// win on key collision; the guarded key itself can only be overridden,
/// never omitted.
pub fn guarded_pjsip(overrides: BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut merged = safe_pjsip_defaults();
    merged.extend(overrides);
    merged
}

/// Serialize one JSON value into the device's string-typed wire format.
///
/// The device reads every configuration value as a string, booleans and
/// integers included.
pub fn wire_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) => "0".to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Coerce an entire caller-supplied module payload to wire strings
pub fn wire_map(raw: &Map<String, Value>) -> BTreeMap<String, String> {
    raw.iter().map(|(k, v)| (k.clone(), wire_value(v))).collect()
}

/// Wire string for a native bool
pub fn wire_bool(value: bool) -> String {
    if value { "1" } else { "0" }.to_string()
}
