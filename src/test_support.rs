//! Scripted device used by unit tests
//!
//! Records every FCGI call and replays canned responses per endpoint.
//! Un-scripted endpoints answer an empty object, which matches the
//! device's behavior for most write endpoints.

use crate::device::DeviceApi;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Clone)]
enum Script {
    Respond(Value),
    Fail(String),
    FailWithStatus(u16, String),
}

#[derive(Default)]
pub struct MockDevice {
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl MockDevice {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Answer `endpoint` with `body` on every call
    pub fn respond(&self, endpoint: &str, body: Value) {
        self.scripts
            .lock()
            .unwrap()
            .insert(endpoint.to_string(), Script::Respond(body));
    }

    /// Fail `endpoint` with a transport-style error
    pub fn fail(&self, endpoint: &str, message: &str) {
        self.scripts
            .lock()
            .unwrap()
            .insert(endpoint.to_string(), Script::Fail(message.to_string()));
    }

    /// Fail `endpoint` with a device-rejected error carrying a status
    pub fn fail_with_status(&self, endpoint: &str, status: u16, message: &str) {
        self.scripts.lock().unwrap().insert(
            endpoint.to_string(),
            Script::FailWithStatus(status, message.to_string()),
        );
    }

    /// Payloads sent to `endpoint`, in call order
    pub fn calls_to(&self, endpoint: &str) -> Vec<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(e, _)| e == endpoint)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    pub fn call_count(&self, endpoint: &str) -> usize {
        self.calls_to(endpoint).len()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn dispatch(&self, endpoint: &str, payload: Value) -> Result<Value> {
        self.calls
            .lock()
            .unwrap()
            .push((endpoint.to_string(), payload));

        let script = self.scripts.lock().unwrap().get(endpoint).cloned();
        match script {
            Some(Script::Respond(body)) => Ok(body),
            Some(Script::Fail(message)) => Err(Error::Transport(message)),
            Some(Script::FailWithStatus(status, message)) => Err(Error::Device {
                status,
                message,
                details: None,
            }),
            None => Ok(json!({})),
        }
    }
}

#[async_trait]
impl DeviceApi for MockDevice {
    async fn post_fcgi(&self, endpoint: &str, payload: Value) -> Result<Value> {
        self.dispatch(endpoint, payload)
    }

    async fn post_fcgi_raw(&self, endpoint: &str, body: Vec<u8>) -> Result<Value> {
        self.dispatch(endpoint, json!({ "bytes": body.len() }))
    }

    async fn fetch_fcgi_bytes(&self, endpoint: &str) -> Result<Vec<u8>> {
        self.dispatch(endpoint, json!({}))?;
        Ok(Vec::new())
    }
}
