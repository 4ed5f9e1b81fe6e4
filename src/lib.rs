//! iDFace gateway
//!
//! REST gateway in front of a Control iD iDFace access-control device.
//! Wraps the device's session-authenticated FCGI API and layers
//! firmware-aware custody workflows, SIP intercom configuration, and
//! monitor-mode event handling on top of it.

pub mod custody;
pub mod device;
pub mod error;
pub mod firmware;
pub mod intercom;
pub mod models;
pub mod state;
pub mod web_api;

#[cfg(test)]
pub(crate) mod test_support;
