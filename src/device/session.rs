//! Session lifecycle against the device
//!
//! The device issues a single live session per login; a fresh login
//! invalidates the previous token. The manager therefore serializes all
//! authentication behind one mutex so concurrent requests never race
//! independent logins against each other.

use crate::device::types::{LoginRequest, LoginResponse, SessionIsValidResponse};
use crate::error::{Error, Result};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// How often an existing token is re-validated against the device
pub const SESSION_CHECK_INTERVAL: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
struct Session {
    token: String,
    last_checked: Instant,
}

/// Manages the device session token
pub struct SessionManager {
    http: reqwest::Client,
    base_url: String,
    login: String,
    password: String,
    state: Mutex<Option<Session>>,
    check_interval: Duration,
}

impl SessionManager {
    pub fn new(
        http: reqwest::Client,
        base_url: String,
        login: String,
        password: String,
    ) -> Self {
        Self {
            http,
            base_url,
            login,
            password,
            state: Mutex::new(None),
            check_interval: SESSION_CHECK_INTERVAL,
        }
    }

    /// Return a live session token, logging in or re-validating as needed.
    ///
    /// The state mutex is held across the login round trip, so concurrent
    /// callers wait for the in-flight authentication instead of starting
    /// their own.
    pub async fn token(&self) -> Result<String> {
        let mut guard = self.state.lock().await;

        if let Some(session) = guard.as_mut() {
            if session.last_checked.elapsed() < self.check_interval {
                return Ok(session.token.clone());
            }
            if self.check_token(&session.token).await {
                session.last_checked = Instant::now();
                return Ok(session.token.clone());
            }
            info!("Session expired, re-authenticating");
            *guard = None;
        }

        let token = self.login_device().await?;
        *guard = Some(Session {
            token: token.clone(),
            last_checked: Instant::now(),
        });
        Ok(token)
    }

    /// Drop the current token. The next call that needs a session logs in
    /// from scratch. Used by the 401/403 retry path and by reboot.
    pub async fn invalidate(&self) {
        let mut guard = self.state.lock().await;
        if guard.take().is_some() {
            info!("Session invalidated");
        }
    }

    /// Lightweight session check; never errors.
    ///
    /// False both when no session exists and when the device reports the
    /// token invalid or is unreachable.
    pub async fn is_session_valid(&self) -> bool {
        let token = {
            let guard = self.state.lock().await;
            match guard.as_ref() {
                Some(session) => session.token.clone(),
                None => return false,
            }
        };
        self.check_token(&token).await
    }

    /// Masked tail of the current token for status display
    pub async fn masked_token(&self) -> Option<String> {
        let guard = self.state.lock().await;
        guard.as_ref().map(|s| {
            let tail: String = s
                .token
                .chars()
                .rev()
                .take(6)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            format!("***{}", tail)
        })
    }

    /// One pass of the periodic background check.
    ///
    /// Clears an invalid token so the next real request re-authenticates;
    /// deliberately does not re-login eagerly, to avoid waking the device
    /// while the gateway is idle.
    pub async fn background_check(&self) {
        let mut guard = self.state.lock().await;
        let Some(session) = guard.as_ref() else {
            return;
        };
        if !self.check_token(&session.token).await {
            warn!("Background check: session no longer valid, clearing token");
            *guard = None;
        }
    }

    async fn login_device(&self) -> Result<String> {
        info!(device = %self.base_url, "Authenticating against device");

        let response = self
            .http
            .post(format!("{}/login.fcgi", self.base_url))
            .json(&LoginRequest {
                login: self.login.clone(),
                password: self.password.clone(),
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Device {
                status: status.as_u16(),
                message: format!("login failed with status {}", status.as_u16()),
                details: serde_json::from_str(&body).ok(),
            });
        }

        let login: LoginResponse = response
            .json()
            .await
            .map_err(|e| Error::Transport(format!("malformed login response: {}", e)))?;

        info!("Device login succeeded");
        Ok(login.session)
    }

    async fn check_token(&self, token: &str) -> bool {
        let url = format!("{}/session_is_valid.fcgi?session={}", self.base_url, token);
        match self.http.post(url).send().await {
            Ok(response) => match response.json::<SessionIsValidResponse>().await {
                Ok(body) => body.session_is_valid,
                Err(_) => false,
            },
            Err(e) => {
                warn!(error = %e, "Session check failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::State, routing::post, Json, Router};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Local stand-in for the device's login endpoints. Counts logins
    /// and issues a distinct token per login.
    #[derive(Default)]
    struct StubDevice {
        logins: AtomicUsize,
        session_valid: AtomicBool,
    }

    async fn login(State(stub): State<Arc<StubDevice>>) -> Json<Value> {
        let n = stub.logins.fetch_add(1, Ordering::SeqCst) + 1;
        Json(json!({ "session": format!("token-{}", n) }))
    }

    async fn session_is_valid(State(stub): State<Arc<StubDevice>>) -> Json<Value> {
        Json(json!({ "session_is_valid": stub.session_valid.load(Ordering::SeqCst) }))
    }

    async fn spawn_stub(stub: Arc<StubDevice>) -> String {
        let router = Router::new()
            .route("/login.fcgi", post(login))
            .route("/session_is_valid.fcgi", post(session_is_valid))
            .with_state(stub);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn manager(base_url: String) -> Arc<SessionManager> {
        Arc::new(SessionManager::new(
            reqwest::Client::new(),
            base_url,
            "admin".to_string(),
            "admin".to_string(),
        ))
    }

    #[tokio::test]
    async fn concurrent_callers_share_a_single_login() {
        let stub = Arc::new(StubDevice::default());
        let base = spawn_stub(stub.clone()).await;
        let manager = manager(base);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let manager = manager.clone();
            handles.push(tokio::spawn(async move { manager.token().await.unwrap() }));
        }
        let mut tokens = Vec::new();
        for handle in handles {
            tokens.push(handle.await.unwrap());
        }

        assert_eq!(stub.logins.load(Ordering::SeqCst), 1);
        assert!(tokens.iter().all(|t| t == "token-1"));
    }

    #[tokio::test]
    async fn invalidate_forces_a_fresh_login() {
        let stub = Arc::new(StubDevice::default());
        let base = spawn_stub(stub.clone()).await;
        let manager = manager(base);

        assert_eq!(manager.token().await.unwrap(), "token-1");
        // Within the check interval the cached token is reused
        assert_eq!(manager.token().await.unwrap(), "token-1");
        assert_eq!(stub.logins.load(Ordering::SeqCst), 1);

        manager.invalidate().await;
        assert_eq!(manager.token().await.unwrap(), "token-2");
        assert_eq!(stub.logins.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn background_check_clears_rejected_token_without_relogin() {
        let stub = Arc::new(StubDevice::default());
        let base = spawn_stub(stub.clone()).await;
        let manager = manager(base);

        manager.token().await.unwrap();
        // The stub reports every token invalid
        assert!(!manager.is_session_valid().await);

        manager.background_check().await;
        assert!(manager.masked_token().await.is_none(), "token cleared");
        assert_eq!(stub.logins.load(Ordering::SeqCst), 1, "no eager re-login");

        // The next real request authenticates from scratch
        assert_eq!(manager.token().await.unwrap(), "token-2");
    }

    #[tokio::test]
    async fn masked_token_exposes_only_the_tail() {
        let stub = Arc::new(StubDevice::default());
        let base = spawn_stub(stub.clone()).await;
        let manager = manager(base);

        assert!(manager.masked_token().await.is_none());
        manager.token().await.unwrap();
        assert_eq!(manager.masked_token().await.as_deref(), Some("***oken-1"));
    }
}
