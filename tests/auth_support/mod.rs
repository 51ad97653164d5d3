#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use device_auth::auth::{
    AuthError, AuthSession, CredentialSet, CredentialStore, DeviceAuthClient, SessionState,
};
use device_auth::config::{DeviceAuthConfig, LoginConfig};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const USERCODE_PATH: &str = "/api/accounts/deviceauth/usercode";
pub const POLL_PATH: &str = "/api/accounts/deviceauth/token";
pub const TOKEN_PATH: &str = "/oauth/token";

#[derive(Default)]
pub struct InMemoryCredentialStore {
    credentials: Mutex<HashMap<String, CredentialSet>>,
    saves: AtomicUsize,
    fail_saves: AtomicBool,
    save_delay_ms: AtomicU64,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, profile: &str, credentials: CredentialSet) {
        self.credentials
            .lock()
            .expect("store lock poisoned")
            .insert(profile.to_string(), credentials);
    }

    pub fn get(&self, profile: &str) -> Option<CredentialSet> {
        self.credentials
            .lock()
            .expect("store lock poisoned")
            .get(profile)
            .cloned()
    }

    /// Number of `save` calls, counted when the call begins.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Make every later `save` fail with an I/O error.
    pub fn fail_saves(&self) {
        self.fail_saves.store(true, Ordering::SeqCst);
    }

    /// Block each later `save` for `delay`, like a slow disk.
    pub fn delay_saves(&self, delay: Duration) {
        self.save_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn load(&self, profile: &str) -> Result<Option<CredentialSet>, AuthError> {
        Ok(self.get(profile))
    }

    fn save(&self, profile: &str, credentials: &CredentialSet) -> Result<(), AuthError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        let delay_ms = self.save_delay_ms.load(Ordering::SeqCst);
        if delay_ms > 0 {
            std::thread::sleep(Duration::from_millis(delay_ms));
        }
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(AuthError::Io("disk full".to_string()));
        }
        self.credentials
            .lock()
            .expect("store lock poisoned")
            .insert(profile.to_string(), credentials.clone());
        Ok(())
    }

    fn clear(&self, profile: &str) -> Result<(), AuthError> {
        self.credentials
            .lock()
            .expect("store lock poisoned")
            .remove(profile);
        Ok(())
    }
}

/// Issuer URL on a local port with nothing listening.
pub fn closed_port_issuer() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    format!("http://{addr}")
}

pub fn client_for_issuer(issuer: &str) -> Arc<DeviceAuthClient> {
    Arc::new(
        DeviceAuthClient::new(DeviceAuthConfig::default().with_issuer(issuer)).expect("client"),
    )
}

pub fn client_for(server: &MockServer) -> Arc<DeviceAuthClient> {
    Arc::new(
        DeviceAuthClient::new(DeviceAuthConfig::default().with_issuer(server.uri()))
            .expect("client"),
    )
}

/// Login settings with short real-time intervals so tests finish quickly.
pub fn fast_login(interval_ms: u64, timeout_ms: u64) -> LoginConfig {
    LoginConfig::default()
        .with_poll_interval(Duration::from_millis(interval_ms))
        .with_timeout(Duration::from_millis(timeout_ms))
}

pub fn session_for(
    server: &MockServer,
    store: Arc<InMemoryCredentialStore>,
    login: LoginConfig,
) -> Arc<AuthSession> {
    Arc::new(AuthSession::new(client_for(server), store, login))
}

pub fn id_token_for(account_id: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256"}"#);
    let payload = URL_SAFE_NO_PAD.encode(
        json!({ "https://api.openai.com/auth": { "chatgpt_account_id": account_id } })
            .to_string(),
    );
    format!("{header}.{payload}.signature")
}

pub async fn mount_device_code(server: &MockServer, device_auth_id: &str, user_code: &str) {
    Mock::given(method("POST"))
        .and(path(USERCODE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "device_auth_id": device_auth_id,
            "user_code": user_code,
            "interval": 5
        })))
        .mount(server)
        .await;
}

pub async fn mount_token_success(server: &MockServer, account_id: &str) {
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id_token": id_token_for(account_id),
            "access_token": "new-access-token",
            "refresh_token": "new-refresh-token"
        })))
        .expect(1)
        .mount(server)
        .await;
}

pub fn grant_body() -> serde_json::Value {
    json!({
        "authorization_code": "ac1",
        "code_challenge": "cc",
        "code_verifier": "cv"
    })
}

/// Wait until the session reaches a state matching `pred`, failing after a
/// second.
pub async fn wait_for_state<F>(session: &AuthSession, pred: F) -> SessionState
where
    F: Fn(&SessionState) -> bool,
{
    let mut rx = session.subscribe();
    let result = tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            let current = rx.borrow_and_update().clone();
            if pred(&current) {
                return current;
            }
            if rx.changed().await.is_err() {
                return current;
            }
        }
    })
    .await;
    result.expect("session did not reach expected state in time")
}
