use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use super::client::DeviceAuthClient;
use super::environment::LoginFlow;
use super::error::AuthError;
use super::session::AuthSession;
use super::store::{CredentialStore, CredentialStoreConfig, FileCredentialStore};
use super::token::CredentialSet;
use crate::config::{LoginConfig, Settings};

const TOKEN_REFRESH_INTERVAL_SECS: i64 = 8 * 24 * 60 * 60;

/// Caller-level facade: which flow to drive, fresh sessions, status and
/// logout.
///
/// All I/O decisions (printing, prompting, exit codes) belong to the caller.
///
/// # Example
/// ```no_run
/// use device_auth::auth::service::AuthService;
/// use device_auth::config::Settings;
///
/// let svc = AuthService::from_settings(&Settings::load()?)?;
/// if svc.is_authenticated()? {
///     println!("already logged in");
/// }
/// # Ok::<(), device_auth::auth::AuthError>(())
/// ```
pub struct AuthService {
    client: Arc<DeviceAuthClient>,
    store: Arc<dyn CredentialStore>,
    login: LoginConfig,
}

impl AuthService {
    pub fn new(
        client: Arc<DeviceAuthClient>,
        store: Arc<dyn CredentialStore>,
        login: LoginConfig,
    ) -> Self {
        Self {
            client,
            store,
            login,
        }
    }

    /// Build a service with a file store rooted at the configured home dir.
    pub fn from_settings(settings: &Settings) -> Result<Self, AuthError> {
        let client = Arc::new(DeviceAuthClient::new(settings.device.clone())?);
        let store = Arc::new(FileCredentialStore::new(CredentialStoreConfig::new(
            settings.login.home_dir.clone(),
        )));
        Ok(Self::new(client, store, settings.login.clone()))
    }

    pub fn login_config(&self) -> &LoginConfig {
        &self.login
    }

    /// Device flow when forced by configuration or when the environment is
    /// remote; browser flow otherwise.
    pub fn select_flow(&self) -> LoginFlow {
        let flow = LoginFlow::select(self.login.force_device_flow);
        debug!(%flow, "selected login flow");
        flow
    }

    /// A fresh session for one login attempt.
    pub fn new_session(&self) -> AuthSession {
        AuthSession::new(self.client.clone(), self.store.clone(), self.login.clone())
    }

    /// Stored credentials, or `None` when logged out.
    pub fn status(&self) -> Result<Option<CredentialSet>, AuthError> {
        self.store.load(&self.login.profile)
    }

    pub fn is_authenticated(&self) -> Result<bool, AuthError> {
        Ok(self.status()?.is_some())
    }

    /// Remove stored credentials. Logging out twice is fine.
    pub fn logout(&self) -> Result<(), AuthError> {
        self.store.clear(&self.login.profile)?;
        info!(profile = %self.login.profile, "logged out");
        Ok(())
    }

    /// Current access token, refreshing and re-persisting stale credentials.
    pub async fn access_token(&self) -> Result<String, AuthError> {
        let credentials = self
            .store
            .load(&self.login.profile)?
            .ok_or(AuthError::NotLoggedIn)?;
        if !needs_refresh(&credentials, Utc::now()) {
            return Ok(credentials.access_token);
        }
        debug!(profile = %self.login.profile, "refreshing stale credentials");
        let refreshed = self.client.refresh_credentials(&credentials).await?;
        self.store.save(&self.login.profile, &refreshed)?;
        Ok(refreshed.access_token)
    }
}

fn needs_refresh(credentials: &CredentialSet, now: DateTime<Utc>) -> bool {
    let last = credentials
        .last_refresh
        .unwrap_or_else(|| DateTime::<Utc>::from(std::time::UNIX_EPOCH));
    now - last >= Duration::seconds(TOKEN_REFRESH_INTERVAL_SECS)
}
