//! Configuration system (layered: code > env > config file > defaults).

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::auth::error::AuthError;
use crate::auth::store::default_home_dir;

pub const DEFAULT_ISSUER: &str = "https://auth.openai.com";
pub const DEFAULT_CLIENT_ID: &str = "app_EMoamEEZ73f0CkXaXp7hrann";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_LOGIN_TIMEOUT: Duration = Duration::from_secs(15 * 60);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_PROFILE: &str = "default";
/// Longest wait a login attempt will honour; larger timeouts are clamped.
pub const MAX_LOGIN_TIMEOUT: Duration = Duration::from_secs(7 * 24 * 60 * 60);
/// Shortest gap between two polls, whatever the override says.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);
const CONFIG_FILE_NAME: &str = "config.toml";

/// Provider endpoints and client registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceAuthConfig {
    pub issuer: String,
    pub client_id: String,
    /// Upper bound for a single HTTP request.
    pub request_timeout: Duration,
}

impl Default for DeviceAuthConfig {
    fn default() -> Self {
        Self {
            issuer: DEFAULT_ISSUER.to_string(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl DeviceAuthConfig {
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub(crate) fn issuer_base(&self) -> &str {
        self.issuer.trim_end_matches('/')
    }
}

/// Settings for one login attempt and where its result is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginConfig {
    /// Overrides the provider-specified polling interval when set.
    pub poll_interval: Option<Duration>,
    pub timeout: Duration,
    /// Use the device flow even when the environment looks local.
    pub force_device_flow: bool,
    pub home_dir: PathBuf,
    pub profile: String,
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            poll_interval: None,
            timeout: DEFAULT_LOGIN_TIMEOUT,
            force_device_flow: false,
            home_dir: default_home_dir(),
            profile: DEFAULT_PROFILE.to_string(),
        }
    }
}

impl LoginConfig {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_force_device_flow(mut self, force: bool) -> Self {
        self.force_device_flow = force;
        self
    }

    pub fn with_home_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.home_dir = dir.into();
        self
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = profile.into();
        self
    }

    /// Interval to use for a request whose provider suggested `provider_secs`.
    pub fn effective_poll_interval(&self, provider_secs: u64) -> Duration {
        let interval = self.poll_interval.unwrap_or_else(|| {
            if provider_secs == 0 {
                DEFAULT_POLL_INTERVAL
            } else {
                Duration::from_secs(provider_secs)
            }
        });
        interval.max(MIN_POLL_INTERVAL)
    }

    /// The login timeout, clamped to [`MAX_LOGIN_TIMEOUT`].
    pub fn effective_timeout(&self) -> Duration {
        self.timeout.min(MAX_LOGIN_TIMEOUT)
    }
}

/// Everything loaded at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub device: DeviceAuthConfig,
    pub login: LoginConfig,
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    issuer: Option<String>,
    client_id: Option<String>,
    request_timeout_secs: Option<u64>,
    poll_interval_secs: Option<u64>,
    timeout_secs: Option<u64>,
    force_device_flow: Option<bool>,
    profile: Option<String>,
}

impl Settings {
    /// Load from `.env`, the process environment and `<home>/config.toml`.
    pub fn load() -> Result<Self, AuthError> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        Self::from_sources(|key| std::env::var_os(key))
    }

    /// Resolve settings from a variable lookup plus the config file in the
    /// resolved home directory.
    pub fn from_sources<F>(lookup: F) -> Result<Self, AuthError>
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let var = |key: &str| {
            lookup(key)
                .and_then(|v| v.into_string().ok())
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let home_dir = var("DEVICE_AUTH_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(default_home_dir);
        let file = read_file_settings(&home_dir.join(CONFIG_FILE_NAME))?;

        let mut settings = Settings::default();
        settings.login.home_dir = home_dir;

        if let Some(issuer) = var("DEVICE_AUTH_ISSUER").or(file.issuer) {
            settings.device.issuer = issuer;
        }
        if let Some(client_id) = var("DEVICE_AUTH_CLIENT_ID").or(file.client_id) {
            settings.device.client_id = client_id;
        }
        if let Some(secs) =
            env_secs(&var, "DEVICE_AUTH_REQUEST_TIMEOUT_SECS")?.or(file.request_timeout_secs)
        {
            settings.device.request_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) =
            env_secs(&var, "DEVICE_AUTH_POLL_INTERVAL_SECS")?.or(file.poll_interval_secs)
        {
            settings.login.poll_interval = Some(Duration::from_secs(secs.max(1)));
        }
        if let Some(secs) = env_secs(&var, "DEVICE_AUTH_TIMEOUT_SECS")?.or(file.timeout_secs) {
            settings.login.timeout = Duration::from_secs(secs);
        }
        if let Some(force) =
            env_bool(&var, "DEVICE_AUTH_FORCE_DEVICE_FLOW")?.or(file.force_device_flow)
        {
            settings.login.force_device_flow = force;
        }
        if let Some(profile) = var("DEVICE_AUTH_PROFILE").or(file.profile) {
            settings.login.profile = profile;
        }

        Ok(settings)
    }
}

fn read_file_settings(path: &Path) -> Result<FileSettings, AuthError> {
    match std::fs::read_to_string(path) {
        Ok(raw) => toml::from_str(&raw).map_err(|e| {
            AuthError::Configuration(format!("invalid {}: {e}", path.display()))
        }),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(FileSettings::default()),
        Err(err) => Err(AuthError::Io(err.to_string())),
    }
}

fn env_secs<V>(var: &V, key: &str) -> Result<Option<u64>, AuthError>
where
    V: Fn(&str) -> Option<String>,
{
    var(key)
        .map(|v| {
            v.parse::<u64>().map_err(|_| {
                AuthError::Configuration(format!(
                    "{key} must be a whole number of seconds, got {v:?}"
                ))
            })
        })
        .transpose()
}

fn env_bool<V>(var: &V, key: &str) -> Result<Option<bool>, AuthError>
where
    V: Fn(&str) -> Option<String>,
{
    var(key)
        .map(|v| match v.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(AuthError::Configuration(format!(
                "{key} must be a boolean, got {v:?}"
            ))),
        })
        .transpose()
}
