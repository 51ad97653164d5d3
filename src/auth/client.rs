use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::device_code::{AuthorizationOutcome, DeviceAuthorizationRequest};
use super::error::AuthError;
use super::token::CredentialSet;
use crate::config::{
    DeviceAuthConfig, DEFAULT_POLL_INTERVAL, MAX_LOGIN_TIMEOUT, MIN_POLL_INTERVAL,
};

/// How long the provider keeps an issued device code alive.
const DEVICE_CODE_LIFETIME_MINS: i64 = 15;

/// Result of a single poll against the device-token endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus {
    /// The user has not approved the code yet.
    Pending,
    /// Approved; the grant still has to be exchanged for tokens.
    Authorized(AuthorizationGrant),
}

/// Authorization code plus PKCE material returned once the user approves.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthorizationGrant {
    pub authorization_code: String,
    #[serde(default)]
    pub code_challenge: Option<String>,
    pub code_verifier: String,
}

/// HTTP client for the provider's device authorization endpoints.
///
/// # Example
/// ```no_run
/// use device_auth::auth::DeviceAuthClient;
/// use device_auth::config::DeviceAuthConfig;
///
/// # async fn example() -> Result<(), device_auth::auth::AuthError> {
/// let client = DeviceAuthClient::new(DeviceAuthConfig::default())?;
/// let request = client.request_device_code().await?;
/// println!("Visit {} and enter {}", request.verification_url, request.user_code);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct DeviceAuthClient {
    http: reqwest::Client,
    config: DeviceAuthConfig,
}

impl DeviceAuthClient {
    pub fn new(config: DeviceAuthConfig) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AuthError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &DeviceAuthConfig {
        &self.config
    }

    pub fn verification_url(&self) -> String {
        format!("{}/codex/device", self.config.issuer_base())
    }

    fn device_redirect_uri(&self) -> String {
        format!("{}/deviceauth/callback", self.config.issuer_base())
    }

    fn token_url(&self) -> String {
        format!("{}/oauth/token", self.config.issuer_base())
    }

    /// Ask the provider to issue a device code and user code.
    pub async fn request_device_code(&self) -> Result<DeviceAuthorizationRequest, AuthError> {
        let url = format!(
            "{}/api/accounts/deviceauth/usercode",
            self.config.issuer_base()
        );
        let resp = self
            .http
            .post(url)
            .json(&UserCodeRequest {
                client_id: &self.config.client_id,
            })
            .send()
            .await
            .map_err(|e| AuthError::request_failed(None, e.to_string()))?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(AuthError::NotEnabled);
        }
        if !status.is_success() {
            return Err(AuthError::request_failed(
                Some(status.as_u16()),
                format!("device code endpoint returned {status}"),
            ));
        }
        let payload: UserCodeResponse = read_json(resp)
            .await
            .map_err(|e| e.into_error(AuthError::request_failed))?;
        let poll_interval_secs = match payload.interval {
            0 => DEFAULT_POLL_INTERVAL.as_secs(),
            secs => secs,
        };
        info!(poll_interval_secs, "device code issued");
        Ok(DeviceAuthorizationRequest {
            device_auth_id: payload.device_auth_id,
            user_code: payload.user_code,
            poll_interval_secs,
            verification_url: self.verification_url(),
            expires_at: Utc::now() + chrono::Duration::minutes(DEVICE_CODE_LIFETIME_MINS),
        })
    }

    /// Issue one poll for `request`.
    ///
    /// 403 and 404 mean the user has not approved yet. Every other
    /// non-success status is fatal.
    pub async fn poll_once(
        &self,
        request: &DeviceAuthorizationRequest,
    ) -> Result<PollStatus, AuthError> {
        let url = format!(
            "{}/api/accounts/deviceauth/token",
            self.config.issuer_base()
        );
        let resp = self
            .http
            .post(url)
            .json(&DeviceTokenRequest {
                device_auth_id: &request.device_auth_id,
                user_code: &request.user_code,
            })
            .send()
            .await
            .map_err(|e| AuthError::request_failed(None, e.to_string()))?;
        let status = resp.status();
        if status.is_success() {
            let grant: AuthorizationGrant = read_json(resp)
                .await
                .map_err(|e| e.into_error(AuthError::request_failed))?;
            check_pkce_pair(&grant);
            return Ok(PollStatus::Authorized(grant));
        }
        if status == StatusCode::FORBIDDEN || status == StatusCode::NOT_FOUND {
            return Ok(PollStatus::Pending);
        }
        Err(AuthError::request_failed(
            Some(status.as_u16()),
            format!("device authorization poll returned {status}"),
        ))
    }

    /// Poll every `interval` until the user approves, `timeout` elapses, or
    /// `cancel` fires, then exchange the grant.
    ///
    /// `timeout` is capped at [`MAX_LOGIN_TIMEOUT`] and `interval` is raised to
    /// at least [`MIN_POLL_INTERVAL`].
    pub async fn poll_for_authorization(
        &self,
        request: &DeviceAuthorizationRequest,
        interval: Duration,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> AuthorizationOutcome {
        self.poll_for_authorization_with_progress(request, interval, timeout, cancel, || {})
            .await
    }

    /// Like [`poll_for_authorization`](Self::poll_for_authorization), calling
    /// `on_authorized` once the provider approves and before the exchange.
    pub async fn poll_for_authorization_with_progress<F>(
        &self,
        request: &DeviceAuthorizationRequest,
        interval: Duration,
        timeout: Duration,
        cancel: &CancellationToken,
        on_authorized: F,
    ) -> AuthorizationOutcome
    where
        F: FnOnce(),
    {
        let started = Instant::now();
        let deadline = started + timeout.min(MAX_LOGIN_TIMEOUT);
        let interval = interval.max(MIN_POLL_INTERVAL);
        let mut polls: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return AuthorizationOutcome::Cancelled;
            }
            if Instant::now() >= deadline {
                info!(polls, "device authorization expired");
                return AuthorizationOutcome::Expired;
            }

            polls += 1;
            let polled = tokio::select! {
                biased;
                _ = cancel.cancelled() => return AuthorizationOutcome::Cancelled,
                _ = sleep_until(deadline) => {
                    info!(polls, "device authorization expired");
                    return AuthorizationOutcome::Expired;
                }
                result = self.poll_once(request) => result,
            };

            match polled {
                Ok(PollStatus::Pending) => {
                    debug!(polls, "device authorization pending");
                }
                Ok(PollStatus::Authorized(grant)) => {
                    info!(
                        polls,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "device authorization approved"
                    );
                    on_authorized();
                    let exchanged = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return AuthorizationOutcome::Cancelled,
                        result = self.exchange_for_credentials(
                            &grant.authorization_code,
                            &grant.code_verifier,
                        ) => result,
                    };
                    return match exchanged {
                        Ok(credentials) => AuthorizationOutcome::Credentials(credentials),
                        Err(err) => {
                            warn!(status = ?err.status(), error = %err, "token exchange failed");
                            AuthorizationOutcome::Failed(err)
                        }
                    };
                }
                Err(err) => {
                    warn!(
                        polls,
                        status = ?err.status(),
                        error = %err,
                        "device authorization poll failed"
                    );
                    return AuthorizationOutcome::Failed(err);
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return AuthorizationOutcome::Cancelled,
                _ = sleep_until(deadline) => {
                    info!(polls, "device authorization expired");
                    return AuthorizationOutcome::Expired;
                }
                _ = sleep(interval) => {}
            }
        }
    }

    /// Trade an approved authorization code for a token set.
    pub async fn exchange_for_credentials(
        &self,
        authorization_code: &str,
        code_verifier: &str,
    ) -> Result<CredentialSet, AuthError> {
        let redirect_uri = self.device_redirect_uri();
        let resp = self
            .http
            .post(self.token_url())
            .form(&[
                ("grant_type", "authorization_code"),
                ("client_id", self.config.client_id.as_str()),
                ("code", authorization_code),
                ("redirect_uri", redirect_uri.as_str()),
                ("code_verifier", code_verifier),
            ])
            .send()
            .await
            .map_err(|e| AuthError::exchange_failed(None, e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(AuthError::exchange_failed(
                Some(status.as_u16()),
                format!("token endpoint returned {status}"),
            ));
        }
        let payload: TokenResponse = read_json(resp)
            .await
            .map_err(|e| e.into_error(AuthError::exchange_failed))?;
        let credentials =
            CredentialSet::new(payload.access_token, payload.refresh_token, payload.id_token);
        if credentials.account_id.is_none() {
            debug!("id token carries no account id claim");
        }
        Ok(credentials)
    }

    /// Use the refresh token to obtain a new token set.
    pub async fn refresh_credentials(
        &self,
        credentials: &CredentialSet,
    ) -> Result<CredentialSet, AuthError> {
        if credentials.refresh_token.is_empty() {
            return Err(AuthError::ExpiredOrInvalidGrant);
        }
        let resp = self
            .http
            .post(self.token_url())
            .json(&RefreshRequest {
                client_id: &self.config.client_id,
                grant_type: "refresh_token",
                refresh_token: &credentials.refresh_token,
                scope: "openid profile email",
            })
            .send()
            .await
            .map_err(|e| AuthError::exchange_failed(None, e.to_string()))?;
        let status = resp.status();
        if status.is_success() {
            let payload: RefreshResponse = read_json(resp)
                .await
                .map_err(|e| e.into_error(AuthError::exchange_failed))?;
            let mut refreshed = CredentialSet::new(
                payload.access_token,
                payload
                    .refresh_token
                    .unwrap_or_else(|| credentials.refresh_token.clone()),
                payload
                    .id_token
                    .unwrap_or_else(|| credentials.id_token.clone()),
            );
            if refreshed.account_id.is_none() {
                refreshed.account_id = credentials.account_id.clone();
            }
            return Ok(refreshed);
        }
        let body = resp.text().await.unwrap_or_default();
        if status == StatusCode::UNAUTHORIZED {
            let code = extract_error_code(&body);
            if matches!(
                code.as_deref(),
                Some("refresh_token_expired")
                    | Some("refresh_token_reused")
                    | Some("refresh_token_invalidated")
            ) {
                return Err(AuthError::ExpiredOrInvalidGrant);
            }
            return Err(AuthError::exchange_failed(
                Some(status.as_u16()),
                format!(
                    "refresh token rejected: {}",
                    code.unwrap_or_else(|| "unknown".to_string())
                ),
            ));
        }
        Err(AuthError::exchange_failed(
            Some(status.as_u16()),
            format!("refresh failed with status {status}"),
        ))
    }
}

#[derive(Debug, Serialize)]
struct UserCodeRequest<'a> {
    client_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct UserCodeResponse {
    device_auth_id: String,
    #[serde(alias = "usercode")]
    user_code: String,
    #[serde(default, deserialize_with = "deserialize_interval")]
    interval: u64,
}

#[derive(Debug, Serialize)]
struct DeviceTokenRequest<'a> {
    device_auth_id: &'a str,
    user_code: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    id_token: String,
    access_token: String,
    refresh_token: String,
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    client_id: &'a str,
    grant_type: &'a str,
    refresh_token: &'a str,
    scope: &'a str,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    refresh_token: Option<String>,
    id_token: Option<String>,
}

/// Failure reading a success body: either the transport broke mid-body or
/// the body did not have the expected shape.
enum BodyError {
    Transport(String),
    Shape(String),
}

impl BodyError {
    fn into_error(self, transport: fn(Option<u16>, String) -> AuthError) -> AuthError {
        match self {
            Self::Transport(message) => transport(None, message),
            Self::Shape(message) => AuthError::MalformedResponse(message),
        }
    }
}

async fn read_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, BodyError> {
    let body = resp
        .text()
        .await
        .map_err(|e| BodyError::Transport(e.to_string()))?;
    serde_json::from_str(&body).map_err(|e| BodyError::Shape(e.to_string()))
}

fn check_pkce_pair(grant: &AuthorizationGrant) {
    let Some(challenge) = grant.code_challenge.as_deref() else {
        return;
    };
    let computed = URL_SAFE_NO_PAD.encode(Sha256::digest(grant.code_verifier.as_bytes()));
    if computed != challenge.trim_end_matches('=') {
        warn!("code challenge does not match S256 of the returned verifier");
    }
}

fn extract_error_code(body: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.as_str())
                .map(|s| s.to_string())
        })
}

fn deserialize_interval<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Interval {
        Number(u64),
        Text(String),
    }

    match Option::<Interval>::deserialize(deserializer)? {
        None => Ok(0),
        Some(Interval::Number(secs)) => Ok(secs),
        Some(Interval::Text(text)) => text
            .trim()
            .parse::<u64>()
            .map_err(|e| serde::de::Error::custom(format!("invalid interval {text:?}: {e}"))),
    }
}
