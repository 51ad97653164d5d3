use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const AUTH_CLAIMS_NAMESPACE: &str = "https://api.openai.com/auth";
const ACCOUNT_ID_CLAIM: &str = "chatgpt_account_id";

/// Persisted proof of authentication.
///
/// # Example
/// ```no_run
/// use device_auth::auth::CredentialSet;
///
/// let credentials = CredentialSet::new("access", "refresh", "header.payload.signature");
/// assert!(credentials.account_id.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialSet {
    pub access_token: String,
    pub refresh_token: String,
    pub id_token: String,
    pub account_id: Option<String>,
    pub last_refresh: Option<DateTime<Utc>>,
}

impl CredentialSet {
    /// Build a credential set from a fresh token response, deriving the
    /// account identifier from the id token claims.
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        id_token: impl Into<String>,
    ) -> Self {
        let id_token = id_token.into();
        let account_id = account_id_from_id_token(&id_token);
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            id_token,
            account_id,
            last_refresh: Some(Utc::now()),
        }
    }
}

/// Extract the account identifier claim from a JWT without verifying it.
///
/// The signature is the provider's concern; only the payload is read.
pub fn account_id_from_id_token(id_token: &str) -> Option<String> {
    let payload = id_token.split('.').nth(1)?;
    let decoded = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let value: serde_json::Value = serde_json::from_slice(&decoded).ok()?;
    value
        .get(AUTH_CLAIMS_NAMESPACE)
        .and_then(|v| v.get(ACCOUNT_ID_CLAIM))
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}
