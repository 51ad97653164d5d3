use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::AuthError;
use super::token::CredentialSet;

/// One issued device code awaiting user approval.
///
/// # Example
/// ```no_run
/// use device_auth::auth::DeviceAuthorizationRequest;
/// use chrono::{Duration, Utc};
///
/// let request = DeviceAuthorizationRequest {
///     device_auth_id: "device-auth-id".to_string(),
///     user_code: "ABCD-EFGH".to_string(),
///     poll_interval_secs: 5,
///     verification_url: "https://auth.openai.com/codex/device".to_string(),
///     expires_at: Utc::now() + Duration::minutes(15),
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceAuthorizationRequest {
    pub device_auth_id: String,
    pub user_code: String,
    pub poll_interval_secs: u64,
    pub verification_url: String,
    pub expires_at: DateTime<Utc>,
}

/// Terminal result of one authorization attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationOutcome {
    Credentials(CredentialSet),
    Expired,
    Cancelled,
    Failed(AuthError),
}

impl AuthorizationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Credentials(_))
    }
}
