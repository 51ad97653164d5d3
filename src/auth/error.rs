use thiserror::Error;

/// Errors produced by the device-code login flow and credential storage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Device code login is not enabled for this account")]
    NotEnabled,
    #[error("Device code request failed{}: {message}", fmt_status(.status))]
    RequestFailed { status: Option<u16>, message: String },
    #[error("Token exchange failed{}: {message}", fmt_status(.status))]
    ExchangeFailed { status: Option<u16>, message: String },
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
    #[error("Login attempt was cancelled")]
    Cancelled,
    #[error("Not logged in")]
    NotLoggedIn,
    #[error("Expired or invalid grant")]
    ExpiredOrInvalidGrant,
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AuthError {
    pub(crate) fn request_failed(status: Option<u16>, message: String) -> Self {
        Self::RequestFailed {
            status,
            message,
        }
    }

    pub(crate) fn exchange_failed(status: Option<u16>, message: String) -> Self {
        Self::ExchangeFailed {
            status,
            message,
        }
    }

    /// HTTP status attached to the failure, if the provider answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RequestFailed { status, .. } | Self::ExchangeFailed { status, .. } => *status,
            _ => None,
        }
    }

    /// Text suitable for showing to the person logging in.
    ///
    /// Returns `None` for cancellation, which needs no message.
    pub fn user_message(&self) -> Option<String> {
        match self {
            Self::Cancelled => None,
            Self::NotEnabled => Some(
                "Device code login is disabled for your account. Enable device code \
                 authorization in your account security settings, then try again."
                    .to_string(),
            ),
            Self::NotLoggedIn => Some("You are not logged in. Run `device-auth login` first.".to_string()),
            Self::ExpiredOrInvalidGrant => {
                Some("Your session has expired. Please log in again.".to_string())
            }
            Self::MalformedResponse(_) => Some(format!(
                "Internal error: the login service returned an unexpected response ({self})"
            )),
            other => Some(other.to_string()),
        }
    }
}

fn fmt_status(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" with status {code}"),
        None => String::new(),
    }
}

impl From<std::io::Error> for AuthError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

impl From<toml::de::Error> for AuthError {
    fn from(error: toml::de::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

impl From<toml::ser::Error> for AuthError {
    fn from(error: toml::ser::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_failed_includes_status_in_message() {
        let err = AuthError::request_failed(Some(500), "server error".to_string());
        assert_eq!(
            err.to_string(),
            "Device code request failed with status 500: server error"
        );
        assert_eq!(err.status(), Some(500));
    }

    #[test]
    fn transport_failures_have_no_status() {
        let err = AuthError::exchange_failed(None, "connection refused".to_string());
        assert_eq!(err.to_string(), "Token exchange failed: connection refused");
        assert_eq!(err.status(), None);
    }

    #[test]
    fn cancelled_has_no_user_message() {
        assert!(AuthError::Cancelled.user_message().is_none());
    }

    #[test]
    fn not_enabled_message_explains_how_to_enable() {
        let message = AuthError::NotEnabled.user_message().unwrap();
        assert!(message.contains("security settings"));
    }
}
