//! Convenience re-exports for common use.

pub use crate::auth::{
    AuthError, AuthService, AuthSession, AuthorizationOutcome, CredentialSet, CredentialStore,
    DeviceAuthClient, DeviceAuthorizationRequest, LoginFlow, SessionState,
};
pub use crate::config::{DeviceAuthConfig, LoginConfig, Settings};
