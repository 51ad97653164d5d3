//! Device-code login flow, session lifecycle and credential storage.

pub mod client;
pub mod device_code;
pub mod environment;
pub mod error;
pub mod service;
pub mod session;
pub mod store;
pub mod token;

pub use client::{AuthorizationGrant, DeviceAuthClient, PollStatus};
pub use device_code::{AuthorizationOutcome, DeviceAuthorizationRequest};
pub use environment::{is_remote_environment, LoginFlow};
pub use error::AuthError;
pub use service::AuthService;
pub use session::{AuthSession, BrowserAttempt, SessionState};
pub use store::{CredentialStore, CredentialStoreConfig, FileCredentialStore};
pub use token::CredentialSet;
