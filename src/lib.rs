//! device-auth: OAuth device-code login for remote development environments.
//!
//! When a machine cannot receive a localhost browser redirect (remote
//! containers, cloud sandboxes, SSH sessions) the user approves a short code
//! on another device while this crate polls the identity provider, exchanges
//! the resulting authorization code for tokens and persists them.
//!
//! # Quick Start
//!
//! ```no_run
//! use device_auth::auth::{AuthorizationOutcome, AuthService, LoginFlow};
//! use device_auth::config::Settings;
//!
//! # async fn example() -> Result<(), device_auth::auth::AuthError> {
//! let svc = AuthService::from_settings(&Settings::load()?)?;
//! if svc.select_flow() == LoginFlow::Device {
//!     let session = svc.new_session();
//!     let request = session.start().await?;
//!     println!("Visit {} and enter {}", request.verification_url, request.user_code);
//!     if let AuthorizationOutcome::Credentials(_) = session.await_completion().await? {
//!         println!("logged in");
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod prelude;

#[cfg(feature = "cli")]
pub mod cli;
