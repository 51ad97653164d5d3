//! Lifecycle of one login attempt, observable by presentation layers.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::client::DeviceAuthClient;
use super::device_code::{AuthorizationOutcome, DeviceAuthorizationRequest};
use super::error::AuthError;
use super::store::CredentialStore;
use crate::config::LoginConfig;

/// What the session is doing right now.
#[derive(Debug, Clone, PartialEq, Eq, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum SessionState {
    Idle,
    AwaitingDeviceCode,
    /// Show `request.user_code` and `request.verification_url` to the user.
    AwaitingUserAction { request: DeviceAuthorizationRequest },
    /// A browser-redirect attempt driven outside this crate is active.
    AwaitingBrowser,
    Exchanging,
    Authenticated { account_id: Option<String> },
    Expired,
    Cancelled,
    Failed { error: AuthError },
}

impl SessionState {
    pub fn label(&self) -> &'static str {
        self.into()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Authenticated { .. } | Self::Expired | Self::Cancelled | Self::Failed { .. }
        )
    }

    pub fn user_code(&self) -> Option<&str> {
        match self {
            Self::AwaitingUserAction { request } => Some(&request.user_code),
            _ => None,
        }
    }
}

/// Handle for a browser-redirect attempt registered with a session.
///
/// The redirect flow itself lives elsewhere; the session only owns its
/// cancellation so a single [`AuthSession::cancel`] covers both flows.
#[derive(Debug, Clone)]
pub struct BrowserAttempt {
    generation: u64,
    cancel: CancellationToken,
}

impl BrowserAttempt {
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[derive(Debug)]
enum AttemptKind {
    Device {
        request: Option<DeviceAuthorizationRequest>,
        polling: bool,
    },
    Browser,
}

#[derive(Debug)]
struct Attempt {
    id: Uuid,
    generation: u64,
    kind: AttemptKind,
    cancel: CancellationToken,
}

#[derive(Debug, Default)]
struct Inner {
    generation: u64,
    attempt: Option<Attempt>,
}

impl Inner {
    fn is_current(&self, generation: u64) -> bool {
        self.attempt
            .as_ref()
            .is_some_and(|attempt| attempt.generation == generation)
    }

    fn replace(&mut self, kind: AttemptKind) -> (u64, Uuid, CancellationToken) {
        if let Some(prior) = self.attempt.take() {
            debug!(attempt_id = %prior.id, "cancelling superseded login attempt");
            prior.cancel.cancel();
        }
        self.generation += 1;
        let id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        self.attempt = Some(Attempt {
            id,
            generation: self.generation,
            kind,
            cancel: cancel.clone(),
        });
        (self.generation, id, cancel)
    }
}

/// One login session: at most one attempt in flight, state published on a
/// watch channel, credentials persisted only on success.
///
/// Construct a fresh session per login attempt rather than sharing one
/// across users.
pub struct AuthSession {
    client: Arc<DeviceAuthClient>,
    store: Arc<dyn CredentialStore>,
    login: LoginConfig,
    inner: Mutex<Inner>,
    state_tx: watch::Sender<SessionState>,
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("login", &self.login)
            .field("state", &self.state_tx.borrow().label())
            .finish()
    }
}

impl AuthSession {
    pub fn new(
        client: Arc<DeviceAuthClient>,
        store: Arc<dyn CredentialStore>,
        login: LoginConfig,
    ) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Idle);
        Self {
            client,
            store,
            login,
            inner: Mutex::new(Inner::default()),
            state_tx,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Cancel whatever is in flight and request a new device code.
    pub async fn start(&self) -> Result<DeviceAuthorizationRequest, AuthError> {
        let (generation, attempt_id, cancel) = {
            let mut inner = self.lock();
            let replaced = inner.replace(AttemptKind::Device {
                request: None,
                polling: false,
            });
            self.publish(SessionState::AwaitingDeviceCode);
            replaced
        };
        info!(%attempt_id, "starting device code login");

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AuthError::Cancelled),
            result = self.client.request_device_code() => result,
        };

        let mut inner = self.lock();
        if !inner.is_current(generation) {
            return Err(AuthError::Cancelled);
        }
        match result {
            Ok(request) => {
                if let Some(Attempt {
                    kind: AttemptKind::Device { request: slot, .. },
                    ..
                }) = inner.attempt.as_mut()
                {
                    *slot = Some(request.clone());
                }
                self.publish(SessionState::AwaitingUserAction {
                    request: request.clone(),
                });
                Ok(request)
            }
            Err(error) => {
                warn!(%attempt_id, %error, "device code request failed");
                inner.attempt = None;
                self.publish(SessionState::Failed {
                    error: error.clone(),
                });
                Err(error)
            }
        }
    }

    /// Poll until the issued code is approved, expires, or is cancelled.
    ///
    /// Credentials are saved through the store before the session reports
    /// `Authenticated`; no other outcome touches the store. Called after the
    /// attempt was already cancelled, this returns `Cancelled` right away.
    pub async fn await_completion(&self) -> Result<AuthorizationOutcome, AuthError> {
        let (generation, attempt_id, cancel, request) = {
            let mut inner = self.lock();
            let Some(attempt) = inner.attempt.as_mut() else {
                if matches!(*self.state_tx.borrow(), SessionState::Cancelled) {
                    return Ok(AuthorizationOutcome::Cancelled);
                }
                return Err(AuthError::InvalidState(
                    "no device code login in progress".to_string(),
                ));
            };
            match &mut attempt.kind {
                AttemptKind::Device {
                    request: Some(request),
                    polling,
                } if !*polling => {
                    *polling = true;
                    (
                        attempt.generation,
                        attempt.id,
                        attempt.cancel.clone(),
                        request.clone(),
                    )
                }
                AttemptKind::Device { polling: true, .. } => {
                    return Err(AuthError::InvalidState(
                        "already awaiting completion".to_string(),
                    ));
                }
                AttemptKind::Device { .. } => {
                    return Err(AuthError::InvalidState(
                        "device code has not been issued yet".to_string(),
                    ));
                }
                AttemptKind::Browser => {
                    return Err(AuthError::InvalidState(
                        "a browser login is in progress".to_string(),
                    ));
                }
            }
        };

        let interval = self.login.effective_poll_interval(request.poll_interval_secs);
        debug!(
            %attempt_id,
            interval_ms = interval.as_millis() as u64,
            timeout_ms = self.login.effective_timeout().as_millis() as u64,
            "awaiting device authorization"
        );
        let outcome = self
            .client
            .poll_for_authorization_with_progress(
                &request,
                interval,
                self.login.effective_timeout(),
                &cancel,
                || self.publish_if_current(generation, SessionState::Exchanging),
            )
            .await;

        Ok(self.finish(generation, attempt_id, outcome))
    }

    /// Abort the in-flight attempt, if any. Terminal and idle sessions are
    /// left untouched, as is an attempt whose credentials are being saved.
    pub fn cancel(&self) {
        let mut inner = self.lock();
        if let Some(attempt) = inner.attempt.take() {
            info!(attempt_id = %attempt.id, "login attempt cancelled");
            attempt.cancel.cancel();
            self.publish(SessionState::Cancelled);
        }
    }

    /// Register an externally driven browser-redirect attempt, cancelling
    /// any device attempt in flight.
    pub fn begin_browser_attempt(&self) -> BrowserAttempt {
        let mut inner = self.lock();
        let (generation, attempt_id, cancel) = inner.replace(AttemptKind::Browser);
        self.publish(SessionState::AwaitingBrowser);
        info!(%attempt_id, "browser login attempt registered");
        BrowserAttempt { generation, cancel }
    }

    /// Report how a browser attempt ended. Superseded or cancelled attempts
    /// resolve to `Cancelled` without touching the store.
    pub fn finish_browser_attempt(
        &self,
        attempt: &BrowserAttempt,
        outcome: AuthorizationOutcome,
    ) -> AuthorizationOutcome {
        let attempt_id = {
            let inner = self.lock();
            match inner.attempt.as_ref() {
                Some(current) if current.generation == attempt.generation => current.id,
                _ => return AuthorizationOutcome::Cancelled,
            }
        };
        self.finish(attempt.generation, attempt_id, outcome)
    }

    fn finish(
        &self,
        generation: u64,
        attempt_id: Uuid,
        outcome: AuthorizationOutcome,
    ) -> AuthorizationOutcome {
        let mut inner = self.lock();
        if !inner.is_current(generation) {
            debug!(%attempt_id, "discarding outcome of superseded attempt");
            return AuthorizationOutcome::Cancelled;
        }
        // The attempt is committed from here on; a later cancel is a no-op.
        inner.attempt = None;

        let credentials = match outcome {
            AuthorizationOutcome::Credentials(credentials) => credentials,
            AuthorizationOutcome::Expired => {
                self.publish(SessionState::Expired);
                return AuthorizationOutcome::Expired;
            }
            AuthorizationOutcome::Cancelled => {
                self.publish(SessionState::Cancelled);
                return AuthorizationOutcome::Cancelled;
            }
            AuthorizationOutcome::Failed(error) => {
                self.publish(SessionState::Failed {
                    error: error.clone(),
                });
                return AuthorizationOutcome::Failed(error);
            }
        };
        drop(inner);

        let saved = self.store.save(&self.login.profile, &credentials);

        // A `start()` issued during the save owns the state now.
        let inner = self.lock();
        let superseded = inner.generation != generation;
        match saved {
            Err(error) => {
                warn!(%attempt_id, %error, "failed to persist credentials");
                if !superseded {
                    self.publish(SessionState::Failed {
                        error: error.clone(),
                    });
                }
                AuthorizationOutcome::Failed(error)
            }
            Ok(()) => {
                info!(%attempt_id, "login succeeded");
                if !superseded {
                    self.publish(SessionState::Authenticated {
                        account_id: credentials.account_id.clone(),
                    });
                }
                AuthorizationOutcome::Credentials(credentials)
            }
        }
    }

    fn publish_if_current(&self, generation: u64, state: SessionState) {
        let inner = self.lock();
        if inner.is_current(generation) {
            self.publish(state);
        }
    }

    fn publish(&self, state: SessionState) {
        debug!(state = state.label(), "session state changed");
        self.state_tx.send_replace(state);
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for AuthSession {
    fn drop(&mut self) {
        if let Some(attempt) = self.lock().attempt.take() {
            attempt.cancel.cancel();
        }
    }
}
