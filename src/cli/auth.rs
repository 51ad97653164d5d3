//! CLI handlers for login, status, logout and token.

use std::sync::Arc;
use std::time::Duration;

use crate::auth::service::AuthService;
use crate::auth::{
    is_remote_environment, AuthError, AuthorizationOutcome, LoginFlow, SessionState,
};
use crate::config::Settings;

use super::LoginArgs;

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Handle `device-auth login`.
pub async fn handle_login(args: &LoginArgs, mut settings: Settings) -> CliResult {
    if args.device {
        settings.login.force_device_flow = true;
    }
    if let Some(secs) = args.timeout_secs {
        settings.login.timeout = Duration::from_secs(secs);
    }
    let svc = AuthService::from_settings(&settings)?;

    if svc.select_flow() == LoginFlow::Browser {
        return Err("This machine can receive a browser redirect; sign in from your editor, \
                    or re-run with --device to use a device code."
            .into());
    }

    let session = Arc::new(svc.new_session());
    let request = session.start().await.map_err(describe)?;

    println!("Visit: {}", request.verification_url);
    println!("Enter code: {}", request.user_code);
    let minutes_left = ((request.expires_at - chrono::Utc::now()).num_seconds() + 59) / 60;
    println!("The code expires in {minutes_left} minutes. Press Ctrl-C to cancel.");
    println!("Waiting for authorization...");

    let canceller = session.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            canceller.cancel();
        }
    });
    let mut states = session.subscribe();
    let progress = tokio::spawn(async move {
        while states.changed().await.is_ok() {
            if matches!(*states.borrow(), SessionState::Exchanging) {
                println!("Authorized, finishing login...");
            }
        }
    });

    let outcome = session.await_completion().await;
    ctrl_c.abort();
    progress.abort();

    match outcome.map_err(describe)? {
        AuthorizationOutcome::Credentials(credentials) => {
            match credentials.account_id {
                Some(account) => println!("Login successful (account {account})"),
                None => println!("Login successful"),
            }
            Ok(())
        }
        AuthorizationOutcome::Cancelled => {
            println!("Login cancelled");
            Ok(())
        }
        AuthorizationOutcome::Expired => {
            Err("The device code expired before it was approved. Please try again.".into())
        }
        AuthorizationOutcome::Failed(error) => Err(describe(error)),
    }
}

/// Handle `device-auth status`.
pub async fn handle_status(settings: Settings) -> CliResult {
    let svc = AuthService::from_settings(&settings)?;

    println!("Authentication Status\n");
    match svc.status()? {
        Some(credentials) => {
            let account = credentials.account_id.as_deref().unwrap_or("unknown account");
            let refreshed = credentials
                .last_refresh
                .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "never".to_string());
            println!(
                "  {}: Logged in ({account}, refreshed {refreshed})",
                svc.login_config().profile
            );
        }
        None => println!("  {}: Not logged in", svc.login_config().profile),
    }

    let environment = if is_remote_environment() { "remote" } else { "local" };
    println!("\nEnvironment: {environment} (login flow: {})", svc.select_flow());
    Ok(())
}

/// Handle `device-auth logout`.
pub async fn handle_logout(settings: Settings) -> CliResult {
    let svc = AuthService::from_settings(&settings)?;
    svc.logout()?;
    println!("Logged out of profile {}", svc.login_config().profile);
    Ok(())
}

/// Handle `device-auth token`.
pub async fn handle_token(settings: Settings) -> CliResult {
    let svc = AuthService::from_settings(&settings)?;
    let token = svc.access_token().await.map_err(describe)?;
    println!("{token}");
    Ok(())
}

fn describe(error: AuthError) -> Box<dyn std::error::Error> {
    error
        .user_message()
        .unwrap_or_else(|| error.to_string())
        .into()
}
