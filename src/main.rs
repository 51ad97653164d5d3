//! device-auth CLI binary entry point.

use device_auth::cli::{Cli, Commands};
use device_auth::config::Settings;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse_args();

    let result = match Settings::load() {
        Ok(mut settings) => {
            if let Some(profile) = cli.profile {
                settings.login.profile = profile;
            }
            match cli.command {
                Commands::Login(args) => device_auth::cli::auth::handle_login(&args, settings).await,
                Commands::Status => device_auth::cli::auth::handle_status(settings).await,
                Commands::Logout => device_auth::cli::auth::handle_logout(settings).await,
                Commands::Token => device_auth::cli::auth::handle_token(settings).await,
            }
        }
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
