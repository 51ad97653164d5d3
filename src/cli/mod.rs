//! CLI entry point for device-auth.

pub mod auth;

use clap::{Parser, Subcommand};

/// Device-code login for remote development environments
#[derive(Parser, Debug)]
#[command(
    name = "device-auth",
    version,
    about = "Device-code login for remote development environments"
)]
pub struct Cli {
    /// Credential profile to use
    #[arg(long, global = true)]
    pub profile: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Log in with a device code
    Login(LoginArgs),
    /// Show authentication status
    Status,
    /// Remove stored credentials
    Logout,
    /// Print a valid access token, refreshing it if stale
    Token,
}

/// Arguments for `device-auth login`.
#[derive(Parser, Debug)]
pub struct LoginArgs {
    /// Use the device flow even if this machine looks local
    #[arg(long)]
    pub device: bool,

    /// Give up after this many seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

impl Cli {
    /// Parse CLI arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
