//! Detection of environments where a localhost browser redirect cannot reach
//! this process.

use std::ffi::OsString;

/// Markers set by remote containers and devcontainer tooling.
const REMOTE_CONTAINER_VARS: &[&str] = &[
    "REMOTE_CONTAINERS",
    "DEVCONTAINER",
    "VSCODE_REMOTE_CONTAINERS_SESSION",
];

/// Markers set by hosted cloud development sandboxes.
const CLOUD_SANDBOX_VARS: &[&str] = &[
    "CODESPACES",
    "GITPOD_WORKSPACE_ID",
    "CLOUD_SHELL",
    "CLOUDSHELL_ENVIRONMENT",
];

/// Markers set by remote shell sessions.
const REMOTE_SHELL_VARS: &[&str] = &["SSH_CONNECTION", "SSH_CLIENT", "SSH_TTY"];

/// Which login flow a caller should drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum LoginFlow {
    /// Interactive browser redirect to a localhost callback.
    Browser,
    /// Device authorization grant: show a code, poll for approval.
    Device,
}

impl LoginFlow {
    /// Pick the device flow when forced by the host or when the process
    /// environment looks remote.
    pub fn select(force_device_flow: bool) -> Self {
        Self::select_with(force_device_flow, |key| std::env::var_os(key))
    }

    pub fn select_with<F>(force_device_flow: bool, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<OsString>,
    {
        if force_device_flow || is_remote_environment_with(lookup) {
            Self::Device
        } else {
            Self::Browser
        }
    }
}

/// Whether the current process runs somewhere a browser on the user's
/// machine cannot redirect back to.
pub fn is_remote_environment() -> bool {
    is_remote_environment_with(|key| std::env::var_os(key))
}

/// Same as [`is_remote_environment`] over an arbitrary variable lookup.
pub fn is_remote_environment_with<F>(lookup: F) -> bool
where
    F: Fn(&str) -> Option<OsString>,
{
    REMOTE_CONTAINER_VARS
        .iter()
        .chain(CLOUD_SANDBOX_VARS)
        .chain(REMOTE_SHELL_VARS)
        .any(|key| lookup(key).is_some_and(|value| !value.is_empty()))
}
