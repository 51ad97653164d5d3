use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::AuthError;
use super::token::CredentialSet;
use crate::config::DEFAULT_PROFILE;

/// Storage abstraction for persisted credentials.
///
/// Implementations must make `save` atomic from a reader's point of view:
/// `load` observes either the previous set or the new one, never a mix.
pub trait CredentialStore: Send + Sync {
    fn load(&self, profile: &str) -> Result<Option<CredentialSet>, AuthError>;
    fn save(&self, profile: &str, credentials: &CredentialSet) -> Result<(), AuthError>;
    fn clear(&self, profile: &str) -> Result<(), AuthError>;
}

/// Configuration for file-backed credential storage.
#[derive(Debug, Clone)]
pub struct CredentialStoreConfig {
    pub base_dir: PathBuf,
}

impl CredentialStoreConfig {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn default_dir() -> PathBuf {
        default_home_dir()
    }
}

/// File-backed credential store using TOML files.
///
/// # Example
/// ```no_run
/// use device_auth::auth::{CredentialSet, CredentialStore, FileCredentialStore};
///
/// let store = FileCredentialStore::new_default();
/// let credentials = CredentialSet::new("access", "refresh", "id-token");
/// store.save("default", &credentials)?;
/// # Ok::<(), device_auth::auth::AuthError>(())
/// ```
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    base_dir: PathBuf,
}

impl FileCredentialStore {
    pub fn new(config: CredentialStoreConfig) -> Self {
        Self {
            base_dir: config.base_dir,
        }
    }

    pub fn new_default() -> Self {
        Self {
            base_dir: default_home_dir(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn credentials_path(&self, profile: &str) -> PathBuf {
        self.base_dir
            .join(format!("{}.toml", profile_file_stem(profile)))
    }

    fn ensure_parent(path: &Path) -> Result<(), AuthError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self, profile: &str) -> Result<Option<CredentialSet>, AuthError> {
        let path = self.credentials_path(profile);
        let raw = match fs::read_to_string(&path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(AuthError::Io(err.to_string())),
        };
        let file: CredentialFile = toml::from_str(&raw)?;
        Ok(Some(file.credentials))
    }

    fn save(&self, profile: &str, credentials: &CredentialSet) -> Result<(), AuthError> {
        let path = self.credentials_path(profile);
        Self::ensure_parent(&path)?;
        let file = CredentialFile {
            version: 1,
            profile: profile.to_string(),
            saved_at: Utc::now(),
            credentials: credentials.clone(),
        };
        let serialized = toml::to_string(&file)?;

        // Write a sibling and rename over the target so a concurrent
        // reader never sees a truncated file.
        let tmp_path = path.with_extension(format!("toml.{}.tmp", uuid::Uuid::new_v4()));
        let result = write_private(&tmp_path, serialized.as_bytes())
            .and_then(|()| fs::rename(&tmp_path, &path).map_err(AuthError::from));
        if result.is_err() {
            let _ = fs::remove_file(&tmp_path);
        }
        result
    }

    fn clear(&self, profile: &str) -> Result<(), AuthError> {
        let path = self.credentials_path(profile);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(AuthError::Io(err.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CredentialFile {
    version: u32,
    profile: String,
    saved_at: DateTime<Utc>,
    credentials: CredentialSet,
}

fn write_private(path: &Path, contents: &[u8]) -> Result<(), AuthError> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(contents)?;
    file.sync_all()?;
    Ok(())
}

pub(crate) fn default_home_dir() -> PathBuf {
    directories::UserDirs::new()
        .map(|dirs| dirs.home_dir().join(".device-auth"))
        .unwrap_or_else(|| PathBuf::from(".device-auth"))
}

/// Map a profile name onto a safe file stem: lowercase ASCII alphanumerics
/// and `-`, anything else becomes `-`. Blank names fall back to `default`.
fn profile_file_stem(profile: &str) -> String {
    let stem: String = profile
        .trim()
        .chars()
        .map(|ch| match ch.to_ascii_lowercase() {
            c if c.is_ascii_alphanumeric() || c == '-' => c,
            _ => '-',
        })
        .collect();
    if stem.chars().all(|c| c == '-') {
        DEFAULT_PROFILE.to_string()
    } else {
        stem
    }
}
