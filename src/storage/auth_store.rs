use crate::common::{system_data_dir, DevMode, FaceAttendError, Result};
use crate::service::protocol::UserProfile;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions, Permissions};
use std::io::Write;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

const AUTH_FILE: &str = "auth.json";
const STORAGE_VERSION: u32 = 1;
/// The file holds a bearer token, so only the owner may read it.
const AUTH_FILE_MODE: u32 = 0o600;

/// What survives between runs: the bearer token and the last fetched profile.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthState {
    #[serde(default)]
    pub version: u32,
    pub token: Option<String>,
    pub user: Option<UserProfile>,
}

pub struct AuthStore {
    path: PathBuf,
    state: AuthState,
}

impl AuthStore {
    /// Open the store at `path`, starting empty if the file is missing.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = if path.exists() {
            let data = fs::read_to_string(&path)?;
            match serde_json::from_str::<AuthState>(&data) {
                Ok(state) => state,
                Err(e) => {
                    // A corrupt file behaves like a logged-out session
                    tracing::warn!("Ignoring unreadable auth file {}: {}", path.display(), e);
                    AuthState::default()
                }
            }
        } else {
            AuthState::default()
        };

        Ok(Self { path, state })
    }

    pub fn open_with_dev_mode(dev_mode: &DevMode) -> Result<Self> {
        let dir = match dev_mode.auth_dir() {
            Some(dir) => dir,
            None => system_data_dir()
                .ok_or_else(|| FaceAttendError::Storage("Failed to get project dirs".into()))?,
        };

        if dev_mode.is_enabled() {
            tracing::debug!("AuthStore using dev directory: {:?}", dir);
        }
        Self::open(dir.join(AUTH_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> &AuthState {
        &self.state
    }

    pub fn token(&self) -> Option<&str> {
        self.state.token.as_deref()
    }

    pub fn user(&self) -> Option<&UserProfile> {
        self.state.user.as_ref()
    }

    pub fn is_logged_in(&self) -> bool {
        self.state.token.is_some()
    }

    pub fn set_token(&mut self, token: impl Into<String>) -> Result<()> {
        self.state.token = Some(token.into());
        self.save()
    }

    pub fn set_user(&mut self, user: UserProfile) -> Result<()> {
        self.state.user = Some(user);
        self.save()
    }

    /// Forget the token and profile, on disk as well.
    pub fn logout(&mut self) -> Result<()> {
        self.state = AuthState::default();
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        tracing::info!("Cleared stored session");
        Ok(())
    }

    pub fn save(&mut self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        self.state.version = STORAGE_VERSION;
        let encoded = serde_json::to_string_pretty(&self.state)
            .map_err(|e| FaceAttendError::Storage(format!("Failed to serialize: {}", e)))?;

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(AUTH_FILE_MODE)
            .open(&self.path)?;
        // mode() only applies on creation
        file.set_permissions(Permissions::from_mode(AUTH_FILE_MODE))?;
        file.write_all(encoded.as_bytes())?;
        Ok(())
    }
}
