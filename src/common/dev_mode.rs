use std::path::PathBuf;
use std::fs;
use crate::common::error::Result;

/// Redirects every piece of client state into `./dev_data` so a development
/// checkout never touches the real auth session or system config.
#[derive(Debug, Clone)]
pub struct DevMode {
    enabled: bool,
    base_dir: PathBuf,
}

impl DevMode {
    pub fn new(enabled: bool) -> Result<Self> {
        Self::with_base_dir(enabled, PathBuf::from("./dev_data"))
    }

    pub fn with_base_dir(enabled: bool, base_dir: PathBuf) -> Result<Self> {
        if enabled {
            fs::create_dir_all(&base_dir)?;
            fs::create_dir_all(base_dir.join("config"))?;
            fs::create_dir_all(base_dir.join("auth"))?;
            fs::create_dir_all(base_dir.join("captures"))?;
            fs::create_dir_all(base_dir.join("debug"))?;

            tracing::info!("Development mode enabled, data will be saved to {}", base_dir.display());
        }

        Ok(Self { enabled, base_dir })
    }

    pub fn disabled() -> Self {
        Self { enabled: false, base_dir: PathBuf::new() }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn config_file(&self) -> Option<PathBuf> {
        self.enabled.then(|| self.base_dir.join("config").join("faceattend.toml"))
    }

    pub fn auth_dir(&self) -> Option<PathBuf> {
        self.enabled.then(|| self.base_dir.join("auth"))
    }

    pub fn get_capture_path(&self, prefix: &str) -> PathBuf {
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        if self.enabled {
            self.base_dir.join("captures").join(format!("{}_{}.jpg", prefix, timestamp))
        } else {
            PathBuf::from(format!("{}_{}.jpg", prefix, timestamp))
        }
    }

    pub fn get_debug_path(&self, prefix: &str) -> PathBuf {
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        if self.enabled {
            self.base_dir.join("debug").join(format!("{}_{}.jpg", prefix, timestamp))
        } else {
            PathBuf::from(format!("{}_debug_{}.jpg", prefix, timestamp))
        }
    }
}
