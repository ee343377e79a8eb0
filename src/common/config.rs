use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use crate::common::error::{FaceAttendError, Result};
use crate::common::{paths, DevMode};

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub models: ModelConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub performance: PerformanceConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CameraConfig {
    /// 999 means auto-detect the user-facing colour camera.
    #[serde(default = "default_device_index")]
    pub device_index: u32,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_warmup_frames")]
    pub warmup_frames: u32,
    #[serde(default = "default_warmup_delay")]
    pub warmup_delay_ms: u64,
}

fn default_device_index() -> u32 { 999 }
fn default_width() -> u32 { 1280 }
fn default_height() -> u32 { 720 }
fn default_warmup_frames() -> u32 { 5 }
fn default_warmup_delay() -> u64 { 50 }

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device_index: default_device_index(),
            width: default_width(),
            height: default_height(),
            warmup_frames: default_warmup_frames(),
            warmup_delay_ms: default_warmup_delay(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ModelConfig {
    #[serde(default = "default_detector_path")]
    pub detector_path: PathBuf,
}

fn default_detector_path() -> PathBuf {
    paths::system_models_dir().join("face_detector.onnx")
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self { detector_path: default_detector_path() }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DetectorConfig {
    #[serde(default = "default_input_size")]
    pub input_width: u32,
    #[serde(default = "default_input_size")]
    pub input_height: u32,
    /// Minimum detector score for a box to count as a face at all.
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f32,
}

fn default_input_size() -> u32 { 640 }
fn default_score_threshold() -> f32 { 0.5 }

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            input_width: default_input_size(),
            input_height: default_input_size(),
            score_threshold: default_score_threshold(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CaptureModeSetting {
    Manual,
    #[default]
    Automatic,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CaptureConfig {
    /// Default mode for check-in. Enrollment is manual unless `--auto` is passed.
    #[serde(default)]
    pub mode: CaptureModeSetting,
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_cooldown")]
    pub cooldown_ms: u64,
    #[serde(default = "default_pacing")]
    pub pacing_ms: u64,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

fn default_tick_interval() -> u64 { 300 }
fn default_cooldown() -> u64 { 800 }
fn default_pacing() -> u64 { 800 }
fn default_jpeg_quality() -> u8 { 90 }

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            mode: CaptureModeSetting::default(),
            tick_interval_ms: default_tick_interval(),
            cooldown_ms: default_cooldown(),
            pacing_ms: default_pacing(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

impl CaptureConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_base_url() -> String {
    "http://localhost:8001".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { base_url: default_base_url() }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PerformanceConfig {
    #[serde(default = "default_optimization_level")]
    pub optimization_level: u32,
}

fn default_optimization_level() -> u32 { 3 }

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self { optimization_level: default_optimization_level() }
    }
}

impl Config {
    /// Resolve the config file: explicit path, dev-mode file, system file,
    /// then the repository's `configs/` copy. Falls back to defaults.
    pub fn load(explicit: Option<&Path>, dev_mode: &DevMode) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from_path(path);
        }

        let candidates = dev_mode
            .config_file()
            .into_iter()
            .chain([paths::system_config_file(), PathBuf::from("configs/faceattend.toml")]);

        for candidate in candidates {
            if candidate.exists() {
                return Self::load_from_path(&candidate);
            }
        }

        tracing::info!("No config file found, using built-in defaults");
        let config = Config::default();
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(FaceAttendError::Config(format!(
                "Config file not found: {}. Please create it from configs/faceattend.toml.",
                path.display()
            )));
        }

        tracing::info!("Loading config from: {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)
            .map_err(|e| FaceAttendError::Config(format!("Config parse error: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.camera.width == 0 || self.camera.width > 4096 {
            return Err(FaceAttendError::Config(format!(
                "Camera width must be between 1 and 4096, got {}", self.camera.width
            )));
        }
        if self.camera.height == 0 || self.camera.height > 4096 {
            return Err(FaceAttendError::Config(format!(
                "Camera height must be between 1 and 4096, got {}", self.camera.height
            )));
        }

        if self.detector.input_width == 0 || self.detector.input_width > 4096 {
            return Err(FaceAttendError::Config(format!(
                "Detector input width must be between 1 and 4096, got {}",
                self.detector.input_width
            )));
        }
        if self.detector.input_height == 0 || self.detector.input_height > 4096 {
            return Err(FaceAttendError::Config(format!(
                "Detector input height must be between 1 and 4096, got {}",
                self.detector.input_height
            )));
        }
        if !(0.0..=1.0).contains(&self.detector.score_threshold) {
            return Err(FaceAttendError::Config(format!(
                "Detector score threshold must be between 0.0 and 1.0, got {}",
                self.detector.score_threshold
            )));
        }

        if self.capture.tick_interval_ms == 0 {
            return Err(FaceAttendError::Config("Tick interval must be at least 1 ms".into()));
        }
        if self.capture.jpeg_quality == 0 || self.capture.jpeg_quality > 100 {
            return Err(FaceAttendError::Config(format!(
                "JPEG quality must be between 1 and 100, got {}", self.capture.jpeg_quality
            )));
        }

        if self.api.base_url.trim().is_empty() {
            return Err(FaceAttendError::Config("API base_url must not be empty".into()));
        }

        Ok(())
    }
}
