// Application configuration: JSON file plus command-line overrides

use crate::error::{EmotionViewError, Result};
use crate::models::DisplaySize;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about = "Live webcam emotion detection")]
pub struct Args {
    /// Path to the JSON configuration file
    #[arg(long, default_value = "emotion_view.json")]
    pub config: PathBuf,

    /// Directory holding the three model bundles
    #[arg(long)]
    pub model_dir: Option<PathBuf>,

    /// Camera index
    #[arg(long)]
    pub camera_index: Option<u32>,

    /// Log file path
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// List available cameras and exit
    #[arg(long)]
    pub list_cameras: bool,
}

/// Haar cascade tuning for the face detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub scale_factor: f64,
    pub min_neighbors: i32,
    pub min_face_size: i32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            scale_factor: 1.1,
            min_neighbors: 5,
            min_face_size: 40,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub model_dir: PathBuf,
    pub camera_index: u32,
    /// Minimum capture width requested from the camera
    pub min_capture_width: u32,
    pub poll_interval_ms: u64,
    pub display_width: u32,
    pub display_height: u32,
    pub log_file: PathBuf,
    pub detector: DetectorConfig,
    /// Expressions below this probability are left out of overlay labels
    pub expression_min_confidence: f32,
    pub compute_descriptors: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("assets/models"),
            camera_index: 0,
            min_capture_width: 300,
            poll_interval_ms: 100,
            display_width: 640,
            display_height: 480,
            log_file: PathBuf::from("emotion_view.log"),
            detector: DetectorConfig::default(),
            expression_min_confidence: 0.1,
            compute_descriptors: false,
        }
    }
}

impl AppConfig {
    /// Loads the config file if it exists, otherwise returns defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("No config file at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_json(&content)?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let config: AppConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Resolves the final configuration from the command line
    pub fn from_args(args: &Args) -> Result<Self> {
        let mut config = Self::load(&args.config)?;
        config.apply_overrides(args);
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides(&mut self, args: &Args) {
        if let Some(dir) = &args.model_dir {
            self.model_dir = dir.clone();
        }
        if let Some(index) = args.camera_index {
            self.camera_index = index;
        }
        if let Some(log_file) = &args.log_file {
            self.log_file = log_file.clone();
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(EmotionViewError::Config(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.display_width == 0 || self.display_height == 0 {
            return Err(EmotionViewError::Config(format!(
                "display size {}x{} is empty",
                self.display_width, self.display_height
            )));
        }
        if !(0.0..=1.0).contains(&self.expression_min_confidence) {
            return Err(EmotionViewError::Config(format!(
                "expression_min_confidence {} is outside 0..=1",
                self.expression_min_confidence
            )));
        }
        if self.detector.scale_factor <= 1.0 {
            return Err(EmotionViewError::Config(
                "detector.scale_factor must be greater than 1.0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn display_size(&self) -> DisplaySize {
        DisplaySize::new(self.display_width, self.display_height)
    }
}
