//! Camera capture and scanner configuration.
//!
//! The camera opens at VGA by default. Scan timing defaults to a 100 ms
//! poll interval and a 2 s cooldown after each continuous-mode detection.

use crate::scan::DeliveryMode;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Largest accepted frame width or height.
pub const MAX_DIMENSION: u32 = 8192;

/// Configuration for camera capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Camera device index.
    pub device_id: u32,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Requested frames per second.
    pub fps: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device_id: 0,
            width: 640,
            height: 480,
            fps: 30,
        }
    }
}

impl CaptureConfig {
    /// Creates a new configuration with the specified dimensions.
    pub fn with_dimensions(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_DIMENSION).contains(&self.width) || !(1..=MAX_DIMENSION).contains(&self.height)
        {
            return Err(ConfigError::InvalidDimensions);
        }
        if self.fps == 0 || self.fps > 120 {
            return Err(ConfigError::InvalidFrameRate);
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Width or height is zero or above [`MAX_DIMENSION`].
    #[error("invalid frame dimensions (each must be 1-8192)")]
    InvalidDimensions,
    /// Frame rate outside 1-120.
    #[error("invalid frame rate (must be 1-120 fps)")]
    InvalidFrameRate,
    /// Poll interval of zero would busy-spin the scanner.
    #[error("poll interval must be greater than zero")]
    InvalidPollInterval,
    /// The configuration file could not be read.
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    /// The configuration file is not valid TOML for this schema.
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}

/// Scan loop configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// What happens after a successful decode.
    pub mode: DeliveryMode,
    /// Delay before every capture attempt, in milliseconds.
    pub poll_interval_ms: u64,
    /// Pause after a continuous-mode detection, in milliseconds.
    pub cooldown_ms: u64,
    /// Close the camera when a session ends by cancellation.
    pub release_camera_on_stop: bool,
    /// Prefix printed before decoded text.
    pub label: String,
    /// Attach a preview window to the camera.
    pub preview: bool,
    /// Title of the preview window.
    pub preview_title: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            mode: DeliveryMode::Continuous,
            poll_interval_ms: 100,
            cooldown_ms: 2000,
            release_camera_on_stop: true,
            label: "QR code detected".to_owned(),
            preview: true,
            preview_title: "QR Code Reader".to_owned(),
        }
    }
}

impl ScanConfig {
    /// Creates a configuration for the given delivery mode.
    pub fn with_mode(mode: DeliveryMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    /// Poll interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Cooldown as a [`Duration`].
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidPollInterval);
        }
        Ok(())
    }
}

/// Metrics exporter configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Metrics server port (0 to disable).
    pub port: u16,
}

/// Full configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct FileConfig {
    /// `[capture]` section.
    #[serde(default)]
    pub capture: CaptureConfig,
    /// `[scan]` section.
    #[serde(default)]
    pub scan: ScanConfig,
    /// `[metrics]` section.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl FileConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: FileConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.capture.validate()?;
        config.scan.validate()?;
        Ok(config)
    }
}
