//! Relay configuration
//!
//! All capture parameters are named configuration with defaults matching
//! the USB3.0 capture board this crate was built around. Values can be
//! overridden from a TOML file.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::constants::*;
use crate::error::{Error, Result};

/// Audio passthrough configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Sample rate in Hz, used for both the input and the output stream
    pub sample_rate: u32,
    /// Channel count
    pub channels: u16,
    /// Passthrough chunk size in bytes
    pub chunk_size: usize,
    /// Host API position the capture device must register under
    pub host_api: u32,
    /// Name substring identifying the capture device (case-sensitive)
    pub device_name: String,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
            chunk_size: DEFAULT_CHUNK_SIZE,
            host_api: DEFAULT_HOST_API,
            device_name: CAPTURE_BOARD_NAME.to_string(),
        }
    }
}

impl AudioConfig {
    /// Bytes per PCM frame (one sample per channel)
    pub fn frame_bytes(&self) -> usize {
        self.channels as usize * BYTES_PER_SAMPLE
    }
}

/// Video capture configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Capture device index
    pub device_index: i32,
    /// Requested frame width (best-effort)
    pub width: u32,
    /// Requested frame height (best-effort)
    pub height: u32,
    /// Requested frame rate (best-effort)
    pub fps: f64,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            device_index: DEFAULT_VIDEO_INDEX,
            width: DEFAULT_FRAME_WIDTH,
            height: DEFAULT_FRAME_HEIGHT,
            fps: DEFAULT_FPS,
        }
    }
}

/// Complete relay configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub audio: AudioConfig,
    pub video: VideoConfig,
}

impl RelayConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: RelayConfig =
            toml::from_str(&contents).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the platform config directory, falling back to defaults
    /// when no file exists
    pub fn load_default() -> Result<Self> {
        if let Some(dirs) = directories::ProjectDirs::from("", "", "capture-board-relay") {
            let path = dirs.config_dir().join("relay.toml");
            if path.exists() {
                return Self::load(&path);
            }
        }
        Ok(Self::default())
    }

    /// Reject configurations the relay cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.audio.sample_rate == 0 {
            return Err(Error::Config("audio sample_rate must be non-zero".into()));
        }
        if self.audio.channels == 0 {
            return Err(Error::Config("audio channels must be non-zero".into()));
        }
        let frame = self.audio.frame_bytes();
        if self.audio.chunk_size == 0 || self.audio.chunk_size % frame != 0 {
            return Err(Error::Config(format!(
                "audio chunk_size must be a positive multiple of the {} byte PCM frame",
                frame
            )));
        }
        if self.video.width == 0 || self.video.height == 0 {
            return Err(Error::Config("video resolution must be non-zero".into()));
        }
        if self.video.fps <= 0.0 {
            return Err(Error::Config("video fps must be positive".into()));
        }
        Ok(())
    }
}
