/*!
 * Recorder Configuration
 *
 * JSON settings file describing what to capture and where to write it.
 * Every field has a default, so an empty object (or a missing file) is a
 * valid full-desktop recording at 30 fps without audio.
 */

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::capture::Rect;
use crate::error::RecorderError;

/// Highest frame rate accepted by `validate`
pub const MAX_FRAME_RATE: f64 = 240.0;

/// Video capture method
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VideoSource {
    None,
    Gdi,
    Duplication {
        #[serde(default)]
        adapter: u32,
        #[serde(default)]
        output: u32,
    },
    TestPattern,
}

impl Default for VideoSource {
    fn default() -> Self {
        VideoSource::Duplication { adapter: 0, output: 0 }
    }
}

/// Audio capture selection; `device` is a device name, `None` for the default
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AudioSelection {
    #[default]
    None,
    Input {
        #[serde(default)]
        device: Option<String>,
    },
    Loopback {
        #[serde(default)]
        device: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    pub frame_rate: f64,
    /// Desktop-coordinate capture rectangle; whole output when unset
    pub region: Option<Rect>,
    pub include_cursor: bool,
    pub video: VideoSource,
    /// Use GDI copy when duplication is unsupported or busy
    pub fallback_to_gdi: bool,
    pub audio: AudioSelection,
    /// Per-frame acquire timeout handed to the capture backend
    pub capture_timeout_ms: u32,
    pub output_dir: PathBuf,
    pub file_name: Option<String>,
    pub start_delay_ms: u64,
    pub duration_secs: Option<u64>,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            frame_rate: 30.0,
            region: None,
            include_cursor: true,
            video: VideoSource::default(),
            fallback_to_gdi: true,
            audio: AudioSelection::None,
            capture_timeout_ms: 0,
            output_dir: default_output_dir(),
            file_name: None,
            start_delay_ms: 0,
            duration_secs: None,
        }
    }
}

fn default_output_dir() -> PathBuf {
    dirs::video_dir()
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}

impl RecorderConfig {
    /// `<config dir>/desktop-recorder/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("desktop-recorder").join("config.json"))
    }

    /// Read a JSON config file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        info!("Loaded config from {}", path.display());
        debug!("{:?}", config);
        Ok(config)
    }

    /// `path` when given, else the default file if it exists, else defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }

        match Self::default_path() {
            Some(default) if default.exists() => Self::load(&default),
            _ => {
                info!("No config file, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn validate(&self) -> Result<(), RecorderError> {
        if !self.frame_rate.is_finite() || self.frame_rate <= 0.0 {
            return Err(RecorderError::InvalidConfig(format!(
                "frame rate must be positive, got {}",
                self.frame_rate
            )));
        }

        if self.frame_rate > MAX_FRAME_RATE {
            return Err(RecorderError::InvalidConfig(format!(
                "frame rate {} exceeds the maximum of {}",
                self.frame_rate, MAX_FRAME_RATE
            )));
        }

        if let Some(region) = &self.region {
            if region.is_empty() {
                return Err(RecorderError::InvalidConfig("capture region has zero size".to_string()));
            }
        }

        if !self.has_video() && !self.has_audio() {
            return Err(RecorderError::NothingToRecord);
        }

        if let Some(duration) = self.duration() {
            if self.start_delay() > duration {
                return Err(RecorderError::InvalidConfig(format!(
                    "start delay of {} ms is longer than the {} s duration",
                    self.start_delay_ms,
                    duration.as_secs()
                )));
            }
        }

        Ok(())
    }

    pub fn has_video(&self) -> bool {
        self.video != VideoSource::None
    }

    pub fn has_audio(&self) -> bool {
        self.audio != AudioSelection::None
    }

    pub fn start_delay(&self) -> Duration {
        Duration::from_millis(self.start_delay_ms)
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration_secs.map(Duration::from_secs)
    }

    /// Output file: explicit name, or a local timestamp with `extension`
    pub fn output_path(&self, extension: &str) -> PathBuf {
        match &self.file_name {
            Some(name) => self.output_dir.join(name),
            None => {
                let stamp = chrono::Local::now().format("%Y-%m-%d-%H-%M-%S");
                self.output_dir.join(format!("{}.{}", stamp, extension))
            }
        }
    }
}
