//! # Configuration Management Module
//!
//! Persistent recorder settings stored in platform-appropriate locations.
//! Handles loading, saving, validating and providing defaults.
//!
//! ## Settings
//! - `port`, `baud_rate`, `read_timeout_ms`: serial link
//! - `encoding`, `channels`: frame layout; the channel count is the expected arity
//! - `poll_interval_ms`: acquisition back-off when the port is quiet
//! - `min_write_interval_ms`: minimum spacing between recorded rows
//! - `debounce_ms`: start/stop toggle debounce window
//! - `output_dir`: where recordings are written
//!
//! ## Storage Location
//! - macOS: ~/Library/Application Support/ppg-recorder/config.toml
//! - Linux: ~/.config/ppg-recorder/config.toml
//! - Windows: %APPDATA%\ppg-recorder\config.toml
//!
//! Missing keys fall back to their defaults, so a file only needs the
//! settings that differ.

use crate::error::ConfigError;
use crate::frame::FrameEncoding;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Channel layouts of the sensor firmwares we've recorded from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// Single photodiode intensity, bare value
    Photodiode,
    /// MAX30102 red and IR intensities as `key=value`
    RedIr,
    /// Red, IR, SpO2 and its validity flag as `key=value`
    Spo2,
    /// Red, IR, heart rate, SpO2 and validity flags, bare CSV
    Max30102,
}

impl Layout {
    pub fn encoding(&self) -> FrameEncoding {
        match self {
            Layout::Photodiode | Layout::Max30102 => FrameEncoding::Csv,
            Layout::RedIr | Layout::Spo2 => FrameEncoding::KeyValue,
        }
    }

    pub fn channels(&self) -> Vec<String> {
        let names: &[&str] = match self {
            Layout::Photodiode => &["Photodiode IR Reading"],
            Layout::RedIr => &["Red", "IR"],
            Layout::Spo2 => &["Red_light", "IR_light", "SpO2", "SpO2Valid"],
            Layout::Max30102 => &["Red_light", "IR_light", "HR", "HRvalid", "SPO2", "SPO2Valid"],
        };
        names.iter().map(|s| s.to_string()).collect()
    }
}

impl std::str::FromStr for Layout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "photodiode" => Ok(Layout::Photodiode),
            "red-ir" => Ok(Layout::RedIr),
            "spo2" => Ok(Layout::Spo2),
            "max30102" => Ok(Layout::Max30102),
            other => Err(format!(
                "unknown layout '{}' (expected photodiode, red-ir, spo2 or max30102)",
                other
            )),
        }
    }
}

fn default_port() -> String {
    if cfg!(target_os = "windows") {
        "COM6".to_string()
    } else {
        "/dev/ttyUSB0".to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub port: String,
    pub baud_rate: u32,
    pub read_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub encoding: FrameEncoding,
    pub channels: Vec<String>,
    pub min_write_interval_ms: u64,
    pub debounce_ms: u64,
    pub output_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            baud_rate: 115_200,
            read_timeout_ms: 50,
            poll_interval_ms: 1,
            encoding: Layout::Max30102.encoding(),
            channels: Layout::Max30102.channels(),
            min_write_interval_ms: 10,
            debounce_ms: 500,
            output_dir: PathBuf::from("recordings"),
        }
    }
}

impl Config {
    /// Get the path to the config file
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ppg-recorder")
            .join("config.toml")
    }

    /// Load config from the default location, or create it if it doesn't exist
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Self::config_path())
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(contents) => {
                let config: Config = toml::from_str(&contents).map_err(ConfigError::ParseFailed)?;
                config.validate()?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File doesn't exist, create default
                let config = Self::default();
                config.save_to(path)?;
                log::info!("Wrote default config to {}", path.display());
                Ok(config)
            }
            Err(e) => Err(ConfigError::ReadFailed(e)),
        }
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(Self::config_path())
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();

        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(ConfigError::WriteFailed)?;
        }

        let toml_string = toml::to_string_pretty(self).map_err(ConfigError::SerializeFailed)?;
        fs::write(path, toml_string).map_err(ConfigError::WriteFailed)?;

        Ok(())
    }

    pub fn apply_layout(&mut self, layout: Layout) {
        self.encoding = layout.encoding();
        self.channels = layout.channels();
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channels.is_empty() {
            return Err(ConfigError::Invalid("at least one channel is required".into()));
        }
        if self.channels.iter().any(|c| c.trim().is_empty()) {
            return Err(ConfigError::Invalid("channel names must not be blank".into()));
        }
        if self.baud_rate == 0 {
            return Err(ConfigError::Invalid("baud_rate must be positive".into()));
        }
        if self.poll_interval_ms >= 10 {
            return Err(ConfigError::Invalid(format!(
                "poll_interval_ms must be below 10, got {}",
                self.poll_interval_ms
            )));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn min_write_interval(&self) -> Duration {
        Duration::from_millis(self.min_write_interval_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}
