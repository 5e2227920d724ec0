//! Capture settings

use crate::core::state_machine::CaptureTiming;
use crate::core::transport::{PortSettings, SerialFlowControl};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Serial port settings
    pub port: PortConfig,
    /// Engine backoff and polling
    pub timing: TimingConfig,
    /// Where captures are written
    pub output: OutputConfig,
    /// Diagnostic logging
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load config from the default location, falling back to defaults when absent
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let path = super::config_file().ok_or("Could not determine config directory")?;
        Self::load_from(&path)
    }

    /// Load config from `path`, falling back to defaults when the file does not exist
    pub fn load_from(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&content)?)
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let path = super::config_file().ok_or("Could not determine config directory")?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Save config to `path`, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Serial port settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortConfig {
    /// Device to capture from (empty for none)
    pub name: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Flow control
    pub flow_control: SerialFlowControl,
    /// Per-read timeout in milliseconds
    pub read_timeout_ms: u64,
}

impl Default for PortConfig {
    fn default() -> Self {
        let settings = PortSettings::default();
        Self {
            name: String::new(),
            baud_rate: settings.baud_rate,
            flow_control: settings.flow_control,
            read_timeout_ms: settings.read_timeout_ms,
        }
    }
}

impl PortConfig {
    /// Line settings for opening the port
    pub fn settings(&self) -> PortSettings {
        PortSettings {
            baud_rate: self.baud_rate,
            flow_control: self.flow_control,
            read_timeout_ms: self.read_timeout_ms,
        }
    }
}

/// Engine timing in milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Retry delay while no port is configured or it will not open
    pub idle_backoff_ms: u64,
    /// Poll delay while waiting for a header line
    pub header_poll_ms: u64,
    /// Spacing of the polls for the capture body
    pub data_poll_interval_ms: u64,
    /// Number of polls for the capture body
    pub data_poll_attempts: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self::from(&CaptureTiming::default())
    }
}

impl From<&CaptureTiming> for TimingConfig {
    fn from(timing: &CaptureTiming) -> Self {
        let ms = |d: Duration| u64::try_from(d.as_millis()).unwrap_or(u64::MAX);
        Self {
            idle_backoff_ms: ms(timing.idle_backoff),
            header_poll_ms: ms(timing.header_poll),
            data_poll_interval_ms: ms(timing.data_poll_interval),
            data_poll_attempts: timing.data_poll_attempts,
        }
    }
}

impl TimingConfig {
    /// Timing for the engine
    pub fn timing(&self) -> CaptureTiming {
        CaptureTiming {
            idle_backoff: Duration::from_millis(self.idle_backoff_ms),
            header_poll: Duration::from_millis(self.header_poll_ms),
            data_poll_interval: Duration::from_millis(self.data_poll_interval_ms),
            data_poll_attempts: self.data_poll_attempts,
        }
    }
}

/// Capture output settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory PNG files are written to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
    /// File name prefix
    pub file_prefix: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: super::capture_dir(),
            file_prefix: "capture".to_string(),
        }
    }
}

/// Diagnostic logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive (overridden by `RUST_LOG`)
    pub level: String,
    /// Write a daily rolling log file here
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
        }
    }
}
