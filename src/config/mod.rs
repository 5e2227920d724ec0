//! Configuration module
//!
//! Handles the capture settings file and the directories it lives in

mod settings;

pub use settings::{AppConfig, LoggingConfig, OutputConfig, PortConfig, TimingConfig};

use directories::ProjectDirs;
use std::path::PathBuf;

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "tekcap", "Tekcap")
}

/// Get the application configuration directory
pub fn config_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the application data directory
pub fn data_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.data_dir().to_path_buf())
}

/// Get the default capture output directory
pub fn capture_dir() -> Option<PathBuf> {
    data_dir().map(|d| d.join("captures"))
}

/// Get the log directory
pub fn log_dir() -> Option<PathBuf> {
    data_dir().map(|d| d.join("logs"))
}

/// Path of the settings file
pub fn config_file() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}
