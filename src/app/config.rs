use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::app::error::AppError;
use crate::app::shell::ShellOptions;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AdbSettings {
    pub command_path: String,
    pub emulator_path: String,
    pub command_timeout_ms: u64,
}

impl Default for AdbSettings {
    fn default() -> Self {
        Self {
            command_path: String::new(),
            emulator_path: String::new(),
            command_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DeviceSettings {
    pub poll_interval_ms: u64,
    pub auto_select: bool,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 3_000,
            auto_select: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ShellSettings {
    pub command_timeout_ms: u64,
    pub startup_grace_ms: u64,
}

impl Default for ShellSettings {
    fn default() -> Self {
        Self {
            command_timeout_ms: 10_000,
            startup_grace_ms: 500,
        }
    }
}

impl ShellSettings {
    pub fn to_options(&self) -> ShellOptions {
        ShellOptions {
            startup_grace: Duration::from_millis(self.startup_grace_ms),
            default_timeout: Duration::from_millis(self.command_timeout_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingSettings {
    pub log_level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            log_level: "INFO".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub adb: AdbSettings,
    #[serde(default)]
    pub device: DeviceSettings,
    #[serde(default)]
    pub shell: ShellSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("ADB_KEEPSHELL_CONFIG_PATH") {
        return PathBuf::from(path);
    }
    home_dir().join(".adb_keepshell_config.json")
}

pub fn backup_config_path() -> PathBuf {
    home_dir().join(".adb_keepshell_config.backup.json")
}

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

pub fn load_config(trace_id: &str) -> Result<AppConfig, AppError> {
    load_config_from_path(&config_path(), trace_id)
}

pub fn save_config(config: &AppConfig, trace_id: &str) -> Result<(), AppError> {
    save_config_to_path(config, &config_path(), &backup_config_path(), trace_id)
}

pub fn load_config_from_path(path: &Path, trace_id: &str) -> Result<AppConfig, AppError> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let raw = fs::read_to_string(path)
        .map_err(|err| AppError::system(format!("Failed to read config: {err}"), trace_id))?;
    let config: AppConfig = serde_json::from_str(&raw)
        .map_err(|err| AppError::validation(format!("Failed to parse config: {err}"), trace_id))?;
    Ok(validate_config(config))
}

pub fn save_config_to_path(
    config: &AppConfig,
    path: &Path,
    backup_path: &Path,
    trace_id: &str,
) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    if path.exists() {
        let _ = fs::copy(path, backup_path);
    }
    let payload = serde_json::to_string_pretty(config)
        .map_err(|err| AppError::system(format!("Failed to serialize config: {err}"), trace_id))?;
    fs::write(path, payload)
        .map_err(|err| AppError::system(format!("Failed to write config: {err}"), trace_id))?;
    Ok(())
}

fn validate_config(mut config: AppConfig) -> AppConfig {
    let defaults = AppConfig::default();
    if !(200..=60_000).contains(&config.device.poll_interval_ms) {
        config.device.poll_interval_ms = defaults.device.poll_interval_ms;
    }
    if config.adb.command_timeout_ms < 1_000 {
        config.adb.command_timeout_ms = defaults.adb.command_timeout_ms;
    }
    if config.shell.command_timeout_ms < 100 {
        config.shell.command_timeout_ms = defaults.shell.command_timeout_ms;
    }
    if config.shell.startup_grace_ms > 10_000 {
        config.shell.startup_grace_ms = defaults.shell.startup_grace_ms;
    }
    if config.logging.log_level.trim().is_empty() {
        config.logging.log_level = defaults.logging.log_level;
    }
    config
}
