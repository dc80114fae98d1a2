//! Configuration loading and config file resolution
//!
//! Bootstrap settings come from a TOML file resolved in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`CSCRIBE_CONFIG`)
//! 3. Per-user config file (`<config_dir>/cscribe/config.toml`)
//! 4. Built-in defaults (fallback)
//!
//! A missing file never prevents startup: loading continues with defaults and
//! returns a [`ConfigSource::Missing`] for the caller to warn about once
//! logging is up. A file that exists but does not parse is an error.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "CSCRIBE_CONFIG";

/// Default seek step for the back/forward commands (seconds)
pub const DEFAULT_SEEK_STEP_SECONDS: f64 = 2.0;

/// Default tempo step for the tempo up/down commands
pub const DEFAULT_TEMPO_STEP: f32 = 0.05;

/// Where the loaded configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Read from this file
    File(PathBuf),
    /// This file was requested but does not exist; defaults were used
    Missing(PathBuf),
    /// Nothing requested and no per-user file; defaults were used
    Defaults,
}

impl ConfigSource {
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigSource::File(path) | ConfigSource::Missing(path) => Some(path),
            ConfigSource::Defaults => None,
        }
    }

    /// Log the outcome. Call after the subscriber is installed.
    pub fn report(&self) {
        match self {
            ConfigSource::File(path) => info!("Loaded configuration from {}", path.display()),
            ConfigSource::Missing(path) => warn!(
                "Config file {} not found, using built-in defaults",
                path.display()
            ),
            ConfigSource::Defaults => info!("Configuration: built-in defaults"),
        }
    }
}

/// Top-level TOML configuration
///
/// Every section is optional; absent keys take their built-in defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub logging: LoggingConfig,
    pub audio: AudioConfig,
    pub controls: ControlConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// Output device configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Output device name (None = system default device)
    pub device: Option<String>,

    /// Fixed buffer size in frames (None = device default)
    pub buffer_size: Option<u32>,
}

/// Step sizes for the transport commands
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub seek_step_seconds: f64,
    pub tempo_step: f32,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            seek_step_seconds: DEFAULT_SEEK_STEP_SECONDS,
            tempo_step: DEFAULT_TEMPO_STEP,
        }
    }
}

impl TomlConfig {
    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Resolve and load configuration, falling back to defaults.
    ///
    /// Runs before logging is initialised (the logging section lives in the
    /// file), so it logs nothing itself. Pass the returned [`ConfigSource`]
    /// to the log once the subscriber exists.
    pub fn load(cli_path: Option<&Path>) -> Result<(Self, ConfigSource)> {
        match resolve_config_path(cli_path) {
            Some(path) if path.exists() => {
                let config = Self::load_file(&path)?;
                Ok((config, ConfigSource::File(path)))
            }
            Some(path) => Ok((Self::default(), ConfigSource::Missing(path))),
            None => Ok((Self::default(), ConfigSource::Defaults)),
        }
    }

    fn validate(&self) -> Result<()> {
        let step = self.controls.seek_step_seconds;
        if !step.is_finite() || step <= 0.0 {
            return Err(Error::Config(format!(
                "controls.seek_step_seconds must be a positive number, got {}",
                step
            )));
        }

        let tempo = self.controls.tempo_step;
        if !tempo.is_finite() || tempo < 0.0 {
            return Err(Error::Config(format!(
                "controls.tempo_step must be non-negative, got {}",
                tempo
            )));
        }

        if self.audio.buffer_size == Some(0) {
            return Err(Error::Config("audio.buffer_size must be non-zero".to_string()));
        }

        Ok(())
    }
}

/// Pick the config file to read, without touching its contents.
///
/// The per-user file is only returned when it exists, so an absent default
/// location is silent while an absent explicit path is reported by the caller.
pub fn resolve_config_path(cli_path: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_path {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Per-user config file
    default_config_path().filter(|p| p.exists())
}

/// Platform config location: `~/.config/cscribe/config.toml` on Linux,
/// `~/Library/Application Support/cscribe/config.toml` on macOS,
/// `%APPDATA%\cscribe\config.toml` on Windows
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("cscribe").join("config.toml"))
}
