//! TOML bootstrap configuration and config file resolution
//!
//! Settings sources, highest priority first:
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Built-in defaults (the `default_*` functions below)
//!
//! This module covers 3 and 4. Binaries layer 1 and 2 on top with clap.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "ROBRIDGE_CONFIG";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TomlConfig {
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port (default 3001)
    #[serde(default = "default_port")]
    pub port: u16,

    /// sqlx connection URL
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// `development` exposes error details in API responses
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Buffered events per dashboard before it starts skipping
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,

    #[serde(default)]
    pub ai: AiConfig,

    #[serde(default)]
    pub scans: ScansConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            database_url: default_database_url(),
            environment: default_environment(),
            event_bus_capacity: default_event_bus_capacity(),
            ai: AiConfig::default(),
            scans: ScansConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// When scans are sent to the AI analysis service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiPolicy {
    /// Every scan is enriched
    #[default]
    Always,
    /// Only scans from AI-capable devices are enriched
    Capability,
}

impl std::str::FromStr for AiPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "always" => Ok(AiPolicy::Always),
            "capability" => Ok(AiPolicy::Capability),
            other => Err(Error::Config(format!("Unknown AI policy: {}", other))),
        }
    }
}

/// `[ai]` section
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AiConfig {
    #[serde(default = "default_ai_server_url")]
    pub server_url: String,

    #[serde(default = "default_ai_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub policy: AiPolicy,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            server_url: default_ai_server_url(),
            timeout_secs: default_ai_timeout_secs(),
            policy: AiPolicy::default(),
        }
    }
}

/// `[scans]` section
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScansConfig {
    /// Seconds without a ping before a device reads as disconnected
    #[serde(default = "default_device_stale_secs")]
    pub device_stale_secs: u64,

    /// Seconds during which the same barcode cannot be saved again
    #[serde(default = "default_saved_dedup_window_secs")]
    pub saved_dedup_window_secs: u64,
}

impl Default for ScansConfig {
    fn default() -> Self {
        Self {
            device_stale_secs: default_device_stale_secs(),
            saved_dedup_window_secs: default_saved_dedup_window_secs(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3001
}

fn default_database_url() -> String {
    "sqlite://robridge.db?mode=rwc".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_event_bus_capacity() -> usize {
    100
}

fn default_ai_server_url() -> String {
    "https://robridgeaiserver.onrender.com".to_string()
}

fn default_ai_timeout_secs() -> u64 {
    15
}

fn default_device_stale_secs() -> u64 {
    60
}

fn default_saved_dedup_window_secs() -> u64 {
    300
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Platform default config file: `<config_dir>/robridge/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("robridge").join("config.toml"))
}

/// Pick the config file path
///
/// Command-line argument, then `ROBRIDGE_CONFIG`, then the platform default.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    default_config_path()
}

/// Parse a TOML document into a [`TomlConfig`]
pub fn parse_toml_config(content: &str) -> Result<TomlConfig> {
    toml::from_str(content).map_err(|e| Error::Config(format!("Invalid TOML config: {}", e)))
}

/// Load the TOML config file
///
/// A missing file is not an error: a warning is logged and compiled
/// defaults are returned. An unreadable or malformed file is an error.
pub fn load_toml_config(path: Option<&Path>) -> Result<TomlConfig> {
    let Some(path) = path else {
        warn!("No config directory available on this platform, using built-in defaults");
        return Ok(TomlConfig::default());
    };

    if !path.exists() {
        warn!(path = %path.display(), "Config file not found, using built-in defaults");
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config = parse_toml_config(&content)?;
    info!(path = %path.display(), "Loaded config file");
    Ok(config)
}
