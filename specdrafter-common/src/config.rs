//! Bootstrap configuration file
//!
//! The TOML file is optional. Every field has a built-in default except the
//! provider API key, which may instead come from the environment. Resolution
//! against command-line flags and environment variables happens in the
//! server crate; this module only locates and parses the file.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Contents of `config.toml`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    /// HTTP bind address
    #[serde(default)]
    pub host: Option<String>,

    /// HTTP server port
    #[serde(default)]
    pub port: Option<u16>,

    /// sqlx connection string for the conversation store
    #[serde(default)]
    pub database_url: Option<String>,

    /// Origins allowed by CORS
    #[serde(default)]
    pub cors_origins: Option<Vec<String>>,

    /// Generation provider settings
    #[serde(default)]
    pub provider: ProviderToml,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// `[provider]` table
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderToml {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub tts_model: Option<String>,
    pub tts_voice: Option<String>,
    pub file_poll_interval_ms: Option<u64>,
}

/// `[logging]` table
#[derive(Debug, Clone, Deserialize)]
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

fn default_log_level() -> String {
    "info".to_string()
}

/// Parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
}

/// Load the config file if one exists
///
/// An explicitly requested path must exist; the platform default is optional.
pub fn load_optional_config(explicit: Option<&Path>) -> Result<TomlConfig> {
    if let Some(path) = explicit {
        return load_toml_config(path);
    }

    match default_config_path() {
        Some(path) if path.exists() => {
            tracing::info!("Loading configuration from {}", path.display());
            load_toml_config(&path)
        }
        _ => Ok(TomlConfig::default()),
    }
}

/// Platform config file location (`~/.config/specdrafter/config.toml` on Linux)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("specdrafter").join("config.toml"))
}

/// Platform data folder holding the default database
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("specdrafter"))
        .unwrap_or_else(|| PathBuf::from("./specdrafter_data"))
}

/// Default sqlx URL for the conversation store
pub fn default_database_url() -> String {
    let path = default_data_dir().join("specdrafter.db");
    format!("sqlite://{}?mode=rwc", path.display())
}
