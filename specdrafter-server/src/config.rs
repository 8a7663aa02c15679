//! Configuration resolution for specdrafter-server
//!
//! **Priority:** command line → environment → TOML file → built-in default.
//! clap handles the first two tiers; [`ServerConfig::resolve`] layers the
//! TOML file and defaults underneath.

use clap::Parser;
use specdrafter_common::config::{default_database_url, TomlConfig};
use specdrafter_common::{Error, Result};
use std::path::PathBuf;
use std::time::Duration;

use crate::provider::DEFAULT_BASE_URL;
use crate::GenerationSettings;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_MODEL: &str = "gemini-2.5-pro";
pub const DEFAULT_TTS_MODEL: &str = "gemini-2.5-flash-preview-tts";
pub const DEFAULT_TTS_VOICE: &str = "Puck";
pub const DEFAULT_FILE_POLL_INTERVAL_MS: u64 = 500;
pub const DEFAULT_CORS_ORIGIN: &str = "http://localhost:3000";

/// Command-line arguments
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "specdrafter-server")]
#[command(about = "SpecDrafter requirements-gathering chat backend")]
#[command(version)]
pub struct Args {
    /// Path to config.toml
    #[arg(long, env = "SPECDRAFTER_CONFIG")]
    pub config: Option<PathBuf>,

    /// HTTP bind address
    #[arg(long, env = "SPECDRAFTER_HOST")]
    pub host: Option<String>,

    /// HTTP port
    #[arg(short, long, env = "SPECDRAFTER_PORT")]
    pub port: Option<u16>,

    /// sqlx SQLite URL for the conversation store
    #[arg(long, env = "SPECDRAFTER_DATABASE_URL")]
    pub database_url: Option<String>,

    /// Gemini API key
    #[arg(long, env = "GEMINI_API_KEY", hide = true, hide_env_values = true)]
    pub api_key: Option<String>,

    /// Gemini API base URL
    #[arg(long, env = "GEMINI_BASE_URL")]
    pub base_url: Option<String>,

    /// Chat and document model
    #[arg(long, env = "SPECDRAFTER_MODEL")]
    pub model: Option<String>,

    /// Speech synthesis model
    #[arg(long, env = "SPECDRAFTER_TTS_MODEL")]
    pub tts_model: Option<String>,

    /// Allowed CORS origins, comma separated
    #[arg(long, env = "SPECDRAFTER_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,
}

/// Fully resolved startup configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub api_key: String,
    pub base_url: String,
    pub generation: GenerationSettings,
    pub cors_origins: Vec<String>,
    pub log_level: String,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl ServerConfig {
    /// Merge arguments over the TOML file; fails when no API key is configured
    pub fn resolve(args: Args, toml: TomlConfig) -> Result<Self> {
        let provider = toml.provider;

        let api_key = non_blank(args.api_key)
            .or_else(|| non_blank(provider.api_key))
            .ok_or_else(|| {
                Error::Config(
                    "Gemini API key not configured. Set GEMINI_API_KEY or provider.api_key in config.toml"
                        .to_string(),
                )
            })?;

        let cors_origins: Vec<String> = args
            .cors_origins
            .or(toml.cors_origins)
            .unwrap_or_else(|| vec![DEFAULT_CORS_ORIGIN.to_string()])
            .into_iter()
            .filter_map(|o| non_blank(Some(o)))
            .collect();

        let file_poll_interval_ms = provider
            .file_poll_interval_ms
            .unwrap_or(DEFAULT_FILE_POLL_INTERVAL_MS);
        if file_poll_interval_ms == 0 {
            return Err(Error::Config(
                "provider.file_poll_interval_ms must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            host: non_blank(args.host)
                .or(toml.host)
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: args.port.or(toml.port).unwrap_or(DEFAULT_PORT),
            database_url: non_blank(args.database_url)
                .or(toml.database_url)
                .unwrap_or_else(default_database_url),
            api_key,
            base_url: non_blank(args.base_url)
                .or(provider.base_url)
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            generation: GenerationSettings {
                model: non_blank(args.model)
                    .or(provider.model)
                    .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
                tts_model: non_blank(args.tts_model)
                    .or(provider.tts_model)
                    .unwrap_or_else(|| DEFAULT_TTS_MODEL.to_string()),
                tts_voice: provider
                    .tts_voice
                    .unwrap_or_else(|| DEFAULT_TTS_VOICE.to_string()),
                file_poll_interval: Duration::from_millis(file_poll_interval_ms),
            },
            cors_origins,
            log_level: toml.logging.level,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
