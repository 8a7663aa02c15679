//! specdrafter-server library interface
//!
//! Exposes the router and application state for integration testing.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod provider;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::http::HeaderValue;
use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::provider::GenerationProvider;
use crate::services::{AudioBridge, AudioTranscoder, ChatOrchestrator, Gateway};

/// Model and voice selection shared by the services
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationSettings {
    /// Chat, document and transcription model
    pub model: String,
    pub tts_model: String,
    pub tts_voice: String,
    /// Delay between remote file state checks
    pub file_poll_interval: Duration,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model: config::DEFAULT_MODEL.to_string(),
            tts_model: config::DEFAULT_TTS_MODEL.to_string(),
            tts_voice: config::DEFAULT_TTS_VOICE.to_string(),
            file_poll_interval: Duration::from_millis(config::DEFAULT_FILE_POLL_INTERVAL_MS),
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Conversation store
    pub db: SqlitePool,
    /// Plain and thinking-mode generation
    pub gateway: Gateway,
    /// Transcription and speech synthesis
    pub audio: AudioBridge,
    pub chat: ChatOrchestrator,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        provider: Arc<dyn GenerationProvider>,
        transcoder: Arc<dyn AudioTranscoder>,
        settings: GenerationSettings,
    ) -> Self {
        let gateway = Gateway::new(Arc::clone(&provider), settings.model.clone());
        let audio = AudioBridge::new(
            provider,
            transcoder,
            settings.model,
            settings.tts_model,
            settings.tts_voice,
            settings.file_poll_interval,
        );
        let chat = ChatOrchestrator::new(db.clone(), gateway.clone(), audio.clone());

        Self {
            db,
            gateway,
            audio,
            chat,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::project_routes())
        .merge(api::chat_routes())
        .merge(api::document_routes())
        .merge(api::audio_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// CORS restricted to `origins`, credentials allowed
///
/// Methods and headers mirror the preflight request.
pub fn cors_layer(origins: &[String]) -> anyhow::Result<CorsLayer> {
    let origins = origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin)
                .map_err(|e| anyhow::anyhow!("Invalid CORS origin '{}': {}", origin, e))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true))
}
