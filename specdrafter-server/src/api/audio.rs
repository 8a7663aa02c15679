//! Audio endpoints: transcription and speech synthesis

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct TranscribeRequest {
    /// Base64-encoded audio
    pub audio: String,
    pub mime_type: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TranscribeResponse {
    pub transcript: String,
}

#[derive(Debug, Deserialize)]
pub struct TextToSpeechRequest {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TextToSpeechResponse {
    /// Base64-encoded WAV
    pub audio_content: String,
}

/// POST /audio/transcribe
pub async fn transcribe(
    State(state): State<AppState>,
    payload: Result<Json<TranscribeRequest>, JsonRejection>,
) -> ApiResult<Json<TranscribeResponse>> {
    let Json(request) = payload?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(request.audio.trim())
        .map_err(|e| ApiError::BadRequest(format!("Invalid base64 audio: {}", e)))?;

    let transcript = state.audio.transcribe(bytes, &request.mime_type).await?;
    Ok(Json(TranscribeResponse { transcript }))
}

/// POST /audio/text-to-speech
pub async fn text_to_speech(
    State(state): State<AppState>,
    payload: Result<Json<TextToSpeechRequest>, JsonRejection>,
) -> ApiResult<Json<TextToSpeechResponse>> {
    let Json(request) = payload?;
    if request.text.trim().is_empty() {
        return Err(ApiError::BadRequest("Text cannot be empty".to_string()));
    }

    let wav = state.audio.synthesize(&request.text).await?;
    Ok(Json(TextToSpeechResponse {
        audio_content: base64::engine::general_purpose::STANDARD.encode(wav),
    }))
}

pub fn audio_routes() -> Router<AppState> {
    Router::new()
        .route("/audio/transcribe", post(transcribe))
        .route("/audio/text-to-speech", post(text_to_speech))
}
