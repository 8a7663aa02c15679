//! Generation provider boundary
//!
//! The hosted language model is reached only through [`GenerationProvider`].
//! Request types follow the provider's content model (alternating `user` /
//! `model` turns made of parts) so the HTTP client can serialize them as-is.

mod gemini;

pub use gemini::{GeminiConfig, GeminiProvider, DEFAULT_BASE_URL};

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from provider calls
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Network request failed
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Provider answered with an error status
    #[error("Provider error ({status}): {message}")]
    ApiResponse { status: u16, message: String },

    /// Response body could not be understood
    #[error("Parse error: {0}")]
    Parse(String),

    /// Prompt or response blocked by provider safety filters
    #[error("Generation blocked: {0}")]
    Blocked(String),

    /// Response lacked the payload the call exists for
    #[error("Missing payload: {0}")]
    MissingPayload(String),

    /// Uploaded file reached the FAILED state
    #[error("Remote file processing failed: {0}")]
    FileProcessing(String),
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Speaker of a provider turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Model,
}

/// Reference to a file previously uploaded to the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileData {
    pub mime_type: String,
    pub file_uri: String,
}

/// One piece of a turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Part {
    Text(String),
    FileData(FileData),
}

/// One conversational turn sent to the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    pub role: TurnRole,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            parts: vec![Part::Text(text.into())],
        }
    }

    pub fn model_text(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Model,
            parts: vec![Part::Text(text.into())],
        }
    }
}

/// Optional generation features
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationOptions {
    /// Ask for reasoning summaries alongside visible text
    pub include_thoughts: bool,
    /// Ask for spoken audio using this prebuilt voice instead of text
    pub speech_voice: Option<String>,
}

/// A single provider call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateRequest {
    pub model: String,
    /// Instruction passed out-of-band rather than as a conversation turn
    pub system_instruction: Option<String>,
    pub contents: Vec<Content>,
    pub options: GenerationOptions,
}

impl GenerateRequest {
    pub fn new(model: impl Into<String>, contents: Vec<Content>) -> Self {
        Self {
            model: model.into(),
            system_instruction: None,
            contents,
            options: GenerationOptions::default(),
        }
    }
}

/// Incremental piece of generated text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub text: String,
    /// True for internal reasoning, false for visible reply text
    pub thought: bool,
}

impl Fragment {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            thought: false,
        }
    }

    pub fn thought(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            thought: true,
        }
    }
}

/// Finite, ordered, single-pass fragment sequence for one call
pub type FragmentStream = BoxStream<'static, ProviderResult<Fragment>>;

/// Result of a non-streaming call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerateResponse {
    /// Concatenated visible text
    pub text: String,
    /// Decoded inline binary payload (raw PCM for speech requests)
    pub inline_data: Option<Vec<u8>>,
}

/// Processing state of an uploaded file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileState {
    StateUnspecified,
    Processing,
    Active,
    Failed,
}

/// Provider-side file handle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    /// Resource name, e.g. `files/abc123`
    pub name: String,
    pub uri: String,
    pub mime_type: String,
    pub state: FileState,
    #[serde(default)]
    pub error: Option<RemoteFileError>,
}

/// Failure detail attached to a FAILED file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFileError {
    #[serde(default)]
    pub code: Option<i32>,
    #[serde(default)]
    pub message: String,
}

/// Hosted language-model service
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Start a streaming generation; fragments arrive in provider order
    async fn stream_generate(&self, request: GenerateRequest) -> ProviderResult<FragmentStream>;

    /// Single-shot generation (transcription, speech)
    async fn generate(&self, request: GenerateRequest) -> ProviderResult<GenerateResponse>;

    async fn upload_file(&self, bytes: Vec<u8>, mime_type: &str) -> ProviderResult<RemoteFile>;

    async fn get_file(&self, name: &str) -> ProviderResult<RemoteFile>;

    async fn delete_file(&self, name: &str) -> ProviderResult<()>;
}
