//! Gemini REST client
//!
//! Talks to the Generative Language API:
//! - `models/{model}:streamGenerateContent?alt=sse` for streamed generation
//! - `models/{model}:generateContent` for transcription and speech
//! - the Files API (resumable upload, state polling, delete) for audio input

use async_trait::async_trait;
use base64::Engine;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{
    Fragment, FragmentStream, GenerateRequest, GenerateResponse, GenerationProvider,
    ProviderError, ProviderResult, RemoteFile,
};

/// Public Generative Language API endpoint
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const API_KEY_HEADER: &str = "x-goog-api-key";
const USER_AGENT: &str = concat!("specdrafter/", env!("CARGO_PKG_VERSION"));
const UPLOAD_DISPLAY_NAME: &str = "specdrafter-audio";

/// Connection settings for [`GeminiProvider`]
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: String,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

/// Error body returned by the API
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    code: Option<u16>,
    message: String,
}

/// One streamed chunk, or a whole non-streaming response
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponseChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    text: Option<String>,
    #[serde(default)]
    thought: Option<bool>,
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
struct InlineData {
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

/// Wrapper around upload responses
#[derive(Debug, Deserialize)]
struct UploadResponse {
    file: RemoteFile,
}

/// Gemini implementation of [`GenerationProvider`]
pub struct GeminiProvider {
    http_client: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiProvider {
    pub fn new(config: GeminiConfig) -> ProviderResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self { http_client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn post(&self, url: &str) -> reqwest::RequestBuilder {
        self.http_client
            .post(url)
            .header(API_KEY_HEADER, &self.config.api_key)
    }

    /// Turn a non-success response into [`ProviderError::ApiResponse`]
    async fn check_status(response: reqwest::Response) -> ProviderResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let (status, message) = match serde_json::from_str::<ErrorResponse>(&body) {
            Ok(parsed) => (parsed.error.code.unwrap_or(status.as_u16()), parsed.error.message),
            Err(_) => (status.as_u16(), body),
        };
        Err(ProviderError::ApiResponse { status, message })
    }
}

/// Build the JSON body for generateContent / streamGenerateContent
pub(crate) fn build_request_body(request: &GenerateRequest) -> Value {
    let mut body = json!({ "contents": request.contents });

    if let Some(instruction) = &request.system_instruction {
        body["systemInstruction"] = json!({ "parts": [{ "text": instruction }] });
    }

    let mut generation_config = serde_json::Map::new();
    if request.options.include_thoughts {
        generation_config.insert(
            "thinkingConfig".to_string(),
            json!({ "includeThoughts": true }),
        );
    }
    if let Some(voice) = &request.options.speech_voice {
        generation_config.insert("responseModalities".to_string(), json!(["AUDIO"]));
        generation_config.insert(
            "speechConfig".to_string(),
            json!({
                "voiceConfig": { "prebuiltVoiceConfig": { "voiceName": voice } }
            }),
        );
    }
    if !generation_config.is_empty() {
        body["generationConfig"] = Value::Object(generation_config);
    }

    body
}

/// Pop one `\n`-terminated line off the front of `buffer`
///
/// Works on bytes so multi-byte characters split across network chunks are
/// only decoded once complete.
fn take_line(buffer: &mut Vec<u8>) -> Option<String> {
    let pos = buffer.iter().position(|&b| b == b'\n')?;
    let line: Vec<u8> = buffer.drain(..=pos).collect();
    Some(String::from_utf8_lossy(&line).trim_end().to_string())
}

/// Extract fragments from one SSE line
fn parse_sse_line(line: &str) -> ProviderResult<Vec<Fragment>> {
    let Some(data) = line.strip_prefix("data:") else {
        // event names, comments, blank separators
        return Ok(Vec::new());
    };
    let data = data.trim();
    if data.is_empty() {
        return Ok(Vec::new());
    }

    let chunk: ResponseChunk = match serde_json::from_str(data) {
        Ok(chunk) => chunk,
        Err(e) => {
            tracing::debug!("Skipping unparseable stream chunk: {} - data: {}", e, data);
            return Ok(Vec::new());
        }
    };

    chunk_fragments(chunk)
}

fn chunk_fragments(chunk: ResponseChunk) -> ProviderResult<Vec<Fragment>> {
    if let Some(reason) = chunk.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(ProviderError::Blocked(format!("prompt blocked: {}", reason)));
    }

    let mut fragments = Vec::new();
    for candidate in chunk.candidates {
        if candidate.finish_reason.as_deref() == Some("SAFETY") {
            return Err(ProviderError::Blocked(
                "response blocked due to safety concerns".to_string(),
            ));
        }
        let Some(content) = candidate.content else {
            continue;
        };
        for part in content.parts {
            if let Some(text) = part.text.filter(|t| !t.is_empty()) {
                fragments.push(Fragment {
                    text,
                    thought: part.thought.unwrap_or(false),
                });
            }
        }
    }
    Ok(fragments)
}

/// Decode an SSE byte stream into fragments, preserving arrival order
pub(crate) fn parse_event_stream<S, B, E>(
    bytes: S,
) -> impl Stream<Item = ProviderResult<Fragment>> + Send + 'static
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Send + 'static,
    ProviderError: From<E>,
{
    async_stream::try_stream! {
        let mut bytes = Box::pin(bytes);
        let mut buffer: Vec<u8> = Vec::new();

        while let Some(chunk) = bytes.next().await {
            let chunk = chunk.map_err(ProviderError::from)?;
            buffer.extend_from_slice(chunk.as_ref());

            while let Some(line) = take_line(&mut buffer) {
                for fragment in parse_sse_line(&line)? {
                    yield fragment;
                }
            }
        }

        if !buffer.is_empty() {
            let line = String::from_utf8_lossy(&buffer).trim_end().to_string();
            for fragment in parse_sse_line(&line)? {
                yield fragment;
            }
        }
    }
}

#[async_trait]
impl GenerationProvider for GeminiProvider {
    async fn stream_generate(&self, request: GenerateRequest) -> ProviderResult<FragmentStream> {
        let url = self.url(&format!(
            "v1beta/models/{}:streamGenerateContent?alt=sse",
            request.model
        ));
        tracing::debug!(model = %request.model, turns = request.contents.len(), "Starting streamed generation");

        let response = self
            .post(&url)
            .json(&build_request_body(&request))
            .send()
            .await?;
        let response = Self::check_status(response).await?;

        Ok(Box::pin(parse_event_stream(response.bytes_stream())))
    }

    async fn generate(&self, request: GenerateRequest) -> ProviderResult<GenerateResponse> {
        let url = self.url(&format!("v1beta/models/{}:generateContent", request.model));
        tracing::debug!(model = %request.model, "Starting single-shot generation");

        let response = self
            .post(&url)
            .json(&build_request_body(&request))
            .send()
            .await?;
        let response = Self::check_status(response).await?;

        let chunk: ResponseChunk = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        let inline_data = chunk
            .candidates
            .iter()
            .filter_map(|c| c.content.as_ref())
            .flat_map(|c| c.parts.iter())
            .find_map(|p| p.inline_data.as_ref())
            .map(|inline| base64::engine::general_purpose::STANDARD.decode(&inline.data))
            .transpose()
            .map_err(|e| ProviderError::Parse(format!("invalid inline data: {}", e)))?;

        let text = chunk_fragments(chunk)?
            .into_iter()
            .filter(|f| !f.thought)
            .map(|f| f.text)
            .collect::<String>();

        Ok(GenerateResponse { text, inline_data })
    }

    async fn upload_file(&self, bytes: Vec<u8>, mime_type: &str) -> ProviderResult<RemoteFile> {
        // Resumable protocol: start a session, then upload and finalize in one request
        let start = self
            .post(&self.url("upload/v1beta/files"))
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", bytes.len().to_string())
            .header("X-Goog-Upload-Header-Content-Type", mime_type)
            .json(&json!({ "file": { "display_name": UPLOAD_DISPLAY_NAME } }))
            .send()
            .await?;
        let start = Self::check_status(start).await?;

        let upload_url = start
            .headers()
            .get("x-goog-upload-url")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| ProviderError::MissingPayload("upload session URL".to_string()))?;

        let response = self
            .post(&upload_url)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(bytes)
            .send()
            .await?;
        let response = Self::check_status(response).await?;

        let uploaded: UploadResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        tracing::info!(file = %uploaded.file.name, state = ?uploaded.file.state, "Uploaded file to provider");
        Ok(uploaded.file)
    }

    async fn get_file(&self, name: &str) -> ProviderResult<RemoteFile> {
        let response = self
            .http_client
            .get(self.url(&format!("v1beta/{}", name)))
            .header(API_KEY_HEADER, &self.config.api_key)
            .send()
            .await?;
        let response = Self::check_status(response).await?;

        response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))
    }

    async fn delete_file(&self, name: &str) -> ProviderResult<()> {
        let response = self
            .http_client
            .delete(self.url(&format!("v1beta/{}", name)))
            .header(API_KEY_HEADER, &self.config.api_key)
            .send()
            .await?;
        Self::check_status(response).await?;
        Ok(())
    }
}
