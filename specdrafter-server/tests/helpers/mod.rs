//! Test helper utilities
//!
//! Scripted provider and transcoder doubles plus router/body helpers shared by
//! the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use http_body_util::BodyExt;
use serde_json::Value;
use specdrafter_server::provider::{
    FileState, Fragment, FragmentStream, GenerateRequest, GenerateResponse, GenerationProvider,
    ProviderError, ProviderResult, RemoteFile, RemoteFileError,
};
use specdrafter_server::services::AudioTranscoder;
use specdrafter_server::{AppState, GenerationSettings};
use sqlx::SqlitePool;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One scripted stream item
#[derive(Debug, Clone)]
pub enum Script {
    Text(&'static str),
    Thought(&'static str),
    Fail(&'static str),
}

/// Provider double replaying scripted responses and counting calls
pub struct MockProvider {
    streams: Mutex<VecDeque<Vec<Script>>>,
    generate_responses: Mutex<VecDeque<GenerateResponse>>,
    file_states: Mutex<VecDeque<FileState>>,
    pub fail_stream_start: AtomicBool,
    pub fail_delete: AtomicBool,
    pub stream_requests: Mutex<Vec<GenerateRequest>>,
    pub generate_requests: Mutex<Vec<GenerateRequest>>,
    pub uploaded_mime_types: Mutex<Vec<String>>,
    pub deleted_files: Mutex<Vec<String>>,
    pub get_file_calls: AtomicUsize,
}

impl MockProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            streams: Mutex::new(VecDeque::new()),
            generate_responses: Mutex::new(VecDeque::new()),
            file_states: Mutex::new(VecDeque::new()),
            fail_stream_start: AtomicBool::new(false),
            fail_delete: AtomicBool::new(false),
            stream_requests: Mutex::new(Vec::new()),
            generate_requests: Mutex::new(Vec::new()),
            uploaded_mime_types: Mutex::new(Vec::new()),
            deleted_files: Mutex::new(Vec::new()),
            get_file_calls: AtomicUsize::new(0),
        })
    }

    /// Queue the fragments of the next streamed call
    pub fn script_stream(&self, items: Vec<Script>) {
        self.streams.lock().unwrap().push_back(items);
    }

    /// Queue the response of the next single-shot call
    pub fn script_generate(&self, text: &str, inline_data: Option<Vec<u8>>) {
        self.generate_responses
            .lock()
            .unwrap()
            .push_back(GenerateResponse {
                text: text.to_string(),
                inline_data,
            });
    }

    /// States reported by upload and then successive polls
    pub fn script_file_states(&self, states: Vec<FileState>) {
        *self.file_states.lock().unwrap() = states.into();
    }

    pub fn stream_call_count(&self) -> usize {
        self.stream_requests.lock().unwrap().len()
    }

    pub fn last_stream_request(&self) -> GenerateRequest {
        self.stream_requests
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no streamed request recorded")
    }

    fn next_file(&self, name: &str, mime_type: &str) -> RemoteFile {
        let state = self
            .file_states
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(FileState::Active);
        RemoteFile {
            name: name.to_string(),
            uri: format!("https://files.test/{}", name),
            mime_type: mime_type.to_string(),
            state,
            error: (state == FileState::Failed).then(|| RemoteFileError {
                code: Some(3),
                message: "unreadable audio".to_string(),
            }),
        }
    }
}

#[async_trait]
impl GenerationProvider for MockProvider {
    async fn stream_generate(&self, request: GenerateRequest) -> ProviderResult<FragmentStream> {
        self.stream_requests.lock().unwrap().push(request);

        if self.fail_stream_start.load(Ordering::SeqCst) {
            return Err(ProviderError::ApiResponse {
                status: 503,
                message: "model overloaded".to_string(),
            });
        }

        let script = self
            .streams
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| vec![Script::Text("Tell me more.")]);

        let items: Vec<ProviderResult<Fragment>> = script
            .into_iter()
            .map(|item| match item {
                Script::Text(t) => Ok(Fragment::text(t)),
                Script::Thought(t) => Ok(Fragment::thought(t)),
                Script::Fail(msg) => Err(ProviderError::ApiResponse {
                    status: 500,
                    message: msg.to_string(),
                }),
            })
            .collect();
        Ok(Box::pin(futures::stream::iter(items)))
    }

    async fn generate(&self, request: GenerateRequest) -> ProviderResult<GenerateResponse> {
        self.generate_requests.lock().unwrap().push(request);
        Ok(self
            .generate_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| GenerateResponse {
                text: "transcribed words".to_string(),
                inline_data: None,
            }))
    }

    async fn upload_file(&self, _bytes: Vec<u8>, mime_type: &str) -> ProviderResult<RemoteFile> {
        let mut uploads = self.uploaded_mime_types.lock().unwrap();
        uploads.push(mime_type.to_string());
        let name = format!("files/upload-{}", uploads.len());
        drop(uploads);
        Ok(self.next_file(&name, mime_type))
    }

    async fn get_file(&self, name: &str) -> ProviderResult<RemoteFile> {
        self.get_file_calls.fetch_add(1, Ordering::SeqCst);
        let mime_type = self
            .uploaded_mime_types
            .lock()
            .unwrap()
            .last()
            .cloned()
            .unwrap_or_default();
        Ok(self.next_file(name, &mime_type))
    }

    async fn delete_file(&self, name: &str) -> ProviderResult<()> {
        self.deleted_files.lock().unwrap().push(name.to_string());
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(ProviderError::ApiResponse {
                status: 500,
                message: "delete failed".to_string(),
            });
        }
        Ok(())
    }
}

/// Transcoder double writing a short silent WAV and counting calls
#[derive(Default)]
pub struct CountingTranscoder {
    pub calls: AtomicUsize,
    pub sources: Mutex<Vec<PathBuf>>,
    pub outputs: Mutex<Vec<PathBuf>>,
}

impl AudioTranscoder for CountingTranscoder {
    fn transcode_to_wav(&self, source: &Path, dest: &Path) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.sources.lock().unwrap().push(source.to_path_buf());
        self.outputs.lock().unwrap().push(dest.to_path_buf());

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(dest, spec)?;
        for _ in 0..160 {
            writer.write_sample(0i16)?;
        }
        writer.finalize()?;
        Ok(())
    }
}

/// Settings with a fast poll interval
pub fn test_settings() -> GenerationSettings {
    GenerationSettings {
        file_poll_interval: Duration::from_millis(1),
        ..Default::default()
    }
}

/// In-memory store plus state wired to the given doubles
pub async fn create_test_state(
    provider: Arc<MockProvider>,
    transcoder: Arc<CountingTranscoder>,
) -> (AppState, SqlitePool) {
    let pool = specdrafter_server::db::init_memory_pool()
        .await
        .expect("Failed to create in-memory database");
    let state = AppState::new(pool.clone(), provider, transcoder, test_settings());
    (state, pool)
}

/// Router over a fresh in-memory store
pub async fn create_test_app(
    provider: Arc<MockProvider>,
) -> (axum::Router, AppState, SqlitePool) {
    let (state, pool) = create_test_state(provider, Arc::new(CountingTranscoder::default())).await;
    let app = specdrafter_server::build_router(state.clone());
    (app, state, pool)
}

pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    String::from_utf8(body_bytes(response).await).unwrap()
}

/// JSON payloads of every `data:` line in an SSE body
pub fn sse_events(body: &str) -> Vec<Value> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| serde_json::from_str(data.trim()).unwrap())
        .collect()
}
