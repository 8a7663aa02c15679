//! Audio bridge
//!
//! Transcription uploads the recording to the provider's file store, waits
//! for it to become active, and asks the model for a transcript. Speech
//! synthesis requests raw PCM from the provider and wraps it as WAV.
//!
//! Cleanup of local temp files and remote uploads is attempted on every path;
//! cleanup failures are logged and never returned.

use hound::{SampleFormat, WavSpec, WavWriter};
use std::io::{Cursor, Write};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempPath;
use thiserror::Error;

use super::prompts::TRANSCRIBE_PROMPT;
use super::transcoder::AudioTranscoder;
use crate::provider::{
    Content, FileData, FileState, GenerateRequest, GenerationOptions, GenerationProvider, Part,
    ProviderError, RemoteFile, TurnRole,
};

/// Containers the provider accepts without re-encoding
pub const SUPPORTED_MIME_TYPES: [&str; 5] = [
    "audio/wav",
    "audio/mp3",
    "audio/flac",
    "audio/aac",
    "audio/ogg",
];

/// Fixed encoding of synthesized speech
pub const TTS_SAMPLE_RATE: u32 = 24_000;
pub const TTS_CHANNELS: u16 = 1;
pub const TTS_BITS_PER_SAMPLE: u16 = 16;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Audio transcoding failed: {0}")]
    Transcode(String),

    #[error("WAV encoding failed: {0}")]
    Encode(#[from] hound::Error),

    #[error("Audio IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// `audio/webm;codecs=opus` -> `audio/webm`
pub fn mime_essence(mime_type: &str) -> String {
    mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

pub fn is_supported_mime(mime_type: &str) -> bool {
    SUPPORTED_MIME_TYPES.contains(&mime_essence(mime_type).as_str())
}

/// Wrap little-endian 16-bit mono PCM at 24 kHz in a WAV container
pub fn wrap_pcm_as_wav(pcm: &[u8]) -> Result<Vec<u8>, AudioError> {
    let spec = WavSpec {
        channels: TTS_CHANNELS,
        sample_rate: TTS_SAMPLE_RATE,
        bits_per_sample: TTS_BITS_PER_SAMPLE,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(pcm.len() + 44));
    {
        let mut writer = WavWriter::new(&mut cursor, spec)?;
        for pair in pcm.chunks_exact(2) {
            writer.write_sample(i16::from_le_bytes([pair[0], pair[1]]))?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

#[derive(Clone)]
pub struct AudioBridge {
    provider: Arc<dyn GenerationProvider>,
    transcoder: Arc<dyn AudioTranscoder>,
    model: String,
    tts_model: String,
    tts_voice: String,
    poll_interval: Duration,
}

impl AudioBridge {
    pub fn new(
        provider: Arc<dyn GenerationProvider>,
        transcoder: Arc<dyn AudioTranscoder>,
        model: impl Into<String>,
        tts_model: impl Into<String>,
        tts_voice: impl Into<String>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            provider,
            transcoder,
            model: model.into(),
            tts_model: tts_model.into(),
            tts_voice: tts_voice.into(),
            poll_interval,
        }
    }

    /// Transcript of `bytes`, declared as `mime_type`
    pub async fn transcribe(&self, bytes: Vec<u8>, mime_type: &str) -> Result<String, AudioError> {
        let mut temp_files = Vec::new();
        let result = self.transcribe_local(bytes, mime_type, &mut temp_files).await;

        for path in temp_files {
            let shown = path.display().to_string();
            if let Err(e) = path.close() {
                tracing::warn!(path = %shown, error = %e, "Failed to remove temp audio file");
            }
        }

        result
    }

    async fn transcribe_local(
        &self,
        bytes: Vec<u8>,
        mime_type: &str,
        temp_files: &mut Vec<TempPath>,
    ) -> Result<String, AudioError> {
        let essence = mime_essence(mime_type);
        let suffix = format!(".{}", essence.rsplit('/').next().unwrap_or("bin"));

        let mut source = tempfile::Builder::new()
            .prefix("specdrafter-")
            .suffix(&suffix)
            .tempfile()?;
        source.write_all(&bytes)?;
        source.flush()?;
        let source_path = source.into_temp_path();
        let source_buf = source_path.to_path_buf();
        temp_files.push(source_path);

        let (upload_bytes, upload_mime) = if is_supported_mime(&essence) {
            (bytes, essence)
        } else {
            tracing::info!(mime_type, "Unsupported audio format, converting to WAV");

            let dest_path = tempfile::Builder::new()
                .prefix("specdrafter-")
                .suffix(".wav")
                .tempfile()?
                .into_temp_path();
            let dest_buf = dest_path.to_path_buf();
            temp_files.push(dest_path);

            let transcoder = Arc::clone(&self.transcoder);
            let target = dest_buf.clone();
            tokio::task::spawn_blocking(move || transcoder.transcode_to_wav(&source_buf, &target))
                .await
                .map_err(|e| AudioError::Transcode(e.to_string()))?
                .map_err(|e| AudioError::Transcode(format!("{:#}", e)))?;

            (tokio::fs::read(&dest_buf).await?, "audio/wav".to_string())
        };

        let file = self.provider.upload_file(upload_bytes, &upload_mime).await?;
        let result = self.transcribe_remote(file.clone()).await;

        if let Err(e) = self.provider.delete_file(&file.name).await {
            tracing::warn!(file = %file.name, error = %e, "Failed to delete uploaded audio");
        }

        result.map_err(AudioError::from)
    }

    async fn transcribe_remote(&self, file: RemoteFile) -> Result<String, ProviderError> {
        let file = self.wait_until_active(file).await?;

        let content = Content {
            role: TurnRole::User,
            parts: vec![
                Part::Text(TRANSCRIBE_PROMPT.to_string()),
                Part::FileData(FileData {
                    mime_type: file.mime_type.clone(),
                    file_uri: file.uri.clone(),
                }),
            ],
        };
        let response = self
            .provider
            .generate(GenerateRequest::new(self.model.clone(), vec![content]))
            .await?;

        tracing::debug!(chars = response.text.len(), "Transcription complete");
        Ok(response.text.trim().to_string())
    }

    /// Poll until ACTIVE; FAILED and unknown states end the wait with an error
    async fn wait_until_active(&self, mut file: RemoteFile) -> Result<RemoteFile, ProviderError> {
        loop {
            match file.state {
                FileState::Active => return Ok(file),
                FileState::Processing => {
                    tokio::time::sleep(self.poll_interval).await;
                    file = self.provider.get_file(&file.name).await?;
                }
                FileState::Failed => {
                    let detail = file
                        .error
                        .map(|e| e.message)
                        .unwrap_or_else(|| "no details".to_string());
                    return Err(ProviderError::FileProcessing(detail));
                }
                FileState::StateUnspecified => {
                    return Err(ProviderError::FileProcessing(format!(
                        "{} has no processing state",
                        file.name
                    )));
                }
            }
        }
    }

    /// WAV bytes speaking `text`
    pub async fn synthesize(&self, text: &str) -> Result<Vec<u8>, AudioError> {
        let request = GenerateRequest {
            model: self.tts_model.clone(),
            system_instruction: None,
            contents: vec![Content::user_text(text)],
            options: GenerationOptions {
                include_thoughts: false,
                speech_voice: Some(self.tts_voice.clone()),
            },
        };

        let response = self.provider.generate(request).await?;
        let pcm = response
            .inline_data
            .filter(|data| !data.is_empty())
            .ok_or_else(|| ProviderError::MissingPayload("no audio content received".to_string()))?;

        tracing::debug!(pcm_bytes = pcm.len(), "Received synthesized speech");
        wrap_pcm_as_wav(&pcm)
    }
}
