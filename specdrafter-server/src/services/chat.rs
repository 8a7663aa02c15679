//! Chat orchestrator
//!
//! One chat turn runs: receive → persist user turn → stream generate →
//! scan and relay → persist assistant turn → maybe advance phase.
//!
//! Everything up to the start of the provider stream happens before the
//! caller gets a response, so failures there are ordinary HTTP errors. The
//! rest runs in a spawned task that relays [`ChatEvent`]s over a channel in
//! strict arrival order.

use base64::Engine;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use specdrafter_common::models::AUDIO_PLACEHOLDER;
use specdrafter_common::{ChatEvent, ConversationEntry, PhaseAdvance};
use sqlx::SqlitePool;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;

use super::audio::AudioBridge;
use super::gateway::{Gateway, GenerationMode, Instruction};
use super::prompts;
use super::token_scanner::{ControlTokenScanner, ScanOutput};
use crate::db::projects;
use crate::error::{ApiError, ApiResult};
use crate::provider::{Content, FragmentStream, Part, TurnRole};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Declared type of voice input when the client omits one
pub const DEFAULT_AUDIO_MIME_TYPE: &str = "audio/webm";

/// One message of the client-held conversation
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    /// `{"audio": <base64>, "mimeType": ...}` for voice turns
    #[serde(default)]
    pub data: Option<Value>,
}

impl ChatMessage {
    fn text(&self) -> Option<&str> {
        self.content.as_deref().filter(|c| !c.trim().is_empty())
    }

    fn turn_role(&self) -> TurnRole {
        match self.role.as_deref() {
            Some("user") => TurnRole::User,
            _ => TurnRole::Model,
        }
    }
}

/// Decoded voice input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioInput {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// Pull and decode the audio payload of a message, if any
pub fn extract_audio(data: Option<&Value>) -> ApiResult<Option<AudioInput>> {
    let Some(audio) = data.and_then(|d| d.get("audio")) else {
        return Ok(None);
    };

    let encoded = audio
        .as_str()
        .ok_or_else(|| ApiError::BadRequest("Audio payload must be a base64 string".to_string()))?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| ApiError::BadRequest(format!("Invalid base64 audio: {}", e)))?;

    let mime_type = data
        .and_then(|d| d.get("mimeType"))
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_AUDIO_MIME_TYPE)
        .to_string();

    Ok(Some(AudioInput { bytes, mime_type }))
}

/// Final parts of the new user turn
pub fn compose_turn_parts(text: Option<&str>, transcript: Option<&str>, phase: &str) -> Vec<Part> {
    let mut parts = Vec::with_capacity(3);
    if let Some(text) = text {
        parts.push(Part::Text(text.to_string()));
    }
    if let Some(transcript) = transcript.filter(|t| !t.is_empty()) {
        parts.push(Part::Text(prompts::transcript_part(transcript)));
    }
    parts.push(Part::Text(prompts::phase_annotation(phase)));
    parts
}

/// Prior messages as provider turns
pub fn history_turns(previous: &[ChatMessage]) -> Vec<Content> {
    previous
        .iter()
        .map(|message| Content {
            role: message.turn_role(),
            parts: vec![Part::Text(
                message.content.clone().unwrap_or_else(|| AUDIO_PLACEHOLDER.to_string()),
            )],
        })
        .collect()
}

/// What a finished turn did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnOutcome {
    /// Persisted assistant reply, if any
    pub reply: Option<String>,
    pub phase: Option<PhaseAdvance>,
    /// Name from a rename token in the reply; recognized but not applied
    pub rename_request: Option<String>,
    /// Provider or store failure after streaming started
    pub error: Option<String>,
    /// Client went away before the stream ended
    pub disconnected: bool,
}

/// A turn in flight
pub struct ChatTurn {
    pub events: ReceiverStream<ChatEvent>,
    pub handle: JoinHandle<TurnOutcome>,
}

#[derive(Clone)]
pub struct ChatOrchestrator {
    db: SqlitePool,
    gateway: Gateway,
    audio: AudioBridge,
}

impl ChatOrchestrator {
    pub fn new(db: SqlitePool, gateway: Gateway, audio: AudioBridge) -> Self {
        Self { db, gateway, audio }
    }

    /// Validate, persist and start generating; events follow on the returned stream
    pub async fn start_turn(&self, project_id: &str, messages: Vec<ChatMessage>) -> ApiResult<ChatTurn> {
        let Some((last, previous)) = messages.split_last() else {
            return Err(ApiError::BadRequest("No messages provided".to_string()));
        };

        let project = projects::get_project(&self.db, project_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Project {}", project_id)))?;

        let audio = extract_audio(last.data.as_ref())?;
        let text = last.text();
        if text.is_none() && audio.is_none() {
            return Err(ApiError::BadRequest("Message content is missing".to_string()));
        }

        let user_entry =
            ConversationEntry::user(text.unwrap_or(AUDIO_PLACEHOLDER), last.data.clone());
        projects::append_entry(&self.db, project_id, &user_entry).await?;
        tracing::info!(project_id, audio = audio.is_some(), "Persisted user turn");

        let transcript = match audio {
            Some(input) => Some(self.audio.transcribe(input.bytes, &input.mime_type).await?),
            None => None,
        };

        let mut turns = history_turns(previous);
        turns.push(Content {
            role: TurnRole::User,
            parts: compose_turn_parts(
                text,
                transcript.as_deref(),
                project.current_phase.as_str(),
            ),
        });

        let instruction =
            Instruction::primed(prompts::CHAT_INSTRUCTION, prompts::CHAT_ACKNOWLEDGEMENT);
        let fragments = self
            .gateway
            .generate(&instruction, turns, GenerationMode::Thinking)
            .await?;

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let handle = tokio::spawn(relay_turn(
            self.db.clone(),
            project_id.to_string(),
            fragments,
            tx,
        ));

        Ok(ChatTurn {
            events: ReceiverStream::new(rx),
            handle,
        })
    }
}

/// Scan and relay fragments, then persist and advance
///
/// `tx` lives until the store writes finish, so the event stream ends only
/// once the reply and phase are committed.
async fn relay_turn(
    db: SqlitePool,
    project_id: String,
    mut fragments: FragmentStream,
    tx: mpsc::Sender<ChatEvent>,
) -> TurnOutcome {
    let mut outcome = TurnOutcome::default();
    let mut scanner = ControlTokenScanner::new(prompts::PHASE_COMPLETE_TOKEN);
    let mut reply = String::new();
    let mut thoughts = String::new();
    let mut phase_complete = false;

    'stream: while let Some(item) = fragments.next().await {
        let fragment = match item {
            Ok(fragment) => fragment,
            Err(e) => {
                tracing::error!(project_id = %project_id, error = %e, "Generation failed mid-stream");
                let _ = tx.send(ChatEvent::Error(e.to_string())).await;
                outcome.error = Some(e.to_string());
                return outcome;
            }
        };

        if fragment.thought {
            thoughts.push_str(&fragment.text);
            if tx.send(ChatEvent::Thought(fragment.text)).await.is_err() {
                outcome.disconnected = true;
                break;
            }
            continue;
        }

        for output in scanner.push(&fragment.text) {
            let event = match output {
                ScanOutput::Text(text) => {
                    reply.push_str(&text);
                    ChatEvent::Text(text)
                }
                ScanOutput::Token if phase_complete => continue,
                ScanOutput::Token => {
                    tracing::info!(project_id = %project_id, "Phase complete signal received");
                    phase_complete = true;
                    ChatEvent::PhaseComplete
                }
            };
            if tx.send(event).await.is_err() {
                outcome.disconnected = true;
                break 'stream;
            }
        }
    }

    if let Some(tail) = scanner.finish() {
        reply.push_str(&tail);
        if !outcome.disconnected && tx.send(ChatEvent::Text(tail)).await.is_err() {
            outcome.disconnected = true;
        }
    }

    if outcome.disconnected {
        tracing::info!(project_id = %project_id, "Client disconnected; keeping partial reply");
    }

    let reply = reply.trim();
    if !reply.is_empty() {
        outcome.rename_request = prompts::parse_rename_request(reply);
        if let Some(name) = &outcome.rename_request {
            tracing::warn!(project_id = %project_id, name = %name, "Rename requested by model; not applied");
        }

        let thoughts = thoughts.trim();
        let data = (!thoughts.is_empty()).then(|| json!({ "thoughts": thoughts }));
        let entry = ConversationEntry::assistant(reply, data);

        if let Err(e) = projects::append_entry(&db, &project_id, &entry).await {
            tracing::error!(project_id = %project_id, error = %e, "Failed to persist assistant turn");
            let _ = tx.send(ChatEvent::Error(e.to_string())).await;
            outcome.error = Some(e.to_string());
            return outcome;
        }
        outcome.reply = Some(reply.to_string());
    } else {
        tracing::info!(project_id = %project_id, "No visible reply text; nothing persisted");
    }

    if phase_complete {
        match projects::advance_phase(&db, &project_id).await {
            Ok(advance) => outcome.phase = Some(advance),
            Err(e) => {
                tracing::error!(project_id = %project_id, error = %e, "Failed to advance phase");
                let _ = tx.send(ChatEvent::Error(e.to_string())).await;
                outcome.error = Some(e.to_string());
            }
        }
    }

    outcome
}
