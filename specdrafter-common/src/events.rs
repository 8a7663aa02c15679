//! Chat stream events
//!
//! Each event is sent to the client as one SSE `data:` line carrying
//! `{"type": ..., "content": ...}`.

use serde::{Deserialize, Serialize};

/// Event relayed to the client while an assistant reply is generated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "snake_case")]
pub enum ChatEvent {
    /// Visible reply text, control tokens removed
    Text(String),
    /// Internal reasoning fragment; never part of the stored reply
    Thought(String),
    /// The current phase was judged complete; sent at most once per turn
    PhaseComplete,
    /// Generation or persistence failed after the stream started; always the
    /// last event
    Error(String),
}

impl ChatEvent {
    /// Event type name as it appears on the wire
    pub fn event_type(&self) -> &'static str {
        match self {
            ChatEvent::Text(_) => "text",
            ChatEvent::Thought(_) => "thought",
            ChatEvent::PhaseComplete => "phase_complete",
            ChatEvent::Error(_) => "error",
        }
    }
}
