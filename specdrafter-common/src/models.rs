//! Domain model
//!
//! A [`Project`] owns an append-only conversation log. The JSON shape matches
//! what the web client consumes (`_id`, `createdAt`, `updatedAt`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::phase::Phase;

/// Name given to freshly created projects
pub const DEFAULT_PROJECT_NAME: &str = "New Project";

/// Placeholder stored for turns that carry audio but no typed text
pub const AUDIO_PLACEHOLDER: &str = "[audio input]";

/// Speaker of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// Capitalised label used when rendering transcripts
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(crate::Error::Internal(format!("Unknown role: {}", other))),
        }
    }
}

/// One turn in a project's conversation log
///
/// Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub role: Role,
    pub content: String,
    /// Side-channel payload: raw audio for user turns, `thoughts` for
    /// assistant turns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

impl ConversationEntry {
    pub fn new(role: Role, content: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            role,
            content: content.into(),
            data,
            timestamp: crate::time::now(),
        }
    }

    pub fn user(content: impl Into<String>, data: Option<Value>) -> Self {
        Self::new(Role::User, content, data)
    }

    pub fn assistant(content: impl Into<String>, data: Option<Value>) -> Self {
        Self::new(Role::Assistant, content, data)
    }
}

/// A requirements-gathering project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub description: String,
    pub conversation_history: Vec<ConversationEntry>,
    pub current_phase: Phase,
    /// Derived artifacts; `content` holds the current requirements document
    pub requirements: Map<String, Value>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// New project in the Foundation phase with an empty log
    pub fn new() -> Self {
        let now = crate::time::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: DEFAULT_PROJECT_NAME.to_string(),
            description: String::new(),
            conversation_history: Vec::new(),
            current_phase: Phase::Foundation,
            requirements: Map::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Current requirements document text, empty when none has been saved
    pub fn requirements_content(&self) -> &str {
        self.requirements
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or("")
    }
}

impl Default for Project {
    fn default() -> Self {
        Self::new()
    }
}

/// Partial update accepted by `PATCH /projects/{id}`
///
/// The phase is deliberately absent: it only moves through the state machine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub requirements: Option<Map<String, Value>>,
}

impl ProjectUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.requirements.is_none()
    }
}
