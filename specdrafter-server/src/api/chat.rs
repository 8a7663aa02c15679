//! Chat streaming endpoint
//!
//! `POST /projects/:id/chat` with `{"messages": [...]}`; the reply arrives as
//! server-sent events, one `data: {"type", "content"}` line per event.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::post,
    Json, Router,
};
use futures::stream::{Stream, StreamExt};
use serde::Deserialize;
use std::convert::Infallible;

use crate::services::ChatMessage;
use crate::{ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

/// POST /projects/:id/chat
pub async fn stream_chat(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let Json(request) = payload?;

    let turn = state.chat.start_turn(&project_id, request.messages).await?;

    // The relay task owns persistence; dropping the stream only stops delivery
    let events = turn.events.map(|event| {
        let data = serde_json::to_string(&event).unwrap_or_else(|e| {
            tracing::error!(event = event.event_type(), error = %e, "Failed to serialize chat event");
            r#"{"type":"error","content":"serialization failure"}"#.to_string()
        });
        Ok(Event::default().data(data))
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

pub fn chat_routes() -> Router<AppState> {
    Router::new().route("/projects/:id/chat", post(stream_chat))
}
