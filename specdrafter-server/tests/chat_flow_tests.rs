//! Chat turn lifecycle tests
//!
//! Drive [`ChatOrchestrator`] directly where the persisted outcome matters
//! and the HTTP endpoint where the SSE wire shape matters.

mod helpers;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::http::StatusCode;
use futures::StreamExt;
use serde_json::json;
use tower::util::ServiceExt;

use helpers::{
    body_json, body_text, create_test_app, create_test_state, json_request, sse_events,
    CountingTranscoder, MockProvider, Script,
};
use specdrafter_common::{ChatEvent, Phase, PhaseAdvance, Project, Role};
use specdrafter_server::db::projects;
use specdrafter_server::provider::{Part, TurnRole};
use specdrafter_server::services::{ChatMessage, ChatTurn, TurnOutcome};
use specdrafter_server::{ApiError, AppState};

async fn seeded_project(state: &AppState, phase: Phase) -> Project {
    let mut project = Project::new();
    project.current_phase = phase;
    project
        .conversation_history
        .push(specdrafter_common::ConversationEntry::assistant("Welcome", None));
    projects::create_project(&state.db, &project).await.unwrap();
    project
}

fn user_message(text: &str) -> ChatMessage {
    ChatMessage {
        role: Some("user".to_string()),
        content: Some(text.to_string()),
        data: None,
    }
}

fn conversation(text: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage {
            role: Some("assistant".to_string()),
            content: Some("Welcome".to_string()),
            data: None,
        },
        user_message(text),
    ]
}

async fn run_turn(turn: ChatTurn) -> (Vec<ChatEvent>, TurnOutcome) {
    let events: Vec<ChatEvent> = turn.events.collect().await;
    let outcome = turn.handle.await.unwrap();
    (events, outcome)
}

async fn reload(state: &AppState, id: &str) -> Project {
    projects::get_project(&state.db, id).await.unwrap().unwrap()
}

async fn test_state(provider: Arc<MockProvider>) -> AppState {
    create_test_state(provider, Arc::new(CountingTranscoder::default()))
        .await
        .0
}

// =============================================================================
// Token handling and phase advance
// =============================================================================

#[tokio::test]
async fn test_split_token_stripped_and_phase_advanced() {
    let provider = MockProvider::new();
    provider.script_stream(vec![
        Script::Thought("The foundation looks complete."),
        Script::Text("Great, we have the basics. [PHASE_"),
        Script::Text("COMPLETE] Next, let's talk features."),
    ]);
    let state = test_state(provider.clone()).await;
    let project = seeded_project(&state, Phase::Foundation).await;

    let turn = state
        .chat
        .start_turn(&project.id, conversation("A recipe sharing app"))
        .await
        .unwrap();
    let (events, outcome) = run_turn(turn).await;

    let phase_events = events
        .iter()
        .filter(|e| matches!(e, ChatEvent::PhaseComplete))
        .count();
    assert_eq!(phase_events, 1);

    let relayed: String = events
        .iter()
        .filter_map(|e| match e {
            ChatEvent::Text(t) => Some(t.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(relayed, "Great, we have the basics.  Next, let's talk features.");
    assert!(!relayed.contains("PHASE_COMPLETE"));
    assert_eq!(
        events[0],
        ChatEvent::Thought("The foundation looks complete.".to_string())
    );

    assert_eq!(
        outcome.phase,
        Some(PhaseAdvance::Advanced {
            from: Phase::Foundation,
            to: Phase::Features
        })
    );

    let stored = reload(&state, &project.id).await;
    assert_eq!(stored.current_phase, Phase::Features);
    assert_eq!(stored.conversation_history.len(), 3);

    let user = &stored.conversation_history[1];
    assert_eq!(user.role, Role::User);
    assert_eq!(user.content, "A recipe sharing app");

    let reply = &stored.conversation_history[2];
    assert_eq!(reply.role, Role::Assistant);
    assert_eq!(
        reply.content,
        "Great, we have the basics.  Next, let's talk features."
    );
    assert_eq!(
        reply.data,
        Some(json!({"thoughts": "The foundation looks complete."}))
    );
}

#[tokio::test]
async fn test_repeated_token_emits_single_event() {
    let provider = MockProvider::new();
    provider.script_stream(vec![Script::Text(
        "[PHASE_COMPLETE]Done.[PHASE_COMPLETE]",
    )]);
    let state = test_state(provider).await;
    let project = seeded_project(&state, Phase::TechnicalContext).await;

    let turn = state
        .chat
        .start_turn(&project.id, conversation("That's all"))
        .await
        .unwrap();
    let (events, outcome) = run_turn(turn).await;

    assert_eq!(
        events,
        vec![ChatEvent::PhaseComplete, ChatEvent::Text("Done.".to_string())]
    );
    assert_eq!(outcome.reply.as_deref(), Some("Done."));
    assert_eq!(reload(&state, &project.id).await.current_phase, Phase::Completed);
}

#[tokio::test]
async fn test_no_token_keeps_phase() {
    let provider = MockProvider::new();
    provider.script_stream(vec![Script::Text("Who are the users?")]);
    let state = test_state(provider).await;
    let project = seeded_project(&state, Phase::Foundation).await;

    let turn = state
        .chat
        .start_turn(&project.id, conversation("An app"))
        .await
        .unwrap();
    let (events, outcome) = run_turn(turn).await;

    assert!(!events.iter().any(|e| matches!(e, ChatEvent::PhaseComplete)));
    assert_eq!(outcome.phase, None);

    let stored = reload(&state, &project.id).await;
    assert_eq!(stored.current_phase, Phase::Foundation);
    assert_eq!(stored.conversation_history.len(), 3);
    assert_eq!(stored.conversation_history[2].data, None);
}

#[tokio::test]
async fn test_token_in_completed_phase_is_noop() {
    let provider = MockProvider::new();
    provider.script_stream(vec![Script::Text("All wrapped up. [PHASE_COMPLETE]")]);
    let state = test_state(provider).await;
    let project = seeded_project(&state, Phase::Completed).await;

    let turn = state
        .chat
        .start_turn(&project.id, conversation("Anything else?"))
        .await
        .unwrap();
    let (_, outcome) = run_turn(turn).await;

    assert_eq!(outcome.phase, Some(PhaseAdvance::AlreadyCompleted));
    assert_eq!(reload(&state, &project.id).await.current_phase, Phase::Completed);
}

// =============================================================================
// Prompt assembly
// =============================================================================

#[tokio::test]
async fn test_prompt_carries_history_and_phase_annotation() {
    let provider = MockProvider::new();
    let state = test_state(provider.clone()).await;
    let project = seeded_project(&state, Phase::FunctionalRequirements).await;

    let turn = state
        .chat
        .start_turn(&project.id, conversation("Users log in with email"))
        .await
        .unwrap();
    run_turn(turn).await;

    let request = provider.last_stream_request();
    assert!(request.options.include_thoughts);

    // Primed instruction pair, one prior turn, then the new turn
    assert_eq!(request.contents.len(), 4);
    assert_eq!(request.contents[1].role, TurnRole::Model);
    assert_eq!(request.contents[2].role, TurnRole::Model);

    let new_turn = &request.contents[3];
    assert_eq!(new_turn.role, TurnRole::User);
    assert_eq!(
        new_turn.parts[0],
        Part::Text("Users log in with email".to_string())
    );
    let Part::Text(annotation) = &new_turn.parts[1] else {
        panic!("annotation should be text");
    };
    assert!(annotation.contains("Functional Requirements"));
}

// =============================================================================
// Empty and failed generations
// =============================================================================

#[tokio::test]
async fn test_thought_only_reply_persists_nothing() {
    let provider = MockProvider::new();
    provider.script_stream(vec![Script::Thought("thinking..."), Script::Text("   ")]);
    let state = test_state(provider).await;
    let project = seeded_project(&state, Phase::Foundation).await;

    let turn = state
        .chat
        .start_turn(&project.id, conversation("Hello"))
        .await
        .unwrap();
    let (_, outcome) = run_turn(turn).await;

    assert_eq!(outcome.reply, None);
    assert_eq!(outcome.error, None);

    let stored = reload(&state, &project.id).await;
    assert_eq!(stored.conversation_history.len(), 2);
    assert_eq!(stored.conversation_history[1].role, Role::User);
}

#[tokio::test]
async fn test_mid_stream_failure_keeps_user_turn() {
    let provider = MockProvider::new();
    provider.script_stream(vec![
        Script::Text("Let me think"),
        Script::Fail("connection reset"),
        Script::Text("never delivered"),
    ]);
    let state = test_state(provider).await;
    let project = seeded_project(&state, Phase::Foundation).await;

    let turn = state
        .chat
        .start_turn(&project.id, conversation("Hello"))
        .await
        .unwrap();
    let (events, outcome) = run_turn(turn).await;

    assert!(matches!(events.last(), Some(ChatEvent::Error(_))));
    assert!(!events
        .iter()
        .any(|e| matches!(e, ChatEvent::Text(t) if t.contains("never"))));
    assert!(outcome.error.is_some());
    assert_eq!(outcome.reply, None);

    let stored = reload(&state, &project.id).await;
    assert_eq!(stored.conversation_history.len(), 2);
    assert_eq!(stored.conversation_history[1].content, "Hello");
}

#[tokio::test]
async fn test_stream_start_failure_keeps_user_turn() {
    let provider = MockProvider::new();
    provider.fail_stream_start.store(true, Ordering::SeqCst);
    let state = test_state(provider).await;
    let project = seeded_project(&state, Phase::Foundation).await;

    let result = state
        .chat
        .start_turn(&project.id, conversation("Hello"))
        .await;
    assert!(matches!(result, Err(ApiError::Provider(_))));

    let stored = reload(&state, &project.id).await;
    assert_eq!(stored.conversation_history.len(), 2);
    assert_eq!(stored.current_phase, Phase::Foundation);
}

#[tokio::test]
async fn test_disconnect_persists_partial_reply() {
    let provider = MockProvider::new();
    provider.script_stream(vec![
        Script::Text("Partial answer "),
        Script::Text("that nobody reads"),
    ]);
    let state = test_state(provider).await;
    let project = seeded_project(&state, Phase::Foundation).await;

    let ChatTurn { events, handle } = state
        .chat
        .start_turn(&project.id, conversation("Hello"))
        .await
        .unwrap();
    drop(events);
    let outcome = handle.await.unwrap();

    assert!(outcome.disconnected);
    assert_eq!(outcome.reply.as_deref(), Some("Partial answer"));

    let stored = reload(&state, &project.id).await;
    assert_eq!(stored.conversation_history.len(), 3);
    assert_eq!(stored.conversation_history[2].content, "Partial answer");
}

// =============================================================================
// Input validation
// =============================================================================

#[tokio::test]
async fn test_rejected_inputs_persist_nothing() {
    let provider = MockProvider::new();
    let state = test_state(provider.clone()).await;
    let project = seeded_project(&state, Phase::Foundation).await;

    let empty = state.chat.start_turn(&project.id, Vec::new()).await;
    assert!(matches!(empty, Err(ApiError::BadRequest(_))));

    let blank = state
        .chat
        .start_turn(&project.id, vec![user_message("   ")])
        .await;
    assert!(matches!(blank, Err(ApiError::BadRequest(_))));

    let missing = state
        .chat
        .start_turn("no-such-project", conversation("Hello"))
        .await;
    assert!(matches!(missing, Err(ApiError::NotFound(_))));

    assert_eq!(provider.stream_call_count(), 0);
    assert_eq!(reload(&state, &project.id).await.conversation_history.len(), 1);
}

// =============================================================================
// Voice input
// =============================================================================

#[tokio::test]
async fn test_audio_only_turn_stores_placeholder() {
    let provider = MockProvider::new();
    provider.script_generate("I want a todo app", None);
    provider.script_stream(vec![Script::Text("A todo app, got it.")]);
    let transcoder = Arc::new(CountingTranscoder::default());
    let (state, _) = create_test_state(provider.clone(), transcoder.clone()).await;
    let project = seeded_project(&state, Phase::Foundation).await;

    let data = json!({"audio": "GkXfo0AgQoaBAQ==", "mimeType": "audio/webm;codecs=opus"});
    let messages = vec![ChatMessage {
        role: Some("user".to_string()),
        content: None,
        data: Some(data.clone()),
    }];

    let turn = state.chat.start_turn(&project.id, messages).await.unwrap();
    run_turn(turn).await;

    assert_eq!(transcoder.calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        *provider.uploaded_mime_types.lock().unwrap(),
        vec!["audio/wav".to_string()]
    );
    assert_eq!(provider.deleted_files.lock().unwrap().len(), 1);

    let stored = reload(&state, &project.id).await;
    let user = &stored.conversation_history[1];
    assert_eq!(user.content, "[audio input]");
    assert_eq!(user.data, Some(data));

    let request = provider.last_stream_request();
    let new_turn = request.contents.last().unwrap();
    assert_eq!(
        new_turn.parts[0],
        Part::Text("\n\n[USER'S VOICE TRANSCRIPT]: I want a todo app".to_string())
    );
}

#[tokio::test]
async fn test_invalid_audio_payload_rejected() {
    let provider = MockProvider::new();
    let state = test_state(provider.clone()).await;
    let project = seeded_project(&state, Phase::Foundation).await;

    let messages = vec![ChatMessage {
        role: Some("user".to_string()),
        content: None,
        data: Some(json!({"audio": "%%%"})),
    }];
    let result = state.chat.start_turn(&project.id, messages).await;

    assert!(matches!(result, Err(ApiError::BadRequest(_))));
    assert_eq!(reload(&state, &project.id).await.conversation_history.len(), 1);
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test]
async fn test_concurrent_turns_both_append() {
    let provider = MockProvider::new();
    provider.script_stream(vec![Script::Text("First reply")]);
    provider.script_stream(vec![Script::Text("Second reply")]);
    let state = test_state(provider).await;
    let project = seeded_project(&state, Phase::Foundation).await;

    let (a, b) = tokio::join!(
        state.chat.start_turn(&project.id, conversation("one")),
        state.chat.start_turn(&project.id, conversation("two")),
    );
    let (a, b) = tokio::join!(run_turn(a.unwrap()), run_turn(b.unwrap()));
    assert!(a.1.reply.is_some());
    assert!(b.1.reply.is_some());

    let stored = reload(&state, &project.id).await;
    assert_eq!(stored.conversation_history.len(), 5);

    let users: Vec<&str> = stored
        .conversation_history
        .iter()
        .filter(|e| e.role == Role::User)
        .map(|e| e.content.as_str())
        .collect();
    assert_eq!(users.len(), 2);
    assert!(users.contains(&"one"));
    assert!(users.contains(&"two"));
}

// =============================================================================
// HTTP wire format
// =============================================================================

#[tokio::test]
async fn test_chat_endpoint_streams_sse() {
    let provider = MockProvider::new();
    provider.script_stream(vec![
        Script::Thought("ok"),
        Script::Text("Sounds good.[PHASE_COMPLETE]"),
    ]);
    let (app, state, _) = create_test_app(provider).await;
    let project = seeded_project(&state, Phase::Foundation).await;

    let response = app
        .oneshot(json_request(
            "POST",
            &format!("/projects/{}/chat", project.id),
            json!({"messages": [
                {"role": "assistant", "content": "Welcome"},
                {"role": "user", "content": "A chess club site"}
            ]}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let events = sse_events(&body_text(response).await);
    assert_eq!(
        events,
        vec![
            json!({"type": "thought", "content": "ok"}),
            json!({"type": "text", "content": "Sounds good."}),
            json!({"type": "phase_complete"}),
        ]
    );
}

#[tokio::test]
async fn test_stream_end_implies_turn_committed() {
    let provider = MockProvider::new();
    provider.script_stream(vec![
        Script::Thought("foundation covered"),
        Script::Text("Sounds good.[PHASE_COMPLETE]"),
    ]);
    let (app, state, _) = create_test_app(provider).await;
    let project = seeded_project(&state, Phase::Foundation).await;

    let response = app
        .oneshot(json_request(
            "POST",
            &format!("/projects/{}/chat", project.id),
            json!({"messages": [
                {"role": "assistant", "content": "Welcome"},
                {"role": "user", "content": "A chess club site"}
            ]}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_text(response).await;

    // Reload as a client would right after the stream closes
    let stored = reload(&state, &project.id).await;
    assert_eq!(stored.conversation_history.len(), 3);
    assert_eq!(stored.conversation_history[2].content, "Sounds good.");
    assert_eq!(stored.current_phase, Phase::Features);
}

#[tokio::test]
async fn test_chat_endpoint_errors_before_stream() {
    let (app, _, _) = create_test_app(MockProvider::new()).await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/projects/missing/chat",
            json!({"messages": [{"role": "user", "content": "Hi"}]}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .oneshot(json_request(
            "POST",
            "/projects/missing/chat",
            json!({"messages": []}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"]["code"], "BAD_REQUEST");
}
