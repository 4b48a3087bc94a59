use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::{Stream, StreamExt};
use std::convert::Infallible;
use tracing::info;

use crate::models::chat::{ChatRequest, ChatResponse, StreamRequest};
use crate::services::memory::Role;
use crate::services::orchestrator::{PromptRequest, SessionMode, StreamEvent};
use crate::state::AppState;
use crate::utils::error::ApiError;

pub async fn chat_handler(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    info!(
        session_id = ?request.session_id,
        message_len = request.message.len(),
        "Chat request"
    );

    let prompt = PromptRequest::new(request.message, request.session_id, SessionMode::RequireExisting)
        .with_history_limit(state.settings.chat.history_limit);
    let reply = state.orchestrator.submit(prompt).await?;

    Ok(Json(ChatResponse {
        message: reply.message,
        session_id: reply.session_id,
        role: Role::Assistant,
        timestamp: reply.timestamp,
    }))
}

pub async fn chat_stream_handler(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    info!(
        session_id = ?request.session_id,
        message_len = request.message.len(),
        "Chat stream request"
    );

    let prompt = PromptRequest::new(request.message, request.session_id, SessionMode::RequireExisting)
        .with_history_limit(state.settings.chat.history_limit);
    let reply = state.orchestrator.submit_streaming(prompt)?;

    Ok(into_sse(reply.events))
}

pub async fn stream_handler(
    State(state): State<AppState>,
    Json(request): Json<StreamRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    info!(
        session_id = ?request.session_id,
        prompt_len = request.prompt.len(),
        seed_messages = request.messages.len(),
        "Stream request"
    );

    let prompt = PromptRequest::new(request.prompt, request.session_id, SessionMode::AutoCreate)
        .with_seed(request.messages);
    let reply = state.orchestrator.submit_streaming(prompt)?;

    Ok(into_sse(reply.events))
}

fn into_sse<S>(events: S) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
    S: Stream<Item = StreamEvent> + Send + 'static,
{
    let stream = events.map(|event| Ok(create_sse_event(event.name(), &event)));
    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn create_sse_event<T: serde::Serialize>(event_type: &str, data: &T) -> Event {
    Event::default()
        .event(event_type)
        .data(serde_json::to_string(data).unwrap_or_else(|_| "{}".to_string()))
}
