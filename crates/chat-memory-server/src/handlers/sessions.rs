use axum::{
    extract::{Path, Query, State},
    Json,
};
use std::sync::Arc;
use tracing::info;

use crate::models::chat::{MessagesQuery, MessagesResponse, SessionCreateResponse, StatusMessage};
use crate::services::memory::{SessionStore, SessionSummary};
use crate::utils::error::ApiError;

pub async fn create_session(
    State(store): State<Arc<SessionStore>>,
) -> Result<Json<SessionCreateResponse>, ApiError> {
    let summary = store.create_session()?;
    info!(session_id = %summary.session_id, "Session created");

    Ok(Json(SessionCreateResponse {
        session_id: summary.session_id,
        created_at: summary.created_at,
    }))
}

pub async fn get_session(
    State(store): State<Arc<SessionStore>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionSummary>, ApiError> {
    store
        .session_summary(&session_id)
        .map(Json)
        .ok_or_else(ApiError::session_not_found)
}

pub async fn get_messages(
    State(store): State<Arc<SessionStore>>,
    Path(session_id): Path<String>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<MessagesResponse>, ApiError> {
    // An empty history and an unknown session look alike through recent_turns
    if store.get_session(&session_id).is_none() {
        return Err(ApiError::session_not_found());
    }

    let messages = store.recent_turns(&session_id, query.effective_limit());
    Ok(Json(MessagesResponse { messages }))
}

pub async fn clear_messages(
    State(store): State<Arc<SessionStore>>,
    Path(session_id): Path<String>,
) -> Result<Json<StatusMessage>, ApiError> {
    if !store.clear_turns(&session_id) {
        return Err(ApiError::session_not_found());
    }

    info!(%session_id, "Session history cleared");
    Ok(Json(StatusMessage::new("Session history cleared")))
}

pub async fn delete_session(
    State(store): State<Arc<SessionStore>>,
    Path(session_id): Path<String>,
) -> Result<Json<StatusMessage>, ApiError> {
    if !store.delete_session(&session_id) {
        return Err(ApiError::session_not_found());
    }

    info!(%session_id, "Session deleted");
    Ok(Json(StatusMessage::new("Session deleted successfully")))
}
