use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::services::memory::{Role, Turn};

// ===== REQUEST MODELS =====

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
    /// Accepted for compatibility; the endpoint decides streaming.
    #[serde(default)]
    pub stream: bool,
}

#[derive(Debug, Deserialize)]
pub struct StreamRequest {
    #[serde(default)]
    pub messages: Vec<SeedMessage>,
    pub prompt: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Client-supplied history used to seed a brand-new session.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedMessage {
    #[serde(default = "default_seed_role")]
    pub role: String,
    #[serde(default)]
    pub content: String,
}

fn default_seed_role() -> String {
    "user".to_string()
}

#[derive(Debug, Deserialize, Default)]
pub struct MessagesQuery {
    /// Non-positive or absent returns everything stored.
    pub limit: Option<i64>,
}

impl MessagesQuery {
    pub fn effective_limit(&self) -> Option<usize> {
        self.limit
            .filter(|l| *l > 0)
            .and_then(|l| usize::try_from(l).ok())
    }
}

// ===== RESPONSE MODELS =====

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub message: String,
    pub session_id: String,
    pub role: Role,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct SessionCreateResponse {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    pub messages: Vec<Turn>,
}

#[derive(Debug, Serialize)]
pub struct StatusMessage {
    pub message: String,
}

impl StatusMessage {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
