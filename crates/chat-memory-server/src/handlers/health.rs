use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct RootResponse {
    message: &'static str,
}

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    timestamp: DateTime<Utc>,
    version: String,
    active_sessions: usize,
    max_sessions: usize,
    max_turns_per_session: usize,
    memory_usage_mb: u64,
    memory_usage_percent: f64,
}

pub async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "AI Coding Agent API is running",
    })
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let stats = state.store.stats();

    let (memory_usage_mb, memory_usage_percent) = {
        let mut sys = state.system.lock();
        sys.refresh_memory();
        let total = sys.total_memory();
        let used = sys.used_memory();
        let percent = if total == 0 {
            0.0
        } else {
            (used as f64 / total as f64) * 100.0
        };
        (used / 1024 / 1024, percent)
    };

    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        active_sessions: stats.active_sessions,
        max_sessions: stats.max_sessions,
        max_turns_per_session: stats.max_turns_per_session,
        memory_usage_mb,
        memory_usage_percent,
    })
}

