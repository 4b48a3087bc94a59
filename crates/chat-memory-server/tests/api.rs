use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use chat_memory_server::build_router;
use chat_memory_server::config::{MemoryConfig, Settings};
use chat_memory_server::services::conversation::ProviderMessage;
use chat_memory_server::services::generator::{GenerationError, TextGenerator, TextStream};
use chat_memory_server::services::memory::SessionStore;
use chat_memory_server::services::orchestrator::ChatOrchestrator;
use chat_memory_server::state::AppState;

/// Answers "echo: <prompt>" word by word and remembers every context it was given.
#[derive(Default)]
struct EchoGenerator {
    contexts: Mutex<Vec<Vec<ProviderMessage>>>,
}

#[async_trait]
impl TextGenerator for EchoGenerator {
    async fn generate(
        &self,
        prompt: &str,
        context: &[ProviderMessage],
    ) -> Result<String, GenerationError> {
        self.contexts.lock().push(context.to_vec());
        Ok(format!("echo: {}", prompt))
    }

    async fn generate_stream(
        &self,
        prompt: &str,
        context: &[ProviderMessage],
    ) -> Result<TextStream, GenerationError> {
        self.contexts.lock().push(context.to_vec());
        let pieces: Vec<Result<String, GenerationError>> = format!("echo: {}", prompt)
            .split_inclusive(' ')
            .map(|p| Ok(p.to_string()))
            .collect();
        Ok(Box::pin(futures::stream::iter(pieces)))
    }
}

struct BrokenGenerator;

#[async_trait]
impl TextGenerator for BrokenGenerator {
    async fn generate(&self, _: &str, _: &[ProviderMessage]) -> Result<String, GenerationError> {
        Err(GenerationError::Provider {
            status: 503,
            body: "overloaded".to_string(),
        })
    }

    async fn generate_stream(
        &self,
        _: &str,
        _: &[ProviderMessage],
    ) -> Result<TextStream, GenerationError> {
        Err(GenerationError::Transport("connection refused".to_string()))
    }
}

struct TestApp {
    router: Router,
    store: Arc<SessionStore>,
}

fn app_with(generator: Arc<dyn TextGenerator>, memory: MemoryConfig) -> TestApp {
    let settings = Settings {
        memory,
        ..Settings::default()
    };
    let store = Arc::new(SessionStore::new(&settings.memory));
    let orchestrator = Arc::new(ChatOrchestrator::new(
        store.clone(),
        generator,
        Duration::from_secs(5),
        settings.chat.stream_buffer,
    ));
    let router = build_router(AppState::new(orchestrator, settings.clone()), &settings.server);
    TestApp { router, store }
}

fn app(generator: Arc<dyn TextGenerator>) -> TestApp {
    app_with(generator, MemoryConfig::default())
}

async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

async fn send_json(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let (status, bytes) = send(router, method, uri, body).await;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

/// Parse `event:` / `data:` pairs out of an SSE body.
fn sse_events(body: &[u8]) -> Vec<(String, Value)> {
    let text = String::from_utf8_lossy(body);
    text.split("\n\n")
        .filter_map(|block| {
            let mut name = None;
            let mut data = None;
            for line in block.lines() {
                if let Some(v) = line.strip_prefix("event:") {
                    name = Some(v.trim().to_string());
                } else if let Some(v) = line.strip_prefix("data:") {
                    data = serde_json::from_str(v.trim()).ok();
                }
            }
            Some((name?, data?))
        })
        .collect()
}

#[tokio::test]
async fn test_root_and_health() {
    let app = app(Arc::new(EchoGenerator::default()));

    let (status, body) = send_json(&app.router, "GET", "/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "AI Coding Agent API is running");

    app.store.create_session().unwrap();
    let (status, body) = send_json(&app.router, "GET", "/api/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["active_sessions"], 1);
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_session_lifecycle() {
    let app = app(Arc::new(EchoGenerator::default()));

    let (status, created) = send_json(&app.router, "POST", "/api/v1/sessions", None).await;
    assert_eq!(status, StatusCode::OK);
    let id = created["session_id"].as_str().unwrap().to_string();

    let (status, summary) = send_json(&app.router, "GET", &format!("/api/v1/sessions/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["message_count"], 0);
    assert_eq!(summary["max_messages"], 5);

    let (status, messages) =
        send_json(&app.router, "GET", &format!("/api/v1/sessions/{id}/messages"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(messages["messages"], json!([]));

    let (status, _) = send_json(&app.router, "DELETE", &format!("/api/v1/sessions/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send_json(&app.router, "GET", &format!("/api/v1/sessions/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NotFound");

    let (status, _) = send_json(&app.router, "DELETE", &format!("/api/v1/sessions/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_session_messages_is_not_found() {
    let app = app(Arc::new(EchoGenerator::default()));

    let (status, _) = send_json(&app.router, "GET", "/api/v1/sessions/nope/messages", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send_json(&app.router, "DELETE", "/api/v1/sessions/nope/messages", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_chat_round_trip_keeps_history() {
    let generator = Arc::new(EchoGenerator::default());
    let app = app(generator.clone());

    let (status, first) = send_json(
        &app.router,
        "POST",
        "/api/v1/chat",
        Some(json!({ "message": "What's 2+2?" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["role"], "assistant");
    assert_eq!(first["message"], "echo: What's 2+2?");
    let id = first["session_id"].as_str().unwrap().to_string();

    let (status, _) = send_json(
        &app.router,
        "POST",
        "/api/v1/chat",
        Some(json!({ "message": "And 3+3?", "session_id": id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let contexts = generator.contexts.lock().clone();
    assert!(contexts[0].is_empty());
    assert_eq!(
        contexts[1],
        vec![
            ProviderMessage::user("What's 2+2?"),
            ProviderMessage::model("echo: What's 2+2?"),
        ]
    );

    let (status, body) = send_json(
        &app.router,
        "GET",
        &format!("/api/v1/sessions/{id}/messages?limit=1"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["role"], "assistant");
    assert_eq!(messages[0]["content"], "echo: And 3+3?");

    let (status, _) =
        send_json(&app.router, "DELETE", &format!("/api/v1/sessions/{id}/messages"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(app.store.recent_turns(&id, None).is_empty());
}

#[tokio::test]
async fn test_chat_requires_existing_session() {
    let app = app(Arc::new(EchoGenerator::default()));

    let (status, body) = send_json(
        &app.router,
        "POST",
        "/api/v1/chat",
        Some(json!({ "message": "hi", "session_id": "missing" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NotFound");
    assert_eq!(app.store.session_count(), 0);
}

#[tokio::test]
async fn test_chat_rejects_empty_message() {
    let app = app(Arc::new(EchoGenerator::default()));

    let (status, body) =
        send_json(&app.router, "POST", "/api/v1/chat", Some(json!({ "message": "  " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "InvalidInput");
}

#[tokio::test]
async fn test_chat_generator_failure_is_bad_gateway() {
    let app = app(Arc::new(BrokenGenerator));

    let (status, body) = send_json(
        &app.router,
        "POST",
        "/api/v1/chat",
        Some(json!({ "message": "hi", "session_id": null })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "GenerationFailure");

    let stats = app.store.stats();
    assert_eq!(stats.active_sessions, 1);
}

#[tokio::test]
async fn test_session_capacity_is_service_unavailable() {
    let memory = MemoryConfig {
        max_sessions: 1,
        ..MemoryConfig::default()
    };
    let app = app_with(Arc::new(EchoGenerator::default()), memory);

    let (status, _) = send_json(&app.router, "POST", "/api/v1/sessions", None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send_json(&app.router, "POST", "/api/v1/sessions", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "CapacityExceeded");
}

#[tokio::test]
async fn test_stream_seeds_new_session_and_emits_sse() {
    let generator = Arc::new(EchoGenerator::default());
    let app = app(generator.clone());

    let (status, body) = send(
        &app.router,
        "POST",
        "/api/v1/stream",
        Some(json!({
            "session_id": "client-chosen",
            "prompt": "refactor this",
            "messages": [
                { "role": "user", "content": "hello" },
                { "role": "assistant", "content": "hi, what do you need?" },
                { "role": "user", "content": "refactor this" }
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let events = sse_events(&body);
    let (last_name, last) = events.last().unwrap();
    assert_eq!(last_name, "done");
    assert_eq!(last["session_id"], "client-chosen");
    assert_eq!(last["full_response"], "echo: refactor this");
    assert_eq!(last["message_count"], 4);

    let streamed: String = events
        .iter()
        .filter(|(name, _)| name == "chunk")
        .map(|(_, data)| data["chunk"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(streamed, "echo: refactor this");

    assert_eq!(
        generator.contexts.lock()[0],
        vec![
            ProviderMessage::user("hello"),
            ProviderMessage::model("hi, what do you need?"),
        ]
    );
}

#[tokio::test]
async fn test_chat_stream_unknown_session_fails_before_streaming() {
    let app = app(Arc::new(EchoGenerator::default()));

    let (status, body) = send_json(
        &app.router,
        "POST",
        "/api/v1/chat/stream",
        Some(json!({ "message": "hi", "session_id": "ghost" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NotFound");
}

#[tokio::test]
async fn test_chat_stream_failure_is_error_event() {
    let app = app(Arc::new(BrokenGenerator));

    let (status, body) = send(
        &app.router,
        "POST",
        "/api/v1/chat/stream",
        Some(json!({ "message": "hi" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let events = sse_events(&body);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].0, "error");
    assert!(events[0].1["error"]
        .as_str()
        .unwrap()
        .contains("connection refused"));

    let id = events[0].1["session_id"].as_str().unwrap();
    let turns = app.store.recent_turns(id, None);
    assert_eq!(turns.len(), 1);
}
