//! Request orchestration: store ⇄ generator ⇄ caller.
//!
//! Per request: `Init` (resolve session, append the user turn) →
//! `HistoryLoaded` (prior turns, without the new prompt) → `Generating` →
//! `Completed` (assistant turn appended) or `Failed` (nothing appended).
//! The store lock is never held across a generator call.

use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::models::chat::SeedMessage;
use crate::services::conversation::{role_from_untrusted, to_provider_format, ProviderMessage};
use crate::services::generator::{GenerationError, TextGenerator};
use crate::services::memory::{Role, SessionStore, Turn};
use crate::utils::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Init,
    HistoryLoaded,
    Generating,
    Completed,
    Failed,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Init => "init",
            Phase::HistoryLoaded => "history_loaded",
            Phase::Generating => "generating",
            Phase::Completed => "completed",
            Phase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// How a caller-supplied session id is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// Unknown or expired id is `NotFound`.
    RequireExisting,
    /// Unknown or expired id is created under that id.
    AutoCreate,
}

#[derive(Debug, Clone)]
pub struct PromptRequest {
    pub prompt: String,
    /// `None` always creates a new session.
    pub session_id: Option<String>,
    pub mode: SessionMode,
    /// Most recent turns read back as context; `None` reads everything stored.
    pub history_limit: Option<usize>,
    /// History to install when the session has no turns yet.
    pub seed: Vec<SeedMessage>,
}

impl PromptRequest {
    pub fn new(prompt: impl Into<String>, session_id: Option<String>, mode: SessionMode) -> Self {
        Self {
            prompt: prompt.into(),
            session_id,
            mode,
            history_limit: None,
            seed: Vec::new(),
        }
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = Some(limit);
        self
    }

    pub fn with_seed(mut self, seed: Vec<SeedMessage>) -> Self {
        self.seed = seed;
        self
    }
}

/// Events delivered to a streaming caller: increments, then exactly one
/// terminal `Done` or `Error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Chunk {
        session_id: String,
        chunk: String,
    },
    Done {
        session_id: String,
        full_response: String,
        message_count: usize,
    },
    Error {
        session_id: String,
        error: String,
    },
}

impl StreamEvent {
    pub fn name(&self) -> &'static str {
        match self {
            StreamEvent::Chunk { .. } => "chunk",
            StreamEvent::Done { .. } => "done",
            StreamEvent::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Chunk { .. })
    }
}

#[derive(Debug, Clone)]
pub struct ChatReply {
    pub session_id: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

pub struct StreamingReply {
    pub session_id: String,
    pub events: BoxStream<'static, StreamEvent>,
}

struct PreparedPrompt {
    session_id: String,
    prompt: String,
    context: Vec<Turn>,
}

pub struct ChatOrchestrator {
    store: Arc<SessionStore>,
    generator: Arc<dyn TextGenerator>,
    generation_timeout: Duration,
    stream_buffer: usize,
}

impl ChatOrchestrator {
    pub fn new(
        store: Arc<SessionStore>,
        generator: Arc<dyn TextGenerator>,
        generation_timeout: Duration,
        stream_buffer: usize,
    ) -> Self {
        Self {
            store,
            generator,
            generation_timeout,
            stream_buffer: stream_buffer.max(1),
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Generate a complete answer before returning.
    pub async fn submit(&self, request: PromptRequest) -> Result<ChatReply, ApiError> {
        let prepared = self.prepare(request)?;
        let context = to_provider_format(&prepared.context);
        let session_id = prepared.session_id;

        debug!(%session_id, phase = %Phase::Generating, "Generating response");
        let generated = tokio::time::timeout(
            self.generation_timeout,
            self.generator.generate(&prepared.prompt, &context),
        )
        .await
        .unwrap_or(Err(GenerationError::Timeout(self.generation_timeout)));

        let message = match generated.and_then(|text| {
            if text.is_empty() {
                Err(GenerationError::EmptyResponse)
            } else {
                Ok(text)
            }
        }) {
            Ok(text) => text,
            Err(e) => {
                warn!(%session_id, phase = %Phase::Failed, "Generation failed: {}", e);
                return Err(e.into());
            }
        };

        let turn = self
            .store
            .append_turn(&session_id, Role::Assistant, message.clone())?;
        debug!(%session_id, phase = %Phase::Completed, "Response stored");

        Ok(ChatReply {
            session_id,
            message,
            timestamp: turn.created_at,
        })
    }

    /// Start a streamed answer.
    ///
    /// Session resolution and prompt validation fail fast here; generation
    /// failures arrive as a terminal [`StreamEvent::Error`]. Dropping the
    /// returned stream cancels generation and discards the partial answer.
    pub fn submit_streaming(
        self: &Arc<Self>,
        request: PromptRequest,
    ) -> Result<StreamingReply, ApiError> {
        let prepared = self.prepare(request)?;
        let session_id = prepared.session_id.clone();

        let (tx, mut rx) = mpsc::channel(self.stream_buffer);
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            orchestrator.drive_stream(prepared, tx).await;
        });

        let events = async_stream::stream! {
            while let Some(event) = rx.recv().await {
                yield event;
            }
        };

        Ok(StreamingReply {
            session_id,
            events: Box::pin(events),
        })
    }

    fn prepare(&self, request: PromptRequest) -> Result<PreparedPrompt, ApiError> {
        if request.prompt.trim().is_empty() {
            return Err(ApiError::InvalidInput("prompt must not be empty".to_string()));
        }

        let session_id = self.resolve_session(request.session_id, request.mode)?;
        debug!(%session_id, phase = %Phase::Init, "Session resolved");

        if !request.seed.is_empty() && self.store.recent_turns(&session_id, None).is_empty() {
            self.seed_history(&session_id, &request.seed, &request.prompt)?;
        }

        let prompt_turn = self
            .store
            .append_turn(&session_id, Role::User, request.prompt.clone())?;

        let mut context = self.store.recent_turns(&session_id, request.history_limit);
        // The prompt goes to the generator separately.
        if let Some(pos) = context.iter().rposition(|t| *t == prompt_turn) {
            context.remove(pos);
        }

        debug!(
            %session_id,
            phase = %Phase::HistoryLoaded,
            context_turns = context.len(),
            "History loaded"
        );

        Ok(PreparedPrompt {
            session_id,
            prompt: request.prompt,
            context,
        })
    }

    fn resolve_session(
        &self,
        session_id: Option<String>,
        mode: SessionMode,
    ) -> Result<String, ApiError> {
        let requested = session_id.filter(|id| !id.trim().is_empty());

        match (requested, mode) {
            (None, _) => Ok(self.store.create_session()?.session_id),
            (Some(id), SessionMode::RequireExisting) => self
                .store
                .get_session(&id)
                .map(|s| s.id)
                .ok_or_else(ApiError::session_not_found),
            (Some(id), SessionMode::AutoCreate) => Ok(self.store.ensure_session(&id)?.id),
        }
    }

    fn seed_history(
        &self,
        session_id: &str,
        seed: &[SeedMessage],
        prompt: &str,
    ) -> Result<(), ApiError> {
        let mut seeded = 0usize;
        for message in seed {
            if message.content.is_empty() || message.content == prompt {
                continue;
            }
            let role = role_from_untrusted(&message.role);
            self.store.append_turn(session_id, role, message.content.clone())?;
            seeded += 1;
        }

        if seeded > 0 {
            info!(%session_id, seeded, "Seeded new session with client history");
        }
        Ok(())
    }

    async fn drive_stream(self: Arc<Self>, prepared: PreparedPrompt, tx: mpsc::Sender<StreamEvent>) {
        let session_id = prepared.session_id.clone();
        let context = to_provider_format(&prepared.context);
        let deadline = Instant::now() + self.generation_timeout;

        debug!(%session_id, phase = %Phase::Generating, "Streaming response");
        let relayed = self
            .relay(&session_id, &prepared.prompt, &context, deadline, &tx)
            .await;

        let full_response = match relayed {
            Ok(text) => text,
            Err(GenerationError::Cancelled) => {
                info!(%session_id, phase = %Phase::Failed, "Client disconnected, discarding partial response");
                return;
            }
            Err(e) => {
                warn!(%session_id, phase = %Phase::Failed, "Streaming generation failed: {}", e);
                let _ = tx
                    .send(StreamEvent::Error {
                        session_id,
                        error: format!("Error generating response: {}", e),
                    })
                    .await;
                return;
            }
        };

        if let Err(e) = self
            .store
            .append_turn(&session_id, Role::Assistant, full_response.clone())
        {
            warn!(%session_id, phase = %Phase::Failed, "Could not store response: {}", e);
            let _ = tx
                .send(StreamEvent::Error {
                    session_id,
                    error: e.to_string(),
                })
                .await;
            return;
        }

        let message_count = self.store.recent_turns(&session_id, None).len();
        debug!(%session_id, phase = %Phase::Completed, message_count, "Response stored");

        let done = StreamEvent::Done {
            session_id,
            full_response,
            message_count,
        };
        if tx.send(done).await.is_err() {
            debug!("Client left before completion event");
        }
    }

    /// Forward increments in generator order; returns their concatenation.
    async fn relay(
        &self,
        session_id: &str,
        prompt: &str,
        context: &[ProviderMessage],
        deadline: Instant,
        tx: &mpsc::Sender<StreamEvent>,
    ) -> Result<String, GenerationError> {
        let mut stream = tokio::select! {
            _ = tx.closed() => return Err(GenerationError::Cancelled),
            started = tokio::time::timeout_at(deadline, self.generator.generate_stream(prompt, context)) => {
                match started {
                    Ok(result) => result?,
                    Err(_) => return Err(GenerationError::Timeout(self.generation_timeout)),
                }
            }
        };

        let mut full_response = String::new();
        loop {
            let next = tokio::select! {
                _ = tx.closed() => return Err(GenerationError::Cancelled),
                next = tokio::time::timeout_at(deadline, stream.next()) => match next {
                    Ok(next) => next,
                    Err(_) => return Err(GenerationError::Timeout(self.generation_timeout)),
                },
            };

            let Some(increment) = next else { break };
            let increment = increment?;
            if increment.is_empty() {
                continue;
            }

            full_response.push_str(&increment);
            let event = StreamEvent::Chunk {
                session_id: session_id.to_string(),
                chunk: increment,
            };
            if tx.send(event).await.is_err() {
                return Err(GenerationError::Cancelled);
            }
        }

        if full_response.is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        Ok(full_response)
    }
}
