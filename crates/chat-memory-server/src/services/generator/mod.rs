//! Text generation boundary
//!
//! The orchestrator only sees [`TextGenerator`]; [`GeminiGenerator`] is the
//! production implementation.

mod gemini;
mod rechunk;
mod sse;

pub use gemini::GeminiGenerator;
pub use rechunk::rechunk;

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::time::Duration;
use thiserror::Error;

use crate::services::conversation::ProviderMessage;

/// Finite, non-restartable sequence of text increments.
pub type TextStream = BoxStream<'static, Result<String, GenerationError>>;

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("failed to reach generator: {0}")]
    Transport(String),

    #[error("generator returned {status}: {body}")]
    Provider { status: u16, body: String },

    #[error("failed to decode generator response: {0}")]
    Decode(String),

    #[error("generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("generation cancelled")]
    Cancelled,

    #[error("generator returned no text")]
    EmptyResponse,
}

/// External text generator.
///
/// `context` holds the prior turns, oldest first; `prompt` is the active
/// instruction and is never part of `context`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        context: &[ProviderMessage],
    ) -> Result<String, GenerationError>;

    async fn generate_stream(
        &self,
        prompt: &str,
        context: &[ProviderMessage],
    ) -> Result<TextStream, GenerationError>;
}
