use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::GeneratorConfig;
use crate::services::conversation::ProviderMessage;

use super::rechunk::rechunk;
use super::sse::SseLineBuffer;
use super::{GenerationError, TextGenerator, TextStream};

/// Gemini REST client (`generateContent` / `streamGenerateContent`).
#[derive(Clone)]
pub struct GeminiGenerator {
    client: Client,
    config: GeneratorConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

// Response Structures
#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    error: Option<ErrorBody>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: u16,
    #[serde(default)]
    message: String,
}

impl GenerateContentResponse {
    fn into_text(self) -> Result<String, GenerationError> {
        if let Some(err) = self.error {
            return Err(GenerationError::Provider {
                status: err.code,
                body: err.message,
            });
        }

        Ok(self
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default())
    }
}

fn decode_chunk(payload: &str) -> Result<String, GenerationError> {
    serde_json::from_str::<GenerateContentResponse>(payload)
        .map_err(|e| GenerationError::Decode(e.to_string()))?
        .into_text()
}

impl GeminiGenerator {
    pub fn new(config: GeneratorConfig) -> Result<Self, GenerationError> {
        // No overall request timeout: streams can legitimately run long and
        // the orchestrator owns the generation deadline.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn endpoint(&self, method: &str) -> String {
        format!(
            "{}/models/{}:{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.model,
            method
        )
    }

    fn build_request<'a>(
        &'a self,
        prompt: &'a str,
        context: &'a [ProviderMessage],
    ) -> GenerateContentRequest<'a> {
        let mut contents: Vec<Content<'a>> = context
            .iter()
            .map(|m| Content {
                role: Some(m.speaker.as_str()),
                parts: vec![Part { text: &m.text }],
            })
            .collect();
        contents.push(Content {
            role: Some("user"),
            parts: vec![Part { text: prompt }],
        });

        let system_instruction = (!self.config.system_prompt.is_empty()).then(|| Content {
            role: None,
            parts: vec![Part {
                text: &self.config.system_prompt,
            }],
        });

        GenerateContentRequest {
            contents,
            system_instruction,
            generation_config: GenerationConfig {
                temperature: self.config.temperature,
                max_output_tokens: self.config.max_output_tokens,
            },
        }
    }

    async fn post(
        &self,
        url: &str,
        body: &GenerateContentRequest<'_>,
    ) -> Result<reqwest::Response, GenerationError> {
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.config.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Provider { status, body });
        }

        Ok(response)
    }
}

#[async_trait]
impl TextGenerator for GeminiGenerator {
    async fn generate(
        &self,
        prompt: &str,
        context: &[ProviderMessage],
    ) -> Result<String, GenerationError> {
        debug!(context = context.len(), "Starting generation");

        let request = self.build_request(prompt, context);
        let response = self.post(&self.endpoint("generateContent"), &request).await?;

        let body: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Decode(e.to_string()))?;

        let text = body.into_text()?;
        if text.is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        Ok(text)
    }

    async fn generate_stream(
        &self,
        prompt: &str,
        context: &[ProviderMessage],
    ) -> Result<TextStream, GenerationError> {
        debug!(context = context.len(), "Starting generation stream");

        let request = self.build_request(prompt, context);
        let response = self
            .post(&self.endpoint("streamGenerateContent?alt=sse"), &request)
            .await?;

        let smooth = self.config.smooth_streaming;
        let pacing = Duration::from_millis(self.config.pacing_ms);
        let mut frames = Box::pin(response.bytes_stream());

        let stream = async_stream::stream! {
            let mut lines = SseLineBuffer::default();
            let mut finished = false;

            while !finished {
                let payloads = match frames.next().await {
                    Some(Ok(frame)) => lines.push(&frame),
                    Some(Err(e)) => {
                        warn!("Generator stream broke: {}", e);
                        yield Err(GenerationError::Transport(e.to_string()));
                        return;
                    }
                    None => {
                        finished = true;
                        lines.finish().into_iter().collect()
                    }
                };

                for payload in payloads {
                    let text = match decode_chunk(&payload) {
                        Ok(text) => text,
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    };

                    if text.is_empty() {
                        continue;
                    }

                    if !smooth {
                        yield Ok(text);
                        continue;
                    }

                    for piece in rechunk(&text) {
                        if !pacing.is_zero() {
                            tokio::time::sleep(pacing).await;
                        }
                        yield Ok(piece);
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}
