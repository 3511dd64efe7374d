//! Text-generation endpoint.
//!
//! The service is stateless per call: every request carries the whole
//! transcript as `contents`, and the reply is a single text string.

use std::sync::Arc;

use async_trait::async_trait;
use cityboard_core::types::Message;
use cityboard_gateway::{trim_base_url, HttpGateway};
use serde::{Deserialize, Serialize};

use crate::error::ChatError;

/// Produces one reply for a full conversation history.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Generate a reply to `contents` with `model`, authenticated by `credential`.
    ///
    /// An empty string means the service returned no content.
    async fn generate(
        &self,
        model: &str,
        credential: &str,
        contents: &[Message],
    ) -> Result<String, ChatError>;
}

/// Gemini `generateContent` client built on an [`HttpGateway`].
pub struct GeminiGenerator {
    gateway: Arc<dyn HttpGateway>,
    endpoint: String,
}

impl GeminiGenerator {
    pub fn new(gateway: Arc<dyn HttpGateway>, endpoint: impl Into<String>) -> Self {
        Self {
            gateway,
            endpoint: endpoint.into(),
        }
    }

    fn url(&self, model: &str) -> String {
        format!(
            "{}/{}:generateContent",
            trim_base_url(&self.endpoint),
            model.trim()
        )
    }
}

#[async_trait]
impl ContentGenerator for GeminiGenerator {
    async fn generate(
        &self,
        model: &str,
        credential: &str,
        contents: &[Message],
    ) -> Result<String, ChatError> {
        let body = serde_json::to_value(GenerateContentRequest::from_transcript(contents))?;
        let url = self.url(model);

        tracing::debug!(model = %model, turns = contents.len(), "Requesting generation");
        let response = self
            .gateway
            .post(&url, &[("x-goog-api-key", credential)], &body)
            .await?;

        extract_reply_text(response)
    }
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
}

impl<'a> GenerateContentRequest<'a> {
    fn from_transcript(messages: &'a [Message]) -> Self {
        Self {
            contents: messages
                .iter()
                .map(|m| Content {
                    role: m.role.as_str(),
                    parts: vec![Part { text: &m.text }],
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
    error: Option<ErrorBody>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<ContentResponse>,
}

#[derive(Deserialize)]
struct ContentResponse {
    #[serde(default)]
    parts: Vec<PartResponse>,
}

#[derive(Deserialize)]
struct PartResponse {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// Text of the first candidate, all text parts concatenated.
///
/// A service error payload or a blocked prompt is a `Transport` error; a
/// response with no candidate text is an empty string.
fn extract_reply_text(value: serde_json::Value) -> Result<String, ChatError> {
    let response: GenerateContentResponse = serde_json::from_value(value)?;

    if let Some(error) = response.error {
        return Err(ChatError::Transport(
            error
                .message
                .unwrap_or_else(|| "generation service reported an error".to_string()),
        ));
    }

    if response.candidates.is_empty() {
        if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(ChatError::Transport(format!(
                "Response was blocked due to {}",
                reason
            )));
        }
    }

    Ok(response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<String>()
        })
        .unwrap_or_default())
}
