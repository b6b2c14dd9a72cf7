//! Text-completion collaborator.
//!
//! The pipeline treats answer generation as an opaque external service: it
//! supplies a system instruction, retrieved context, and the user query, and
//! consumes a text answer or the absence of one. The shipped implementation
//! talks to an OpenAI-compatible chat-completions endpoint. Calls carry an
//! explicit timeout; a failed or timed-out call is the caller's cue to
//! degrade to "no response available", never to abort retrieval.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default OpenAI-compatible chat-completions endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

/// Default model used for answer generation.
pub const DEFAULT_COMPLETION_MODEL: &str = "gpt-4o-mini";

/// Instruction sent with every generation request.
pub const SYSTEM_INSTRUCTION: &str = "You answer user questions using only the provided document \
     passages. If the passages do not contain the answer, say so instead of guessing.";

/// External answer-generation service.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Produce an answer for `query` given retrieved `context`.
    async fn complete(&self, system: &str, context: &str, query: &str) -> Result<String>;
}

/// Chat-completions client for OpenAI-compatible APIs.
pub struct ChatCompletionsClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl ChatCompletionsClient {
    /// Build a client with a 60 second request timeout.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        Self::with_timeout(api_key, model, Duration::from_secs(60))
    }

    pub fn with_timeout(
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build completion HTTP client")?;
        Ok(Self {
            client,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    /// Point the client at a different OpenAI-compatible endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl CompletionProvider for ChatCompletionsClient {
    async fn complete(&self, system: &str, context: &str, query: &str) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: format!("{context}\n{query}"),
                },
            ],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.trim())
            .json(&body)
            .send()
            .await
            .context("failed to call chat completions")?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            bail!("completion service returned {status}: {text}");
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .context("failed to parse completion response")?;

        let answer = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content);
        match answer {
            Some(content) if !content.is_empty() => Ok(content),
            _ => bail!("completion service returned no choices"),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: String,
}
