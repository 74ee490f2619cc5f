//! Completion model clients for answer synthesis.
//!
//! Defines the [`CompletionModel`] trait and concrete implementations:
//! - **[`GeminiCompletion`]** — streams from the Google Generative Language
//!   `streamGenerateContent` SSE endpoint and accumulates the deltas into
//!   one answer string.
//! - **[`OpenAICompletion`]** — single `chat/completions` request.
//!
//! Unlike the embedding clients, completion requests are single-shot with no
//! retry. A chat turn has an interactive caller waiting on it, and by the
//! time synthesis runs the user's message is already persisted; the caller
//! can simply re-ask. Failures map to [`ChatError::SynthesisFailed`].

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use futures::StreamExt;

use crate::config::CompletionConfig;
use crate::embedding::{GEMINI_BASE_URL, OPENAI_BASE_URL};
use crate::error::ChatError;

#[async_trait]
pub trait CompletionModel: Send + Sync {
    /// Returns the model identifier (e.g. `"gemini-1.5-flash"`).
    fn model_name(&self) -> &str;

    /// Produce one complete answer for a fully assembled prompt.
    async fn complete(&self, prompt: &str) -> Result<String, ChatError>;
}

/// Create the appropriate [`CompletionModel`] based on configuration.
///
/// # Errors
///
/// Returns an error for unknown provider names or a missing API key.
pub fn create_completion_model(config: &CompletionConfig) -> Result<Arc<dyn CompletionModel>> {
    match config.provider.as_str() {
        "gemini" => Ok(Arc::new(GeminiCompletion::new(config)?)),
        "openai" => Ok(Arc::new(OpenAICompletion::new(config)?)),
        other => bail!("Unknown completion provider: {}", other),
    }
}

// ============ Gemini Provider ============

/// Completion model using the Google Generative Language API.
///
/// Calls `POST {base}/models/{model}:streamGenerateContent?alt=sse` with the
/// API key in the `x-goog-api-key` header and drains the SSE stream to
/// completion. Requires the `GEMINI_API_KEY` environment variable.
pub struct GeminiCompletion {
    model: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiCompletion {
    pub fn new(config: &CompletionConfig) -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| anyhow::anyhow!("GEMINI_API_KEY environment variable not set"))?;

        let model = config
            .model
            .clone()
            .unwrap_or_else(|| "gemini-1.5-flash".to_string());
        let base_url = config
            .url
            .clone()
            .unwrap_or_else(|| GEMINI_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model,
            base_url,
            api_key,
            client,
        })
    }

    async fn stream_completion(&self, prompt: &str) -> Result<String> {
        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url, self.model
        );
        let body = serde_json::json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
        });

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .context("Gemini completion request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Gemini completion API error {}: {}", status, body_text);
        }

        // Accumulate SSE deltas into one answer. Lines are complete UTF-8
        // (multi-byte sequences never contain 0x0A), so decoding per line is
        // safe even when a chunk boundary splits a character.
        let mut stream = response.bytes_stream();
        let mut buf: Vec<u8> = Vec::new();
        let mut answer = String::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("reading Gemini completion stream")?;
            buf.extend_from_slice(&chunk);

            while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = buf.drain(..=pos).collect();
                append_sse_text(&String::from_utf8_lossy(&line), &mut answer);
            }
        }
        if !buf.is_empty() {
            append_sse_text(&String::from_utf8_lossy(&buf), &mut answer);
        }

        Ok(answer)
    }
}

#[async_trait]
impl CompletionModel for GeminiCompletion {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String, ChatError> {
        let answer = self
            .stream_completion(prompt)
            .await
            .map_err(|e| ChatError::synthesis_failed(format!("{e:#}")))?;
        if answer.trim().is_empty() {
            return Err(ChatError::synthesis_failed(
                "model stream produced no answer text",
            ));
        }
        Ok(answer)
    }
}

/// Extract text deltas from one SSE line and append them to `answer`.
///
/// Non-data lines (comments, event names, blanks) and the `[DONE]` marker
/// are ignored, as are data payloads that fail to parse.
fn append_sse_text(line: &str, answer: &mut String) {
    let trimmed = line.trim();
    let data = match trimmed.strip_prefix("data:") {
        Some(rest) => rest.trim_start(),
        None => return,
    };
    if data.is_empty() || data == "[DONE]" {
        return;
    }
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(data) {
        push_candidate_text(&json, answer);
    }
}

/// Append `candidates[0].content.parts[*].text` from a generation chunk.
fn push_candidate_text(json: &serde_json::Value, answer: &mut String) {
    let parts = json
        .get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array());

    if let Some(parts) = parts {
        for part in parts {
            if let Some(text) = part.get("text").and_then(|t| t.as_str()) {
                answer.push_str(text);
            }
        }
    }
}

// ============ OpenAI Provider ============

/// Completion model using the OpenAI chat completions API.
///
/// Single non-streaming `POST {base}/chat/completions` with a bearer token.
/// Requires the `OPENAI_API_KEY` environment variable.
pub struct OpenAICompletion {
    model: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAICompletion {
    pub fn new(config: &CompletionConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;

        let model = config
            .model
            .clone()
            .unwrap_or_else(|| "gpt-4o-mini".to_string());
        let base_url = config
            .url
            .clone()
            .unwrap_or_else(|| OPENAI_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model,
            base_url,
            api_key,
            client,
        })
    }

    async fn request_completion(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .context("OpenAI completion request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("OpenAI completion API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response.json().await?;
        extract_openai_content(&json)
    }
}

#[async_trait]
impl CompletionModel for OpenAICompletion {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String, ChatError> {
        let answer = self
            .request_completion(prompt)
            .await
            .map_err(|e| ChatError::synthesis_failed(format!("{e:#}")))?;
        if answer.trim().is_empty() {
            return Err(ChatError::synthesis_failed(
                "model returned an empty answer",
            ));
        }
        Ok(answer)
    }
}

/// Extract `choices[0].message.content` from a chat completions response.
fn extract_openai_content(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing message content"))
}
