//! Embedding provider abstraction and implementations.
//!
//! Defines the [`EmbeddingProvider`] trait and concrete implementations:
//! - **[`GeminiEmbeddings`]** — calls the Google Generative Language
//!   `batchEmbedContents` endpoint.
//! - **[`OpenAIEmbeddings`]** — calls the OpenAI embeddings API.
//!
//! Providers are constructed once at startup ([`create_embedding_provider`])
//! and injected wherever embeddings are needed (ingestion and query-time
//! retrieval), so a missing API key fails fast instead of mid-pipeline.
//!
//! Also provides vector utilities for the SQLite-backed index:
//! - [`cosine_similarity`] — compute similarity between two embedding vectors
//! - [`vec_to_blob`] — encode a `Vec<f32>` as little-endian bytes for BLOB storage
//! - [`blob_to_vec`] — decode a BLOB back into a `Vec<f32>`
//!
//! # Retry Strategy
//!
//! Both providers use exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! API keys are sent as headers (never query parameters) so transport errors
//! cannot echo them.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::EmbeddingConfig;

pub(crate) const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub(crate) const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Trait for embedding providers.
///
/// The same provider instance (same model, same dimensionality) must be used
/// for indexing and querying, otherwise similarity scores are meaningless.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-004"`).
    fn model_name(&self) -> &str;

    /// Returns the embedding vector dimensionality (e.g. `768`).
    fn dims(&self) -> usize;

    /// Embed a batch of texts, returning one vector per input in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query text.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_batch(&[text.to_string()]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
    }
}

/// Create the appropriate [`EmbeddingProvider`] based on configuration.
///
/// | Config value | Provider | Credential |
/// |--------------|----------|------------|
/// | `"gemini"` | [`GeminiEmbeddings`] | `GEMINI_API_KEY` |
/// | `"openai"` | [`OpenAIEmbeddings`] | `OPENAI_API_KEY` |
///
/// # Errors
///
/// Returns an error for unknown provider names or a missing API key.
pub fn create_embedding_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "gemini" => Ok(Arc::new(GeminiEmbeddings::new(config)?)),
        "openai" => Ok(Arc::new(OpenAIEmbeddings::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// POST a JSON request with retry/backoff, returning the parsed JSON body.
///
/// `build` is invoked per attempt so the request can be re-sent. `label`
/// names the upstream in error messages.
async fn post_json_with_retry<F>(
    build: F,
    max_retries: u32,
    label: &str,
) -> Result<serde_json::Value>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            // Exponential backoff: 1s, 2s, 4s, 8s, ...
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        match build().send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return Ok(response.json().await?);
                }

                // Rate limited or server error, worth retrying
                if status.as_u16() == 429 || status.is_server_error() {
                    let body_text = response.text().await.unwrap_or_default();
                    last_err = Some(anyhow::anyhow!("{} error {}: {}", label, status, body_text));
                    continue;
                }

                // Client error (not 429), don't retry
                let body_text = response.text().await.unwrap_or_default();
                bail!("{} error {}: {}", label, status, body_text);
            }
            Err(e) => {
                last_err = Some(anyhow::anyhow!("{} request failed: {}", label, e));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("{} failed after retries", label)))
}

// ============ Gemini Provider ============

/// Embedding provider using the Google Generative Language API.
///
/// Calls `POST {base}/models/{model}:batchEmbedContents` with the API key in
/// the `x-goog-api-key` header. Requires the `GEMINI_API_KEY` environment
/// variable.
pub struct GeminiEmbeddings {
    model: String,
    dims: usize,
    base_url: String,
    api_key: String,
    batch_size: usize,
    max_retries: u32,
    client: reqwest::Client,
}

impl GeminiEmbeddings {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| anyhow::anyhow!("GEMINI_API_KEY environment variable not set"))?;

        let model = config
            .model
            .clone()
            .unwrap_or_else(|| "text-embedding-004".to_string());
        let dims = config.dims.unwrap_or(768);
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
            dims,
            base_url,
            api_key,
            batch_size: config.batch_size,
            max_retries: config.max_retries,
            client,
        })
    }

    async fn embed_one_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/models/{}:batchEmbedContents", self.base_url, self.model);
        let requests: Vec<serde_json::Value> = texts
            .iter()
            .map(|t| {
                serde_json::json!({
                    "model": format!("models/{}", self.model),
                    "content": { "parts": [{ "text": t }] },
                })
            })
            .collect();
        let body = serde_json::json!({ "requests": requests });

        let json = post_json_with_retry(
            || {
                self.client
                    .post(&url)
                    .header("x-goog-api-key", &self.api_key)
                    .header("Content-Type", "application/json")
                    .json(&body)
            },
            self.max_retries,
            "Gemini embeddings API",
        )
        .await?;

        parse_gemini_response(&json, texts.len())
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbeddings {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size.max(1)) {
            out.extend(self.embed_one_batch(batch).await?);
        }
        check_dims(&out, self.dims)?;
        Ok(out)
    }
}

/// Parse a `batchEmbedContents` response: `embeddings[].values`.
fn parse_gemini_response(json: &serde_json::Value, expected: usize) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Gemini response: missing embeddings array"))?;

    if embeddings.len() != expected {
        bail!(
            "Invalid Gemini response: expected {} embeddings, got {}",
            expected,
            embeddings.len()
        );
    }

    let mut result = Vec::with_capacity(embeddings.len());
    for item in embeddings {
        let values = item
            .get("values")
            .and_then(|v| v.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid Gemini response: missing values"))?;
        let vec: Vec<f32> = values
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        result.push(vec);
    }

    Ok(result)
}

// ============ OpenAI Provider ============

/// Embedding provider using the OpenAI API.
///
/// Calls `POST {base}/embeddings` with a bearer token. Requires the
/// `OPENAI_API_KEY` environment variable.
pub struct OpenAIEmbeddings {
    model: String,
    dims: usize,
    base_url: String,
    api_key: String,
    batch_size: usize,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAIEmbeddings {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;

        let model = config
            .model
            .clone()
            .unwrap_or_else(|| "text-embedding-3-small".to_string());
        let dims = config.dims.unwrap_or(1536);
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
            dims,
            base_url,
            api_key,
            batch_size: config.batch_size,
            max_retries: config.max_retries,
            client,
        })
    }

    async fn embed_one_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let json = post_json_with_retry(
            || {
                self.client
                    .post(&url)
                    .header("Authorization", format!("Bearer {}", self.api_key))
                    .header("Content-Type", "application/json")
                    .json(&body)
            },
            self.max_retries,
            "OpenAI embeddings API",
        )
        .await?;

        parse_openai_response(&json, texts.len())
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddings {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size.max(1)) {
            out.extend(self.embed_one_batch(batch).await?);
        }
        check_dims(&out, self.dims)?;
        Ok(out)
    }
}

/// Parse an OpenAI embeddings response: `data[].embedding`.
fn parse_openai_response(json: &serde_json::Value, expected: usize) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing data array"))?;

    if data.len() != expected {
        bail!(
            "Invalid OpenAI response: expected {} embeddings, got {}",
            expected,
            data.len()
        );
    }

    let mut embeddings = Vec::with_capacity(data.len());
    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing embedding"))?;
        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        embeddings.push(vec);
    }

    Ok(embeddings)
}

/// Stored vectors and query vectors must agree on dimensionality or cosine
/// scores degrade to 0; surface a misconfigured `embedding.dims` here.
fn check_dims(vectors: &[Vec<f32>], dims: usize) -> Result<()> {
    if let Some(v) = vectors.first() {
        if v.len() != dims {
            bail!(
                "Embedding dimensionality mismatch: provider returned {}, configured dims = {}",
                v.len(),
                dims
            );
        }
    }
    Ok(())
}

// ============ Vector utilities ============

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// Each `f32` is stored as 4 bytes in little-endian order, producing
/// a BLOB of `vec.len() × 4` bytes.
///
/// # Example
///
/// ```rust
/// use pagewise::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12); // 3 × 4 bytes
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
///
/// Reverses [`vec_to_blob`]: reads 4-byte little-endian `f32` values
/// from the byte slice.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`:
/// - `1.0` = identical direction
/// - `0.0` = orthogonal (unrelated)
/// - `-1.0` = opposite direction
///
/// Returns `0.0` for empty vectors or vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        let blob = vec_to_blob(&vec);
        let restored = blob_to_vec(&blob);
        assert_eq!(vec, restored);
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        let sim = cosine_similarity(&a, &b);
        assert!(sim.abs() < 1e-6);
    }

    #[test]
    fn test_cosine_opposite() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        let sim = cosine_similarity(&a, &b);
        assert!((sim + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_empty() {
        let sim = cosine_similarity(&[], &[]);
        assert_eq!(sim, 0.0);
    }

    #[test]
    fn test_cosine_different_lengths() {
        let a = vec![1.0, 2.0];
        let b = vec![1.0];
        let sim = cosine_similarity(&a, &b);
        assert_eq!(sim, 0.0);
    }

    #[test]
    fn test_parse_gemini_response() {
        let json = serde_json::json!({
            "embeddings": [
                { "values": [0.1, 0.2] },
                { "values": [0.3, 0.4] },
            ]
        });
        let vecs = parse_gemini_response(&json, 2).unwrap();
        assert_eq!(vecs.len(), 2);
        assert_eq!(vecs[0].len(), 2);
        assert!((vecs[1][0] - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_parse_gemini_response_count_mismatch() {
        let json = serde_json::json!({ "embeddings": [{ "values": [0.1] }] });
        assert!(parse_gemini_response(&json, 2).is_err());
    }

    #[test]
    fn test_parse_gemini_response_missing_fields() {
        let json = serde_json::json!({ "not_embeddings": [] });
        assert!(parse_gemini_response(&json, 0).is_err());
    }

    #[test]
    fn test_parse_openai_response() {
        let json = serde_json::json!({
            "data": [
                { "embedding": [1.0, 0.0] },
            ]
        });
        let vecs = parse_openai_response(&json, 1).unwrap();
        assert_eq!(vecs, vec![vec![1.0f32, 0.0]]);
    }

    #[test]
    fn test_parse_openai_response_missing_embedding() {
        let json = serde_json::json!({ "data": [{ "index": 0 }] });
        assert!(parse_openai_response(&json, 1).is_err());
    }
}
