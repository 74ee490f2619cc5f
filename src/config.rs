use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub uploads: UploadsConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadsConfig {
    #[serde(default = "default_uploads_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_max_upload_bytes")]
    pub max_bytes: usize,
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            dir: default_uploads_dir(),
            max_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_uploads_dir() -> PathBuf {
    PathBuf::from("./data/uploads")
}
fn default_max_upload_bytes() -> usize {
    16 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_max_tokens() -> usize {
    400
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    /// How many recent messages are flattened into the prompt.
    #[serde(default = "default_history_limit")]
    pub history_limit: i64,
    /// How many passages similarity search returns per question.
    #[serde(default = "default_top_k")]
    pub top_k: i64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            top_k: default_top_k(),
        }
    }
}

fn default_history_limit() -> i64 {
    6
}
fn default_top_k() -> i64 {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL override, mainly for pointing tests at a stub server.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

fn default_embedding_provider() -> String {
    "gemini".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    #[serde(default = "default_completion_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Base URL override, mainly for pointing tests at a stub server.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_completion_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            provider: default_completion_provider(),
            model: None,
            url: None,
            timeout_secs: default_completion_timeout_secs(),
        }
    }
}

fn default_completion_provider() -> String {
    "gemini".to_string()
}
fn default_completion_timeout_secs() -> u64 {
    120
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate chunking
    if config.chunking.max_tokens == 0 {
        anyhow::bail!("chunking.max_tokens must be > 0");
    }

    // Validate chat
    if config.chat.history_limit < 1 {
        anyhow::bail!("chat.history_limit must be >= 1");
    }
    if config.chat.top_k < 1 {
        anyhow::bail!("chat.top_k must be >= 1");
    }

    // Validate uploads
    if config.uploads.max_bytes == 0 {
        anyhow::bail!("uploads.max_bytes must be > 0");
    }

    // Validate embedding
    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }
    if config.embedding.dims == Some(0) {
        anyhow::bail!(
            "embedding.dims must be > 0 when set for provider '{}'",
            config.embedding.provider
        );
    }

    match config.embedding.provider.as_str() {
        "gemini" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be gemini or openai.",
            other
        ),
    }

    match config.completion.provider.as_str() {
        "gemini" | "openai" => {}
        other => anyhow::bail!(
            "Unknown completion provider: '{}'. Must be gemini or openai.",
            other
        ),
    }

    Ok(config)
}
