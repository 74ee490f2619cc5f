//! Document ingestion pipeline.
//!
//! Takes an upload from raw bytes to a queryable vector namespace:
//! store the file, create the document record, extract text, split into
//! passages, embed, index. Status moves `PENDING -> PROCESSING ->
//! SUCCESS/FAILED`; chat against the document stays unavailable until
//! `SUCCESS`.
//!
//! Processing problems (unextractable text, embedding provider failure) mark
//! the document `FAILED` and still return an outcome, so callers can report
//! the terminal status. Only infrastructure errors (store writes failing)
//! propagate as `Err`.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::chunk::split_passages;
use crate::config::Config;
use crate::db;
use crate::embedding::{create_embedding_provider, EmbeddingProvider};
use crate::error::ChatError;
use crate::extract;
use crate::index::VectorIndex;
use crate::models::{Document, UploadStatus};
use crate::store::DocumentStore;

/// Outcome of one ingestion run. `document.status` is terminal
/// (`SUCCESS` or `FAILED`).
pub struct IngestOutcome {
    pub document: Document,
    pub passages: usize,
}

/// Upfront request checks, shared by the upload endpoint and the CLI.
///
/// These run before any record is created; a rejected upload leaves no trace.
pub fn validate_upload(config: &Config, file_name: &str, size: usize) -> Result<(), ChatError> {
    if file_name.trim().is_empty() {
        return Err(ChatError::validation("file name must not be empty"));
    }
    if !extract::is_supported(file_name) {
        return Err(ChatError::validation(format!(
            "unsupported file type: '{}' (supported: pdf, txt, md)",
            extract::file_extension(file_name)
        )));
    }
    if size == 0 {
        return Err(ChatError::validation("file is empty"));
    }
    if size > config.uploads.max_bytes {
        return Err(ChatError::validation(format!(
            "file exceeds maximum size of {} bytes",
            config.uploads.max_bytes
        )));
    }
    Ok(())
}

/// Ingest one pre-validated upload for `user_id`.
pub async fn ingest_document(
    pool: &SqlitePool,
    provider: Arc<dyn EmbeddingProvider>,
    config: &Config,
    user_id: &str,
    file_name: &str,
    bytes: &[u8],
) -> Result<IngestOutcome> {
    let documents = DocumentStore::new(pool.clone());

    // Keep the raw upload on disk so a failed run can be inspected and
    // reprocessed without asking the user to upload again.
    let storage_path = store_upload(config, file_name, bytes)?;
    let mut document = documents.create(user_id, file_name, &storage_path).await?;

    documents
        .set_status(&document.id, UploadStatus::Processing)
        .await?;

    match process(pool, provider, config, &document, bytes).await {
        Ok(passage_count) => {
            documents
                .set_status(&document.id, UploadStatus::Success)
                .await?;
            document.status = UploadStatus::Success;
            Ok(IngestOutcome {
                document,
                passages: passage_count,
            })
        }
        Err(e) => {
            tracing::warn!(
                document_id = %document.id,
                name = %document.name,
                error = format!("{e:#}"),
                "ingestion failed"
            );
            documents
                .set_status(&document.id, UploadStatus::Failed)
                .await?;
            document.status = UploadStatus::Failed;
            Ok(IngestOutcome {
                document,
                passages: 0,
            })
        }
    }
}

/// Extract, split, embed, index. Any error here means `FAILED`.
async fn process(
    pool: &SqlitePool,
    provider: Arc<dyn EmbeddingProvider>,
    config: &Config,
    document: &Document,
    bytes: &[u8],
) -> Result<usize> {
    let extension = extract::file_extension(&document.name);
    let text = extract::extract_text(bytes, &extension)
        .with_context(|| format!("extracting text from {}", document.name))?;

    let passages = split_passages(&document.id, &text, config.chunking.max_tokens);
    if passages.is_empty() {
        bail!("no extractable text in {}", document.name);
    }

    let texts: Vec<String> = passages.iter().map(|p| p.text.clone()).collect();
    let vectors = provider.embed_batch(&texts).await?;

    let index = VectorIndex::new(pool.clone());
    index
        .replace_passages(
            &document.id,
            &passages,
            &vectors,
            provider.model_name(),
            provider.dims(),
        )
        .await?;

    Ok(passages.len())
}

/// Write the upload into the uploads directory under a unique name.
fn store_upload(config: &Config, file_name: &str, bytes: &[u8]) -> Result<String> {
    let dir = &config.uploads.dir;
    std::fs::create_dir_all(dir)
        .with_context(|| format!("creating uploads dir {}", dir.display()))?;

    let path = dir.join(format!("{}_{}", Uuid::new_v4(), sanitize_file_name(file_name)));
    std::fs::write(&path, bytes)
        .with_context(|| format!("writing upload to {}", path.display()))?;

    Ok(path.to_string_lossy().into_owned())
}

/// Strip anything path-like from a client-supplied file name.
fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_matches('.');
    if trimmed.is_empty() {
        "upload".to_string()
    } else {
        trimmed.to_string()
    }
}

/// CLI entry point for `pagewise ingest`.
pub async fn run_ingest(
    config: &Config,
    path: &str,
    user: &str,
    name: Option<String>,
) -> Result<()> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read file: {}", path))?;

    let file_name = name.unwrap_or_else(|| {
        Path::new(path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string())
    });

    validate_upload(config, &file_name, bytes.len())?;

    let pool = db::connect(config).await?;
    let provider = create_embedding_provider(&config.embedding)?;

    let outcome = ingest_document(&pool, provider, config, user, &file_name, &bytes).await?;

    println!("ingest {}", file_name);
    println!("  document id: {}", outcome.document.id);
    println!("  passages indexed: {}", outcome.passages);
    println!("  status: {}", outcome.document.status.as_str());

    pool.close().await;

    if outcome.document.status != UploadStatus::Success {
        bail!("ingestion failed for {}", file_name);
    }
    println!("ok");
    Ok(())
}
