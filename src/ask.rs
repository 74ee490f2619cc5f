//! CLI entry point for `pagewise ask`.
//!
//! Runs the same chat pipeline as `POST /api/message`, but authenticates by
//! trust: `--user` names the acting user directly, no token involved. Useful
//! for smoke-testing an ingested document without standing up the server.

use std::sync::Arc;

use anyhow::Result;

use crate::completion::create_completion_model;
use crate::config::Config;
use crate::db;
use crate::embedding::create_embedding_provider;
use crate::index::VectorIndex;
use crate::pipeline::ChatPipeline;
use crate::retrieval::VectorRetriever;
use crate::store::{ConversationStore, DocumentStore};
use crate::synthesis::Synthesizer;

pub async fn run_ask(
    config: &Config,
    document_id: &str,
    question: &str,
    user: &str,
) -> Result<()> {
    let pool = db::connect(config).await?;

    let provider = create_embedding_provider(&config.embedding)?;
    let model = create_completion_model(&config.completion)?;

    let retriever = Arc::new(VectorRetriever::new(
        provider,
        VectorIndex::new(pool.clone()),
    ));
    let pipeline = ChatPipeline::new(
        DocumentStore::new(pool.clone()),
        ConversationStore::new(pool.clone()),
        retriever,
        Synthesizer::new(model),
        config.chat.history_limit,
        config.chat.top_k,
    );

    let answer = pipeline.answer(user, document_id, question).await?;
    println!("{answer}");

    pool.close().await;
    Ok(())
}
