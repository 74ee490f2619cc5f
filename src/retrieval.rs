//! Retrieval seam between the chat pipeline and the vector index.
//!
//! The pipeline talks to a `Retriever` trait object so tests can substitute
//! a canned implementation. The real one embeds the question and ranks the
//! document's namespace in the SQLite index. Any failure on this path,
//! including a namespace with nothing in it, surfaces as
//! `ChatError::RetrievalUnavailable` so the server can answer 503 without
//! having persisted anything beyond the user's message.

use std::sync::Arc;

use async_trait::async_trait;

use crate::embedding::EmbeddingProvider;
use crate::error::ChatError;
use crate::index::VectorIndex;
use crate::models::RetrievedPassage;

#[async_trait]
pub trait Retriever: Send + Sync {
    /// Top-k passages for `query` within one document's namespace.
    async fn retrieve(
        &self,
        namespace: &str,
        query: &str,
        top_k: i64,
    ) -> Result<Vec<RetrievedPassage>, ChatError>;
}

pub struct VectorRetriever {
    provider: Arc<dyn EmbeddingProvider>,
    index: VectorIndex,
}

impl VectorRetriever {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, index: VectorIndex) -> Self {
        Self { provider, index }
    }
}

#[async_trait]
impl Retriever for VectorRetriever {
    async fn retrieve(
        &self,
        namespace: &str,
        query: &str,
        top_k: i64,
    ) -> Result<Vec<RetrievedPassage>, ChatError> {
        let size = self
            .index
            .namespace_size(namespace)
            .await
            .map_err(|e| ChatError::retrieval_unavailable(format!("index lookup failed: {e}")))?;
        if size == 0 {
            return Err(ChatError::retrieval_unavailable(format!(
                "no indexed passages for document {namespace}"
            )));
        }

        let query_vec = self
            .provider
            .embed_query(query)
            .await
            .map_err(|e| ChatError::retrieval_unavailable(format!("query embedding failed: {e}")))?;

        self.index
            .search(namespace, &query_vec, top_k)
            .await
            .map_err(|e| ChatError::retrieval_unavailable(format!("index search failed: {e}")))
    }
}
