//! Failure taxonomy for the chat pipeline.
//!
//! Every pipeline step fails into exactly one of these variants, and the HTTP
//! layer maps each variant to one status code. Variant payloads exist for the
//! server log; the response body for 5xx variants carries a generic message
//! only (see `server::AppError`).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    /// Missing or unresolvable caller credentials.
    #[error("unauthenticated")]
    Unauthenticated,

    /// Document missing or owned by another user. The two cases are never
    /// distinguished in any externally visible way.
    #[error("document not found")]
    NotFound,

    /// Malformed request payload, rejected before any side effect.
    #[error("{0}")]
    Validation(String),

    /// The document's vector namespace is absent or not yet queryable, or the
    /// retrieval engine could not serve the query.
    #[error("retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    /// Completion provider unreachable, errored, or returned a malformed
    /// response.
    #[error("synthesis failed: {0}")]
    SynthesisFailed(String),

    /// Conversation or document store read/write failure.
    #[error("persistence failed: {0}")]
    PersistenceFailed(#[from] sqlx::Error),
}

impl ChatError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ChatError::Validation(msg.into())
    }

    pub fn retrieval_unavailable(msg: impl Into<String>) -> Self {
        ChatError::RetrievalUnavailable(msg.into())
    }

    pub fn synthesis_failed(msg: impl Into<String>) -> Self {
        ChatError::SynthesisFailed(msg.into())
    }
}
