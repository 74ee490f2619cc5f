//! Core data models used throughout pagewise.
//!
//! These types represent the documents, conversation messages, and retrieved
//! passages that flow through the ingestion and chat pipelines.

use serde::Serialize;

/// Processing state of an uploaded document.
///
/// The vector namespace for a document is only queryable once the status is
/// `Success`; `Failed` is terminal evidence of an ingestion attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UploadStatus {
    Pending,
    Processing,
    Success,
    Failed,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Pending => "PENDING",
            UploadStatus::Processing => "PROCESSING",
            UploadStatus::Success => "SUCCESS",
            UploadStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(UploadStatus::Pending),
            "PROCESSING" => Some(UploadStatus::Processing),
            "SUCCESS" => Some(UploadStatus::Success),
            "FAILED" => Some(UploadStatus::Failed),
            _ => None,
        }
    }
}

/// An uploaded source file and its ingestion state.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub storage_path: String,
    pub status: UploadStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

/// One turn in a document-scoped conversation.
///
/// `user_id` is the conversation owner for both turns; `is_user_message`
/// carries authorship (false = assistant).
#[derive(Debug, Clone)]
pub struct Message {
    pub id: String,
    pub document_id: String,
    pub user_id: String,
    pub text: String,
    pub is_user_message: bool,
    pub created_at: i64,
}

/// A chunk of extracted document text, prior to embedding.
#[derive(Debug, Clone)]
pub struct Passage {
    pub id: String,
    pub document_id: String,
    pub passage_index: i64,
    pub text: String,
}

/// A passage returned from similarity search, ranked by descending score.
#[derive(Debug, Clone)]
pub struct RetrievedPassage {
    pub text: String,
    pub score: f64,
}
