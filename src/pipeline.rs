//! Chat turn orchestration.
//!
//! One [`ChatPipeline::answer`] call is one turn:
//!
//! 1. validate the question (no side effects yet)
//! 2. resolve the document with ownership enforced
//! 3. append the user message to the conversation log
//! 4. concurrently retrieve passages and read the recent history window
//! 5. synthesize the answer from history + passages + question
//! 6. append the assistant message, best effort
//!
//! The conversation log is append-only: once step 3 commits, no later
//! failure removes the user's message. The final append is best effort
//! because the computed answer is the response of record for the turn; a
//! lost store write is logged and the answer still returned. The history
//! window is read after the user append on purpose, so the window always
//! contains the question being asked.
//!
//! Dropping the returned future (caller disconnect) cancels whichever step
//! is in flight; in particular a half-accumulated answer is never persisted.

use std::sync::Arc;

use crate::error::ChatError;
use crate::models::UploadStatus;
use crate::retrieval::Retriever;
use crate::store::{ConversationStore, DocumentStore};
use crate::synthesis::Synthesizer;

pub struct ChatPipeline {
    documents: DocumentStore,
    conversation: ConversationStore,
    retriever: Arc<dyn Retriever>,
    synthesizer: Synthesizer,
    history_limit: i64,
    top_k: i64,
}

impl ChatPipeline {
    pub fn new(
        documents: DocumentStore,
        conversation: ConversationStore,
        retriever: Arc<dyn Retriever>,
        synthesizer: Synthesizer,
        history_limit: i64,
        top_k: i64,
    ) -> Self {
        Self {
            documents,
            conversation,
            retriever,
            synthesizer,
            history_limit,
            top_k,
        }
    }

    /// Answer one question against one document on behalf of `user_id`.
    pub async fn answer(
        &self,
        user_id: &str,
        document_id: &str,
        question: &str,
    ) -> Result<String, ChatError> {
        if question.trim().is_empty() {
            return Err(ChatError::validation("message must not be empty"));
        }
        if document_id.trim().is_empty() {
            return Err(ChatError::validation("fileId must not be empty"));
        }

        let document = self
            .documents
            .find_owned(document_id, user_id)
            .await?
            .ok_or(ChatError::NotFound)?;

        self.conversation
            .append(&document.id, user_id, question, true)
            .await?;

        // The namespace is only queryable once ingestion finished.
        if document.status != UploadStatus::Success {
            return Err(ChatError::retrieval_unavailable(format!(
                "document is not ready for chat (status: {})",
                document.status.as_str()
            )));
        }

        let retrieval = self.retriever.retrieve(&document.id, question, self.top_k);
        let history = async {
            self.conversation
                .recent(&document.id, self.history_limit)
                .await
                .map_err(ChatError::from)
        };
        let (passages, history) = tokio::try_join!(retrieval, history)?;

        let answer = self.synthesizer.answer(&history, &passages, question).await?;

        if let Err(e) = self
            .conversation
            .append(&document.id, user_id, &answer, false)
            .await
        {
            tracing::warn!(
                document_id = %document.id,
                error = %e,
                "assistant message append failed; returning answer anyway"
            );
        }

        Ok(answer)
    }
}
