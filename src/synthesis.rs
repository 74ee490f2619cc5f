//! Prompt assembly and answer synthesis.
//!
//! Everything the model sees for one chat turn is flattened into a single
//! user-role prompt: instructions, then the recent conversation window, then
//! the retrieved passages, then the new question. There is no multi-turn
//! message array and no system role; history is inlined as labelled lines.

use std::sync::Arc;

use crate::completion::CompletionModel;
use crate::error::ChatError;
use crate::models::{Message, RetrievedPassage};

/// Build the flattened synthesis prompt.
///
/// Layout, in order:
/// 1. instruction lines (answer from context, admit when unknown)
/// 2. `PREVIOUS CONVERSATION:` with one `User:`/`Model:` line per message,
///    oldest first
/// 3. `CONTEXT:` with retrieved passages separated by blank lines
/// 4. `USER INPUT:` with the new question
///
/// Empty history or empty passages keep their section headers so the model
/// always sees the same frame.
pub fn build_prompt(
    history: &[Message],
    passages: &[RetrievedPassage],
    question: &str,
) -> String {
    let mut prompt = String::new();
    prompt.push_str(
        "Use the following pieces of context (or previous conversation if needed) \
         to answer the user's question in markdown format.\n",
    );
    prompt.push_str(
        "If you don't know the answer, just say that you don't know, \
         don't try to make up an answer.\n",
    );

    prompt.push_str("----------------\n\nPREVIOUS CONVERSATION:\n");
    for message in history {
        if message.is_user_message {
            prompt.push_str("User: ");
        } else {
            prompt.push_str("Model: ");
        }
        prompt.push_str(&message.text);
        prompt.push('\n');
    }

    prompt.push_str("\n----------------\n\nCONTEXT:\n");
    let context: Vec<&str> = passages.iter().map(|p| p.text.as_str()).collect();
    prompt.push_str(&context.join("\n\n"));

    prompt.push_str("\n\nUSER INPUT: ");
    prompt.push_str(question);
    prompt
}

/// Turns a conversation window plus retrieved passages into one answer.
pub struct Synthesizer {
    model: Arc<dyn CompletionModel>,
}

impl Synthesizer {
    pub fn new(model: Arc<dyn CompletionModel>) -> Self {
        Self { model }
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    pub async fn answer(
        &self,
        history: &[Message],
        passages: &[RetrievedPassage],
        question: &str,
    ) -> Result<String, ChatError> {
        let prompt = build_prompt(history, passages, question);
        self.model.complete(&prompt).await
    }
}
