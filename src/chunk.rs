//! Paragraph-boundary passage splitter.
//!
//! Splits extracted document text into [`Passage`]s that respect a
//! configurable `max_tokens` limit. Splitting occurs on paragraph boundaries
//! (`\n\n`) to preserve semantic coherence within each passage; oversized
//! paragraphs (common in PDF extraction, which rarely yields blank lines) are
//! hard-split at word boundaries.

use uuid::Uuid;

use crate::models::Passage;

/// Approximate chars-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

/// Split text into passages on paragraph boundaries, respecting max_tokens.
/// Returns passages with contiguous indices starting at 0; whitespace-only
/// input yields no passages.
pub fn split_passages(document_id: &str, text: &str, max_tokens: usize) -> Vec<Passage> {
    let max_chars = max_tokens * CHARS_PER_TOKEN;

    let mut passages = Vec::new();
    let mut current_buf = String::new();
    let mut index: i64 = 0;

    for para in text.split("\n\n") {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }

        // If adding this paragraph would exceed max, flush current buffer
        let would_be = if current_buf.is_empty() {
            trimmed.len()
        } else {
            current_buf.len() + 2 + trimmed.len() // +2 for \n\n separator
        };

        if would_be > max_chars && !current_buf.is_empty() {
            passages.push(make_passage(document_id, index, &current_buf));
            index += 1;
            current_buf.clear();
        }

        if trimmed.len() > max_chars {
            if !current_buf.is_empty() {
                passages.push(make_passage(document_id, index, &current_buf));
                index += 1;
                current_buf.clear();
            }
            // Hard split at max_chars, preferring a newline or space boundary
            let mut remaining = trimmed;
            while !remaining.is_empty() {
                let mut split_at = remaining.len().min(max_chars);
                while !remaining.is_char_boundary(split_at) {
                    split_at -= 1;
                }
                let actual_split = if split_at < remaining.len() {
                    remaining[..split_at]
                        .rfind('\n')
                        .or_else(|| remaining[..split_at].rfind(' '))
                        .map(|pos| pos + 1)
                        .unwrap_or(split_at)
                } else {
                    split_at
                };
                let piece = remaining[..actual_split].trim();
                if !piece.is_empty() {
                    passages.push(make_passage(document_id, index, piece));
                    index += 1;
                }
                remaining = &remaining[actual_split..];
            }
        } else {
            if !current_buf.is_empty() {
                current_buf.push_str("\n\n");
            }
            current_buf.push_str(trimmed);
        }
    }

    if !current_buf.is_empty() {
        passages.push(make_passage(document_id, index, &current_buf));
    }

    passages
}

fn make_passage(document_id: &str, index: i64, text: &str) -> Passage {
    Passage {
        id: Uuid::new_v4().to_string(),
        document_id: document_id.to_string(),
        passage_index: index,
        text: text.to_string(),
    }
}
