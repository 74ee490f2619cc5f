//! Document and conversation persistence.
//!
//! Thin stores over the shared [`SqlitePool`]. Methods return `sqlx::Error`
//! directly; callers in the chat path convert to
//! [`ChatError::PersistenceFailed`](crate::error::ChatError) via `?`.
//!
//! Ownership is enforced at the query level: [`DocumentStore::find_owned`]
//! filters by both id and user, so a caller probing someone else's document
//! gets the same `None` as a nonexistent id.

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::models::{Document, Message, UploadStatus};

/// Current wall-clock time in unix milliseconds.
pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// ============ Documents ============

#[derive(Clone)]
pub struct DocumentStore {
    pool: SqlitePool,
}

impl DocumentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new document in `PENDING` state and return it.
    pub async fn create(
        &self,
        user_id: &str,
        name: &str,
        storage_path: &str,
    ) -> Result<Document, sqlx::Error> {
        let doc = Document {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            name: name.to_string(),
            storage_path: storage_path.to_string(),
            status: UploadStatus::Pending,
            created_at: now_ms(),
            updated_at: now_ms(),
        };

        sqlx::query(
            r#"
            INSERT INTO documents (id, user_id, name, storage_path, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.user_id)
        .bind(&doc.name)
        .bind(&doc.storage_path)
        .bind(doc.status.as_str())
        .bind(doc.created_at)
        .bind(doc.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(doc)
    }

    pub async fn set_status(&self, id: &str, status: UploadStatus) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE documents SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(now_ms())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<Document>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT id, user_id, name, storage_path, status, created_at, updated_at
             FROM documents WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| document_from_row(&r)))
    }

    /// Look up a document only if `user_id` owns it.
    ///
    /// Returns `None` both for unknown ids and for documents owned by someone
    /// else, so the API cannot distinguish the two cases.
    pub async fn find_owned(
        &self,
        id: &str,
        user_id: &str,
    ) -> Result<Option<Document>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT id, user_id, name, storage_path, status, created_at, updated_at
             FROM documents WHERE id = ? AND user_id = ?",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| document_from_row(&r)))
    }

    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<Document>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT id, user_id, name, storage_path, status, created_at, updated_at
             FROM documents WHERE user_id = ? ORDER BY created_at DESC, id ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(document_from_row).collect())
    }
}

fn document_from_row(row: &SqliteRow) -> Document {
    let status: String = row.get("status");
    Document {
        id: row.get("id"),
        user_id: row.get("user_id"),
        name: row.get("name"),
        storage_path: row.get("storage_path"),
        // CHECK constraint keeps the column within known values
        status: UploadStatus::parse(&status).unwrap_or(UploadStatus::Pending),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

// ============ Messages ============

#[derive(Clone)]
pub struct ConversationStore {
    pool: SqlitePool,
}

impl ConversationStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn append(
        &self,
        document_id: &str,
        user_id: &str,
        text: &str,
        is_user_message: bool,
    ) -> Result<Message, sqlx::Error> {
        let message = Message {
            id: Uuid::new_v4().to_string(),
            document_id: document_id.to_string(),
            user_id: user_id.to_string(),
            text: text.to_string(),
            is_user_message,
            created_at: now_ms(),
        };

        sqlx::query(
            r#"
            INSERT INTO messages (id, document_id, user_id, text, is_user_message, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&message.id)
        .bind(&message.document_id)
        .bind(&message.user_id)
        .bind(&message.text)
        .bind(message.is_user_message)
        .bind(message.created_at)
        .execute(&self.pool)
        .await?;

        Ok(message)
    }

    /// The most recent `limit` messages for a document, oldest first.
    ///
    /// Fetches newest-first with a rowid tiebreak (several messages can land
    /// in the same millisecond) and reverses, so the window always holds the
    /// latest turns in conversation order.
    pub async fn recent(&self, document_id: &str, limit: i64) -> Result<Vec<Message>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT id, document_id, user_id, text, is_user_message, created_at
             FROM messages WHERE document_id = ?
             ORDER BY created_at DESC, rowid DESC LIMIT ?",
        )
        .bind(document_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut messages: Vec<Message> = rows.iter().map(message_from_row).collect();
        messages.reverse();
        Ok(messages)
    }

    /// All messages for a document, oldest first.
    pub async fn list(&self, document_id: &str) -> Result<Vec<Message>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT id, document_id, user_id, text, is_user_message, created_at
             FROM messages WHERE document_id = ?
             ORDER BY created_at ASC, rowid ASC",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(message_from_row).collect())
    }
}

fn message_from_row(row: &SqliteRow) -> Message {
    Message {
        id: row.get("id"),
        document_id: row.get("document_id"),
        user_id: row.get("user_id"),
        text: row.get("text"),
        is_user_message: row.get("is_user_message"),
        created_at: row.get("created_at"),
    }
}
