//! SQLite-backed vector index, partitioned by document namespace.
//!
//! Each document's passages live under `namespace = document id`; a search
//! never sees rows from another namespace, which is what isolates unrelated
//! documents from each other. Vectors are stored as little-endian f32 BLOBs
//! and cosine-ranked in process. Namespaces are written once by ingestion and
//! read on every chat turn.

use anyhow::{bail, Result};
use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::models::{Passage, RetrievedPassage};

pub struct VectorIndex {
    pool: SqlitePool,
}

impl VectorIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Replace the namespace contents for a document in one transaction.
    ///
    /// `passages` and `vectors` are parallel slices (one vector per passage).
    pub async fn replace_passages(
        &self,
        document_id: &str,
        passages: &[Passage],
        vectors: &[Vec<f32>],
        model: &str,
        dims: usize,
    ) -> Result<()> {
        if passages.len() != vectors.len() {
            bail!(
                "passage/vector count mismatch: {} passages, {} vectors",
                passages.len(),
                vectors.len()
            );
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM passages WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;

        for (passage, vector) in passages.iter().zip(vectors.iter()) {
            sqlx::query(
                r#"
                INSERT INTO passages (id, document_id, passage_index, text, embedding, model, dims)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&passage.id)
            .bind(document_id)
            .bind(passage.passage_index)
            .bind(&passage.text)
            .bind(vec_to_blob(vector))
            .bind(model)
            .bind(dims as i64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Number of passages stored under a document's namespace.
    pub async fn namespace_size(&self, document_id: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM passages WHERE document_id = ?")
            .bind(document_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Top-k passages by cosine similarity within one namespace.
    ///
    /// Scores all vectors in the namespace in process (namespaces are one
    /// document's worth of passages, small by construction) and sorts by
    /// similarity desc, passage index asc for deterministic ties.
    pub async fn search(
        &self,
        document_id: &str,
        query_vec: &[f32],
        k: i64,
    ) -> Result<Vec<RetrievedPassage>> {
        let rows = sqlx::query(
            "SELECT passage_index, text, embedding FROM passages WHERE document_id = ?",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;

        struct Scored {
            passage_index: i64,
            text: String,
            score: f64,
        }

        let mut scored: Vec<Scored> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vec = blob_to_vec(&blob);
                Scored {
                    passage_index: row.get("passage_index"),
                    text: row.get("text"),
                    score: cosine_similarity(query_vec, &vec) as f64,
                }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.passage_index.cmp(&b.passage_index))
        });
        scored.truncate(k.max(0) as usize);

        Ok(scored
            .into_iter()
            .map(|s| RetrievedPassage {
                text: s.text,
                score: s.score,
            })
            .collect())
    }
}
