//! SQLite-backed [`VectorStore`].
//!
//! Records live in the `embeddings` table, keyed to a row in `collections`
//! by the collection's UUID. Metadata is a JSON text column queried with
//! `json_extract`; vectors are little-endian f32 BLOBs scored in Rust.
//!
//! Statements resolve the collection by name on every call, so a
//! [`reset_collection`](VectorStore::reset_collection) (which issues a new
//! UUID) needs no cached state.

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::error::{LoreError, Result};
use crate::models::{
    DocumentMetadata, EmbeddingRecord, EmbeddingType, ScoredRecord, SESSION_NOTES_PREFIX,
};

use super::{RecordCounts, VectorStore};

const COLLECTION_ID: &str = "(SELECT uuid FROM collections WHERE name = ?)";

/// SQLite implementation of [`VectorStore`] for one named collection.
pub struct SqliteStore {
    pool: SqlitePool,
    collection: String,
}

impl SqliteStore {
    /// Bind to `collection`, creating its registry row if missing.
    /// The schema must already exist (see [`crate::migrate`]).
    pub async fn open(pool: SqlitePool, collection: &str) -> Result<Self> {
        let store = Self {
            pool,
            collection: collection.to_string(),
        };
        store.ensure_collection().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the underlying pool.
    pub async fn close(self) {
        self.pool.close().await;
    }

    async fn ensure_collection(&self) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO collections (uuid, name, cmetadata) VALUES (?, ?, NULL)")
            .bind(uuid::Uuid::new_v4().to_string())
            .bind(&self.collection)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn collection_uuid(&self) -> Result<String> {
        let row = sqlx::query("SELECT uuid FROM collections WHERE name = ?")
            .bind(&self.collection)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| {
                LoreError::store(format!("collection '{}' does not exist", self.collection))
            })?;
        Ok(row.get("uuid"))
    }

    /// Fetch document-level session summaries matching an extra predicate,
    /// highest `session_number` first.
    async fn session_rows(
        &self,
        below: Option<i64>,
        limit: usize,
    ) -> Result<Vec<EmbeddingRecord>> {
        let sql = format!(
            r#"
            SELECT id, embedding, document, cmetadata
            FROM embeddings
            WHERE collection_id = {COLLECTION_ID}
              AND json_extract(cmetadata, '$.embedding_type') = 'document'
              AND json_extract(cmetadata, '$.name') GLOB ?
              AND json_extract(cmetadata, '$.session_number') IS NOT NULL
              AND (? IS NULL OR CAST(json_extract(cmetadata, '$.session_number') AS INTEGER) < ?)
            ORDER BY CAST(json_extract(cmetadata, '$.session_number') AS INTEGER) DESC
            LIMIT ?
            "#
        );

        let rows = sqlx::query(&sql)
            .bind(&self.collection)
            .bind(format!("{}*", SESSION_NOTES_PREFIX))
            .bind(below)
            .bind(below)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_record).collect()
    }
}

fn row_to_record(row: &SqliteRow) -> Result<EmbeddingRecord> {
    let blob: Vec<u8> = row.get("embedding");
    let raw: String = row.get("cmetadata");
    let metadata: DocumentMetadata = serde_json::from_str(&raw)
        .map_err(|e| LoreError::store(format!("invalid stored metadata: {}", e)))?;

    Ok(EmbeddingRecord {
        id: row.get("id"),
        embedding: blob_to_vec(&blob),
        document: row.get("document"),
        metadata,
    })
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn reset_collection(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        // Embeddings go with the collection row (ON DELETE CASCADE).
        sqlx::query("DELETE FROM collections WHERE name = ?")
            .bind(&self.collection)
            .execute(&mut *tx)
            .await?;
        sqlx::query("INSERT INTO collections (uuid, name, cmetadata) VALUES (?, ?, NULL)")
            .bind(uuid::Uuid::new_v4().to_string())
            .bind(&self.collection)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(collection = %self.collection, "collection reset");
        Ok(())
    }

    async fn document_index(&self) -> Result<HashMap<String, String>> {
        let sql = format!(
            r#"
            SELECT json_extract(cmetadata, '$.id') AS doc_id,
                   COALESCE(json_extract(cmetadata, '$."last modified"'), '') AS last_modified
            FROM embeddings
            WHERE collection_id = {COLLECTION_ID}
              AND json_extract(cmetadata, '$.embedding_type') = 'document'
            "#
        );

        let rows = sqlx::query(&sql)
            .bind(&self.collection)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| (row.get("doc_id"), row.get("last_modified")))
            .collect())
    }

    async fn delete_by_lineage(&self, ids: &[String]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let sql = format!(
            "DELETE FROM embeddings WHERE collection_id = {COLLECTION_ID} \
             AND json_extract(cmetadata, '$.id') = ?"
        );

        let mut tx = self.pool.begin().await?;
        let mut deleted = 0u64;
        for id in ids {
            let result = sqlx::query(&sql)
                .bind(&self.collection)
                .bind(id)
                .execute(&mut *tx)
                .await?;
            deleted += result.rows_affected();
        }
        tx.commit().await?;

        Ok(deleted)
    }

    async fn add_records(&self, records: &[EmbeddingRecord]) -> Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        let collection_id = self.collection_uuid().await?;
        let mut tx = self.pool.begin().await?;
        for record in records {
            let metadata = serde_json::to_string(&record.metadata).map_err(LoreError::store)?;
            sqlx::query(
                "INSERT INTO embeddings (id, collection_id, embedding, document, cmetadata) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&record.id)
            .bind(&collection_id)
            .bind(vec_to_blob(&record.embedding))
            .bind(&record.document)
            .bind(metadata)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(records.len() as u64)
    }

    async fn similarity_search(
        &self,
        query: &[f32],
        limit: usize,
        embedding_type: Option<EmbeddingType>,
    ) -> Result<Vec<ScoredRecord>> {
        let sql = format!(
            r#"
            SELECT id, embedding, document, cmetadata
            FROM embeddings
            WHERE collection_id = {COLLECTION_ID}
              AND (? IS NULL OR json_extract(cmetadata, '$.embedding_type') = ?)
            "#
        );

        let kind = embedding_type.map(|t| t.as_str());
        let rows = sqlx::query(&sql)
            .bind(&self.collection)
            .bind(kind)
            .bind(kind)
            .fetch_all(&self.pool)
            .await?;

        let mut scored = Vec::with_capacity(rows.len());
        for row in &rows {
            let record = row_to_record(row)?;
            scored.push(ScoredRecord {
                score: cosine_similarity(query, &record.embedding),
                record,
            });
        }

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(limit);

        Ok(scored)
    }

    async fn latest_session_note(&self) -> Result<Option<EmbeddingRecord>> {
        Ok(self.session_rows(None, 1).await?.into_iter().next())
    }

    async fn session_notes_before(
        &self,
        session_number: i64,
        limit: usize,
    ) -> Result<Vec<EmbeddingRecord>> {
        self.session_rows(Some(session_number), limit).await
    }

    async fn count_records(&self) -> Result<RecordCounts> {
        let sql = format!(
            r#"
            SELECT
                COALESCE(SUM(json_extract(cmetadata, '$.embedding_type') = 'document'), 0) AS documents,
                COALESCE(SUM(json_extract(cmetadata, '$.embedding_type') = 'chunk'), 0) AS chunks,
                COALESCE(SUM(
                    json_extract(cmetadata, '$.embedding_type') = 'document'
                    AND json_extract(cmetadata, '$.name') GLOB ?
                    AND json_extract(cmetadata, '$.session_number') IS NOT NULL
                ), 0) AS session_notes
            FROM embeddings
            WHERE collection_id = {COLLECTION_ID}
            "#
        );

        let row = sqlx::query(&sql)
            .bind(format!("{}*", SESSION_NOTES_PREFIX))
            .bind(&self.collection)
            .fetch_one(&self.pool)
            .await?;

        let documents: i64 = row.get("documents");
        let chunks: i64 = row.get("chunks");
        let session_notes: i64 = row.get("session_notes");

        Ok(RecordCounts {
            documents: documents as u64,
            chunks: chunks as u64,
            session_notes: session_notes as u64,
        })
    }
}
