//! In-memory [`VectorStore`] for tests and embedding hosts.
//!
//! Records live in a `Vec` behind `std::sync::RwLock`. Similarity search is
//! brute-force cosine over every stored vector.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::embedding::cosine_similarity;
use crate::error::{LoreError, Result};
use crate::models::{EmbeddingRecord, EmbeddingType, ScoredRecord};

use super::{is_session_note, RecordCounts, VectorStore};

#[derive(Default)]
pub struct InMemoryStore {
    records: RwLock<Vec<EmbeddingRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored record, in insertion order.
    pub fn records(&self) -> Result<Vec<EmbeddingRecord>> {
        Ok(self.read()?.clone())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Vec<EmbeddingRecord>>> {
        self.records
            .read()
            .map_err(|_| LoreError::store("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Vec<EmbeddingRecord>>> {
        self.records
            .write()
            .map_err(|_| LoreError::store("in-memory store lock poisoned"))
    }

    fn sessions_sorted_desc(&self) -> Result<Vec<EmbeddingRecord>> {
        let mut sessions: Vec<EmbeddingRecord> = self
            .read()?
            .iter()
            .filter(|r| is_session_note(&r.metadata))
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.metadata.session_number.cmp(&a.metadata.session_number));
        Ok(sessions)
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn reset_collection(&self) -> Result<()> {
        self.write()?.clear();
        Ok(())
    }

    async fn document_index(&self) -> Result<HashMap<String, String>> {
        Ok(self
            .read()?
            .iter()
            .filter(|r| r.metadata.embedding_type == Some(EmbeddingType::Document))
            .map(|r| {
                (
                    r.metadata.id.clone(),
                    r.metadata.last_modified.clone().unwrap_or_default(),
                )
            })
            .collect())
    }

    async fn delete_by_lineage(&self, ids: &[String]) -> Result<u64> {
        let mut records = self.write()?;
        let before = records.len();
        records.retain(|r| !ids.contains(&r.metadata.id));
        Ok((before - records.len()) as u64)
    }

    async fn add_records(&self, records: &[EmbeddingRecord]) -> Result<u64> {
        self.write()?.extend(records.iter().cloned());
        Ok(records.len() as u64)
    }

    async fn similarity_search(
        &self,
        query: &[f32],
        limit: usize,
        embedding_type: Option<EmbeddingType>,
    ) -> Result<Vec<ScoredRecord>> {
        let mut scored: Vec<ScoredRecord> = self
            .read()?
            .iter()
            .filter(|r| embedding_type.is_none() || r.metadata.embedding_type == embedding_type)
            .map(|r| ScoredRecord {
                score: cosine_similarity(query, &r.embedding),
                record: r.clone(),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(limit);
        Ok(scored)
    }

    async fn latest_session_note(&self) -> Result<Option<EmbeddingRecord>> {
        Ok(self.sessions_sorted_desc()?.into_iter().next())
    }

    async fn session_notes_before(
        &self,
        session_number: i64,
        limit: usize,
    ) -> Result<Vec<EmbeddingRecord>> {
        Ok(self
            .sessions_sorted_desc()?
            .into_iter()
            .filter(|r| r.metadata.session_number.is_some_and(|n| n < session_number))
            .take(limit)
            .collect())
    }

    async fn count_records(&self) -> Result<RecordCounts> {
        let records = self.read()?;
        let mut counts = RecordCounts::default();
        for r in records.iter() {
            match r.metadata.embedding_type {
                Some(EmbeddingType::Document) => counts.documents += 1,
                Some(EmbeddingType::Chunk) => counts.chunks += 1,
                None => {}
            }
            if is_session_note(&r.metadata) {
                counts.session_notes += 1;
            }
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentMetadata;

    fn record(id: &str, kind: EmbeddingType, vector: Vec<f32>) -> EmbeddingRecord {
        let mut meta = DocumentMetadata::new(id);
        meta.embedding_type = Some(kind);
        meta.last_modified = Some("2024-01-01T00:00:00Z".to_string());
        EmbeddingRecord::new(format!("text {}", id), meta, vector)
    }

    fn session(n: i64) -> EmbeddingRecord {
        let mut r = record(&format!("s{n}"), EmbeddingType::Document, vec![1.0]);
        r.metadata.name = Some(format!("Session Notes {n}"));
        r.metadata.session_number = Some(n);
        r
    }

    #[tokio::test]
    async fn test_document_index_ignores_chunks() {
        let store = InMemoryStore::new();
        store
            .add_records(&[
                record("a", EmbeddingType::Document, vec![1.0]),
                record("a", EmbeddingType::Chunk, vec![1.0]),
                record("b", EmbeddingType::Chunk, vec![1.0]),
            ])
            .await
            .unwrap();

        let index = store.document_index().await.unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index["a"], "2024-01-01T00:00:00Z");
    }

    #[tokio::test]
    async fn test_delete_by_lineage_removes_both_kinds() {
        let store = InMemoryStore::new();
        store
            .add_records(&[
                record("a", EmbeddingType::Document, vec![1.0]),
                record("a", EmbeddingType::Chunk, vec![1.0]),
                record("b", EmbeddingType::Chunk, vec![1.0]),
            ])
            .await
            .unwrap();

        let deleted = store.delete_by_lineage(&["a".to_string()]).await.unwrap();
        assert_eq!(deleted, 2);
        let left = store.records().unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].metadata.id, "b");
    }

    #[tokio::test]
    async fn test_similarity_search_filters_and_orders() {
        let store = InMemoryStore::new();
        store
            .add_records(&[
                record("far", EmbeddingType::Document, vec![0.0, 1.0]),
                record("near", EmbeddingType::Document, vec![1.0, 0.1]),
                record("chunk", EmbeddingType::Chunk, vec![1.0, 0.0]),
            ])
            .await
            .unwrap();

        let hits = store
            .similarity_search(&[1.0, 0.0], 5, Some(EmbeddingType::Document))
            .await
            .unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.record.metadata.id.as_str()).collect();
        assert_eq!(ids, vec!["near", "far"]);
    }

    #[tokio::test]
    async fn test_session_queries() {
        let store = InMemoryStore::new();
        let records: Vec<EmbeddingRecord> = [3, 7, 1, 5, 2, 6, 4].into_iter().map(session).collect();
        store.add_records(&records).await.unwrap();

        let latest = store.latest_session_note().await.unwrap().unwrap();
        assert_eq!(latest.metadata.session_number, Some(7));

        let earlier = store.session_notes_before(7, 5).await.unwrap();
        let numbers: Vec<i64> = earlier
            .iter()
            .filter_map(|r| r.metadata.session_number)
            .collect();
        assert_eq!(numbers, vec![6, 5, 4, 3, 2]);

        let counts = store.count_records().await.unwrap();
        assert_eq!(counts.documents, 7);
        assert_eq!(counts.session_notes, 7);
    }

    #[tokio::test]
    async fn test_reset_clears_everything() {
        let store = InMemoryStore::new();
        store.add_records(&[session(1)]).await.unwrap();
        store.reset_collection().await.unwrap();
        assert_eq!(store.count_records().await.unwrap(), RecordCounts::default());
        assert!(store.latest_session_note().await.unwrap().is_none());
    }
}
