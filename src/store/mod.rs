//! Storage abstraction for the embedding collection.
//!
//! The [`VectorStore`] trait covers every operation the synchronizer and the
//! composer need, scoped to one named collection. Two backends:
//!
//! - [`SqliteStore`](sqlite::SqliteStore) for the CLI, persisted in a
//!   single SQLite file.
//! - [`InMemoryStore`](memory::InMemoryStore) for tests and embedding hosts.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::Result;
use crate::models::{DocumentMetadata, EmbeddingRecord, EmbeddingType, ScoredRecord, SESSION_NOTES_PREFIX};

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// Record counts for one collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordCounts {
    pub documents: u64,
    pub chunks: u64,
    /// Document-level records that qualify for the narrative flow.
    pub session_notes: u64,
}

/// Abstract embedding collection.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`reset_collection`](VectorStore::reset_collection) | Drop every record and recreate the collection |
/// | [`document_index`](VectorStore::document_index) | `id → last modified` of document-level records |
/// | [`delete_by_lineage`](VectorStore::delete_by_lineage) | Remove all records of the given identities |
/// | [`add_records`](VectorStore::add_records) | Insert embedded records |
/// | [`similarity_search`](VectorStore::similarity_search) | Cosine top-k over the collection |
/// | [`latest_session_note`](VectorStore::latest_session_note) | Highest-numbered session summary |
/// | [`session_notes_before`](VectorStore::session_notes_before) | Earlier session summaries, newest first |
/// | [`count_records`](VectorStore::count_records) | Counts per record kind |
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Delete the collection with all its records and recreate it empty.
    async fn reset_collection(&self) -> Result<()>;

    /// Map each document-level record's `id` to its stored `last modified`.
    ///
    /// A record stored without `last modified` maps to an empty string.
    async fn document_index(&self) -> Result<HashMap<String, String>>;

    /// Delete every record, document-level and chunk-level, whose lineage
    /// `id` is in `ids`. Returns the number of records removed.
    async fn delete_by_lineage(&self, ids: &[String]) -> Result<u64>;

    /// Insert records. All-or-nothing per call.
    async fn add_records(&self, records: &[EmbeddingRecord]) -> Result<u64>;

    /// Top `limit` records by cosine similarity to `query`, best first,
    /// optionally restricted to one record kind.
    async fn similarity_search(
        &self,
        query: &[f32],
        limit: usize,
        embedding_type: Option<EmbeddingType>,
    ) -> Result<Vec<ScoredRecord>>;

    /// The session summary with the highest `session_number`.
    async fn latest_session_note(&self) -> Result<Option<EmbeddingRecord>>;

    /// Up to `limit` session summaries numbered below `session_number`,
    /// highest number first.
    async fn session_notes_before(
        &self,
        session_number: i64,
        limit: usize,
    ) -> Result<Vec<EmbeddingRecord>>;

    async fn count_records(&self) -> Result<RecordCounts>;
}

/// Whether a record belongs to the narrative flow's candidate set:
/// a numbered, document-level record named like a session summary.
pub fn is_session_note(metadata: &DocumentMetadata) -> bool {
    metadata.embedding_type == Some(EmbeddingType::Document)
        && metadata.session_number.is_some()
        && metadata
            .name
            .as_deref()
            .is_some_and(|n| n.starts_with(SESSION_NOTES_PREFIX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SESSION_NOTES_TAG;

    fn summary(name: &str, tags: &[&str]) -> DocumentMetadata {
        let mut metadata = DocumentMetadata::new("n");
        metadata.name = Some(name.to_string());
        metadata.tags = tags.iter().map(|t| t.to_string()).collect();
        metadata.embedding_type = Some(EmbeddingType::Document);
        metadata.session_number = Some(3);
        metadata
    }

    #[test]
    fn test_narrative_eligibility_follows_name_not_tag() {
        // Tagged at sync time, then renamed: no longer a narrative candidate.
        let renamed = summary("Prologue", &[SESSION_NOTES_TAG]);
        assert!(renamed.is_session_notes());
        assert!(!is_session_note(&renamed));

        // Named like a summary with its number stored: eligible without the tag.
        let untagged = summary("Session Notes 3", &[]);
        assert!(!untagged.is_session_notes());
        assert!(is_session_note(&untagged));
    }

    #[test]
    fn test_narrative_eligibility_needs_number_and_document_level() {
        let mut unnumbered = summary("Session Notes", &[SESSION_NOTES_TAG]);
        unnumbered.session_number = None;
        assert!(!is_session_note(&unnumbered));

        let mut chunk = summary("Session Notes 3", &[SESSION_NOTES_TAG]);
        chunk.embedding_type = Some(EmbeddingType::Chunk);
        assert!(!is_session_note(&chunk));
    }
}
