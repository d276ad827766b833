//! Core data models used throughout the pipeline.
//!
//! These types represent the documents, chunks and persisted embedding
//! records that flow through the sync (write) and composer (read) paths.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tag that marks a fetched document as a session summary.
///
/// Read at sync time: tagged documents get a `session_number` parsed from
/// their name and take part in `is_latest` tagging. Tags are not consulted
/// when reading the store back.
pub const SESSION_NOTES_TAG: &str = "Session Notes";

/// Name prefix of stored session summaries.
///
/// Read at query time: the narrative flow only picks document-level records
/// whose name starts with this and that carry a `session_number`. Same text
/// as [`SESSION_NOTES_TAG`], but a tagged page renamed away from it drops out
/// of the narrative.
pub const SESSION_NOTES_PREFIX: &str = "Session Notes";

/// Whether a persisted record holds a whole document or a fragment of one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingType {
    Document,
    Chunk,
}

impl EmbeddingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbeddingType::Document => "document",
            EmbeddingType::Chunk => "chunk",
        }
    }
}

/// Structured metadata attached to documents, chunks and stored records.
///
/// Known fields are typed; anything else the source provides is kept in
/// `extra` and round-trips through the store untouched. The JSON keys match
/// the source's property names (`created time`, `last modified`), so the
/// stored metadata bag can be queried by those names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Stable external identity; also the lineage key for chunks.
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(
        rename = "created time",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub created_time: Option<String>,
    #[serde(
        rename = "last modified",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub last_modified: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_type: Option<EmbeddingType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_number: Option<i64>,
    /// Deprecated: only ever set within one sync batch. Retrieval orders by
    /// `session_number` instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_latest: Option<bool>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl DocumentMetadata {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn is_session_notes(&self) -> bool {
        self.tags.iter().any(|t| t == SESSION_NOTES_TAG)
    }
}

/// A source document as fetched. Never mutated after the fetch; a newer
/// fetch of the same identity supersedes it.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub content: String,
    pub metadata: DocumentMetadata,
}

impl Document {
    pub fn new(content: impl Into<String>, metadata: DocumentMetadata) -> Self {
        Self {
            content: content.into(),
            metadata,
        }
    }

    pub fn id(&self) -> &str {
        &self.metadata.id
    }
}

/// A bounded fragment of one document's text.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub text: String,
    pub metadata: DocumentMetadata,
}

impl Chunk {
    /// Identity of the document this chunk was cut from.
    pub fn lineage(&self) -> &str {
        &self.metadata.id
    }
}

/// A row in the embedding table: vector, original text and metadata.
#[derive(Debug, Clone)]
pub struct EmbeddingRecord {
    /// Record UUID (distinct from the lineage `metadata.id`).
    pub id: String,
    pub embedding: Vec<f32>,
    pub document: String,
    pub metadata: DocumentMetadata,
}

impl EmbeddingRecord {
    pub fn new(document: String, metadata: DocumentMetadata, embedding: Vec<f32>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            embedding,
            document,
            metadata,
        }
    }
}

/// A record returned from a similarity search with its score.
#[derive(Debug, Clone)]
pub struct ScoredRecord {
    pub record: EmbeddingRecord,
    /// Cosine similarity to the query vector.
    pub score: f32,
}
