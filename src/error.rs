//! Error taxonomy for the sync and retrieval pipeline.
//!
//! Every library entry point returns [`LoreError`]. Nothing in the core
//! retries; failures propagate to the caller, which decides whether to
//! re-run a sync or surface a generic reply.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, LoreError>;

#[derive(Debug, Error)]
pub enum LoreError {
    /// The external document source could not be reached or refused the request.
    #[error("document source unavailable: {0}")]
    SourceUnavailable(String),

    /// A fetched document lacks required metadata (its `id` or `last modified`).
    #[error("malformed document: {0}")]
    MalformedDocument(String),

    /// A last-modified timestamp is not valid ISO 8601.
    #[error("cannot parse timestamp '{value}' for document {id}")]
    TimestampParseError { id: String, value: String },

    /// The embedding store failed: connection, query, or stored-row decoding.
    #[error("store error: {0}")]
    StoreConnectionError(String),

    /// The embedding or completion model call failed.
    #[error("generation model error: {0}")]
    GenerationModelError(String),

    /// The narrative flow found no session-notes documents in the collection.
    #[error("no session notes found in collection")]
    NoSessionNotes,

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl LoreError {
    pub fn store<E: std::fmt::Display>(err: E) -> Self {
        LoreError::StoreConnectionError(err.to_string())
    }

    pub fn generation<E: std::fmt::Display>(err: E) -> Self {
        LoreError::GenerationModelError(err.to_string())
    }

    pub fn source<E: std::fmt::Display>(err: E) -> Self {
        LoreError::SourceUnavailable(err.to_string())
    }
}

impl From<sqlx::Error> for LoreError {
    fn from(err: sqlx::Error) -> Self {
        LoreError::StoreConnectionError(err.to_string())
    }
}
