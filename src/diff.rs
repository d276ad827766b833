//! Change detection between a fresh fetch and the persisted index.
//!
//! The index maps document identity to the `last modified` string stored
//! on that identity's document-level record. Nothing else is persisted
//! between runs, so the index alone decides what a sync writes.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::collections::HashMap;

use crate::error::{LoreError, Result};
use crate::models::Document;

/// Classification of a fetch against the persisted index.
#[derive(Debug, Default)]
pub struct Delta {
    /// Identities absent from the index.
    pub new: Vec<Document>,
    /// Identities whose fetched timestamp is strictly newer than the persisted one.
    pub updated: Vec<Document>,
    /// Count of identities left untouched.
    pub unchanged: usize,
}

impl Delta {
    pub fn is_empty(&self) -> bool {
        self.new.is_empty() && self.updated.is_empty()
    }
}

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parse an ISO 8601 timestamp into a naive UTC datetime.
///
/// Offset-aware values are converted to UTC before the offset is dropped,
/// so `2024-01-01T12:00:00+02:00` equals `2024-01-01T10:00:00`.
pub fn parse_timestamp(id: &str, value: &str) -> Result<NaiveDateTime> {
    let trimmed = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.naive_utc());
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Ok(dt);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(date.and_hms_opt(0, 0, 0).unwrap_or_default());
    }

    Err(LoreError::TimestampParseError {
        id: id.to_string(),
        value: value.to_string(),
    })
}

/// Parsed `last modified` of a fetched document.
///
/// A document without one is malformed.
pub fn fetched_timestamp(doc: &Document) -> Result<NaiveDateTime> {
    let value = doc.metadata.last_modified.as_deref().ok_or_else(|| {
        LoreError::MalformedDocument(format!("document {} has no last modified time", doc.id()))
    })?;
    parse_timestamp(doc.id(), value)
}

/// Fail on the first document whose `last modified` is missing or unparseable.
pub fn check_timestamps(documents: &[Document]) -> Result<()> {
    documents.iter().try_for_each(|doc| fetched_timestamp(doc).map(|_| ()))
}

/// Partition `fresh` into new, updated and unchanged documents.
///
/// Every fetched document needs a parseable `last modified`, new ones
/// included, so nothing uncomparable reaches the store.
pub fn diff(fresh: Vec<Document>, persisted: &HashMap<String, String>) -> Result<Delta> {
    let mut delta = Delta::default();

    for doc in fresh {
        let fetched_at = fetched_timestamp(&doc)?;

        let Some(stored) = persisted.get(doc.id()) else {
            delta.new.push(doc);
            continue;
        };
        let stored_at = parse_timestamp(doc.id(), stored)?;

        if fetched_at > stored_at {
            delta.updated.push(doc);
        } else {
            delta.unchanged += 1;
        }
    }

    tracing::debug!(
        new = delta.new.len(),
        updated = delta.updated.len(),
        unchanged = delta.unchanged,
        "diff complete"
    );

    Ok(delta)
}
