//! Recursive separator text chunker and batch tagging.
//!
//! Splits document text into [`Chunk`]s no longer than `chunk_size`
//! characters, preferring structural boundaries (rules, headers,
//! paragraphs) over finer ones (lines, sentences, words, characters).
//!
//! # Algorithm
//!
//! 1. Pick the first separator in the priority list that occurs in the text.
//!    The empty separator always matches and splits into characters.
//! 2. Split on it, keeping the separator at the start of the following piece.
//! 3. Pieces shorter than `chunk_size` are merged greedily into chunks. When a
//!    chunk is emitted, trailing pieces totalling at most `chunk_overlap`
//!    characters are carried into the next one.
//! 4. Pieces that are still too long are split recursively with the
//!    remaining, finer separators.
//!
//! Lengths are counted in characters, not bytes, so multi-byte text never
//! splits inside a code point.
//!
//! Batch tagging ([`prepare_batch`]) runs before splitting so chunks inherit
//! `session_number` and `is_latest` from their parent.

use regex::Regex;
use std::collections::VecDeque;
use std::sync::OnceLock;

use crate::config::ChunkingConfig;
use crate::diff::parse_timestamp;
use crate::models::{Chunk, Document, EmbeddingType};

/// Size-bounded recursive splitter.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize, separators: Vec<String>) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            chunk_overlap: chunk_overlap.min(chunk_size.saturating_sub(1)),
            separators,
        }
    }

    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self::new(
            config.chunk_size,
            config.chunk_overlap,
            config.separators.clone(),
        )
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Split `text` into trimmed, non-empty chunks of at most `chunk_size` characters.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &self.separators)
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let mut final_chunks = Vec::new();

        let mut separator = separators.last().map(String::as_str).unwrap_or("");
        let mut finer: &[String] = &[];
        for (i, s) in separators.iter().enumerate() {
            if s.is_empty() {
                separator = "";
                break;
            }
            if text.contains(s.as_str()) {
                separator = s.as_str();
                finer = &separators[i + 1..];
                break;
            }
        }

        let mut good: Vec<&str> = Vec::new();
        for piece in split_keeping_separator(text, separator) {
            if char_len(piece) < self.chunk_size {
                good.push(piece);
                continue;
            }

            if !good.is_empty() {
                final_chunks.extend(self.merge_splits(&good));
                good.clear();
            }

            if !finer.is_empty() {
                final_chunks.extend(self.split_recursive(piece, finer));
            } else if char_len(piece) > self.chunk_size {
                // Separator list exhausted without reaching the empty
                // separator: fall back to characters to keep the bound.
                let chars = split_keeping_separator(piece, "");
                final_chunks.extend(self.merge_splits(&chars));
            } else {
                let trimmed = piece.trim();
                if !trimmed.is_empty() {
                    final_chunks.push(trimmed.to_string());
                }
            }
        }

        if !good.is_empty() {
            final_chunks.extend(self.merge_splits(&good));
        }

        final_chunks
    }

    /// Greedily merge small pieces into chunks, carrying overlap forward.
    fn merge_splits(&self, splits: &[&str]) -> Vec<String> {
        let mut docs = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for &piece in splits {
            let len = char_len(piece);

            if total + len > self.chunk_size && !current.is_empty() {
                push_joined(&mut docs, &current);

                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    match current.pop_front() {
                        Some(front) => total -= char_len(front),
                        None => break,
                    }
                }
            }

            current.push_back(piece);
            total += len;
        }

        push_joined(&mut docs, &current);
        docs
    }
}

fn push_joined(docs: &mut Vec<String>, current: &VecDeque<&str>) {
    let joined: String = current.iter().copied().collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        docs.push(trimmed.to_string());
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Split on `separator`, attaching each separator to the start of the
/// piece that follows it. Empty pieces are dropped. The empty separator
/// splits into individual characters.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices(separator) {
        if idx > start {
            pieces.push(&text[start..idx]);
        }
        start = idx;
    }
    pieces.push(&text[start..]);
    pieces.retain(|p| !p.is_empty());
    pieces
}

/// Normalize extracted page text before splitting.
///
/// Replaces the ligature code points PDF-to-Notion imports leave behind,
/// turns NUL bytes into spaces and drops everything outside ASCII.
pub fn sanitize_text(text: &str) -> String {
    text.replace(['\u{e05c}', '\u{fb01}'], "fi")
        .replace('\0', " ")
        .chars()
        .filter(|c| c.is_ascii())
        .collect()
}

/// Split every document into chunks tagged `embedding_type = chunk`.
///
/// Each chunk carries a copy of its parent's metadata, so its `id` is the
/// parent's identity.
pub fn chunk_documents(documents: &[Document], splitter: &TextSplitter) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    for doc in documents {
        let clean = sanitize_text(&doc.content);
        for text in splitter.split_text(&clean) {
            let mut metadata = doc.metadata.clone();
            metadata.embedding_type = Some(EmbeddingType::Chunk);
            chunks.push(Chunk { text, metadata });
        }
    }
    chunks
}

/// Tag whole documents with `embedding_type = document`.
pub fn mark_documents(documents: &mut [Document]) {
    for doc in documents {
        doc.metadata.embedding_type = Some(EmbeddingType::Document);
    }
}

fn first_integer(name: &str) -> Option<i64> {
    static DIGITS: OnceLock<Regex> = OnceLock::new();
    let re = DIGITS.get_or_init(|| Regex::new(r"\d+").expect("static regex"));
    re.find(name).and_then(|m| m.as_str().parse().ok())
}

/// Number the session summaries in this batch and flag the newest.
///
/// `session_number` is the first integer in the document name. Among the
/// batch's session documents, the one with the most recent creation time
/// gets `is_latest = true`; documents whose creation time is missing or
/// unparseable are logged and left out of that choice. Records persisted by
/// earlier batches are not revisited.
pub fn tag_session_notes(documents: &mut [Document]) {
    let mut latest: Option<(usize, chrono::NaiveDateTime)> = None;

    for (i, doc) in documents.iter_mut().enumerate() {
        if !doc.metadata.is_session_notes() {
            continue;
        }

        let name = doc.metadata.name.as_deref().unwrap_or_default();
        match first_integer(name) {
            Some(n) => doc.metadata.session_number = Some(n),
            None => tracing::warn!(
                id = %doc.metadata.id,
                name,
                "session notes document has no session number in its name"
            ),
        }

        let created = match doc.metadata.created_time.as_deref() {
            Some(ts) => match parse_timestamp(&doc.metadata.id, ts) {
                Ok(created) => Some(created),
                Err(e) => {
                    tracing::warn!(
                        id = %doc.metadata.id,
                        error = %e,
                        "session notes document skipped for is_latest: unparseable created time"
                    );
                    None
                }
            },
            None => {
                tracing::warn!(
                    id = %doc.metadata.id,
                    "session notes document skipped for is_latest: no created time"
                );
                None
            }
        };
        if let Some(created) = created {
            if latest.map_or(true, |(_, best)| created > best) {
                latest = Some((i, created));
            }
        }
    }

    if let Some((i, _)) = latest {
        documents[i].metadata.is_latest = Some(true);
    }
}

/// Tag a batch and derive its chunks.
///
/// Returns the documents marked `embedding_type = document` and the chunks
/// cut from them, in document order.
pub fn prepare_batch(
    mut documents: Vec<Document>,
    splitter: &TextSplitter,
) -> (Vec<Document>, Vec<Chunk>) {
    tag_session_notes(&mut documents);
    mark_documents(&mut documents);
    let chunks = chunk_documents(&documents, splitter);
    (documents, chunks)
}
