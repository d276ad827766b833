//! Vector store synchronization.
//!
//! Coordinates the write path: source → tagging and chunking → embedding →
//! store. Two modes:
//!
//! - **Full**: embed and insert every fetched document. With `reset` the
//!   collection is dropped first; without it, existing records of the
//!   fetched identities are removed before insertion.
//! - **Incremental**: diff the fetch against the store's document index and
//!   only touch new and updated identities.
//!
//! Per identity, a successful sync leaves exactly one document-level record
//! and one generation of chunk-level records. Records for an updated identity
//! are deleted before anything new is inserted. A batch containing a
//! document without a parseable `last modified` is rejected before any
//! write. Nothing is retried; a run that fails after the delete leaves the
//! identity absent, and the next run picks it up as new.

use std::collections::HashSet;

use crate::chunk::{prepare_batch, TextSplitter};
use crate::config::{ChunkingConfig, Config};
use crate::db;
use crate::diff::{check_timestamps, diff};
use crate::embedding::{create_embedder, embed_in_batches, Embedder};
use crate::error::Result;
use crate::migrate::migrate_pool;
use crate::models::{Document, EmbeddingRecord};
use crate::source::{DocumentSource, NotionSource};
use crate::store::{SqliteStore, VectorStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Reload every fetched document; `reset` drops the collection first.
    Full { reset: bool },
    Incremental,
}

/// Outcome of one sync run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub fetched: u64,
    pub new: u64,
    pub updated: u64,
    pub unchanged: u64,
    /// Records removed before insertion.
    pub deleted: u64,
    /// Chunk-level records inserted (estimated on a dry run).
    pub chunk_records: u64,
    /// Document-level records inserted (estimated on a dry run).
    pub document_records: u64,
    pub dry_run: bool,
}

impl SyncReport {
    /// True when the run neither deleted nor inserted anything.
    pub fn is_noop(&self) -> bool {
        self.deleted == 0 && self.chunk_records == 0 && self.document_records == 0
    }
}

/// Writes batches of documents into one collection.
pub struct Synchronizer<'a> {
    store: &'a dyn VectorStore,
    embedder: &'a dyn Embedder,
    splitter: TextSplitter,
    batch_size: usize,
}

impl<'a> Synchronizer<'a> {
    pub fn new(
        store: &'a dyn VectorStore,
        embedder: &'a dyn Embedder,
        chunking: &ChunkingConfig,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            embedder,
            splitter: TextSplitter::from_config(chunking),
            batch_size,
        }
    }

    /// Load `documents` as the full content of the collection.
    ///
    /// With `reset` the collection is dropped and recreated first and no
    /// diff is consulted. Every document must carry a parseable
    /// `last modified`; the store is untouched otherwise.
    pub async fn initialise(&self, documents: Vec<Document>, reset: bool) -> Result<SyncReport> {
        check_timestamps(&documents)?;

        let mut report = SyncReport {
            fetched: documents.len() as u64,
            new: documents.len() as u64,
            ..Default::default()
        };

        if reset {
            self.store.reset_collection().await?;
        } else {
            let ids = lineage_ids(&documents);
            report.deleted = self.store.delete_by_lineage(&ids).await?;
        }

        let (chunks, docs) = self.embed_and_insert(documents).await?;
        report.chunk_records = chunks;
        report.document_records = docs;

        tracing::info!(
            documents = report.document_records,
            chunks = report.chunk_records,
            reset,
            "full load complete"
        );
        Ok(report)
    }

    /// Apply a diff: drop every record of the updated identities, then
    /// insert fresh records for new and updated documents.
    pub async fn apply_incremental(
        &self,
        new_docs: Vec<Document>,
        updated_docs: Vec<Document>,
    ) -> Result<SyncReport> {
        check_timestamps(&new_docs)?;
        check_timestamps(&updated_docs)?;

        let mut report = SyncReport {
            new: new_docs.len() as u64,
            updated: updated_docs.len() as u64,
            ..Default::default()
        };

        if !updated_docs.is_empty() {
            let ids = lineage_ids(&updated_docs);
            report.deleted = self.store.delete_by_lineage(&ids).await?;
            tracing::info!(
                identities = ids.len(),
                records = report.deleted,
                "removed superseded records"
            );
        }

        let mut batch = new_docs;
        batch.extend(updated_docs);
        if batch.is_empty() {
            return Ok(report);
        }

        let (chunks, docs) = self.embed_and_insert(batch).await?;
        report.chunk_records = chunks;
        report.document_records = docs;
        Ok(report)
    }

    /// Diff `fetched` against the store and apply the result.
    pub async fn sync_incremental(&self, fetched: Vec<Document>) -> Result<SyncReport> {
        let fetched_count = fetched.len() as u64;
        let index = self.store.document_index().await?;
        let delta = diff(fetched, &index)?;
        let unchanged = delta.unchanged as u64;

        let mut report = self.apply_incremental(delta.new, delta.updated).await?;
        report.fetched = fetched_count;
        report.unchanged = unchanged;
        Ok(report)
    }

    /// Classify without writing; record counts are estimates.
    pub async fn plan(&self, fetched: Vec<Document>, mode: SyncMode) -> Result<SyncReport> {
        let mut report = SyncReport {
            fetched: fetched.len() as u64,
            dry_run: true,
            ..Default::default()
        };

        let batch = match mode {
            SyncMode::Full { .. } => {
                check_timestamps(&fetched)?;
                report.new = fetched.len() as u64;
                fetched
            }
            SyncMode::Incremental => {
                let index = self.store.document_index().await?;
                let delta = diff(fetched, &index)?;
                report.new = delta.new.len() as u64;
                report.updated = delta.updated.len() as u64;
                report.unchanged = delta.unchanged as u64;
                delta.new.into_iter().chain(delta.updated).collect()
            }
        };

        let (docs, chunks) = prepare_batch(batch, &self.splitter);
        report.document_records = docs.len() as u64;
        report.chunk_records = chunks.len() as u64;
        Ok(report)
    }

    /// Tag, chunk, embed and insert a batch in a single store write.
    /// Returns `(chunk records, document records)`.
    async fn embed_and_insert(&self, documents: Vec<Document>) -> Result<(u64, u64)> {
        let (documents, chunks) = prepare_batch(documents, &self.splitter);

        let chunk_texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let doc_texts: Vec<String> = documents.iter().map(|d| d.content.clone()).collect();

        let chunk_vectors = embed_in_batches(self.embedder, &chunk_texts, self.batch_size).await?;
        let doc_vectors = embed_in_batches(self.embedder, &doc_texts, self.batch_size).await?;

        let mut records = Vec::with_capacity(chunks.len() + documents.len());
        for (chunk, vector) in chunks.into_iter().zip(chunk_vectors) {
            records.push(EmbeddingRecord::new(chunk.text, chunk.metadata, vector));
        }
        let chunk_count = records.len() as u64;
        for (doc, vector) in documents.into_iter().zip(doc_vectors) {
            records.push(EmbeddingRecord::new(doc.content, doc.metadata, vector));
        }
        let doc_count = records.len() as u64 - chunk_count;

        self.store.add_records(&records).await?;
        tracing::debug!(chunks = chunk_count, documents = doc_count, "inserted records");

        Ok((chunk_count, doc_count))
    }
}

fn lineage_ids(documents: &[Document]) -> Vec<String> {
    let mut seen = HashSet::new();
    documents
        .iter()
        .map(|d| d.id().to_string())
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

/// Fetch from `source` and synchronize `store` according to `mode`.
pub async fn sync_from_source(
    source: &dyn DocumentSource,
    store: &dyn VectorStore,
    embedder: &dyn Embedder,
    config: &Config,
    mode: SyncMode,
    dry_run: bool,
) -> Result<SyncReport> {
    let fetched = source.fetch_all().await?;
    tracing::info!(source = source.name(), documents = fetched.len(), "fetched documents");

    let sync = Synchronizer::new(
        store,
        embedder,
        &config.chunking,
        config.embedding.batch_size,
    );

    let report = if dry_run {
        sync.plan(fetched, mode).await?
    } else {
        match mode {
            SyncMode::Full { reset } => {
                let fetched_count = fetched.len() as u64;
                let mut report = sync.initialise(fetched, reset).await?;
                report.fetched = fetched_count;
                report
            }
            SyncMode::Incremental => sync.sync_incremental(fetched).await?,
        }
    };

    tracing::info!(
        new = report.new,
        updated = report.updated,
        unchanged = report.unchanged,
        deleted = report.deleted,
        chunk_records = report.chunk_records,
        document_records = report.document_records,
        dry_run,
        "sync finished"
    );
    Ok(report)
}

/// CLI entry point: sync the configured Notion database into the
/// configured SQLite collection. The pool is closed on every exit path.
pub async fn run_sync(config: &Config, mode: SyncMode, dry_run: bool) -> Result<SyncReport> {
    let source = NotionSource::new(&config.source)?;
    let embedder = create_embedder(&config.embedding)?;

    let pool = db::connect(config).await?;
    let result = async {
        migrate_pool(&pool).await?;
        let store = SqliteStore::open(pool.clone(), &config.store.collection).await?;
        sync_from_source(&source, &store, embedder.as_ref(), config, mode, dry_run).await
    }
    .await;
    pool.close().await;

    result
}
