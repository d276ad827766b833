//! Document sources.
//!
//! A [`DocumentSource`] returns the complete current set of documents from
//! an external system. Sources only read; they never touch the store.

pub mod notion;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::Document;

pub use notion::NotionSource;

#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Short identifier used in logs (e.g. `"notion"`).
    fn name(&self) -> &str;

    /// Fetch every document with its metadata.
    ///
    /// Fails with `SourceUnavailable` on transport or status errors and
    /// `MalformedDocument` when an entry lacks its `id`.
    async fn fetch_all(&self) -> Result<Vec<Document>>;
}
