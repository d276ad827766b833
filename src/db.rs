//! SQLite database connection management.
//!
//! One database file holds every collection. The file and its parent
//! directories are created on first connect. Every sync run and every query
//! opens its own pool through [`connect`] and closes it before returning, on
//! success and on failure alike.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::time::Duration;

use crate::config::Config;
use crate::error::{LoreError, Result};

/// Pool for `store.path`: WAL journal, foreign keys on (collection deletes
/// cascade to embeddings), up to 5 connections.
///
/// A reader such as `lore stats` may overlap a running sync; the busy
/// timeout makes it wait for the writer instead of failing with
/// `SQLITE_BUSY`.
pub async fn connect(config: &Config) -> Result<SqlitePool> {
    let path = &config.store.path;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            LoreError::store(format!("cannot create {}: {}", parent.display(), e))
        })?;
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(10))
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    tracing::debug!(path = %path.display(), "opened database");
    Ok(pool)
}
