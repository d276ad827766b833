//! Database schema migrations.
//!
//! Two logical tables joined by a collection identifier: a collection
//! registry (`name → uuid`) and an embedding table holding the vector,
//! the original text and a JSON metadata bag. Every statement is
//! idempotent; running the migrations twice is safe.

use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;
use crate::error::Result;

/// Connect to the configured database and create the schema.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let result = migrate_pool(&pool).await;
    pool.close().await;
    result
}

/// Create the schema on an existing pool.
pub async fn migrate_pool(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS collections (
            uuid TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            cmetadata TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS embeddings (
            id TEXT PRIMARY KEY,
            collection_id TEXT NOT NULL,
            embedding BLOB NOT NULL,
            document TEXT NOT NULL,
            cmetadata TEXT NOT NULL DEFAULT '{}',
            FOREIGN KEY (collection_id) REFERENCES collections(uuid) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_embeddings_collection ON embeddings(collection_id)",
    )
    .execute(pool)
    .await?;

    // Lineage lookups (diff index, delete-by-id) filter on the metadata id.
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_embeddings_lineage \
         ON embeddings(collection_id, json_extract(cmetadata, '$.id'))",
    )
    .execute(pool)
    .await?;

    Ok(())
}
