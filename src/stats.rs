//! Collection statistics.
//!
//! A quick summary of what's stored: record counts per kind, session
//! coverage, and a per-collection breakdown. Used by `lore stats` to confirm
//! that syncs land where expected.

use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::error::Result;
use crate::migrate::migrate_pool;
use crate::store::{RecordCounts, SqliteStore, VectorStore};

/// Per-collection breakdown row.
struct CollectionStats {
    name: String,
    documents: i64,
    chunks: i64,
    newest_edit: Option<String>,
}

/// Query the database and print a summary of the configured collection.
pub async fn run_stats(config: &Config) -> Result<RecordCounts> {
    let pool = db::connect(config).await?;
    let result = print_stats(&pool, config).await;
    pool.close().await;
    result
}

async fn print_stats(pool: &SqlitePool, config: &Config) -> Result<RecordCounts> {
    migrate_pool(pool).await?;
    let store = SqliteStore::open(pool.clone(), &config.store.collection).await?;
    let counts = store.count_records().await?;
    let latest = store.latest_session_note().await?;

    let db_size = std::fs::metadata(&config.store.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Loremaster — Collection Stats");
    println!("=============================");
    println!();
    println!("  Database:       {}", config.store.path.display());
    println!("  Size:           {}", format_bytes(db_size));
    println!("  Collection:     {}", config.store.collection);
    println!();
    println!("  Documents:      {}", counts.documents);
    println!("  Chunks:         {}", counts.chunks);
    println!("  Session notes:  {}", counts.session_notes);
    match latest.and_then(|r| r.metadata.session_number) {
        Some(n) => println!("  Latest session: {}", n),
        None => println!("  Latest session: none"),
    }

    let rows = sqlx::query(
        r#"
        SELECT
            c.name AS name,
            COALESCE(SUM(json_extract(e.cmetadata, '$.embedding_type') = 'document'), 0) AS documents,
            COALESCE(SUM(json_extract(e.cmetadata, '$.embedding_type') = 'chunk'), 0) AS chunks,
            MAX(json_extract(e.cmetadata, '$."last modified"')) AS newest_edit
        FROM collections c
        LEFT JOIN embeddings e ON e.collection_id = c.uuid
        GROUP BY c.name
        ORDER BY documents DESC
        "#,
    )
    .fetch_all(pool)
    .await?;

    let collections: Vec<CollectionStats> = rows
        .iter()
        .map(|row| CollectionStats {
            name: row.get("name"),
            documents: row.get("documents"),
            chunks: row.get("chunks"),
            newest_edit: row.get("newest_edit"),
        })
        .collect();

    if collections.len() > 1 {
        println!();
        println!("  By collection:");
        println!(
            "  {:<24} {:>6} {:>8}   {}",
            "COLLECTION", "DOCS", "CHUNKS", "NEWEST EDIT"
        );
        println!("  {}", "-".repeat(64));

        for c in &collections {
            println!(
                "  {:<24} {:>6} {:>8}   {}",
                c.name,
                c.documents,
                c.chunks,
                c.newest_edit.as_deref().unwrap_or("never")
            );
        }
    }

    println!();
    Ok(counts)
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }
}
