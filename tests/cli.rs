use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

use loremaster::config::load_config;
use loremaster::models::{DocumentMetadata, EmbeddingRecord, EmbeddingType};
use loremaster::store::{SqliteStore, VectorStore};
use loremaster::{db, migrate};

fn lore_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("lore");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    // Nothing below is reachable from the tests; commands that would need
    // the network fail or finish before making a request.
    let config_content = format!(
        r#"[store]
collection = "lore-test"
path = "{}/data/lore.sqlite"

[source]
api_token = "secret_test"
database_id = "0000"
base_url = "http://127.0.0.1:9"

[chunking]
chunk_size = 200
chunk_overlap = 20

[embedding]
provider = "openai"
model = "fake"
dims = 4
api_key = "test-key"
base_url = "http://127.0.0.1:9"

[generation]
api_key = "test-key"
base_url = "http://127.0.0.1:9"
"#,
        root.display()
    );

    let config_path = config_dir.join("lore.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_lore(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = lore_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run lore binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn record(id: &str, name: &str, kind: EmbeddingType, session: Option<i64>) -> EmbeddingRecord {
    let mut meta = DocumentMetadata::new(id);
    meta.name = Some(name.to_string());
    meta.embedding_type = Some(kind);
    meta.session_number = session;
    meta.last_modified = Some("2024-01-01T00:00:00.000Z".to_string());
    EmbeddingRecord::new(format!("{name} text"), meta, vec![1.0, 0.0, 0.0, 0.0])
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_lore(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/lore.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_lore(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_lore(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_stats_empty_collection() {
    let (_tmp, config_path) = setup_test_env();

    run_lore(&config_path, &["init"]);
    let (stdout, stderr, success) = run_lore(&config_path, &["stats"]);
    assert!(success, "stats failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("lore-test"));
    assert!(stdout.contains("Documents:      0"));
    assert!(stdout.contains("Latest session: none"));
}

#[tokio::test]
async fn test_stats_counts_seeded_records() {
    let (_tmp, config_path) = setup_test_env();
    let config = load_config(&config_path).unwrap();

    let pool = db::connect(&config).await.unwrap();
    migrate::migrate_pool(&pool).await.unwrap();
    let store = SqliteStore::open(pool, &config.store.collection).await.unwrap();
    store
        .add_records(&[
            record("1", "Veren", EmbeddingType::Document, None),
            record("1", "Veren", EmbeddingType::Chunk, None),
            record("2", "Session Notes 4", EmbeddingType::Document, Some(4)),
            record("2", "Session Notes 4", EmbeddingType::Chunk, Some(4)),
            record("3", "Session Notes 5", EmbeddingType::Document, Some(5)),
        ])
        .await
        .unwrap();
    store.close().await;

    let (stdout, stderr, success) = run_lore(&config_path, &["stats"]);
    assert!(success, "stats failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Documents:      3"), "got: {}", stdout);
    assert!(stdout.contains("Chunks:         2"), "got: {}", stdout);
    assert!(stdout.contains("Session notes:  2"), "got: {}", stdout);
    assert!(stdout.contains("Latest session: 5"), "got: {}", stdout);
}

#[test]
fn test_last_session_without_notes_fails() {
    let (_tmp, config_path) = setup_test_env();

    run_lore(&config_path, &["init"]);
    let (_, stderr, success) = run_lore(&config_path, &["last-session"]);
    assert!(!success);
    assert!(
        stderr.contains("no session notes"),
        "expected missing session error, got: {}",
        stderr
    );
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("nope.toml");

    let (_, stderr, success) = run_lore(&missing, &["init"]);
    assert!(!success);
    assert!(stderr.contains("loading config"), "got: {}", stderr);
}

#[test]
fn test_invalid_config_fails() {
    let (_tmp, config_path) = setup_test_env();
    let content = fs::read_to_string(&config_path).unwrap();
    fs::write(
        &config_path,
        content.replace("chunk_overlap = 20", "chunk_overlap = 500"),
    )
    .unwrap();

    let (_, stderr, success) = run_lore(&config_path, &["init"]);
    assert!(!success);
    assert!(stderr.contains("chunk_overlap"), "got: {}", stderr);
}

#[test]
fn test_help_lists_commands() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_lore(&config_path, &["--help"]);
    assert!(success);
    for cmd in ["init", "sync", "ask", "last-session", "stats"] {
        assert!(stdout.contains(cmd), "help missing {}: {}", cmd, stdout);
    }
}
