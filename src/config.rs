//! TOML configuration parsing and validation.
//!
//! The configuration is read once at process start and passed by reference
//! into every component. String values may reference environment variables
//! as `${VAR_NAME}`; they are expanded here, at load time, and nowhere else.
//! A referenced variable that is not set is a load error, so a missing
//! secret fails the process at startup rather than mid-sync.
//!
//! ```toml
//! [store]
//! collection = "red-moon-saga"
//! path = "./data/lore.sqlite"
//!
//! [source]
//! api_token = "${NOTION_TOKEN}"
//! database_id = "0123456789abcdef"
//!
//! [chunking]
//! chunk_size = 1000
//! chunk_overlap = 200
//!
//! [embedding]
//! provider = "openai"
//! model = "text-embedding-3-small"
//! dims = 1536
//! api_key = "${OPENAI_API_KEY}"
//!
//! [generation]
//! api_key = "${OPENAI_API_KEY}"
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{LoreError, Result};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    pub source: SourceConfig,
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingConfig,
    pub generation: GenerationConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Name of the collection all records are written under.
    pub collection: String,
    /// SQLite database file.
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub api_token: String,
    /// Identifier of the Notion database holding the campaign documents.
    pub database_id: String,
    #[serde(default = "default_notion_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_notion_url() -> String {
    "https://api.notion.com".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters.
    pub chunk_size: usize,
    /// Characters carried over between consecutive chunks.
    #[serde(default)]
    pub chunk_overlap: usize,
    #[serde(default = "default_separators")]
    pub separators: Vec<String>,
}

/// Structural markers first, then paragraphs, lines, sentences, words, characters.
pub fn default_separators() -> Vec<String> {
    [
        "---", "####", "###", "##", "#", "\n\n\n", "\n\n", "\n", ".", "?", "!", " ", "",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_openai_url")]
    pub base_url: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_provider() -> String {
    "openai".to_string()
}
fn default_openai_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_openai_url")]
    pub base_url: String,
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
    /// Longest reply the hosting chat surface accepts, in characters.
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,
}

fn default_model() -> String {
    "gpt-4o".to_string()
}
fn default_temperature() -> f32 {
    0.5
}
fn default_generation_timeout() -> u64 {
    120
}
fn default_max_message_length() -> usize {
    2000
}

/// How the Q&A flow picks its top-k documents.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    #[default]
    Similarity,
    Mmr,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default)]
    pub search_type: SearchMode,
    /// Candidate pool size for MMR re-ranking.
    #[serde(default = "default_fetch_k")]
    pub fetch_k: usize,
    #[serde(default = "default_lambda_mult")]
    pub lambda_mult: f32,
    /// Older session summaries given as background to the narrative flow.
    #[serde(default = "default_previous_sessions")]
    pub n_previous_sessions: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: default_k(),
            search_type: SearchMode::default(),
            fetch_k: default_fetch_k(),
            lambda_mult: default_lambda_mult(),
            n_previous_sessions: default_previous_sessions(),
        }
    }
}

fn default_k() -> usize {
    5
}
fn default_fetch_k() -> usize {
    20
}
fn default_lambda_mult() -> f32 {
    0.5
}
fn default_previous_sessions() -> usize {
    5
}

impl EmbeddingConfig {
    pub fn is_local(&self) -> bool {
        self.provider == "local"
    }
}

/// Read, expand and validate the configuration file at `path`.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        LoreError::Config(format!(
            "failed to read config file {}: {}",
            path.display(),
            e
        ))
    })?;
    parse_config(&content)
}

/// Parse configuration from TOML text. See [`load_config`].
pub fn parse_config(content: &str) -> Result<Config> {
    let mut raw: toml::Value = toml::from_str(content)
        .map_err(|e| LoreError::Config(format!("failed to parse config: {}", e)))?;
    expand_value(&mut raw)?;

    let config: Config = raw
        .try_into()
        .map_err(|e| LoreError::Config(format!("failed to parse config: {}", e)))?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    fn bail<T>(msg: impl Into<String>) -> Result<T> {
        Err(LoreError::Config(msg.into()))
    }

    if config.store.collection.trim().is_empty() {
        return bail("store.collection must not be empty");
    }
    if config.source.api_token.trim().is_empty() {
        return bail("source.api_token must not be empty");
    }
    if config.source.database_id.trim().is_empty() {
        return bail("source.database_id must not be empty");
    }

    if config.chunking.chunk_size == 0 {
        return bail("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        return bail("chunking.chunk_overlap must be smaller than chunking.chunk_size");
    }
    if config.chunking.separators.is_empty() {
        return bail("chunking.separators must not be empty");
    }

    match config.embedding.provider.as_str() {
        "openai" => {
            if config.embedding.model.is_none() {
                return bail("embedding.model must be specified when provider is 'openai'");
            }
            if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
                return bail("embedding.dims must be > 0 when provider is 'openai'");
            }
            if config
                .embedding
                .api_key
                .as_deref()
                .map_or(true, |k| k.trim().is_empty())
            {
                return bail("embedding.api_key must be set when provider is 'openai'");
            }
        }
        "local" => {}
        other => {
            return bail(format!(
                "Unknown embedding provider: '{}'. Must be openai or local.",
                other
            ))
        }
    }
    if config.embedding.batch_size == 0 {
        return bail("embedding.batch_size must be > 0");
    }

    if config.generation.api_key.trim().is_empty() {
        return bail("generation.api_key must not be empty");
    }
    if !(0.0..=2.0).contains(&config.generation.temperature) {
        return bail("generation.temperature must be in [0.0, 2.0]");
    }
    // Room for the code fence that wraps every reply.
    if config.generation.max_message_length <= 6 {
        return bail("generation.max_message_length must be > 6");
    }

    if config.retrieval.k < 1 {
        return bail("retrieval.k must be >= 1");
    }
    if config.retrieval.fetch_k < config.retrieval.k {
        return bail("retrieval.fetch_k must be >= retrieval.k");
    }
    if !(0.0..=1.0).contains(&config.retrieval.lambda_mult) {
        return bail("retrieval.lambda_mult must be in [0.0, 1.0]");
    }

    Ok(())
}

fn expand_value(value: &mut toml::Value) -> Result<()> {
    match value {
        toml::Value::String(s) => {
            *s = expand_env_vars(s)?;
        }
        toml::Value::Array(items) => {
            for item in items {
                expand_value(item)?;
            }
        }
        toml::Value::Table(table) => {
            for (_, item) in table.iter_mut() {
                expand_value(item)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Expand `${VAR_NAME}` patterns in a string from the process environment.
pub(crate) fn expand_env_vars(s: &str) -> Result<String> {
    let mut result = s.to_string();
    let mut search_from = 0;
    while let Some(rel) = result[search_from..].find("${") {
        let start = search_from + rel;
        let end = match result[start..].find('}') {
            Some(pos) => start + pos,
            None => break,
        };
        let var_name = &result[start + 2..end];
        let value = std::env::var(var_name).map_err(|_| {
            LoreError::Config(format!("environment variable {} is not set", var_name))
        })?;
        search_from = start + value.len();
        result = format!("{}{}{}", &result[..start], value, &result[end + 1..]);
    }
    Ok(result)
}
