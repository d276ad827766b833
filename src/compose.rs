//! Retrieval composer: the read path.
//!
//! Two flows answer from the store, independent of any sync in progress.
//!
//! **Q&A** is an explicit state machine ([`QaState`]):
//!
//! ```text
//! Start ──condense──▶ Condensed ──embed──▶ Embedded ──retrieve──▶ Retrieved ──generate──▶ Answered
//! ```
//!
//! The follow-up question is condensed against the history first, so
//! retrieval runs on the standalone question. Retrieval only considers
//! document-level records.
//!
//! **Last session** skips similarity search: it takes the highest-numbered
//! session summary as the focal session and up to N earlier summaries as
//! background, then asks the chat model for a retelling.

use sqlx::SqlitePool;

use crate::config::{Config, RetrievalConfig, SearchMode};
use crate::db;
use crate::embedding::{cosine_similarity, create_embedder, Embedder};
use crate::error::{LoreError, Result};
use crate::generation::{ChatModel, OpenAIChat};
use crate::migrate::migrate_pool;
use crate::models::{EmbeddingRecord, EmbeddingType, ScoredRecord};
use crate::prompts;
use crate::store::{SqliteStore, VectorStore};

/// How candidate documents are chosen for a question.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SearchType {
    /// Plain top-k by cosine similarity.
    Similarity,
    /// Maximal marginal relevance over the `fetch_k` most similar records.
    /// `lambda_mult` of 1.0 is pure relevance, 0.0 pure diversity.
    Mmr { fetch_k: usize, lambda_mult: f32 },
}

impl SearchType {
    pub fn from_config(config: &RetrievalConfig) -> Self {
        match config.search_type {
            SearchMode::Similarity => SearchType::Similarity,
            SearchMode::Mmr => SearchType::Mmr {
                fetch_k: config.fetch_k,
                lambda_mult: config.lambda_mult,
            },
        }
    }
}

/// Parameters of one Q&A run.
#[derive(Debug, Clone, PartialEq)]
pub struct QaParams {
    pub temperature: f32,
    pub k: usize,
    pub search_type: SearchType,
    /// Reply length the prompt asks the model to stay within.
    pub max_length: usize,
}

impl QaParams {
    pub fn from_config(config: &Config) -> Self {
        Self {
            temperature: config.generation.temperature,
            k: config.retrieval.k,
            search_type: SearchType::from_config(&config.retrieval),
            max_length: config.generation.max_message_length,
        }
    }
}

/// Progress of a question through the Q&A chain.
#[derive(Debug, Clone)]
pub enum QaState {
    Start {
        question: String,
        history: Vec<(String, String)>,
    },
    Condensed {
        question: String,
    },
    Embedded {
        question: String,
        vector: Vec<f32>,
    },
    Retrieved {
        question: String,
        documents: Vec<ScoredRecord>,
    },
    Answered {
        answer: String,
    },
}

impl QaState {
    pub fn start(question: impl Into<String>, history: Vec<(String, String)>) -> Self {
        QaState::Start {
            question: question.into(),
            history,
        }
    }

    pub fn is_answered(&self) -> bool {
        matches!(self, QaState::Answered { .. })
    }
}

/// The Q&A chain over a store, an embedder and a chat model.
pub struct QaChain<'a> {
    store: &'a dyn VectorStore,
    embedder: &'a dyn Embedder,
    chat: &'a dyn ChatModel,
    params: QaParams,
}

impl<'a> QaChain<'a> {
    pub fn new(
        store: &'a dyn VectorStore,
        embedder: &'a dyn Embedder,
        chat: &'a dyn ChatModel,
        params: QaParams,
    ) -> Self {
        Self {
            store,
            embedder,
            chat,
            params,
        }
    }

    /// Rewrite a follow-up into a standalone question. Without history the
    /// question is returned unchanged and the model is not called.
    pub async fn condense(&self, question: &str, history: &[(String, String)]) -> Result<String> {
        if history.is_empty() {
            return Ok(question.to_string());
        }
        let prompt = prompts::condense_question(history, question);
        let standalone = self.chat.complete(&prompt, self.params.temperature).await?;
        tracing::debug!(standalone = %standalone.trim(), "condensed question");
        Ok(standalone.trim().to_string())
    }

    pub async fn embed_query(&self, question: &str) -> Result<Vec<f32>> {
        self.embedder.embed_query(question).await
    }

    /// Top-k document-level records for the query vector.
    pub async fn retrieve(&self, vector: &[f32]) -> Result<Vec<ScoredRecord>> {
        let k = self.params.k;
        match self.params.search_type {
            SearchType::Similarity => {
                self.store
                    .similarity_search(vector, k, Some(EmbeddingType::Document))
                    .await
            }
            SearchType::Mmr {
                fetch_k,
                lambda_mult,
            } => {
                let candidates = self
                    .store
                    .similarity_search(vector, fetch_k.max(k), Some(EmbeddingType::Document))
                    .await?;
                let embeddings: Vec<&[f32]> = candidates
                    .iter()
                    .map(|c| c.record.embedding.as_slice())
                    .collect();
                let picked = maximal_marginal_relevance(vector, &embeddings, lambda_mult, k);
                Ok(picked.into_iter().map(|i| candidates[i].clone()).collect())
            }
        }
    }

    /// Stuff the documents into the lore prompt and ask once.
    pub async fn generate(&self, question: &str, documents: &[ScoredRecord]) -> Result<String> {
        let context = documents
            .iter()
            .map(|d| d.record.document.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let prompt = prompts::lore_qa(&context, question, self.params.max_length);
        self.chat.complete(&prompt, self.params.temperature).await
    }

    /// Advance one stage. `Answered` is terminal and returned as is.
    pub async fn step(&self, state: QaState) -> Result<QaState> {
        Ok(match state {
            QaState::Start { question, history } => QaState::Condensed {
                question: self.condense(&question, &history).await?,
            },
            QaState::Condensed { question } => {
                let vector = self.embed_query(&question).await?;
                QaState::Embedded { question, vector }
            }
            QaState::Embedded { question, vector } => {
                let documents = self.retrieve(&vector).await?;
                tracing::debug!(documents = documents.len(), "retrieved context");
                QaState::Retrieved {
                    question,
                    documents,
                }
            }
            QaState::Retrieved {
                question,
                documents,
            } => QaState::Answered {
                answer: self.generate(&question, &documents).await?,
            },
            answered @ QaState::Answered { .. } => answered,
        })
    }

    /// Run every stage and return the answer.
    pub async fn run(&self, question: &str, history: &[(String, String)]) -> Result<String> {
        let mut state = QaState::start(question, history.to_vec());
        loop {
            state = self.step(state).await?;
            if let QaState::Answered { answer } = state {
                return Ok(answer);
            }
        }
    }
}

/// Select `k` indices from `candidates` by maximal marginal relevance.
///
/// The most similar candidate is taken first; each further pick maximizes
/// `lambda * sim(query, c) - (1 - lambda) * max sim(c, selected)`.
pub fn maximal_marginal_relevance(
    query: &[f32],
    candidates: &[&[f32]],
    lambda_mult: f32,
    k: usize,
) -> Vec<usize> {
    let k = k.min(candidates.len());
    if k == 0 {
        return Vec::new();
    }

    let relevance: Vec<f32> = candidates
        .iter()
        .map(|c| cosine_similarity(query, c))
        .collect();

    let mut selected: Vec<usize> = Vec::with_capacity(k);
    while selected.len() < k {
        let mut best: Option<(usize, f32)> = None;
        for (i, candidate) in candidates.iter().enumerate() {
            if selected.contains(&i) {
                continue;
            }
            let redundancy = selected
                .iter()
                .map(|&j| cosine_similarity(candidate, candidates[j]))
                .fold(f32::NEG_INFINITY, f32::max);
            let redundancy = if selected.is_empty() { 0.0 } else { redundancy };
            let score = lambda_mult * relevance[i] - (1.0 - lambda_mult) * redundancy;
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((i, score));
            }
        }
        match best {
            Some((i, _)) => selected.push(i),
            None => break,
        }
    }
    selected
}

/// Focal and background summaries for the last-session retelling.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub focal: EmbeddingRecord,
    /// Earlier sessions, highest number first.
    pub background: Vec<EmbeddingRecord>,
}

impl SessionContext {
    /// Background rendered as `-- SESSION n -- ` blocks joined by newlines.
    pub fn background_text(&self) -> String {
        self.background
            .iter()
            .map(|r| {
                let number = r
                    .metadata
                    .session_number
                    .map(|n| n.to_string())
                    .unwrap_or_default();
                format!("-- SESSION {} -- \n{}", number, r.document)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Select the focal session and up to `n_previous` earlier ones.
pub async fn session_context(
    store: &dyn VectorStore,
    n_previous: usize,
) -> Result<SessionContext> {
    let focal = store
        .latest_session_note()
        .await?
        .ok_or(LoreError::NoSessionNotes)?;
    let focal_number = focal.metadata.session_number.ok_or(LoreError::NoSessionNotes)?;

    let background = if n_previous == 0 {
        Vec::new()
    } else {
        store.session_notes_before(focal_number, n_previous).await?
    };

    tracing::debug!(
        focal = focal_number,
        background = background.len(),
        "selected session context"
    );
    Ok(SessionContext { focal, background })
}

/// Query entry points over one store.
pub struct Loremaster<'a> {
    store: &'a dyn VectorStore,
    embedder: &'a dyn Embedder,
    chat: &'a dyn ChatModel,
    qa: QaParams,
    n_previous_sessions: usize,
}

impl<'a> Loremaster<'a> {
    pub fn new(
        store: &'a dyn VectorStore,
        embedder: &'a dyn Embedder,
        chat: &'a dyn ChatModel,
        config: &Config,
    ) -> Self {
        Self {
            store,
            embedder,
            chat,
            qa: QaParams::from_config(config),
            n_previous_sessions: config.retrieval.n_previous_sessions,
        }
    }

    /// Override the number of background sessions.
    pub fn with_previous_sessions(mut self, n: usize) -> Self {
        self.n_previous_sessions = n;
        self
    }

    pub fn with_qa_params(mut self, params: QaParams) -> Self {
        self.qa = params;
        self
    }

    /// Answer a question, condensing it against `history` first.
    pub async fn ask(&self, question: &str, history: &[(String, String)]) -> Result<String> {
        QaChain::new(self.store, self.embedder, self.chat, self.qa.clone())
            .run(question, history)
            .await
    }

    /// Retell the most recent session. Fails with `NoSessionNotes` when the
    /// collection holds no numbered session summaries.
    pub async fn narrate_last_session(&self) -> Result<String> {
        let context = session_context(self.store, self.n_previous_sessions).await?;
        let prompt = prompts::last_session(
            &context.background_text(),
            &context.focal.document,
            self.qa.max_length,
        );
        self.chat.complete(&prompt, self.qa.temperature).await
    }
}

async fn open_store(pool: &SqlitePool, config: &Config) -> Result<SqliteStore> {
    migrate_pool(pool).await?;
    SqliteStore::open(pool.clone(), &config.store.collection).await
}

/// CLI entry point for `lore ask`. The pool is closed on every exit path.
pub async fn run_ask(config: &Config, question: &str) -> Result<String> {
    let embedder = create_embedder(&config.embedding)?;
    let chat = OpenAIChat::new(&config.generation)?;

    let pool = db::connect(config).await?;
    let result = async {
        let store = open_store(&pool, config).await?;
        Loremaster::new(&store, embedder.as_ref(), &chat, config)
            .ask(question, &[])
            .await
    }
    .await;
    pool.close().await;

    result
}

/// CLI entry point for `lore last-session`. `previous` overrides
/// `retrieval.n_previous_sessions`.
pub async fn run_last_session(config: &Config, previous: Option<usize>) -> Result<String> {
    let embedder = create_embedder(&config.embedding)?;
    let chat = OpenAIChat::new(&config.generation)?;

    let pool = db::connect(config).await?;
    let result = async {
        let store = open_store(&pool, config).await?;
        let mut loremaster = Loremaster::new(&store, embedder.as_ref(), &chat, config);
        if let Some(n) = previous {
            loremaster = loremaster.with_previous_sessions(n);
        }
        loremaster.narrate_last_session().await
    }
    .await;
    pool.close().await;

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mmr_first_pick_is_most_relevant() {
        let query = [1.0f32, 0.0];
        let a = [0.9f32, 0.1];
        let b = [1.0f32, 0.0];
        let c = [0.0f32, 1.0];
        let candidates: [&[f32]; 3] = [&a, &b, &c];
        let picked = maximal_marginal_relevance(&query, &candidates, 0.5, 1);
        assert_eq!(picked, vec![1]);
    }

    #[test]
    fn test_mmr_prefers_diverse_second_pick() {
        let query = [1.0f32, 1.0];
        let best = [1.0f32, 0.9];
        let near_duplicate = [1.0f32, 0.89];
        let different = [0.2f32, 1.0];
        let candidates: [&[f32]; 3] = [&best, &near_duplicate, &different];

        let diverse = maximal_marginal_relevance(&query, &candidates, 0.3, 2);
        assert_eq!(diverse, vec![0, 2]);

        let relevant = maximal_marginal_relevance(&query, &candidates, 1.0, 2);
        assert_eq!(relevant, vec![0, 1]);
    }

    #[test]
    fn test_mmr_k_larger_than_candidates() {
        let a = [1.0f32];
        let one: [&[f32]; 1] = [&a];
        assert_eq!(maximal_marginal_relevance(&[1.0], &one, 0.5, 5), vec![0]);
        assert!(maximal_marginal_relevance(&[1.0], &[], 0.5, 5).is_empty());
    }

    #[test]
    fn test_background_text_format() {
        use crate::models::DocumentMetadata;
        let mut m6 = DocumentMetadata::new("s6");
        m6.session_number = Some(6);
        let mut m5 = DocumentMetadata::new("s5");
        m5.session_number = Some(5);

        let ctx = SessionContext {
            focal: EmbeddingRecord::new("seven".into(), DocumentMetadata::new("s7"), vec![]),
            background: vec![
                EmbeddingRecord::new("six".into(), m6, vec![]),
                EmbeddingRecord::new("five".into(), m5, vec![]),
            ],
        };
        assert_eq!(
            ctx.background_text(),
            "-- SESSION 6 -- \nsix\n-- SESSION 5 -- \nfive"
        );
    }
}
