//! Retrieval service: named corpora behind interchangeable strategies.
//!
//! Each corpus is served either by dense embedding similarity or by keyword
//! overlap. Callers pick a corpus by name and never see which strategy
//! backs it.

pub mod dense;
pub mod keyword;
pub mod loader;
pub mod tokenize;

pub use dense::DenseIndex;
pub use keyword::KeywordIndex;
pub use loader::load_corpora;
pub use tokenize::tokenize;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cache::EmbeddingCache;
use crate::config::Config;
use crate::embeddings::{CachedEmbedder, Embedder, HashingEmbedder};
use crate::error::{CitypulseError, Result};

/// One passage of a corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusEntry {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Pre-computed embedding, used as-is by dense corpora.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl CorpusEntry {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata: serde_json::Map::new(),
            embedding: None,
        }
    }
}

/// A retrieved passage with its relevance score in (0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Retrieved {
    pub id: String,
    pub text: String,
    pub score: f32,
}

/// Which scoring backs a corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Dense,
    Keyword,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Dense => f.write_str("dense"),
            Strategy::Keyword => f.write_str("keyword"),
        }
    }
}

impl FromStr for Strategy {
    type Err = CitypulseError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dense" => Ok(Strategy::Dense),
            "keyword" => Ok(Strategy::Keyword),
            other => Err(CitypulseError::InvalidArgument(format!(
                "unknown retrieval strategy '{}'",
                other
            ))),
        }
    }
}

/// A scored index over one corpus.
pub trait Retriever: Send + Sync {
    fn strategy(&self) -> Strategy;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Up to `top_k` entries scoring above zero and at least `min_score`,
    /// best first.
    fn search(&self, query: &str, top_k: usize, min_score: f32) -> Vec<Retrieved>;
}

/// Order entries by score descending, keeping corpus order among equal scores.
pub(crate) fn rank(
    entries: &[CorpusEntry],
    scores: &[f32],
    top_k: usize,
    min_score: f32,
) -> Vec<Retrieved> {
    let mut scored: Vec<(usize, f32)> = scores
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, score)| *score > 0.0 && *score >= min_score)
        .collect();

    // sort_by is stable, so ties stay in insertion order
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    scored
        .into_iter()
        .take(top_k)
        .map(|(idx, score)| Retrieved {
            id: entries[idx].id.clone(),
            text: entries[idx].text.clone(),
            score,
        })
        .collect()
}

/// Registry of named corpora.
pub struct RetrievalService {
    corpora: HashMap<String, Box<dyn Retriever>>,
    min_score: f32,
}

impl RetrievalService {
    pub fn new(min_score: f32) -> Self {
        Self {
            corpora: HashMap::new(),
            min_score,
        }
    }

    /// Build indexes for every loaded corpus. Corpora without an explicit
    /// strategy use `default_strategy`.
    pub fn build(
        corpora: BTreeMap<String, Vec<CorpusEntry>>,
        strategies: &HashMap<String, Strategy>,
        default_strategy: Strategy,
        embedder: Arc<dyn Embedder>,
        min_score: f32,
    ) -> Result<Self> {
        let mut service = Self::new(min_score);
        for (name, entries) in corpora {
            let strategy = strategies.get(&name).copied().unwrap_or(default_strategy);
            let count = entries.len();
            let retriever: Box<dyn Retriever> = match strategy {
                Strategy::Dense => Box::new(DenseIndex::build(entries, Arc::clone(&embedder))?),
                Strategy::Keyword => Box::new(KeywordIndex::new(entries)),
            };
            log::info!("Corpus '{}': {} entries ({} retrieval)", name, count, strategy);
            service.register(name, retriever);
        }

        for name in strategies.keys() {
            if !service.corpora.contains_key(name) {
                log::warn!("Retrieval strategy configured for missing corpus '{}'", name);
            }
        }
        Ok(service)
    }

    /// Load `corpus_dir` and index it with a cached local embedder.
    pub fn from_config(config: &Config) -> Result<Self> {
        let corpora = load_corpora(config.corpus_dir())?;
        let cache = Arc::new(EmbeddingCache::new(config.embeddings.cache_capacity));
        let embedder: Arc<dyn Embedder> = Arc::new(CachedEmbedder::new(
            Arc::new(HashingEmbedder::new(config.embeddings.dimensions)),
            cache,
        ));
        Self::build(
            corpora,
            &config.retrieval.strategies,
            config.retrieval.default_strategy,
            embedder,
            config.retrieval.min_score,
        )
    }

    /// Add or replace a corpus.
    pub fn register(&mut self, name: impl Into<String>, retriever: Box<dyn Retriever>) {
        self.corpora.insert(name.into(), retriever);
    }

    /// Top-`top_k` passages of `corpus_id` for `query`, best first.
    ///
    /// An empty query or empty corpus yields an empty result; `top_k == 0` or an
    /// unknown corpus is an `InvalidArgument`.
    pub fn retrieve(&self, query: &str, corpus_id: &str, top_k: usize) -> Result<Vec<Retrieved>> {
        if top_k == 0 {
            return Err(CitypulseError::InvalidArgument(
                "top_k must be greater than 0".to_string(),
            ));
        }
        let retriever = self.corpora.get(corpus_id).ok_or_else(|| {
            CitypulseError::InvalidArgument(format!("unknown corpus '{}'", corpus_id))
        })?;
        if query.trim().is_empty() || retriever.is_empty() {
            return Ok(Vec::new());
        }

        let start = std::time::Instant::now();
        let results = retriever.search(query, top_k, self.min_score);
        log::debug!(
            "Retrieval on '{}' ({}) took {:?}, returned {} results",
            corpus_id,
            retriever.strategy(),
            start.elapsed(),
            results.len()
        );
        Ok(results)
    }

    pub fn strategy_of(&self, corpus_id: &str) -> Option<Strategy> {
        self.corpora.get(corpus_id).map(|r| r.strategy())
    }

    pub fn contains(&self, corpus_id: &str) -> bool {
        self.corpora.contains_key(corpus_id)
    }

    /// Corpus names, sorted.
    pub fn corpus_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.corpora.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn corpus_len(&self, corpus_id: &str) -> Option<usize> {
        self.corpora.get(corpus_id).map(|r| r.len())
    }
}
