use std::collections::HashSet;

use crate::retrieval::tokenize::token_set;
use crate::retrieval::{rank, CorpusEntry, Retrieved, Retriever, Strategy};

/// Keyword-overlap retriever: Jaccard similarity between the query's token
/// set and each entry's token set.
pub struct KeywordIndex {
    entries: Vec<CorpusEntry>,
    tokens: Vec<HashSet<String>>,
}

impl KeywordIndex {
    pub fn new(entries: Vec<CorpusEntry>) -> Self {
        let tokens = entries.iter().map(|e| token_set(&e.text)).collect();
        Self { entries, tokens }
    }
}

/// |A ∩ B| / |A ∪ B|, 0.0 when both are empty.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    if union == 0 {
        0.0
    } else {
        intersection as f32 / union as f32
    }
}

impl Retriever for KeywordIndex {
    fn strategy(&self) -> Strategy {
        Strategy::Keyword
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn search(&self, query: &str, top_k: usize, min_score: f32) -> Vec<Retrieved> {
        let query_tokens = token_set(query);
        if query_tokens.is_empty() {
            return Vec::new();
        }
        let scores: Vec<f32> = self
            .tokens
            .iter()
            .map(|entry_tokens| jaccard(&query_tokens, entry_tokens))
            .collect();
        rank(&self.entries, &scores, top_k, min_score)
    }
}
