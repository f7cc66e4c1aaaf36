use std::sync::Arc;

use crate::embeddings::Embedder;
use crate::error::{CitypulseError, Result};
use crate::retrieval::{rank, CorpusEntry, Retrieved, Retriever, Strategy};

/// Dense retriever: cosine similarity between the query embedding and
/// entry embeddings computed (or supplied) once at build time.
pub struct DenseIndex {
    entries: Vec<CorpusEntry>,
    vectors: Vec<Vec<f32>>,
    embedder: Arc<dyn Embedder>,
}

impl DenseIndex {
    /// Embed every entry that does not already carry a vector.
    ///
    /// Pre-computed vectors must match the embedder's dimensionality.
    pub fn build(entries: Vec<CorpusEntry>, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let dims = embedder.dimensions();
        let start = std::time::Instant::now();
        let mut vectors = Vec::with_capacity(entries.len());

        for entry in &entries {
            let vector = match &entry.embedding {
                Some(v) if v.len() == dims => v.clone(),
                Some(v) => {
                    return Err(CitypulseError::InvalidArgument(format!(
                        "entry {} has a {}-dim embedding, expected {}",
                        entry.id,
                        v.len(),
                        dims
                    )))
                }
                None => embedder.embed(&entry.text),
            };
            vectors.push(vector);
        }

        log::debug!("Dense index: embedded {} entries in {:?}", entries.len(), start.elapsed());
        Ok(Self {
            entries,
            vectors,
            embedder,
        })
    }
}

impl Retriever for DenseIndex {
    fn strategy(&self) -> Strategy {
        Strategy::Dense
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn search(&self, query: &str, top_k: usize, min_score: f32) -> Vec<Retrieved> {
        let query_vec = self.embedder.embed(query);
        let scores: Vec<f32> = self
            .vectors
            .iter()
            .map(|v| cosine_similarity(&query_vec, v).clamp(0.0, 1.0))
            .collect();
        rank(&self.entries, &scores, top_k, min_score)
    }
}

/// Compute cosine similarity between two vectors
///
/// Returns 0.0 if either vector has zero magnitude or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}
