//! Exact in-memory vector index using cosine similarity.
//!
//! A [`VectorIndex`] is built once from a session's chunks and their
//! embeddings and is read-only afterwards, so it can be shared between
//! concurrent queries behind an `Arc` without further synchronization.

use std::cmp::Ordering;

use tracing::debug;

use crate::document::{Chunk, RetrievalResult, ScoredChunk};
use crate::error::{RagError, Result};

#[derive(Debug, Clone)]
struct Entry {
    chunk: Chunk,
    embedding: Vec<f32>,
    norm: f32,
}

/// An immutable, exhaustively searched index over chunk embeddings.
///
/// Entries keep their insertion order; that order is the tie-breaker when two
/// chunks score the same, so results are fully deterministic.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::VectorIndex;
///
/// let index = VectorIndex::build(chunks, embeddings)?;
/// let result = index.query(&query_embedding, 5)?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    entries: Vec<Entry>,
    dimension: Option<usize>,
}

impl VectorIndex {
    /// Build an index from chunks and their embeddings, matched by position.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidArgument`] if the two sequences differ in
    /// length, and [`RagError::DimensionMismatch`] if any embedding's length
    /// disagrees with the first one.
    pub fn build(chunks: Vec<Chunk>, embeddings: Vec<Vec<f32>>) -> Result<Self> {
        if chunks.len() != embeddings.len() {
            return Err(RagError::InvalidArgument(format!(
                "{} chunks but {} embeddings",
                chunks.len(),
                embeddings.len()
            )));
        }

        let dimension = embeddings.first().map(Vec::len);
        if let Some(expected) = dimension {
            if let Some((position, found)) = embeddings
                .iter()
                .map(Vec::len)
                .enumerate()
                .find(|&(_, len)| len != expected)
            {
                return Err(RagError::DimensionMismatch { expected, found, position });
            }
        }

        let entries: Vec<Entry> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| {
                let norm = l2_norm(&embedding);
                Entry { chunk, embedding, norm }
            })
            .collect();

        debug!(chunk_count = entries.len(), dimension = ?dimension, "built vector index");
        Ok(Self { entries, dimension })
    }

    /// Number of indexed chunks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the index holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Dimension shared by every indexed embedding, if any were indexed.
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    /// Iterate over indexed chunks in insertion order.
    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.entries.iter().map(|entry| &entry.chunk)
    }

    /// Return up to `k` chunks ranked by descending cosine similarity.
    ///
    /// Equal scores keep insertion order. An empty index yields an empty
    /// result.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidArgument`] if `k == 0`, and
    /// [`RagError::DimensionMismatch`] if `vector` does not match the index
    /// dimension.
    pub fn query(&self, vector: &[f32], k: usize) -> Result<RetrievalResult> {
        if k == 0 {
            return Err(RagError::InvalidArgument("k must be greater than zero".to_string()));
        }
        let Some(expected) = self.dimension else {
            return Ok(RetrievalResult::default());
        };
        if vector.len() != expected {
            return Err(RagError::DimensionMismatch {
                expected,
                found: vector.len(),
                position: 0,
            });
        }

        let query_norm = l2_norm(vector);
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(position, entry)| {
                (position, cosine_similarity(&entry.embedding, entry.norm, vector, query_norm))
            })
            .collect();

        scored.sort_by(|a, b| rank(a.1, b.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);

        let hits = scored
            .into_iter()
            .map(|(position, score)| ScoredChunk { chunk: self.entries[position].chunk.clone(), score })
            .collect();
        Ok(RetrievalResult { hits })
    }
}

/// Descending by score; NaN sorts last.
fn rank(a: f32, b: f32) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
    }
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Cosine similarity given precomputed norms.
///
/// Returns 0.0 if either vector has zero magnitude.
fn cosine_similarity(a: &[f32], norm_a: f32, b: &[f32], norm_b: f32) -> f32 {
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    dot / (norm_a * norm_b)
}
