//! Query-time retrieval: embed the question, then search the index.

use tracing::{debug, error};

use crate::document::RetrievalResult;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::index::VectorIndex;

/// Retrieve the `k` chunks of `index` most similar to `query`.
///
/// The query text is embedded with `embedder`, which must be the provider
/// that embedded the indexed chunks. Provider failures are returned as-is and
/// the index is not consulted.
///
/// # Errors
///
/// Returns [`RagError::InvalidArgument`] if `k == 0` (checked before the
/// provider is called), any [`RagError::Provider`] raised while embedding,
/// and [`RagError::DimensionMismatch`] if the query vector does not match the
/// index.
pub async fn retrieve(
    query: &str,
    index: &VectorIndex,
    embedder: &dyn EmbeddingProvider,
    k: usize,
) -> Result<RetrievalResult> {
    if k == 0 {
        return Err(RagError::InvalidArgument("k must be greater than zero".to_string()));
    }

    let query_embedding = embedder.embed(query).await.inspect_err(|e| {
        error!(provider = embedder.name(), error = %e, "embedding failed during query");
    })?;

    let result = index.query(&query_embedding, k)?;
    debug!(k, hit_count = result.len(), "retrieved chunks");
    Ok(result)
}
