//! Configuration for the question-answering pipeline.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Tunables for chunking, retrieval, quotas and ingestion retries.
///
/// Obtain a validated value through [`PipelineConfig::builder()`], or call
/// [`validate`](PipelineConfig::validate) after deserializing one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum chunk length in characters.
    pub chunk_max_length: usize,
    /// Number of characters shared by consecutive chunks.
    pub chunk_overlap: usize,
    /// Number of chunks retrieved per query.
    pub retrieval_k: usize,
    /// Maximum number of documents accepted by one session.
    pub max_documents_per_session: usize,
    /// Maximum size of a single uploaded document, in bytes.
    pub max_document_size_bytes: usize,
    /// Minimum cosine similarity a chunk needs to ground an answer.
    pub relevance_threshold: f32,
    /// Extra attempts made for an embedding batch after a transient failure.
    pub ingestion_retry_attempts: u32,
    /// Delay before the first retry; doubled on every subsequent retry.
    pub ingestion_backoff_base_ms: u64,
    /// Upper bound on a single backoff delay.
    pub max_backoff_ms: u64,
    /// Number of chunk texts sent to the embedding provider per request.
    pub embedding_batch_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_max_length: 1000,
            chunk_overlap: 200,
            retrieval_k: 4,
            max_documents_per_session: 10,
            max_document_size_bytes: 10 * 1024 * 1024,
            relevance_threshold: 0.2,
            ingestion_retry_attempts: 3,
            ingestion_backoff_base_ms: 200,
            max_backoff_ms: 10_000,
            embedding_batch_size: 64,
        }
    }
}

impl PipelineConfig {
    /// Create a new builder for constructing a [`PipelineConfig`].
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Check that the tunables are mutually consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Configuration`] if:
    /// - `chunk_max_length == 0` or `chunk_overlap >= chunk_max_length`
    /// - `retrieval_k == 0` or `embedding_batch_size == 0`
    /// - either quota is zero
    /// - `relevance_threshold` is not a finite value in `[-1, 1]`
    pub fn validate(&self) -> Result<()> {
        if self.chunk_max_length == 0 {
            return Err(RagError::Configuration(
                "chunk_max_length must be greater than zero".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_max_length {
            return Err(RagError::Configuration(format!(
                "chunk_overlap ({}) must be less than chunk_max_length ({})",
                self.chunk_overlap, self.chunk_max_length
            )));
        }
        if self.retrieval_k == 0 {
            return Err(RagError::Configuration("retrieval_k must be greater than zero".to_string()));
        }
        if self.max_documents_per_session == 0 {
            return Err(RagError::Configuration(
                "max_documents_per_session must be greater than zero".to_string(),
            ));
        }
        if self.max_document_size_bytes == 0 {
            return Err(RagError::Configuration(
                "max_document_size_bytes must be greater than zero".to_string(),
            ));
        }
        if !self.relevance_threshold.is_finite() || !(-1.0..=1.0).contains(&self.relevance_threshold)
        {
            return Err(RagError::Configuration(format!(
                "relevance_threshold ({}) must be within [-1, 1]",
                self.relevance_threshold
            )));
        }
        if self.embedding_batch_size == 0 {
            return Err(RagError::Configuration(
                "embedding_batch_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Delay to wait before retry number `retry` (1-based).
    ///
    /// Grows as `base * 2^(retry - 1)` and never exceeds `max_backoff_ms`.
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        let millis = self.ingestion_backoff_base_ms.saturating_mul(1u64 << exponent);
        Duration::from_millis(millis.min(self.max_backoff_ms))
    }
}

/// Builder for constructing a validated [`PipelineConfig`].
#[derive(Debug, Clone, Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// Set the maximum chunk length in characters.
    pub fn chunk_max_length(mut self, length: usize) -> Self {
        self.config.chunk_max_length = length;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the number of chunks retrieved per query.
    pub fn retrieval_k(mut self, k: usize) -> Self {
        self.config.retrieval_k = k;
        self
    }

    /// Set the maximum number of documents per session.
    pub fn max_documents_per_session(mut self, max: usize) -> Self {
        self.config.max_documents_per_session = max;
        self
    }

    /// Set the maximum size of one uploaded document in bytes.
    pub fn max_document_size_bytes(mut self, max: usize) -> Self {
        self.config.max_document_size_bytes = max;
        self
    }

    /// Set the minimum similarity a chunk needs to ground an answer.
    pub fn relevance_threshold(mut self, threshold: f32) -> Self {
        self.config.relevance_threshold = threshold;
        self
    }

    /// Set how many times a transiently failing embedding batch is retried.
    pub fn ingestion_retry_attempts(mut self, attempts: u32) -> Self {
        self.config.ingestion_retry_attempts = attempts;
        self
    }

    /// Set the base backoff delay in milliseconds.
    pub fn ingestion_backoff_base_ms(mut self, millis: u64) -> Self {
        self.config.ingestion_backoff_base_ms = millis;
        self
    }

    /// Set the cap on a single backoff delay in milliseconds.
    pub fn max_backoff_ms(mut self, millis: u64) -> Self {
        self.config.max_backoff_ms = millis;
        self
    }

    /// Set the number of texts per embedding request.
    pub fn embedding_batch_size(mut self, size: usize) -> Self {
        self.config.embedding_batch_size = size;
        self
    }

    /// Build the [`PipelineConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Configuration`] under the rules of
    /// [`PipelineConfig::validate`].
    pub fn build(self) -> Result<PipelineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn overlap_must_be_smaller_than_max_length() {
        let err = PipelineConfig::builder().chunk_max_length(20).chunk_overlap(20).build();
        assert!(matches!(err, Err(RagError::Configuration(_))));

        let err = PipelineConfig::builder().chunk_max_length(0).chunk_overlap(0).build();
        assert!(matches!(err, Err(RagError::Configuration(_))));
    }

    #[test]
    fn rejects_zero_k_and_out_of_range_threshold() {
        assert!(PipelineConfig::builder().retrieval_k(0).build().is_err());
        assert!(PipelineConfig::builder().relevance_threshold(1.5).build().is_err());
        assert!(PipelineConfig::builder().relevance_threshold(f32::NAN).build().is_err());
        assert!(PipelineConfig::builder().max_documents_per_session(0).build().is_err());
    }

    #[test]
    fn backoff_doubles_and_is_capped() {
        let config = PipelineConfig::builder()
            .ingestion_backoff_base_ms(100)
            .max_backoff_ms(350)
            .build()
            .unwrap();
        assert_eq!(config.backoff_delay(1), Duration::from_millis(100));
        assert_eq!(config.backoff_delay(2), Duration::from_millis(200));
        assert_eq!(config.backoff_delay(3), Duration::from_millis(350));
        assert_eq!(config.backoff_delay(40), Duration::from_millis(350));
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"chunk_max_length": 20, "chunk_overlap": 5}"#).unwrap();
        assert_eq!(config.chunk_max_length, 20);
        assert_eq!(config.retrieval_k, PipelineConfig::default().retrieval_k);
        assert!(config.validate().is_ok());
    }
}
