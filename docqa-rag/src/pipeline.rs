//! Session pipeline controller.
//!
//! The [`SessionPipeline`] owns every live [`Session`] and coordinates
//! ingestion (extract → chunk → embed → index, once per session) and
//! question answering (embed → search → threshold → synthesize, many times).
//!
//! # Example
//!
//! ```rust,ignore
//! use docqa_rag::{
//!     ExtractiveSynthesizer, HashingEmbedder, PipelineConfig, SessionPipeline, Upload,
//! };
//!
//! let pipeline = SessionPipeline::builder()
//!     .config(PipelineConfig::default())
//!     .embedding_provider(Arc::new(HashingEmbedder::default()))
//!     .synthesizer(Arc::new(ExtractiveSynthesizer::default()))
//!     .build()?;
//!
//! let session = pipeline.create_session().await;
//! pipeline.ingest(&session, vec![Upload::new("notes.txt", text)]).await?;
//! let answer = pipeline.query(&session, "What colour is the sky?").await?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::chunking::{BoundaryChunker, Chunker};
use crate::config::PipelineConfig;
use crate::document::{AttributedAnswer, Document, RetrievalResult, SourceDocument, Upload};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::extract::ExtractorRegistry;
use crate::index::VectorIndex;
use crate::retriever::retrieve;
use crate::session::{Corpus, IngestGuard, Session, SessionId, SessionInfo, SessionState};
use crate::synthesis::AnswerSynthesizer;

/// Summary of a completed ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    /// Ingested documents in upload order.
    pub documents: Vec<SourceDocument>,
    /// Number of chunks indexed.
    pub chunk_count: usize,
    /// Number of embedding batches sent.
    pub batches: usize,
    /// Embedding calls made, including retries.
    pub embedding_attempts: u32,
}

/// The session pipeline controller.
///
/// Sessions are independent: each owns its documents, chunks and index, and
/// nothing is shared between them besides the stateless providers. The
/// session registry lock is only held to look sessions up, never across a
/// provider call or backoff delay. Construct one via
/// [`SessionPipeline::builder()`].
pub struct SessionPipeline {
    config: PipelineConfig,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    synthesizer: Arc<dyn AnswerSynthesizer>,
    chunker: Arc<dyn Chunker>,
    extractors: ExtractorRegistry,
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
}

impl SessionPipeline {
    /// Create a new [`SessionPipelineBuilder`].
    pub fn builder() -> SessionPipelineBuilder {
        SessionPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Start a new, empty session.
    pub async fn create_session(&self) -> SessionId {
        let session = Arc::new(Session::new());
        let id = session.id().to_string();
        self.sessions.write().await.insert(id.clone(), session);
        info!(session.id = %id, "created session");
        id
    }

    /// Number of live sessions.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Current lifecycle state of a session.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::SessionNotFound`] for unknown or closed sessions.
    pub async fn session_state(&self, session_id: &str) -> Result<SessionState> {
        Ok(self.session(session_id).await?.state())
    }

    /// Snapshot of a session's documents, chunk count and turn count.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::SessionNotFound`] for unknown or closed sessions.
    pub async fn session_info(&self, session_id: &str) -> Result<SessionInfo> {
        Ok(self.session(session_id).await?.info())
    }

    /// Ingest uploaded files into an empty session.
    ///
    /// Each upload is converted to text by the extractor registered for its
    /// extension, then processed as by [`ingest_documents`](Self::ingest_documents).
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidState`] unless the session is empty, then
    /// [`RagError::QuotaExceeded`] before anything else happens if the upload
    /// has too many or too large files, [`RagError::Extraction`] if a
    /// file cannot be read as text, and otherwise the errors of
    /// [`ingest_documents`](Self::ingest_documents).
    pub async fn ingest(&self, session_id: &str, uploads: Vec<Upload>) -> Result<IngestReport> {
        let session = self.session(session_id).await?;
        let guard = session.begin_ingest(|| {
            self.check_quota(uploads.iter().map(|u| (u.filename.as_str(), u.content.len())))
        })?;
        let documents = uploads
            .into_iter()
            .map(|upload| {
                let text = self.extractors.extract(&upload.filename, &upload.content)?;
                Ok(Document::new(upload.filename, text))
            })
            .collect::<Result<Vec<_>>>()
            .inspect_err(|e| error!(session.id = session_id, error = %e, "extraction failed"))?;

        let corpus = self.build_corpus(session_id, documents).await?;
        self.publish(session_id, guard, corpus)
    }

    /// Ingest already-extracted documents into an empty session.
    ///
    /// Documents are chunked in upload order, embedded in batches of
    /// `embedding_batch_size` and indexed. A batch failing with a transient
    /// provider error is retried up to `ingestion_retry_attempts` times with
    /// exponential backoff. The session only becomes ready once every chunk
    /// is indexed; on any failure it goes back to empty.
    ///
    /// # Errors
    ///
    /// - [`RagError::SessionNotFound`] for an unknown session
    /// - [`RagError::InvalidState`] unless the session is empty, or if it was
    ///   closed while ingesting
    /// - [`RagError::QuotaExceeded`] for too many or too large documents
    /// - [`RagError::InvalidArgument`] if no documents were given
    /// - [`RagError::IngestionFailed`] once retries are exhausted
    /// - [`RagError::Provider`] for permanent provider failures
    /// - [`RagError::DimensionMismatch`] if the provider returned vectors of
    ///   different lengths
    pub async fn ingest_documents(
        &self,
        session_id: &str,
        documents: Vec<Document>,
    ) -> Result<IngestReport> {
        let session = self.session(session_id).await?;
        let guard = session.begin_ingest(|| {
            self.check_quota(documents.iter().map(|d| (d.name.as_str(), d.text.len())))
        })?;
        let corpus = self.build_corpus(session_id, documents).await?;
        self.publish(session_id, guard, corpus)
    }

    /// Answer a question from a ready session's corpus.
    ///
    /// Retrieves `retrieval_k` chunks, drops those scoring below
    /// `relevance_threshold`, and hands the rest to the synthesizer. If no
    /// chunk clears the threshold, the synthesizer is not called and an
    /// explicit ungrounded answer with no sources is returned.
    ///
    /// Queries only read the index, so any number may run concurrently on the
    /// same session. Dropping the returned future cancels the query cleanly.
    ///
    /// # Errors
    ///
    /// - [`RagError::SessionNotFound`] for an unknown session
    /// - [`RagError::InvalidArgument`] for a blank question
    /// - [`RagError::InvalidState`] unless the session is ready
    /// - [`RagError::Provider`] from the embedding provider or synthesizer
    pub async fn query(&self, session_id: &str, query: &str) -> Result<AttributedAnswer> {
        let session = self.session(session_id).await?;
        if query.trim().is_empty() {
            return Err(RagError::InvalidArgument("query must not be blank".to_string()));
        }

        let guard = session.begin_query()?;
        let result = retrieve(
            query,
            guard.corpus().index(),
            self.embedding_provider.as_ref(),
            self.config.retrieval_k,
        )
        .await?;

        let context = result.above_threshold(self.config.relevance_threshold);
        let answer = if context.is_empty() {
            info!(
                session.id = session_id,
                threshold = self.config.relevance_threshold,
                "no chunk above relevance threshold"
            );
            AttributedAnswer::ungrounded()
        } else {
            self.synthesizer.synthesize(query, &context).await.inspect_err(|e| {
                error!(
                    session.id = session_id,
                    synthesizer = self.synthesizer.name(),
                    error = %e,
                    "synthesis failed"
                );
            })?
        };

        guard.complete();
        info!(
            session.id = session_id,
            grounded = answer.grounded,
            source_count = answer.sources.len(),
            "query answered"
        );
        Ok(answer)
    }

    /// Retrieve the `k` most similar chunks without synthesizing an answer.
    ///
    /// No relevance threshold is applied.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidArgument`] if `k == 0`, and otherwise the
    /// errors of [`query`](Self::query).
    pub async fn retrieve(&self, session_id: &str, query: &str, k: usize) -> Result<RetrievalResult> {
        let session = self.session(session_id).await?;
        let guard = session.begin_query()?;
        retrieve(query, guard.corpus().index(), self.embedding_provider.as_ref(), k).await
    }

    /// Tear a session down and release its corpus.
    ///
    /// Queries already running finish against the complete index; new calls
    /// for this identifier fail with [`RagError::SessionNotFound`]. Returns
    /// the state the session was in.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::SessionNotFound`] for unknown sessions.
    pub async fn close_session(&self, session_id: &str) -> Result<SessionState> {
        let session = self
            .sessions
            .write()
            .await
            .remove(session_id)
            .ok_or_else(|| RagError::SessionNotFound(session_id.to_string()))?;
        let previous = session.close();
        info!(
            session.id = session_id,
            previous = %previous,
            turns = session.turn_count(),
            "closed session"
        );
        Ok(previous)
    }

    async fn session(&self, session_id: &str) -> Result<Arc<Session>> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| RagError::SessionNotFound(session_id.to_string()))
    }

    fn check_quota<'a>(&self, items: impl ExactSizeIterator<Item = (&'a str, usize)>) -> Result<()> {
        let max_documents = self.config.max_documents_per_session;
        if items.len() > max_documents {
            return Err(RagError::QuotaExceeded(format!(
                "{} documents uploaded, at most {max_documents} allowed per session",
                items.len()
            )));
        }
        if items.len() == 0 {
            return Err(RagError::InvalidArgument("no documents uploaded".to_string()));
        }

        let max_bytes = self.config.max_document_size_bytes;
        for (name, size) in items {
            if size > max_bytes {
                return Err(RagError::QuotaExceeded(format!(
                    "'{name}' is {size} bytes, at most {max_bytes} allowed"
                )));
            }
        }
        Ok(())
    }

    /// Chunk, embed and index `documents`, preserving upload and ordinal order.
    async fn build_corpus(
        &self,
        session_id: &str,
        documents: Vec<Document>,
    ) -> Result<(Corpus, IngestReport)> {
        let mut sources = Vec::with_capacity(documents.len());
        let mut chunks = Vec::new();
        for document in documents {
            let document_chunks = self.chunker.chunk(&document);
            debug!(
                session.id = session_id,
                document.id = %document.id,
                chunk_count = document_chunks.len(),
                "chunked document"
            );
            sources.push(document.source());
            chunks.extend(document_chunks);
            // The document's full text is dropped here.
        }

        let mut embeddings = Vec::with_capacity(chunks.len());
        let mut attempts = 0u32;
        let mut batches = 0usize;
        for batch in chunks.chunks(self.config.embedding_batch_size) {
            let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
            embeddings.extend(self.embed_with_retry(session_id, &texts, &mut attempts).await?);
            batches += 1;
        }

        let chunk_count = chunks.len();
        let index = VectorIndex::build(chunks, embeddings).inspect_err(|e| {
            error!(session.id = session_id, error = %e, "index build failed");
        })?;

        let report = IngestReport {
            documents: sources.clone(),
            chunk_count,
            batches,
            embedding_attempts: attempts,
        };
        Ok((Corpus::new(sources, index), report))
    }

    /// Embed one batch, retrying transient failures with exponential backoff.
    async fn embed_with_retry(
        &self,
        session_id: &str,
        texts: &[&str],
        attempts: &mut u32,
    ) -> Result<Vec<Vec<f32>>> {
        let provider = self.embedding_provider.name();
        let max_retries = self.config.ingestion_retry_attempts;
        let mut retry = 0u32;
        loop {
            *attempts += 1;
            match self.embedding_provider.embed_batch(texts).await {
                Ok(vectors) if vectors.len() == texts.len() => return Ok(vectors),
                Ok(vectors) => {
                    let err = RagError::permanent(
                        provider,
                        format!("{} embeddings returned for {} texts", vectors.len(), texts.len()),
                    );
                    error!(session.id = session_id, error = %err, "embedding batch malformed");
                    return Err(err);
                }
                Err(e) if e.is_transient() && retry < max_retries => {
                    retry += 1;
                    let delay = self.config.backoff_delay(retry);
                    warn!(
                        session.id = session_id,
                        provider,
                        attempt = retry,
                        max_retries,
                        delay = ?delay,
                        error = %e,
                        "transient embedding failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) if e.is_transient() => {
                    error!(
                        session.id = session_id,
                        provider,
                        attempts = retry + 1,
                        error = %e,
                        "embedding retries exhausted"
                    );
                    return Err(RagError::IngestionFailed {
                        attempts: retry + 1,
                        reason: e.to_string(),
                    });
                }
                Err(e) => {
                    error!(session.id = session_id, provider, error = %e, "permanent embedding failure");
                    return Err(e);
                }
            }
        }
    }

    fn publish(
        &self,
        session_id: &str,
        guard: IngestGuard<'_>,
        (corpus, report): (Corpus, IngestReport),
    ) -> Result<IngestReport> {
        guard.commit(corpus)?;
        info!(
            session.id = session_id,
            document_count = report.documents.len(),
            chunk_count = report.chunk_count,
            embedding_attempts = report.embedding_attempts,
            "session ready"
        );
        Ok(report)
    }
}

/// Builder for constructing a [`SessionPipeline`].
///
/// `config`, `embedding_provider` and `synthesizer` are required. The chunker
/// defaults to a [`BoundaryChunker`] using the configured length and overlap,
/// and the extractor registry to [`ExtractorRegistry::default`].
///
/// # Example
///
/// ```rust,ignore
/// let pipeline = SessionPipeline::builder()
///     .config(PipelineConfig::default())
///     .embedding_provider(Arc::new(embedder))
///     .synthesizer(Arc::new(synthesizer))
///     .extractors(ExtractorRegistry::default().register("pdf", Arc::new(pdf))) // optional
///     .build()?;
/// ```
#[derive(Default)]
pub struct SessionPipelineBuilder {
    config: Option<PipelineConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    synthesizer: Option<Arc<dyn AnswerSynthesizer>>,
    chunker: Option<Arc<dyn Chunker>>,
    extractors: Option<ExtractorRegistry>,
}

impl SessionPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the answer synthesizer.
    pub fn synthesizer(mut self, synthesizer: Arc<dyn AnswerSynthesizer>) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    /// Override the document chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Override the text extractors.
    pub fn extractors(mut self, extractors: ExtractorRegistry) -> Self {
        self.extractors = Some(extractors);
        self
    }

    /// Build the [`SessionPipeline`], validating the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Configuration`] if a required field is missing or
    /// the configuration is invalid.
    pub fn build(self) -> Result<SessionPipeline> {
        let config = self
            .config
            .ok_or_else(|| RagError::Configuration("config is required".to_string()))?;
        config.validate()?;
        let embedding_provider = self.embedding_provider.ok_or_else(|| {
            RagError::Configuration("embedding_provider is required".to_string())
        })?;
        let synthesizer = self
            .synthesizer
            .ok_or_else(|| RagError::Configuration("synthesizer is required".to_string()))?;
        let chunker = match self.chunker {
            Some(chunker) => chunker,
            None => Arc::new(BoundaryChunker::new(config.chunk_max_length, config.chunk_overlap)?),
        };

        Ok(SessionPipeline {
            config,
            embedding_provider,
            synthesizer,
            chunker,
            extractors: self.extractors.unwrap_or_default(),
            sessions: RwLock::new(HashMap::new()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::HashingEmbedder;
    use crate::synthesis::ExtractiveSynthesizer;

    fn pipeline(config: PipelineConfig) -> SessionPipeline {
        SessionPipeline::builder()
            .config(config)
            .embedding_provider(Arc::new(HashingEmbedder::new(64)))
            .synthesizer(Arc::new(ExtractiveSynthesizer::default()))
            .build()
            .unwrap()
    }

    #[test]
    fn builder_requires_providers() {
        let err = SessionPipeline::builder().config(PipelineConfig::default()).build();
        assert!(matches!(err, Err(RagError::Configuration(_))));
    }

    #[test]
    fn builder_rejects_invalid_config() {
        let config = PipelineConfig { chunk_overlap: 5000, ..PipelineConfig::default() };
        let err = SessionPipeline::builder()
            .config(config)
            .embedding_provider(Arc::new(HashingEmbedder::default()))
            .synthesizer(Arc::new(ExtractiveSynthesizer::default()))
            .build();
        assert!(matches!(err, Err(RagError::Configuration(_))));
    }

    #[tokio::test]
    async fn ingest_then_query() {
        let pipeline = pipeline(PipelineConfig::default());
        let session = pipeline.create_session().await;
        let report = pipeline
            .ingest(&session, vec![Upload::new("sky.txt", "The sky is blue. Grass is green.")])
            .await
            .unwrap();
        assert_eq!(report.chunk_count, 1);
        assert_eq!(report.embedding_attempts, 1);

        let answer = pipeline.query(&session, "what colour is the sky").await.unwrap();
        assert!(answer.grounded);
        assert_eq!(answer.sources[0].name, "sky.txt");
        assert_eq!(pipeline.session_info(&session).await.unwrap().turn_count, 1);
    }

    #[tokio::test]
    async fn unknown_session_is_reported() {
        let pipeline = pipeline(PipelineConfig::default());
        let err = pipeline.query("nope", "anything").await.unwrap_err();
        assert!(matches!(err, RagError::SessionNotFound(_)));
        assert!(matches!(pipeline.close_session("nope").await, Err(RagError::SessionNotFound(_))));
    }

    #[tokio::test]
    async fn empty_upload_is_invalid() {
        let pipeline = pipeline(PipelineConfig::default());
        let session = pipeline.create_session().await;
        let err = pipeline.ingest(&session, Vec::new()).await.unwrap_err();
        assert!(matches!(err, RagError::InvalidArgument(_)));
        assert_eq!(pipeline.session_state(&session).await.unwrap(), SessionState::Empty);
    }

    #[tokio::test]
    async fn unsupported_upload_leaves_session_empty() {
        let pipeline = pipeline(PipelineConfig::default());
        let session = pipeline.create_session().await;
        let err = pipeline.ingest(&session, vec![Upload::new("scan.pdf", b"%PDF".to_vec())]).await;
        assert!(matches!(err, Err(RagError::Extraction { .. })));
        assert_eq!(pipeline.session_state(&session).await.unwrap(), SessionState::Empty);
    }
}
