//! Session-scoped retrieval-augmented question answering over uploaded documents.
//!
//! A [`SessionPipeline`] binds one uploaded corpus to one conversational
//! session. Uploads are extracted to plain text, split into overlapping
//! chunks, embedded and placed in an exact in-memory [`VectorIndex`]. Each
//! question is embedded, matched against the index, filtered by a relevance
//! threshold and answered by an [`AnswerSynthesizer`] with explicit source
//! attribution.
//!
//! The embedding provider and the answer synthesizer are traits; this crate
//! ships local implementations ([`HashingEmbedder`], [`ExtractiveSynthesizer`])
//! and, behind the `openai` feature, OpenAI-backed ones.
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use docqa_rag::{
//!     ExtractiveSynthesizer, HashingEmbedder, PipelineConfig, SessionPipeline, Upload,
//! };
//!
//! # async fn run() -> docqa_rag::Result<()> {
//! let pipeline = SessionPipeline::builder()
//!     .config(PipelineConfig::builder().chunk_max_length(200).chunk_overlap(40).build()?)
//!     .embedding_provider(Arc::new(HashingEmbedder::default()))
//!     .synthesizer(Arc::new(ExtractiveSynthesizer::default()))
//!     .build()?;
//!
//! let session = pipeline.create_session().await;
//! pipeline.ingest(&session, vec![Upload::new("sky.txt", "The sky is blue.")]).await?;
//! let answer = pipeline.query(&session, "What colour is the sky?").await?;
//! assert_eq!(answer.sources[0].name, "sky.txt");
//! pipeline.close_session(&session).await?;
//! # Ok(())
//! # }
//! ```

pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod hashing;
pub mod index;
#[cfg(feature = "openai")]
pub mod openai;
pub mod pipeline;
pub mod retriever;
pub mod session;
pub mod synthesis;

pub use chunking::{BoundaryChunker, Chunker, split};
pub use config::{PipelineConfig, PipelineConfigBuilder};
pub use document::{
    AttributedAnswer, Chunk, Citation, Document, NO_GROUNDING_ANSWER, RetrievalResult,
    ScoredChunk, SourceDocument, Upload,
};
pub use embedding::EmbeddingProvider;
pub use error::{ProviderErrorKind, RagError, Result};
pub use extract::{ExtractorRegistry, TextExtractor, Utf8TextExtractor};
pub use hashing::HashingEmbedder;
pub use index::VectorIndex;
#[cfg(feature = "openai")]
pub use openai::{OpenAIChatSynthesizer, OpenAIEmbeddingProvider};
pub use pipeline::{IngestReport, SessionPipeline, SessionPipelineBuilder};
pub use retriever::retrieve;
pub use session::{Corpus, Session, SessionId, SessionInfo, SessionState};
pub use synthesis::{
    AnswerSynthesizer, DECLINE_MARKER, ExtractiveSynthesizer, grounded_prompt, is_decline,
};
