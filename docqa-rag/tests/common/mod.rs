//! Scripted provider fakes shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use docqa_rag::{
    AnswerSynthesizer, AttributedAnswer, EmbeddingProvider, ExtractiveSynthesizer,
    HashingEmbedder, PipelineConfig, RagError, Result, RetrievalResult, SessionPipeline,
};
use tokio::sync::Notify;

/// A hashing embedder that first replays a queue of scripted failures.
pub struct ScriptedEmbedder {
    inner: HashingEmbedder,
    failures: Mutex<VecDeque<RagError>>,
    drop_last: bool,
    calls: AtomicU32,
}

impl ScriptedEmbedder {
    pub fn new() -> Self {
        Self::failing_with(Vec::new())
    }

    /// Fail the next calls with `failures`, in order, then succeed.
    pub fn failing_with(failures: Vec<RagError>) -> Self {
        Self {
            inner: HashingEmbedder::new(128),
            failures: Mutex::new(failures.into()),
            drop_last: false,
            calls: AtomicU32::new(0),
        }
    }

    /// Answer every batch with one vector too few.
    pub fn short_batches() -> Self {
        Self { drop_last: true, ..Self::new() }
    }

    pub fn transient_failures(count: usize) -> Self {
        Self::failing_with(
            (0..count).map(|_| RagError::transient("scripted", "429 Too Many Requests")).collect(),
        )
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for ScriptedEmbedder {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failure = self.failures.lock().unwrap().pop_front();
        match failure {
            Some(err) => Err(err),
            None => {
                let mut vectors = self.inner.embed_batch(texts).await?;
                if self.drop_last {
                    vectors.pop();
                }
                Ok(vectors)
            }
        }
    }
}

/// An extractive synthesizer that counts calls and can be held mid-answer.
pub struct GatedSynthesizer {
    inner: ExtractiveSynthesizer,
    gated: bool,
    calls: AtomicU32,
    /// Notified when a call enters `synthesize`.
    pub entered: Notify,
    /// Notify to let a held call finish.
    pub release: Notify,
}

impl GatedSynthesizer {
    pub fn open() -> Self {
        Self::with_gate(false)
    }

    pub fn gated() -> Self {
        Self::with_gate(true)
    }

    fn with_gate(gated: bool) -> Self {
        Self {
            inner: ExtractiveSynthesizer::new(3),
            gated,
            calls: AtomicU32::new(0),
            entered: Notify::new(),
            release: Notify::new(),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnswerSynthesizer for GatedSynthesizer {
    fn name(&self) -> &str {
        "gated"
    }

    async fn synthesize(&self, query: &str, context: &RetrievalResult) -> Result<AttributedAnswer> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.gated {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.inner.synthesize(query, context).await
    }
}

pub fn config() -> PipelineConfig {
    PipelineConfig::builder()
        .chunk_max_length(120)
        .chunk_overlap(20)
        .retrieval_k(3)
        .relevance_threshold(0.1)
        .ingestion_retry_attempts(3)
        .ingestion_backoff_base_ms(100)
        .build()
        .unwrap()
}

pub fn pipeline(
    config: PipelineConfig,
    embedder: Arc<ScriptedEmbedder>,
    synthesizer: Arc<GatedSynthesizer>,
) -> SessionPipeline {
    SessionPipeline::builder()
        .config(config)
        .embedding_provider(embedder)
        .synthesizer(synthesizer)
        .build()
        .unwrap()
}

pub const SKY: &str = "The sky is blue on a clear day because air scatters blue sunlight. \
    At sunset the sky turns orange and red. Clouds look white because water droplets \
    scatter all colours equally.";

pub const GRASS: &str = "Grass is green because its cells are full of chlorophyll. \
    Chlorophyll absorbs red and blue light and reflects green light. Lawns need water, \
    sunlight and regular mowing to stay healthy.";

pub const BREAD: &str = "Bread is made from flour, water, salt and yeast. \
    The dough is kneaded, left to rise, shaped and baked in a hot oven until the crust \
    is golden brown.";
