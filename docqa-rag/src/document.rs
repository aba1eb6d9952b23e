//! Data types for uploads, documents, chunks, retrieval results and answers.

use serde::{Deserialize, Serialize};

/// One uploaded file as received from the transport layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    /// The original file name, used to pick a text extractor.
    pub filename: String,
    /// The raw file content.
    pub content: Vec<u8>,
}

impl Upload {
    /// Create an upload from a file name and its bytes.
    pub fn new(filename: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self { filename: filename.into(), content: content.into() }
    }
}

/// A source document with its extracted plain text.
///
/// The text is owned by the ingestion step only; once chunked, the session
/// retains a [`SourceDocument`] and the chunks, never the full text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Unique identifier for the document.
    pub id: String,
    /// Display name, usually the uploaded file name.
    pub name: String,
    /// The extracted plain text.
    pub text: String,
}

impl Document {
    /// Create a document with a freshly generated identifier.
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self { id: uuid::Uuid::new_v4().to_string(), name: name.into(), text: text.into() }
    }

    /// The identity of this document without its text.
    pub fn source(&self) -> SourceDocument {
        SourceDocument { id: self.id.clone(), name: self.name.clone() }
    }
}

/// The identity of a document, as reported in answers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceDocument {
    /// Unique identifier for the document.
    pub id: String,
    /// Display name of the document.
    pub name: String,
}

/// A contiguous piece of one [`Document`]'s text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// The ID of the parent [`Document`].
    pub document_id: String,
    /// Display name of the parent document.
    pub document_name: String,
    /// Position of this chunk within its document, starting at zero.
    pub ordinal: usize,
    /// The text content of the chunk.
    pub text: String,
    /// Byte offset of the chunk's first character in the document text.
    pub start: usize,
    /// Byte offset one past the chunk's last character in the document text.
    pub end: usize,
}

/// A retrieved [`Chunk`] paired with its similarity to the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    /// The retrieved chunk.
    pub chunk: Chunk,
    /// Cosine similarity to the query (higher is more relevant).
    pub score: f32,
}

/// Chunks ranked by descending similarity for one query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    /// Ranked hits, best first.
    pub hits: Vec<ScoredChunk>,
}

impl RetrievalResult {
    /// Number of hits.
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    /// Returns `true` if nothing was retrieved.
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Keep only hits scoring at least `threshold`, preserving order.
    pub fn above_threshold(self, threshold: f32) -> Self {
        Self { hits: self.hits.into_iter().filter(|hit| hit.score >= threshold).collect() }
    }

    /// Distinct source documents, in order of their best-ranked chunk.
    pub fn sources(&self) -> Vec<SourceDocument> {
        let mut sources: Vec<SourceDocument> = Vec::new();
        for hit in &self.hits {
            if !sources.iter().any(|s| s.id == hit.chunk.document_id) {
                sources.push(SourceDocument {
                    id: hit.chunk.document_id.clone(),
                    name: hit.chunk.document_name.clone(),
                });
            }
        }
        sources
    }

    /// One citation per hit, in rank order.
    pub fn citations(&self) -> Vec<Citation> {
        self.hits
            .iter()
            .map(|hit| Citation {
                document_id: hit.chunk.document_id.clone(),
                ordinal: hit.chunk.ordinal,
                score: hit.score,
            })
            .collect()
    }
}

/// A reference to a chunk that grounded an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    /// The ID of the chunk's document.
    pub document_id: String,
    /// The chunk's ordinal within its document.
    pub ordinal: usize,
    /// The chunk's similarity to the query.
    pub score: f32,
}

/// Answer text returned when no retrieved chunk is relevant enough.
pub const NO_GROUNDING_ANSWER: &str =
    "I could not find sufficient grounding for this question in the uploaded documents.";

/// The final answer to a query with its source attribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributedAnswer {
    /// The answer text.
    pub text: String,
    /// Distinct documents the answer draws on.
    pub sources: Vec<SourceDocument>,
    /// The chunks used as grounding context.
    pub citations: Vec<Citation>,
    /// `false` when the pipeline declined to answer for lack of grounding.
    pub grounded: bool,
}

impl AttributedAnswer {
    /// An answer grounded in every hit of `context`.
    pub fn grounded(text: impl Into<String>, context: &RetrievalResult) -> Self {
        Self {
            text: text.into(),
            sources: context.sources(),
            citations: context.citations(),
            grounded: true,
        }
    }

    /// The explicit "no sufficient grounding" answer with no sources.
    pub fn ungrounded() -> Self {
        Self {
            text: NO_GROUNDING_ANSWER.to_string(),
            sources: Vec::new(),
            citations: Vec::new(),
            grounded: false,
        }
    }
}
