//! Per-session state: one corpus, one index, one lifecycle.
//!
//! A [`Session`] moves through `Empty → Ingesting → Ready → (Querying →
//! Ready)* → Closed`. The phase lives behind a short-lived `std::sync::Mutex`
//! that is never held across an `.await`. Once ready, the corpus is shared as
//! an `Arc<Corpus>`: a query clones the `Arc` and keeps reading a complete
//! index even if the session is closed underneath it. Guards restore the
//! phase when an ingestion or query future is dropped mid-flight.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::document::SourceDocument;
use crate::error::{RagError, Result};
use crate::index::VectorIndex;

/// Session identifier (a UUID v4 string).
pub type SessionId = String;

/// Externally visible lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No corpus yet; uploads are accepted.
    Empty,
    /// Documents are being chunked, embedded and indexed.
    Ingesting,
    /// The corpus is indexed and no query is running.
    Ready,
    /// The corpus is indexed and at least one query is running.
    Querying,
    /// The session was torn down.
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Empty => "empty",
            Self::Ingesting => "ingesting",
            Self::Ready => "ready",
            Self::Querying => "querying",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// The indexed documents of a ready session.
#[derive(Debug)]
pub struct Corpus {
    documents: Vec<SourceDocument>,
    index: VectorIndex,
}

impl Corpus {
    /// Bundle the ingested documents (in upload order) with their index.
    pub fn new(documents: Vec<SourceDocument>, index: VectorIndex) -> Self {
        Self { documents, index }
    }

    /// Documents in upload order.
    pub fn documents(&self) -> &[SourceDocument] {
        &self.documents
    }

    /// The read-only vector index.
    pub fn index(&self) -> &VectorIndex {
        &self.index
    }
}

#[derive(Debug)]
enum Phase {
    Empty,
    Ingesting,
    Ready(Arc<Corpus>),
    Closed,
}

/// A snapshot of a session for introspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// The session identifier.
    pub id: SessionId,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// Current lifecycle state.
    pub state: SessionState,
    /// Ingested documents in upload order; empty until ready.
    pub documents: Vec<SourceDocument>,
    /// Number of indexed chunks; zero until ready.
    pub chunk_count: usize,
    /// Number of completed queries.
    pub turn_count: u64,
}

/// One user's isolated corpus and conversation.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    created_at: DateTime<Utc>,
    phase: Mutex<Phase>,
    in_flight: AtomicUsize,
    turns: AtomicU64,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// Create an empty session with a fresh identifier.
    pub fn new() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            phase: Mutex::new(Phase::Empty),
            in_flight: AtomicUsize::new(0),
            turns: AtomicU64::new(0),
        }
    }

    /// The session identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state_of(&self.phase())
    }

    /// Number of completed queries.
    pub fn turn_count(&self) -> u64 {
        self.turns.load(Ordering::SeqCst)
    }

    /// Snapshot the session.
    pub fn info(&self) -> SessionInfo {
        let state = self.state();
        let (documents, chunk_count) = match &*self.phase() {
            Phase::Ready(corpus) => (corpus.documents.clone(), corpus.index.len()),
            _ => (Vec::new(), 0),
        };
        SessionInfo {
            id: self.id.clone(),
            created_at: self.created_at,
            state,
            documents,
            chunk_count,
            turn_count: self.turn_count(),
        }
    }

    /// Move `Empty → Ingesting` once `admit` accepts the upload.
    ///
    /// `admit` runs under the session lock and only for an empty session, so
    /// a rejected upload leaves the state untouched.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidState`] from any other state, or the error
    /// returned by `admit`.
    pub fn begin_ingest(&self, admit: impl FnOnce() -> Result<()>) -> Result<IngestGuard<'_>> {
        let mut phase = self.phase();
        match &*phase {
            Phase::Empty => {
                admit()?;
                *phase = Phase::Ingesting;
                Ok(IngestGuard { session: self, committed: false })
            }
            _ => Err(self.invalid("ingest documents", &phase)),
        }
    }

    /// Register a query against the ready corpus.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidState`] unless the session is ready.
    pub fn begin_query(&self) -> Result<QueryGuard<'_>> {
        let phase = self.phase();
        match &*phase {
            Phase::Ready(corpus) => {
                self.in_flight.fetch_add(1, Ordering::SeqCst);
                Ok(QueryGuard { session: self, corpus: Arc::clone(corpus) })
            }
            _ => Err(self.invalid("query", &phase)),
        }
    }

    /// Move to `Closed`, releasing the session's reference to its corpus.
    ///
    /// Returns the state the session was in. Queries still running keep
    /// their own reference and finish against the complete index.
    pub fn close(&self) -> SessionState {
        let mut phase = self.phase();
        let previous = self.state_of(&phase);
        *phase = Phase::Closed;
        previous
    }

    fn phase(&self) -> MutexGuard<'_, Phase> {
        self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state_of(&self, phase: &Phase) -> SessionState {
        match phase {
            Phase::Empty => SessionState::Empty,
            Phase::Ingesting => SessionState::Ingesting,
            Phase::Ready(_) if self.in_flight.load(Ordering::SeqCst) > 0 => SessionState::Querying,
            Phase::Ready(_) => SessionState::Ready,
            Phase::Closed => SessionState::Closed,
        }
    }

    fn invalid(&self, operation: &'static str, phase: &Phase) -> RagError {
        RagError::InvalidState { operation, state: self.state_of(phase).to_string() }
    }
}

/// Holds a session in `Ingesting`; reverts it to `Empty` unless committed.
#[derive(Debug)]
pub struct IngestGuard<'a> {
    session: &'a Session,
    committed: bool,
}

impl IngestGuard<'_> {
    /// Publish the corpus and move `Ingesting → Ready`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidState`] if the session was closed while
    /// ingesting; the corpus is dropped.
    pub fn commit(mut self, corpus: Corpus) -> Result<()> {
        let mut phase = self.session.phase();
        match &*phase {
            Phase::Ingesting => {
                *phase = Phase::Ready(Arc::new(corpus));
                self.committed = true;
                Ok(())
            }
            _ => Err(self.session.invalid("finish ingestion", &phase)),
        }
    }
}

impl Drop for IngestGuard<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        let mut phase = self.session.phase();
        if matches!(*phase, Phase::Ingesting) {
            *phase = Phase::Empty;
        }
    }
}

/// A running query's hold on the corpus.
///
/// Dropping the guard, whether the query completed or was cancelled, takes
/// the session back out of `Querying`.
#[derive(Debug)]
pub struct QueryGuard<'a> {
    session: &'a Session,
    corpus: Arc<Corpus>,
}

impl QueryGuard<'_> {
    /// The corpus this query reads.
    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    /// Count the query as a completed conversational turn.
    pub fn complete(self) {
        self.session.turns.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for QueryGuard<'_> {
    fn drop(&mut self) {
        self.session.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
