//! Document chunking.
//!
//! Text is cut into windows of at most `max_length` characters. Consecutive
//! windows share exactly `overlap` characters, so dropping the first `overlap`
//! characters of every chunk after the first and concatenating reproduces the
//! input. A window's end is moved back to the nearest paragraph, sentence or
//! word break when one lies within the boundary tolerance of the target
//! length; otherwise the window is cut hard.

use std::iter;
use std::ops::Range;

use crate::document::{Chunk, Document};
use crate::error::{RagError, Result};

/// Default tolerance is `max_length / BOUNDARY_TOLERANCE_DIVISOR` characters.
const BOUNDARY_TOLERANCE_DIVISOR: usize = 5;

/// A strategy for splitting documents into chunks.
pub trait Chunker: Send + Sync {
    /// Split a document into chunks, ordered by ordinal.
    ///
    /// Returns an empty `Vec` if the document has empty text.
    fn chunk(&self, document: &Document) -> Vec<Chunk>;
}

/// Splits text into overlapping windows, preferring natural break points.
///
/// # Example
///
/// ```rust
/// use docqa_rag::{BoundaryChunker, Chunker, Document};
///
/// let chunker = BoundaryChunker::new(20, 5).unwrap();
/// let chunks = chunker.chunk(&Document::new("sky.txt", "The sky is blue. Grass is green."));
/// assert_eq!(chunks.len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct BoundaryChunker {
    max_length: usize,
    overlap: usize,
    tolerance: usize,
}

impl BoundaryChunker {
    /// Create a new `BoundaryChunker`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Configuration`] unless `0 <= overlap < max_length`.
    pub fn new(max_length: usize, overlap: usize) -> Result<Self> {
        validate(max_length, overlap)?;
        Ok(Self { max_length, overlap, tolerance: default_tolerance(max_length) })
    }

    /// Set how many characters before the target length are searched for a
    /// break point. Zero disables boundary search entirely.
    pub fn with_boundary_tolerance(mut self, tolerance: usize) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Compute the byte ranges of each chunk of `text`.
    pub fn spans(&self, text: &str) -> Vec<Range<usize>> {
        split_spans(text, self.max_length, self.overlap, self.tolerance)
    }
}

impl Chunker for BoundaryChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        self.spans(&document.text)
            .into_iter()
            .enumerate()
            .map(|(ordinal, span)| Chunk {
                document_id: document.id.clone(),
                document_name: document.name.clone(),
                ordinal,
                text: document.text[span.clone()].to_string(),
                start: span.start,
                end: span.end,
            })
            .collect()
    }
}

/// Split `text` into overlapping pieces of at most `max_length` characters.
///
/// # Errors
///
/// Returns [`RagError::Configuration`] unless `0 <= overlap < max_length`.
pub fn split(text: &str, max_length: usize, overlap: usize) -> Result<Vec<&str>> {
    validate(max_length, overlap)?;
    Ok(split_spans(text, max_length, overlap, default_tolerance(max_length))
        .into_iter()
        .map(|span| &text[span])
        .collect())
}

fn validate(max_length: usize, overlap: usize) -> Result<()> {
    if max_length == 0 {
        return Err(RagError::Configuration("chunk max length must be greater than zero".into()));
    }
    if overlap >= max_length {
        return Err(RagError::Configuration(format!(
            "chunk overlap ({overlap}) must be less than chunk max length ({max_length})"
        )));
    }
    Ok(())
}

fn default_tolerance(max_length: usize) -> usize {
    (max_length / BOUNDARY_TOLERANCE_DIVISOR).max(1)
}

/// Core splitting loop. Positions are counted in characters and translated to
/// byte offsets only when a span is emitted.
fn split_spans(
    text: &str,
    max_length: usize,
    overlap: usize,
    tolerance: usize,
) -> Vec<Range<usize>> {
    if text.is_empty() {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    let offsets: Vec<usize> =
        text.char_indices().map(|(i, _)| i).chain(iter::once(text.len())).collect();
    let total = chars.len();

    let mut spans = Vec::new();
    let mut start = 0;
    loop {
        let target = start + max_length;
        if target >= total {
            spans.push(offsets[start]..offsets[total]);
            break;
        }

        // The cut must leave more than `overlap` characters in this window so
        // the next window starts strictly later.
        let earliest = (start + overlap + 1).max(target.saturating_sub(tolerance));
        let end = find_break(&chars, earliest, target).unwrap_or(target);

        spans.push(offsets[start]..offsets[end]);
        start = end - overlap;
    }

    spans
}

#[derive(Debug, Clone, Copy)]
enum BreakKind {
    Paragraph,
    Sentence,
    Word,
}

/// Find the strongest break in `earliest..=latest`, preferring the rightmost
/// position within the strongest kind present.
fn find_break(chars: &[char], earliest: usize, latest: usize) -> Option<usize> {
    if earliest > latest {
        return None;
    }
    [BreakKind::Paragraph, BreakKind::Sentence, BreakKind::Word]
        .into_iter()
        .find_map(|kind| (earliest..=latest).rev().find(|&pos| is_break(chars, pos, kind)))
}

/// Whether cutting immediately before `chars[pos]` is a break of `kind`.
fn is_break(chars: &[char], pos: usize, kind: BreakKind) -> bool {
    if pos == 0 || pos >= chars.len() {
        return false;
    }
    let before = chars[pos - 1];
    let two_before = pos.checked_sub(2).map(|i| chars[i]);
    match kind {
        BreakKind::Paragraph => before == '\n' && two_before == Some('\n'),
        BreakKind::Sentence => {
            before.is_whitespace() && matches!(two_before, Some('.' | '!' | '?'))
        }
        BreakKind::Word => before.is_whitespace() && !chars[pos].is_whitespace(),
    }
}
