//! Answer synthesis from retrieved context.
//!
//! An [`AnswerSynthesizer`] turns a question plus its [`RetrievalResult`] into
//! an [`AttributedAnswer`]. Only the retrieved chunk texts are passed as
//! grounding context, never whole documents. The pipeline drops chunks below
//! the relevance threshold before a synthesizer is called, and answers with
//! [`AttributedAnswer::ungrounded`] when nothing is left.

use std::fmt::Write as _;

use async_trait::async_trait;

use crate::document::{AttributedAnswer, RetrievalResult};
use crate::error::Result;

/// Reply a language model is told to give when the excerpts do not answer
/// the question.
pub const DECLINE_MARKER: &str = "NO_ANSWER";

/// Produces an answer grounded in retrieved chunks.
///
/// Implementations that call a language model should build their prompt with
/// [`grounded_prompt`] and map a [`DECLINE_MARKER`] reply to
/// [`AttributedAnswer::ungrounded`].
#[async_trait]
pub trait AnswerSynthesizer: Send + Sync {
    /// Short synthesizer name used in logs and error messages.
    fn name(&self) -> &str;

    /// Answer `query` using only the chunks in `context`.
    async fn synthesize(&self, query: &str, context: &RetrievalResult) -> Result<AttributedAnswer>;
}

/// Render the grounding prompt for a language model.
///
/// Excerpts are numbered in rank order and labelled with their source
/// document name.
pub fn grounded_prompt(query: &str, context: &RetrievalResult) -> String {
    let mut prompt = String::from(
        "Answer the question using only the numbered excerpts below. \
         Mention which documents you used. If the excerpts do not contain the answer, \
         reply with exactly ",
    );
    prompt.push_str(DECLINE_MARKER);
    prompt.push_str(" and nothing else.\n\n");

    for (i, hit) in context.hits.iter().enumerate() {
        // Writing to a String cannot fail.
        let _ = writeln!(
            prompt,
            "[{}] ({}, part {})\n{}\n",
            i + 1,
            hit.chunk.document_name,
            hit.chunk.ordinal + 1,
            hit.chunk.text.trim()
        );
    }

    let _ = write!(prompt, "Question: {}", query.trim());
    prompt
}

/// Returns `true` if a model reply is the decline marker.
pub fn is_decline(reply: &str) -> bool {
    reply.trim().trim_end_matches('.').eq_ignore_ascii_case(DECLINE_MARKER)
}

/// A synthesizer that answers by quoting the best retrieved excerpts.
///
/// No language model is involved: the answer is the text of the top
/// `max_excerpts` chunks, each labelled with its source, and every quoted
/// chunk is cited.
#[derive(Debug, Clone)]
pub struct ExtractiveSynthesizer {
    max_excerpts: usize,
}

impl Default for ExtractiveSynthesizer {
    fn default() -> Self {
        Self { max_excerpts: 2 }
    }
}

impl ExtractiveSynthesizer {
    /// Create a synthesizer quoting at most `max_excerpts` chunks (at least one).
    pub fn new(max_excerpts: usize) -> Self {
        Self { max_excerpts: max_excerpts.max(1) }
    }
}

#[async_trait]
impl AnswerSynthesizer for ExtractiveSynthesizer {
    fn name(&self) -> &str {
        "extractive"
    }

    async fn synthesize(&self, _query: &str, context: &RetrievalResult) -> Result<AttributedAnswer> {
        if context.is_empty() {
            return Ok(AttributedAnswer::ungrounded());
        }

        let used = RetrievalResult {
            hits: context.hits.iter().take(self.max_excerpts).cloned().collect(),
        };
        let text = used
            .hits
            .iter()
            .map(|hit| format!("{} (from {})", hit.chunk.text.trim(), hit.chunk.document_name))
            .collect::<Vec<_>>()
            .join("\n\n");

        Ok(AttributedAnswer::grounded(text, &used))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Chunk, ScoredChunk};

    fn context() -> RetrievalResult {
        let hit = |doc: &str, ordinal: usize, text: &str, score: f32| ScoredChunk {
            chunk: Chunk {
                document_id: doc.to_string(),
                document_name: format!("{doc}.md"),
                ordinal,
                text: text.to_string(),
                start: 0,
                end: text.len(),
            },
            score,
        };
        RetrievalResult {
            hits: vec![
                hit("sky", 0, "The sky is blue. ", 0.9),
                hit("grass", 0, "Grass is green.", 0.6),
                hit("sky", 1, "Clouds are white.", 0.4),
            ],
        }
    }

    #[test]
    fn prompt_contains_only_chunk_text_and_question() {
        let prompt = grounded_prompt("What colour is the sky?", &context());
        assert!(prompt.contains("[1] (sky.md, part 1)\nThe sky is blue."));
        assert!(prompt.contains("[3] (sky.md, part 2)\nClouds are white."));
        assert!(prompt.contains(DECLINE_MARKER));
        assert!(prompt.ends_with("Question: What colour is the sky?"));
    }

    #[test]
    fn decline_detection_tolerates_punctuation() {
        assert!(is_decline("NO_ANSWER"));
        assert!(is_decline("  no_answer.\n"));
        assert!(!is_decline("The sky is blue."));
    }

    #[tokio::test]
    async fn extractive_answer_quotes_and_cites_top_chunks() {
        let answer = ExtractiveSynthesizer::new(2).synthesize("sky?", &context()).await.unwrap();
        assert!(answer.grounded);
        assert!(answer.text.starts_with("The sky is blue. (from sky.md)"));
        assert_eq!(answer.citations.len(), 2);
        let names: Vec<_> = answer.sources.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["sky.md", "grass.md"]);
    }

    #[tokio::test]
    async fn extractive_answer_declines_on_empty_context() {
        let answer = ExtractiveSynthesizer::default()
            .synthesize("anything", &RetrievalResult::default())
            .await
            .unwrap();
        assert!(!answer.grounded);
        assert!(answer.sources.is_empty());
    }
}
