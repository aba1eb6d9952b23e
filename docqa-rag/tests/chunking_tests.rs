//! Property tests for boundary-aware overlapping chunking.

use docqa_rag::{BoundaryChunker, Chunker, Document, split};
use proptest::prelude::*;

/// Text mixing words, sentence punctuation, paragraphs and multi-byte characters.
fn arb_text() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z]{0,300}",
        "[a-zA-Z .,!?\n]{0,400}",
        "[a-zé ü.\n]{0,200}",
        "\\PC{0,150}",
    ]
}

/// A valid `(max_length, overlap)` pair.
fn arb_params() -> impl Strategy<Value = (usize, usize)> {
    (1usize..80).prop_flat_map(|max| (Just(max), 0..max))
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// **Property: chunking loses and duplicates nothing outside the overlap**
/// *For any* text and valid `(max_length, overlap)`, dropping the first
/// `overlap` characters of every chunk after the first and concatenating
/// SHALL reproduce the text exactly; every chunk SHALL be at most
/// `max_length` characters; consecutive chunks SHALL share exactly `overlap`
/// characters.
mod prop_chunk_reconstruction {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn overlap_removed_concatenation_reconstructs_text(
            text in arb_text(),
            (max_length, overlap) in arb_params(),
        ) {
            let chunks = split(&text, max_length, overlap).unwrap();

            let mut rebuilt = String::new();
            for (i, chunk) in chunks.iter().enumerate() {
                if i == 0 {
                    rebuilt.push_str(chunk);
                } else {
                    rebuilt.extend(chunk.chars().skip(overlap));
                }
            }
            prop_assert_eq!(&rebuilt, &text);
        }

        #[test]
        fn chunks_are_bounded_and_share_exact_overlap(
            text in arb_text(),
            (max_length, overlap) in arb_params(),
        ) {
            let chunks = split(&text, max_length, overlap).unwrap();
            prop_assert_eq!(chunks.is_empty(), text.is_empty());

            for chunk in &chunks {
                prop_assert!(char_len(chunk) <= max_length);
                prop_assert!(!chunk.is_empty());
            }

            for pair in chunks.windows(2) {
                let tail: String = pair[0].chars().skip(char_len(pair[0]) - overlap).collect();
                let head: String = pair[1].chars().take(overlap).collect();
                prop_assert_eq!(tail, head);
            }
        }

        #[test]
        fn short_text_is_one_chunk(
            (max_length, overlap) in arb_params(),
            seed in "[a-z ]{1,80}",
        ) {
            let text: String = seed.chars().take(max_length).collect();
            prop_assert_eq!(split(&text, max_length, overlap).unwrap(), vec![text.as_str()]);
        }

        #[test]
        fn spans_index_the_document_text(
            text in arb_text(),
            (max_length, overlap) in arb_params(),
        ) {
            let document = Document::new("doc.txt", text.clone());
            let chunker = BoundaryChunker::new(max_length, overlap).unwrap();
            for (i, chunk) in chunker.chunk(&document).iter().enumerate() {
                prop_assert_eq!(chunk.ordinal, i);
                prop_assert_eq!(&text[chunk.start..chunk.end], chunk.text.as_str());
            }
        }
    }
}

#[test]
fn sky_and_grass_scenario_splits_with_five_character_overlap() {
    let chunks = split("The sky is blue. Grass is green.", 20, 5).unwrap();
    assert!(chunks.len() >= 2);
    for pair in chunks.windows(2) {
        let tail: String = pair[0].chars().skip(char_len(pair[0]) - 5).collect();
        let head: String = pair[1].chars().take(5).collect();
        assert_eq!(tail, head);
    }
}

#[test]
fn invalid_parameters_are_rejected() {
    assert!(split("text", 3, 3).is_err());
    assert!(split("text", 0, 0).is_err());
    assert!(split("", 0, 0).is_err());
}
