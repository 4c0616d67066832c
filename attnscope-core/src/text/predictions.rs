//! Cleanup of fill-mask candidates returned by the model service.

use super::convention::TokenizerConvention;
use crate::types::WordPrediction;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One raw fill-mask candidate, as decoded by the model's tokenizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenScore {
    pub token: String,
    pub score: f64,
}

/// Turn raw candidates into displayable words.
///
/// Whitespace and the sub-word marker are stripped; empty words, special
/// tokens and repeats are dropped. Order is kept and at most `limit` words
/// are returned.
pub fn clean_predictions(
    candidates: &[TokenScore],
    convention: TokenizerConvention,
    limit: usize,
) -> Vec<WordPrediction> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(limit.min(candidates.len()));
    for candidate in candidates {
        if out.len() >= limit {
            break;
        }
        let word = convention.strip_marker(candidate.token.trim()).trim();
        if word.is_empty() || convention.is_special(word) || !seen.insert(word.to_string()) {
            continue;
        }
        out.push(WordPrediction {
            word: word.to_string(),
            score: candidate.score,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(items: &[(&str, f64)]) -> Vec<TokenScore> {
        items
            .iter()
            .map(|(t, s)| TokenScore {
                token: t.to_string(),
                score: *s,
            })
            .collect()
    }

    #[test]
    fn test_drops_specials_empties_and_duplicates() {
        let raw = scores(&[
            ("dog", 0.4),
            (" ", 0.2),
            ("[UNK]", 0.1),
            ("dog", 0.05),
            ("##s", 0.03),
        ]);
        let words = clean_predictions(&raw, TokenizerConvention::ContinuationMarked, 10);
        let names: Vec<&str> = words.iter().map(|w| w.word.as_str()).collect();
        assert_eq!(names, vec!["dog", "s"]);
        assert_eq!(words[0].score, 0.4);
    }

    #[test]
    fn test_word_start_marker_removed() {
        let raw = scores(&[("\u{120}cat", 0.5), ("cat", 0.3), ("<mask>", 0.1), ("\u{120}", 0.1)]);
        let words = clean_predictions(&raw, TokenizerConvention::WordStartMarked, 10);
        assert_eq!(words.len(), 1);
        assert_eq!(words[0].word, "cat");
    }

    #[test]
    fn test_limit() {
        let raw = scores(&[("a", 0.3), ("b", 0.2), ("c", 0.1)]);
        let words = clean_predictions(&raw, TokenizerConvention::ContinuationMarked, 2);
        assert_eq!(words.len(), 2);
        assert!(clean_predictions(&raw, TokenizerConvention::ContinuationMarked, 0).is_empty());
    }
}
