//! Token-to-word alignment.
//!
//! Maps sub-word token positions to indices of whitespace-delimited words in
//! the original text. Three passes run in order, each touching only tokens
//! the earlier passes left unmapped:
//!
//! 1. exact match against the word with trailing punctuation removed,
//! 2. substring match against the lower-cased word,
//! 3. left-to-right distribution over words that have no token yet.

use super::convention::TokenizerConvention;
use crate::types::Token;
use std::collections::BTreeMap;
use tracing::{debug, trace};

/// Token index to word index. Ordered so iteration is deterministic.
pub type WordAlignmentMap = BTreeMap<usize, usize>;

/// Characters stripped from the end of a word before exact matching.
pub const TRAILING_PUNCTUATION: &[char] = &['.', ',', '!', '?', ';', ':'];

/// Align `tokens` to the words of `text`.
///
/// Every non-special token receives a word index as long as the text has at
/// least one word. With no words the map is empty.
pub fn align(tokens: &[Token], text: &str, convention: TokenizerConvention) -> WordAlignmentMap {
    let lowered: Vec<String> = text.split_whitespace().map(str::to_lowercase).collect();
    let mut map = WordAlignmentMap::new();
    if lowered.is_empty() {
        debug!("no words in text, alignment map is empty");
        return map;
    }
    let bare: Vec<&str> = lowered
        .iter()
        .map(|w| w.trim_end_matches(TRAILING_PUNCTUATION))
        .collect();

    let content: Vec<(usize, String)> = tokens
        .iter()
        .filter(|t| !convention.is_special(&t.text))
        .map(|t| (t.index, convention.clean(&t.text)))
        .collect();

    for (index, clean) in &content {
        if let Some(word) = bare.iter().position(|w| w == clean) {
            trace!(token = index, word, "exact match");
            map.insert(*index, word);
        }
    }

    for (index, clean) in &content {
        if map.contains_key(index) || clean.is_empty() {
            continue;
        }
        if let Some(word) = lowered.iter().position(|w| w.contains(clean.as_str())) {
            trace!(token = index, word, "substring match");
            map.insert(*index, word);
        }
    }

    let gaps = content.len() - map.len();
    if gaps > 0 {
        debug!(gaps, "tokens left unaligned by matching, distributing by position");
        let last = lowered.len() - 1;
        let mut per_word = vec![0usize; lowered.len()];
        for &word in map.values() {
            per_word[word] += 1;
        }
        let mut cursor = 0;
        for (index, _) in &content {
            if map.contains_key(index) {
                continue;
            }
            while cursor < last && per_word[cursor] > 0 {
                cursor += 1;
            }
            trace!(token = index, word = cursor, "position match");
            map.insert(*index, cursor);
            per_word[cursor] += 1;
        }
    }

    map
}

/// Copy word indices from `map` onto the tokens.
pub fn apply_alignment(tokens: &mut [Token], map: &WordAlignmentMap) {
    for token in tokens {
        token.word_index = map.get(&token.index).copied();
    }
}
