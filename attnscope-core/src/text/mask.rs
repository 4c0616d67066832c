//! Mask-target resolution.
//!
//! Given a selected token, find the one span of the original text that the
//! token stands for and replace it. Resolution is an ordered list of
//! strategies; each either resolves a target or reports that it does not
//! apply, and the first one that resolves wins. The last strategy always
//! resolves, so any text with at least one word yields a target.

use super::align::{align, TRAILING_PUNCTUATION};
use super::convention::TokenizerConvention;
use crate::error::AttnError;
use crate::types::Token;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::{debug, trace};

/// Single-character tokens that are replaced in place rather than by word.
pub const PUNCTUATION: &[char] = &['.', ',', '!', '?', ':', ';', '-', '\'', '"'];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanKind {
    Word,
    Punctuation,
}

/// Which strategy produced a [`MaskTarget`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskStrategy {
    Punctuation,
    CharacterSpan,
    Alignment,
    DirectMatch,
    PositionEstimate,
    /// The caller named the word to replace.
    NamedWord,
}

/// The resolved replacement.
///
/// `position` is a word index for [`SpanKind::Word`] and a byte offset into
/// the original text for [`SpanKind::Punctuation`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaskTarget {
    pub span_kind: SpanKind,
    pub position: usize,
    pub modified_text: String,
    pub strategy: MaskStrategy,
}

/// Byte ranges of the whitespace-delimited words of `text`.
pub fn word_spans(text: &str) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut start = None;
    for (i, c) in text.char_indices() {
        match (c.is_whitespace(), start) {
            (true, Some(s)) => {
                spans.push(s..i);
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push(s..text.len());
    }
    spans
}

struct Request<'a> {
    tokens: &'a [Token],
    text: &'a str,
    selected: usize,
    replacement: &'a str,
    convention: TokenizerConvention,
    words: Vec<Range<usize>>,
}

impl Request<'_> {
    fn token(&self) -> &Token {
        &self.tokens[self.selected]
    }

    fn preceding_content_tokens(&self) -> usize {
        self.tokens[..self.selected]
            .iter()
            .filter(|t| !self.convention.is_special(&t.text))
            .count()
    }

    fn splice(&self, range: Range<usize>, with: &str) -> String {
        let mut out = String::with_capacity(self.text.len() + with.len());
        out.push_str(&self.text[..range.start]);
        out.push_str(with);
        out.push_str(&self.text[range.end..]);
        out
    }

    fn replace_word(&self, word: usize, strategy: MaskStrategy) -> MaskTarget {
        replace_word_at(self.text, &self.words, word, self.replacement, strategy)
    }
}

/// Replace word `word`, carrying over its trailing sentence punctuation.
fn replace_word_at(
    text: &str,
    words: &[Range<usize>],
    word: usize,
    replacement: &str,
    strategy: MaskStrategy,
) -> MaskTarget {
    let span = words[word].clone();
    let mut replacement = replacement.to_string();
    if let Some(last) = text[span.clone()].chars().last()
        && TRAILING_PUNCTUATION.contains(&last)
        && !replacement.ends_with(last)
    {
        replacement.push(last);
    }
    let mut modified_text = String::with_capacity(text.len() + replacement.len());
    modified_text.push_str(&text[..span.start]);
    modified_text.push_str(&replacement);
    modified_text.push_str(&text[span.end..]);
    MaskTarget {
        span_kind: SpanKind::Word,
        position: word,
        modified_text,
        strategy,
    }
}

/// Replace the first word of `text` equal to `word`, ignoring case and
/// trailing punctuation. `None` when no word matches.
pub fn replace_named_word(text: &str, word: &str, replacement: &str) -> Option<MaskTarget> {
    let wanted = word.trim().trim_end_matches(TRAILING_PUNCTUATION).to_lowercase();
    if wanted.is_empty() {
        return None;
    }
    let words = word_spans(text);
    let index = words.iter().position(|w| {
        text[w.clone()].trim_end_matches(TRAILING_PUNCTUATION).to_lowercase() == wanted
    })?;
    Some(replace_word_at(text, &words, index, replacement, MaskStrategy::NamedWord))
}

type Strategy = fn(&Request<'_>) -> Option<MaskTarget>;

const STRATEGIES: &[(MaskStrategy, Strategy)] = &[
    (MaskStrategy::Punctuation, punctuation),
    (MaskStrategy::CharacterSpan, character_span),
    (MaskStrategy::Alignment, alignment),
    (MaskStrategy::DirectMatch, direct_match),
];

/// Resolve the span of `text` that token `selected` stands for and replace it
/// with `replacement`.
pub fn resolve(
    tokens: &[Token],
    text: &str,
    selected: usize,
    replacement: &str,
    convention: TokenizerConvention,
) -> Result<MaskTarget, AttnError> {
    if selected >= tokens.len() {
        return Err(AttnError::InvalidIndex {
            index: selected as i64,
            len: tokens.len(),
        });
    }
    let words = word_spans(text);
    if words.is_empty() {
        return Err(AttnError::NoViableMask);
    }
    let request = Request {
        tokens,
        text,
        selected,
        replacement,
        convention,
        words,
    };

    for (name, strategy) in STRATEGIES {
        if let Some(target) = strategy(&request) {
            debug!(strategy = ?name, position = target.position, "mask target resolved");
            return Ok(target);
        }
        trace!(strategy = ?name, "mask strategy not applicable");
    }
    let target = position_estimate(&request);
    debug!(position = target.position, "mask target estimated from token position");
    Ok(target)
}

fn punctuation(req: &Request<'_>) -> Option<MaskTarget> {
    let text = req.convention.strip_marker(&req.token().text);
    let mut chars = text.chars();
    let ch = chars.next().filter(|c| PUNCTUATION.contains(c))?;
    if chars.next().is_some() {
        return None;
    }

    let occurrences: Vec<usize> = req.text.match_indices(ch).map(|(i, _)| i).collect();
    let offset = match occurrences.as_slice() {
        [] => return None,
        [only] => *only,
        _ if ch == '.' && req.text.ends_with('.') => req.text.len() - 1,
        _ => {
            let guess = req.preceding_content_tokens().min(occurrences.len() - 1);
            occurrences[guess]
        }
    };
    Some(MaskTarget {
        span_kind: SpanKind::Punctuation,
        position: offset,
        modified_text: req.splice(offset..offset + ch.len_utf8(), req.replacement),
        strategy: MaskStrategy::Punctuation,
    })
}

/// Locate each token in the text with a forward-only cursor and pick the word
/// whose span overlaps the selected token's span.
///
/// Applies to both conventions. A token that cannot be found past the cursor
/// leaves the selection unresolved here.
fn character_span(req: &Request<'_>) -> Option<MaskTarget> {
    // ASCII folding keeps byte offsets identical to the original text.
    let haystack = req.text.to_ascii_lowercase();
    let mut cursor = 0;
    let mut span = None;
    for token in &req.tokens[..=req.selected] {
        span = None;
        if req.convention.is_special(&token.text) {
            continue;
        }
        let needle = req.convention.strip_marker(&token.text).to_ascii_lowercase();
        if needle.is_empty() {
            continue;
        }
        if let Some(found) = haystack[cursor..].find(&needle) {
            let start = cursor + found;
            cursor = start + needle.len();
            span = Some(start..cursor);
        }
    }
    let span = span?;
    let word = req
        .words
        .iter()
        .position(|w| w.start < span.end && span.start < w.end)?;
    Some(req.replace_word(word, MaskStrategy::CharacterSpan))
}

/// Fallback for continuation-marked tokens the cursor search could not place.
fn alignment(req: &Request<'_>) -> Option<MaskTarget> {
    if req.convention != TokenizerConvention::ContinuationMarked {
        return None;
    }
    let map = align(req.tokens, req.text, req.convention);
    let word = *map.get(&req.token().index)?;
    let word = word.min(req.words.len() - 1);
    Some(req.replace_word(word, MaskStrategy::Alignment))
}

fn direct_match(req: &Request<'_>) -> Option<MaskTarget> {
    let clean = req.convention.clean(&req.token().text);
    if clean.is_empty() {
        return None;
    }
    let word = req.words.iter().position(|w| {
        let lowered = req.text[w.clone()].to_lowercase();
        let bare = lowered.trim_end_matches(TRAILING_PUNCTUATION);
        bare == clean || bare.contains(clean.as_str())
    })?;
    Some(req.replace_word(word, MaskStrategy::DirectMatch))
}

fn position_estimate(req: &Request<'_>) -> MaskTarget {
    let word = req.preceding_content_tokens().min(req.words.len() - 1);
    req.replace_word(word, MaskStrategy::PositionEstimate)
}
