//! Sub-word marker conventions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a tokenizer marks word boundaries inside its sub-word vocabulary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenizerConvention {
    /// WordPiece style: `##` marks a token that continues the previous word.
    #[default]
    ContinuationMarked,
    /// Byte-level BPE style: `Ġ` marks a token that starts a new word.
    WordStartMarked,
}

const CONTINUATION_SPECIALS: &[&str] = &["[CLS]", "[SEP]", "[PAD]", "[UNK]", "[MASK]"];
const WORD_START_SPECIALS: &[&str] = &["<s>", "</s>", "<pad>", "<unk>", "<mask>"];

impl TokenizerConvention {
    /// Guess the convention from a model identifier.
    pub fn for_model(model_id: &str) -> Self {
        let id = model_id.to_ascii_lowercase();
        if id.contains("roberta") || id.contains("gpt2") || id.contains("bart") {
            Self::WordStartMarked
        } else {
            Self::ContinuationMarked
        }
    }

    pub fn marker(&self) -> &'static str {
        match self {
            Self::ContinuationMarked => "##",
            Self::WordStartMarked => "\u{120}",
        }
    }

    pub fn mask_token(&self) -> &'static str {
        match self {
            Self::ContinuationMarked => "[MASK]",
            Self::WordStartMarked => "<mask>",
        }
    }

    pub fn special_tokens(&self) -> &'static [&'static str] {
        match self {
            Self::ContinuationMarked => CONTINUATION_SPECIALS,
            Self::WordStartMarked => WORD_START_SPECIALS,
        }
    }

    pub fn is_special(&self, text: &str) -> bool {
        self.special_tokens().contains(&text)
    }

    /// `text` without its leading marker.
    pub fn strip_marker<'a>(&self, text: &'a str) -> &'a str {
        text.strip_prefix(self.marker()).unwrap_or(text)
    }

    /// Lower-cased token text without the marker, as used for matching.
    pub fn clean(&self, text: &str) -> String {
        self.strip_marker(text).to_lowercase()
    }
}

impl fmt::Display for TokenizerConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ContinuationMarked => write!(f, "continuation_marked"),
            Self::WordStartMarked => write!(f, "word_start_marked"),
        }
    }
}
