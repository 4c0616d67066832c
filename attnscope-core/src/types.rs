//! Request and response types shared by the pipeline and the gateway.

use crate::attention::{Matrix, VisualizationMethod};
use crate::error::AttnError;
use crate::text::mask::MaskTarget;
use serde::{Deserialize, Serialize};

/// Model used when a request does not name one.
pub const DEFAULT_MODEL: &str = "bert-base-uncased";

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

/// Check a caller-supplied token index against a sequence of `len` tokens.
///
/// Indices arrive signed on the wire so that a negative value is reported as
/// an out-of-range index instead of a body that fails to parse.
pub fn token_index(index: i64, len: usize) -> Result<usize, AttnError> {
    usize::try_from(index)
        .ok()
        .filter(|i| *i < len)
        .ok_or(AttnError::InvalidIndex { index, len })
}

/// A sub-word token at one sequence position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub text: String,
    pub index: usize,
    /// Whitespace-delimited word this token belongs to, once aligned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word_index: Option<usize>,
}

impl Token {
    pub fn new(text: impl Into<String>, index: usize) -> Self {
        Self {
            text: text.into(),
            index,
            word_index: None,
        }
    }

    /// Number a tokenizer's output in sequence order.
    pub fn sequence<I, S>(texts: I) -> Vec<Token>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        texts
            .into_iter()
            .enumerate()
            .map(|(i, t)| Token::new(t, i))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeadAttention {
    pub head_index: usize,
    pub attention: Matrix,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerAttention {
    pub layer_index: usize,
    pub heads: Vec<HeadAttention>,
}

/// Tokens plus processed attention, ready for rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttentionResponse {
    pub tokens: Vec<Token>,
    pub layers: Vec<LayerAttention>,
}

/// Attention before and after one token's word was replaced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResponse {
    pub before_attention: AttentionResponse,
    pub after_attention: AttentionResponse,
    pub mask_target: MaskTarget,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenizeRequest {
    pub text: String,
    #[serde(default = "default_model")]
    pub model_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenizeResponse {
    pub tokens: Vec<Token>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttentionRequest {
    pub text: String,
    #[serde(default = "default_model")]
    pub model_name: String,
    #[serde(default)]
    pub visualization_method: Option<VisualizationMethod>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttentionEnvelope {
    pub attention_data: AttentionResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonRequest {
    pub text: String,
    pub masked_index: i64,
    pub replacement_word: String,
    #[serde(default = "default_model")]
    pub model_name: String,
    #[serde(default)]
    pub visualization_method: Option<VisualizationMethod>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaskPredictionRequest {
    pub text: String,
    pub mask_index: i64,
    #[serde(default = "default_model")]
    pub model_name: String,
    /// Falls back to the configured default when absent.
    #[serde(default)]
    pub top_k: Option<usize>,
    /// Text with a literal `<mask>` placeholder; skips mask resolution.
    #[serde(default)]
    pub explicit_masked_text: Option<String>,
    /// Word to mask, looked up in `text` before falling back to `mask_index`.
    #[serde(default)]
    pub word_to_mask: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordPrediction {
    pub word: String,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaskPredictionResponse {
    pub predictions: Vec<WordPrediction>,
    /// The text that was sent to the model, mask token included.
    pub masked_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsResponse {
    pub models: Vec<ModelInfo>,
}
