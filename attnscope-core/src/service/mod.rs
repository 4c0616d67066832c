//! The model service seam.
//!
//! Tokenization, attention extraction and masked-language-model inference
//! happen outside this crate. [`ModelService`] is the contract the pipeline
//! consumes; [`HttpModelService`] talks to an inference sidecar over HTTP and
//! [`ModelCache`] keeps track of which models have been loaded.

pub mod cache;
pub mod http;

pub use cache::{LoadedModel, ModelCache};
pub use http::HttpModelService;

use crate::attention::AttentionTensor;
use crate::error::AttnError;
use crate::text::TokenScore;
use async_trait::async_trait;

/// Tokenizer and model inference for a set of named models.
#[async_trait]
pub trait ModelService: Send + Sync {
    /// Human-readable backend name, for logs and health output.
    fn name(&self) -> &str;

    /// Prepare `model_id` for use. Called once per model by [`ModelCache`].
    async fn load(&self, model_id: &str) -> Result<(), AttnError>;

    /// Sub-word tokens of `text` in sequence order, special tokens included.
    async fn tokenize(&self, text: &str, model_id: &str) -> Result<Vec<String>, AttnError>;

    /// Raw attention of every layer and head for `text`.
    async fn attend(&self, text: &str, model_id: &str) -> Result<AttentionTensor, AttnError>;

    /// Top `top_k` candidates for the mask token in `masked_text`, best first.
    async fn fill_mask(
        &self,
        masked_text: &str,
        model_id: &str,
        top_k: usize,
    ) -> Result<Vec<TokenScore>, AttnError>;
}
