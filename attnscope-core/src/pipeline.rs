//! Request orchestration: model service -> attribution -> alignment.
//!
//! The numeric work is pure and runs on the blocking pool so the async
//! runtime keeps serving other requests while flow or rollout is computed.

use crate::attention::{attribute, AttentionTensor, VisualizationMethod};
use crate::config::{AnalysisConfig, AttnConfig};
use crate::error::AttnError;
use crate::service::{LoadedModel, ModelCache, ModelService};
use crate::text::{
    align, apply_alignment, clean_predictions, replace_named_word, resolve, TokenizerConvention,
};
use crate::types::{
    token_index, AttentionResponse, ComparisonRequest, ComparisonResponse, MaskPredictionRequest,
    MaskPredictionResponse, ModelInfo, Token,
};
use std::sync::Arc;
use tracing::{debug, info};

/// Placeholder accepted in caller-supplied masked text, whatever the model.
pub const MASK_PLACEHOLDER: &str = "<mask>";

/// Number tokens and attach the word each one belongs to.
pub fn aligned_tokens(raw: Vec<String>, text: &str, convention: TokenizerConvention) -> Vec<Token> {
    let mut tokens = Token::sequence(raw);
    let map = align(&tokens, text, convention);
    apply_alignment(&mut tokens, &map);
    tokens
}

/// Build an [`AttentionResponse`] from tokenizer output and raw attention.
///
/// Fails when the tensor does not cover exactly one position per token or
/// when the sequence is longer than the configured limit.
pub fn analyze(
    raw_tokens: Vec<String>,
    text: &str,
    attentions: &AttentionTensor,
    method: VisualizationMethod,
    analysis: &AnalysisConfig,
    convention: TokenizerConvention,
) -> Result<AttentionResponse, AttnError> {
    if attentions.seq_len() != raw_tokens.len() {
        return Err(AttnError::malformed(format!(
            "attention covers {} positions but there are {} tokens",
            attentions.seq_len(),
            raw_tokens.len()
        )));
    }
    if attentions.seq_len() > analysis.max_sequence_len {
        return Err(AttnError::malformed(format!(
            "sequence of {} tokens exceeds the limit of {}",
            attentions.seq_len(),
            analysis.max_sequence_len
        )));
    }
    if method == VisualizationMethod::Flow && attentions.seq_len() > analysis.flow_max_sequence_len {
        return Err(AttnError::invalid_request(format!(
            "flow supports at most {} tokens, got {}; use rollout for longer inputs",
            analysis.flow_max_sequence_len,
            attentions.seq_len()
        )));
    }
    let tokens = aligned_tokens(raw_tokens, text, convention);
    let layers = attribute(attentions, method, &analysis.attribution_options())?;
    Ok(AttentionResponse { tokens, layers })
}

/// Entry point for every operation the gateway and CLI expose.
#[derive(Debug)]
pub struct AttentionPipeline {
    cache: ModelCache,
    config: AttnConfig,
}

impl AttentionPipeline {
    pub fn new(service: Arc<dyn ModelService>, config: AttnConfig) -> Self {
        let cache = ModelCache::new(service, config.models.clone());
        Self { cache, config }
    }

    pub fn config(&self) -> &AttnConfig {
        &self.config
    }

    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }

    pub fn models(&self) -> Vec<ModelInfo> {
        self.config.models.iter().map(|m| m.info()).collect()
    }

    fn service(&self) -> &dyn ModelService {
        self.cache.service().as_ref()
    }

    async fn tokens_for(&self, model: &LoadedModel, text: &str) -> Result<Vec<Token>, AttnError> {
        let raw = self.service().tokenize(text, model.id()).await?;
        Ok(aligned_tokens(raw, text, model.convention()))
    }

    /// Tokenize `text`, with word indices attached.
    pub async fn tokenize(&self, text: &str, model_id: &str) -> Result<Vec<Token>, AttnError> {
        let model = self.cache.get(model_id).await?;
        self.tokens_for(&model, text).await
    }

    /// Tokens and processed attention for `text`.
    pub async fn attention(
        &self,
        text: &str,
        model_id: &str,
        method: Option<VisualizationMethod>,
    ) -> Result<AttentionResponse, AttnError> {
        let model = self.cache.get(model_id).await?;
        let method = method.unwrap_or(self.config.analysis.method);
        let (raw, attentions) = tokio::try_join!(
            self.service().tokenize(text, model.id()),
            self.service().attend(text, model.id()),
        )?;
        debug!(
            model = model_id,
            %method,
            tokens = raw.len(),
            layers = attentions.num_layers(),
            "computing attention"
        );

        let text = text.to_string();
        let analysis = self.config.analysis.clone();
        let convention = model.convention();
        tokio::task::spawn_blocking(move || {
            analyze(raw, &text, &attentions, method, &analysis, convention)
        })
        .await?
    }

    /// Attention before and after replacing the word behind one token.
    pub async fn compare(&self, request: &ComparisonRequest) -> Result<ComparisonResponse, AttnError> {
        let model = self.cache.get(&request.model_name).await?;
        let tokens = self.tokens_for(&model, &request.text).await?;
        let index = token_index(request.masked_index, tokens.len())?;
        let target = resolve(
            &tokens,
            &request.text,
            index,
            &request.replacement_word,
            model.convention(),
        )?;
        info!(
            model = %request.model_name,
            index,
            strategy = ?target.strategy,
            "comparing attention after replacement"
        );

        let method = request.visualization_method;
        let (before_attention, after_attention) = tokio::try_join!(
            self.attention(&request.text, &request.model_name, method),
            self.attention(&target.modified_text, &request.model_name, method),
        )?;
        Ok(ComparisonResponse {
            before_attention,
            after_attention,
            mask_target: target,
        })
    }

    /// Candidate words for the masked position.
    pub async fn predict_masked(
        &self,
        request: &MaskPredictionRequest,
    ) -> Result<MaskPredictionResponse, AttnError> {
        let model = self.cache.get(&request.model_name).await?;
        let convention = model.convention();
        let mask = convention.mask_token();

        let masked_text = match &request.explicit_masked_text {
            Some(explicit) => {
                if !explicit.contains(MASK_PLACEHOLDER) && !explicit.contains(mask) {
                    return Err(AttnError::invalid_request(
                        "No mask token found in the explicit masked text",
                    ));
                }
                explicit.replace(MASK_PLACEHOLDER, mask)
            }
            None => {
                let named = request
                    .word_to_mask
                    .as_deref()
                    .and_then(|word| replace_named_word(&request.text, word, mask));
                match named {
                    Some(target) => target.modified_text,
                    None => {
                        if let Some(word) = &request.word_to_mask {
                            debug!(word = %word, "named word not in text, resolving by index");
                        }
                        let tokens = self.tokens_for(&model, &request.text).await?;
                        let index = token_index(request.mask_index, tokens.len())?;
                        resolve(&tokens, &request.text, index, mask, convention)?.modified_text
                    }
                }
            }
        };

        let top_k = request
            .top_k
            .unwrap_or(self.config.predictions.default_top_k);
        let limit = top_k.min(self.config.predictions.max_predictions);
        let candidates = self
            .service()
            .fill_mask(&masked_text, model.id(), top_k)
            .await?;
        let predictions = clean_predictions(&candidates, convention, limit);
        debug!(
            model = model.id(),
            candidates = candidates.len(),
            kept = predictions.len(),
            "masked word predictions"
        );
        Ok(MaskPredictionResponse {
            predictions,
            masked_text,
        })
    }
}
