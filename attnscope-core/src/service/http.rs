//! HTTP client for the inference sidecar.
//!
//! The sidecar exposes four JSON endpoints: `/load`, `/tokenize`, `/attend`
//! and `/fill_mask`. Every request carries the model id; every non-2xx reply
//! becomes [`AttnError::Service`].

use super::ModelService;
use crate::attention::tensor::NestedAttention;
use crate::attention::AttentionTensor;
use crate::config::ServiceConfig;
use crate::error::AttnError;
use crate::text::TokenScore;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Serialize)]
struct TextBody<'a> {
    model: &'a str,
    text: &'a str,
}

#[derive(Serialize)]
struct LoadBody<'a> {
    model: &'a str,
}

#[derive(Serialize)]
struct FillMaskBody<'a> {
    model: &'a str,
    text: &'a str,
    top_k: usize,
}

#[derive(Deserialize)]
struct TokensReply {
    tokens: Vec<String>,
}

#[derive(Deserialize)]
struct AttendReply {
    attentions: NestedAttention,
}

#[derive(Deserialize)]
struct FillMaskReply {
    candidates: Vec<TokenScore>,
}

/// [`ModelService`] backed by an HTTP inference sidecar.
#[derive(Debug, Clone)]
pub struct HttpModelService {
    client: Client,
    base_url: String,
}

impl HttpModelService {
    pub fn new(config: &ServiceConfig) -> Result<Self, AttnError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, AttnError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, path);
        debug!(url = %url, "Sending model service request");

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| AttnError::service(format!("Request to {} failed: {}", url, e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AttnError::service(format!("Failed to read response body: {}", e)))?;

        if !status.is_success() {
            return Err(AttnError::service(format!(
                "{} returned {}: {}",
                path,
                status.as_u16(),
                text.trim()
            )));
        }

        serde_json::from_str(&text)
            .map_err(|e| AttnError::service(format!("Invalid JSON from {}: {}", path, e)))
    }
}

#[async_trait]
impl ModelService for HttpModelService {
    fn name(&self) -> &str {
        "http"
    }

    async fn load(&self, model_id: &str) -> Result<(), AttnError> {
        let _: serde_json::Value = self.post("load", &LoadBody { model: model_id }).await?;
        Ok(())
    }

    async fn tokenize(&self, text: &str, model_id: &str) -> Result<Vec<String>, AttnError> {
        let reply: TokensReply = self
            .post("tokenize", &TextBody { model: model_id, text })
            .await?;
        Ok(reply.tokens)
    }

    async fn attend(&self, text: &str, model_id: &str) -> Result<AttentionTensor, AttnError> {
        let reply: AttendReply = self
            .post("attend", &TextBody { model: model_id, text })
            .await?;
        AttentionTensor::from_nested(reply.attentions)
    }

    async fn fill_mask(
        &self,
        masked_text: &str,
        model_id: &str,
        top_k: usize,
    ) -> Result<Vec<TokenScore>, AttnError> {
        let reply: FillMaskReply = self
            .post(
                "fill_mask",
                &FillMaskBody {
                    model: model_id,
                    text: masked_text,
                    top_k,
                },
            )
            .await?;
        Ok(reply.candidates)
    }
}
