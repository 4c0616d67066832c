//! Error types for the attnscope-core crate.

use thiserror::Error;

/// Top-level error type for attention analysis.
///
/// Only input mistakes and failures of the external model service are
/// represented here. Numerical degeneracies inside rollout, flow and
/// alignment are recovered where they happen and never reach this type.
#[derive(Debug, Error)]
pub enum AttnError {
    #[error("Invalid token index {index}. Valid range: 0-{}", .len.saturating_sub(1))]
    InvalidIndex { index: i64, len: usize },

    #[error("No replaceable word found in the input text")]
    NoViableMask,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Model {model} not supported")]
    UnsupportedModel { model: String },

    #[error("Malformed attention tensor: {0}")]
    MalformedTensor(String),

    #[error("Model service error: {0}")]
    Service(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Background task failed: {0}")]
    Join(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl AttnError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedTensor(msg.into())
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn service(msg: impl Into<String>) -> Self {
        Self::Service(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn unsupported_model(model: impl Into<String>) -> Self {
        Self::UnsupportedModel {
            model: model.into(),
        }
    }

    /// Whether the error was caused by the caller's input rather than by
    /// this process or the model service. Client errors are never retried.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidIndex { .. }
                | Self::NoViableMask
                | Self::InvalidRequest(_)
                | Self::UnsupportedModel { .. }
                | Self::MalformedTensor(_)
        )
    }
}

impl From<tokio::task::JoinError> for AttnError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Join(e.to_string())
    }
}
