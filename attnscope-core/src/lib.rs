//! # attnscope-core: transformer attention analysis
//!
//! Turns raw per-layer, per-head attention from a masked language model into
//! structures a viewer can render, and lets a caller test the model by
//! replacing one word and comparing the result.
//!
//! - [`attention`]: rollout, max-flow attribution and the method selector
//! - [`text`]: token-to-word alignment and mask-target resolution
//! - [`service`]: the model service seam and the load-once model cache
//! - [`pipeline`]: async orchestration used by the gateway and the CLI
//! - [`gateway`]: axum HTTP API

// Foundation
pub mod config;
pub mod error;
pub mod types;

// Algorithms
pub mod attention;
pub mod text;

// Service plumbing
pub mod gateway;
pub mod pipeline;
pub mod service;

// Re-exports
pub use attention::{AttentionTensor, Matrix, VisualizationMethod};
pub use config::{load_config, AttnConfig, ModelSpec};
pub use error::AttnError;
pub use pipeline::AttentionPipeline;
pub use service::{HttpModelService, ModelCache, ModelService};
pub use text::{MaskTarget, TokenizerConvention, WordAlignmentMap};
pub use types::{AttentionResponse, ComparisonResponse, Token};
