//! Attribution orchestrator: picks raw, rollout or flow and reshapes the
//! result into the per-layer, per-head structure the renderer consumes.

use super::flow::{flow_with, FlowOptions};
use super::rollout::{rollout_with, RolloutOptions};
use super::tensor::{AttentionTensor, Matrix};
use crate::error::AttnError;
use crate::types::{HeadAttention, LayerAttention};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// How attention is presented to the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisualizationMethod {
    /// Every head's own attention matrix, untouched.
    #[default]
    Raw,
    /// Attention rollout across all layers.
    Rollout,
    /// Max-flow attribution across all layers.
    Flow,
}

impl fmt::Display for VisualizationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raw => write!(f, "raw"),
            Self::Rollout => write!(f, "rollout"),
            Self::Flow => write!(f, "flow"),
        }
    }
}

impl FromStr for VisualizationMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "raw" => Ok(Self::Raw),
            "rollout" => Ok(Self::Rollout),
            "flow" => Ok(Self::Flow),
            other => Err(format!("Unknown attention processing method: {other}")),
        }
    }
}

/// Options shared by the derived methods.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AttributionOptions {
    pub rollout: RolloutOptions,
    pub flow: FlowOptions,
}

/// Apply `method` to `attentions` and lay the result out as layers of heads.
///
/// Rollout and flow collapse heads and layers into one matrix; that matrix is
/// repeated for every head of every layer so the response keeps the raw shape.
pub fn attribute(
    attentions: &AttentionTensor,
    method: VisualizationMethod,
    options: &AttributionOptions,
) -> Result<Vec<LayerAttention>, AttnError> {
    debug!(
        %method,
        layers = attentions.num_layers(),
        heads = attentions.num_heads(),
        seq_len = attentions.seq_len(),
        "processing attention"
    );
    match method {
        VisualizationMethod::Raw => Ok(raw_layers(attentions)),
        VisualizationMethod::Rollout => {
            let m = rollout_with(attentions, options.rollout);
            Ok(broadcast_layers(attentions, &m))
        }
        VisualizationMethod::Flow => {
            let m = flow_with(attentions, None, &options.flow)?;
            Ok(broadcast_layers(attentions, &m))
        }
    }
}

fn raw_layers(attentions: &AttentionTensor) -> Vec<LayerAttention> {
    (0..attentions.num_layers())
        .map(|layer_index| LayerAttention {
            layer_index,
            heads: (0..attentions.num_heads())
                .map(|head_index| HeadAttention {
                    head_index,
                    attention: attentions.head(layer_index, head_index),
                })
                .collect(),
        })
        .collect()
}

fn broadcast_layers(attentions: &AttentionTensor, matrix: &Matrix) -> Vec<LayerAttention> {
    (0..attentions.num_layers())
        .map(|layer_index| LayerAttention {
            layer_index,
            heads: (0..attentions.num_heads())
                .map(|head_index| HeadAttention {
                    head_index,
                    attention: matrix.clone(),
                })
                .collect(),
        })
        .collect()
}
