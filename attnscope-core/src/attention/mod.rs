//! Attention post-processing: rollout, flow and the orchestrator that
//! selects between them.

pub mod flow;
pub mod maxflow;
pub mod method;
pub mod rollout;
pub mod tensor;

pub use flow::{flow, flow_with, FlowGraph, FlowOptions};
pub use method::{attribute, AttributionOptions, VisualizationMethod};
pub use rollout::{rollout, rollout_with, RolloutOptions};
pub use tensor::{AttentionTensor, Matrix};
