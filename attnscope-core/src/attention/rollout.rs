//! Attention rollout.
//!
//! Composes per-layer attention by matrix multiplication. Each layer's head
//! average is augmented with the identity (the residual path), row-normalized
//! and multiplied onto the running product in layer order.

use super::tensor::{normalize_distribution, AttentionTensor, Matrix};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Knobs for [`rollout_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolloutOptions {
    /// Add the identity matrix to every layer's head average.
    pub add_identity: bool,
}

impl Default for RolloutOptions {
    fn default() -> Self {
        Self { add_identity: true }
    }
}

/// Rollout with identity augmentation.
pub fn rollout(attentions: &AttentionTensor) -> Matrix {
    rollout_with(attentions, RolloutOptions::default())
}

/// Compute the `seq_len x seq_len` rollout matrix. Every row of the result
/// sums to 1.0; rows that collapse to zero are replaced by the uniform
/// distribution.
pub fn rollout_with(attentions: &AttentionTensor, options: RolloutOptions) -> Matrix {
    let n = attentions.seq_len();
    let mut acc = Matrix::identity(n);

    for layer in 0..attentions.num_layers() {
        let mut step = attentions.head_average(layer);
        if options.add_identity {
            step.add_identity();
        }
        step.row_normalize_guarded();
        step.zero_non_finite();
        acc = acc.matmul(&step);
        trace!(layer, rows = ?acc.to_rows(), "rollout after layer");
    }

    let degenerate = (0..n)
        .filter(|&r| normalize_distribution(acc.row_mut(r)))
        .count();
    if degenerate > 0 {
        debug!(
            rows = degenerate,
            "rollout rows summed to zero, substituted uniform distribution"
        );
    }
    acc
}
