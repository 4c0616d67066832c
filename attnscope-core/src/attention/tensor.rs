//! Attention tensors and the dense matrices derived from them.

use crate::error::AttnError;
use serde::{Deserialize, Serialize};
use std::ops::{Index, IndexMut};

/// Guard added to row sums before division.
pub const ROW_EPSILON: f64 = 1e-8;

/// Nested wire shape of an attention tensor: `[layer][head][query][key]`.
pub type NestedAttention = Vec<Vec<Vec<Vec<f64>>>>;

/// Raw attention weights indexed `[layer][head][query_pos][key_pos]`.
///
/// Values are stored flat in row-major order. A tensor is only ever read and
/// reduced; nothing in the crate mutates one after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "NestedAttention", into = "NestedAttention")]
pub struct AttentionTensor {
    layers: usize,
    heads: usize,
    seq_len: usize,
    data: Vec<f64>,
}

impl AttentionTensor {
    /// Build a tensor from flat row-major data.
    pub fn new(layers: usize, heads: usize, seq_len: usize, data: Vec<f64>) -> Result<Self, AttnError> {
        if layers == 0 || heads == 0 || seq_len == 0 {
            return Err(AttnError::malformed(format!(
                "empty dimension (layers={layers}, heads={heads}, seq_len={seq_len})"
            )));
        }
        let expected = layers * heads * seq_len * seq_len;
        if data.len() != expected {
            return Err(AttnError::malformed(format!(
                "expected {expected} values, got {}",
                data.len()
            )));
        }
        if let Some(bad) = data.iter().find(|v| !v.is_finite() || **v < 0.0) {
            return Err(AttnError::malformed(format!(
                "attention weights must be finite and non-negative, found {bad}"
            )));
        }
        Ok(Self {
            layers,
            heads,
            seq_len,
            data,
        })
    }

    /// Build a tensor from the nested `[layer][head][query][key]` shape,
    /// rejecting ragged input.
    pub fn from_nested(nested: NestedAttention) -> Result<Self, AttnError> {
        let layers = nested.len();
        let heads = nested.first().map(Vec::len).unwrap_or(0);
        let seq_len = nested
            .first()
            .and_then(|l| l.first())
            .map(Vec::len)
            .unwrap_or(0);

        let mut data = Vec::with_capacity(layers * heads * seq_len * seq_len);
        for (l, layer) in nested.into_iter().enumerate() {
            if layer.len() != heads {
                return Err(AttnError::malformed(format!(
                    "layer {l} has {} heads, expected {heads}",
                    layer.len()
                )));
            }
            for (h, head) in layer.into_iter().enumerate() {
                if head.len() != seq_len {
                    return Err(AttnError::malformed(format!(
                        "layer {l} head {h} has {} query rows, expected {seq_len}",
                        head.len()
                    )));
                }
                for (q, row) in head.into_iter().enumerate() {
                    if row.len() != seq_len {
                        return Err(AttnError::malformed(format!(
                            "layer {l} head {h} row {q} has {} keys, expected {seq_len}",
                            row.len()
                        )));
                    }
                    data.extend(row);
                }
            }
        }
        Self::new(layers, heads, seq_len, data)
    }

    pub fn num_layers(&self) -> usize {
        self.layers
    }

    pub fn num_heads(&self) -> usize {
        self.heads
    }

    pub fn seq_len(&self) -> usize {
        self.seq_len
    }

    fn offset(&self, layer: usize, head: usize) -> usize {
        (layer * self.heads + head) * self.seq_len * self.seq_len
    }

    /// Weight with which `query` attends to `key` in one head.
    pub fn get(&self, layer: usize, head: usize, query: usize, key: usize) -> f64 {
        self.data[self.offset(layer, head) + query * self.seq_len + key]
    }

    /// One head's `seq_len x seq_len` matrix.
    pub fn head(&self, layer: usize, head: usize) -> Matrix {
        let start = self.offset(layer, head);
        let end = start + self.seq_len * self.seq_len;
        Matrix {
            rows: self.seq_len,
            cols: self.seq_len,
            data: self.data[start..end].to_vec(),
        }
    }

    /// Mean over heads for one layer.
    pub fn head_average(&self, layer: usize) -> Matrix {
        let n = self.seq_len;
        let mut avg = Matrix::zeros(n, n);
        for head in 0..self.heads {
            let start = self.offset(layer, head);
            for (acc, v) in avg.data.iter_mut().zip(&self.data[start..start + n * n]) {
                *acc += v;
            }
        }
        let scale = 1.0 / self.heads as f64;
        avg.data.iter_mut().for_each(|v| *v *= scale);
        avg
    }

    pub fn to_nested(&self) -> NestedAttention {
        (0..self.layers)
            .map(|l| {
                (0..self.heads)
                    .map(|h| self.head(l, h).to_rows())
                    .collect()
            })
            .collect()
    }
}

impl TryFrom<NestedAttention> for AttentionTensor {
    type Error = AttnError;

    fn try_from(nested: NestedAttention) -> Result<Self, Self::Error> {
        Self::from_nested(nested)
    }
}

impl From<AttentionTensor> for NestedAttention {
    fn from(tensor: AttentionTensor) -> Self {
        tensor.to_nested()
    }
}

/// Dense row-major matrix of `f64`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<f64>>", into = "Vec<Vec<f64>>")]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    pub fn identity(n: usize) -> Self {
        let mut m = Self::zeros(n, n);
        for i in 0..n {
            m[(i, i)] = 1.0;
        }
        m
    }

    /// Build from nested rows; every row must have the same length.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self, AttnError> {
        let cols = rows.first().map(Vec::len).unwrap_or(0);
        let n_rows = rows.len();
        let mut data = Vec::with_capacity(n_rows * cols);
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != cols {
                return Err(AttnError::malformed(format!(
                    "row {i} has {} columns, expected {cols}",
                    row.len()
                )));
            }
            data.extend(row);
        }
        Ok(Self {
            rows: n_rows,
            cols,
            data,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn row(&self, r: usize) -> &[f64] {
        &self.data[r * self.cols..(r + 1) * self.cols]
    }

    pub fn row_mut(&mut self, r: usize) -> &mut [f64] {
        &mut self.data[r * self.cols..(r + 1) * self.cols]
    }

    pub fn row_sums(&self) -> Vec<f64> {
        (0..self.rows).map(|r| self.row(r).iter().sum()).collect()
    }

    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        (0..self.rows).map(|r| self.row(r).to_vec()).collect()
    }

    /// Add 1.0 on the diagonal (the residual connection).
    pub fn add_identity(&mut self) {
        for i in 0..self.rows.min(self.cols) {
            self[(i, i)] += 1.0;
        }
    }

    pub fn scale(&mut self, factor: f64) {
        self.data.iter_mut().for_each(|v| *v *= factor);
    }

    /// Divide each row by its sum plus [`ROW_EPSILON`].
    pub fn row_normalize_guarded(&mut self) {
        for r in 0..self.rows {
            let row = self.row_mut(r);
            let denom = row.iter().sum::<f64>() + ROW_EPSILON;
            row.iter_mut().for_each(|v| *v /= denom);
        }
    }

    /// Replace NaN and infinite entries with zero.
    pub fn zero_non_finite(&mut self) {
        for v in &mut self.data {
            if !v.is_finite() {
                *v = 0.0;
            }
        }
    }

    /// Matrix product `self @ other`.
    pub fn matmul(&self, other: &Matrix) -> Matrix {
        debug_assert_eq!(self.cols, other.rows);
        let mut out = Matrix::zeros(self.rows, other.cols);
        for i in 0..self.rows {
            for k in 0..self.cols {
                let a = self[(i, k)];
                if a == 0.0 {
                    continue;
                }
                let rhs = other.row(k);
                let dst = out.row_mut(i);
                for (d, b) in dst.iter_mut().zip(rhs) {
                    *d += a * b;
                }
            }
        }
        out
    }
}

impl Index<(usize, usize)> for Matrix {
    type Output = f64;

    fn index(&self, (r, c): (usize, usize)) -> &f64 {
        &self.data[r * self.cols + c]
    }
}

impl IndexMut<(usize, usize)> for Matrix {
    fn index_mut(&mut self, (r, c): (usize, usize)) -> &mut f64 {
        &mut self.data[r * self.cols + c]
    }
}

impl TryFrom<Vec<Vec<f64>>> for Matrix {
    type Error = AttnError;

    fn try_from(rows: Vec<Vec<f64>>) -> Result<Self, Self::Error> {
        Self::from_rows(rows)
    }
}

impl From<Matrix> for Vec<Vec<f64>> {
    fn from(m: Matrix) -> Self {
        m.to_rows()
    }
}

/// Scale `row` so that it sums to exactly 1.0.
///
/// Rows with a zero (or non-finite) total become the uniform distribution.
/// Returns `true` when that substitution happened.
pub fn normalize_distribution(row: &mut [f64]) -> bool {
    let total: f64 = row.iter().sum();
    if total > 0.0 && total.is_finite() {
        row.iter_mut().for_each(|v| *v /= total);
        false
    } else {
        let uniform = 1.0 / row.len().max(1) as f64;
        row.iter_mut().for_each(|v| *v = uniform);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_heads() -> AttentionTensor {
        AttentionTensor::from_nested(vec![vec![
            vec![vec![1.0, 0.0], vec![0.0, 1.0]],
            vec![vec![0.0, 1.0], vec![1.0, 0.0]],
        ]])
        .unwrap()
    }

    #[test]
    fn test_from_nested_dimensions() {
        let t = two_heads();
        assert_eq!(t.num_layers(), 1);
        assert_eq!(t.num_heads(), 2);
        assert_eq!(t.seq_len(), 2);
        assert_eq!(t.get(0, 1, 0, 1), 1.0);
        assert_eq!(t.get(0, 0, 0, 1), 0.0);
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let err = AttentionTensor::from_nested(vec![vec![vec![vec![1.0, 0.0], vec![1.0]]]])
            .unwrap_err();
        assert!(matches!(err, AttnError::MalformedTensor(_)));
    }

    #[test]
    fn test_negative_weight_rejected() {
        let err = AttentionTensor::new(1, 1, 1, vec![-0.5]).unwrap_err();
        assert!(err.to_string().contains("non-negative"));
    }

    #[test]
    fn test_empty_tensor_rejected() {
        assert!(AttentionTensor::from_nested(vec![]).is_err());
    }

    #[test]
    fn test_head_average() {
        let avg = two_heads().head_average(0);
        assert_eq!(avg.to_rows(), vec![vec![0.5, 0.5], vec![0.5, 0.5]]);
    }

    #[test]
    fn test_nested_roundtrip_via_serde() {
        let t = two_heads();
        let json = serde_json::to_string(&t).unwrap();
        let back: AttentionTensor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn test_matmul_identity() {
        let m = Matrix::from_rows(vec![vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert_eq!(m.matmul(&Matrix::identity(2)), m);
        let sq = m.matmul(&m);
        assert_eq!(sq.to_rows(), vec![vec![7.0, 10.0], vec![15.0, 22.0]]);
    }

    #[test]
    fn test_normalize_distribution_zero_row_is_uniform() {
        let mut row = vec![0.0; 4];
        assert!(normalize_distribution(&mut row));
        assert_eq!(row, vec![0.25; 4]);

        let mut row = vec![1.0, 3.0];
        assert!(!normalize_distribution(&mut row));
        assert_eq!(row, vec![0.25, 0.75]);
    }

    #[test]
    fn test_zero_non_finite() {
        let mut m = Matrix::from_rows(vec![vec![f64::NAN, 1.0, f64::INFINITY]]).unwrap();
        m.zero_non_finite();
        assert_eq!(m.row(0), &[0.0, 1.0, 0.0]);
    }
}
