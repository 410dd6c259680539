use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{TensorError, TensorResult};

/// Scaling factor applied to the row maximum before the softmax shift. Kept
/// just under one so the shifted maximum never lands exactly on zero.
const SOFTMAX_SHIFT: f64 = 1.0 - 1e-300;

/// A dense row-major f32 tensor.
///
/// The buffer invariant `data.len() == rows * cols` is established by every
/// constructor and preserved by every kernel. An optional auxiliary state
/// bank carries per-element accumulator slots for callers that track running
/// moments alongside the values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
    state: Vec<Vec<f32>>,
}

impl Tensor {
    /// Create a tensor filled with zeros.
    pub fn zeros(rows: usize, cols: usize) -> TensorResult<Self> {
        Self::from_vec(rows, cols, vec![0.0; rows.saturating_mul(cols)])
    }

    /// Create a tensor from raw data. The provided vector must hold exactly
    /// `rows * cols` elements.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f32>) -> TensorResult<Self> {
        if rows == 0 || cols == 0 {
            return Err(TensorError::InvalidDimensions { rows, cols });
        }
        let expected = rows * cols;
        if data.len() != expected {
            return Err(TensorError::DataLength {
                expected,
                got: data.len(),
            });
        }
        Ok(Self {
            rows,
            cols,
            data,
            state: Vec::new(),
        })
    }

    /// Construct a tensor by applying a generator to each coordinate.
    pub fn from_fn<F>(rows: usize, cols: usize, mut f: F) -> TensorResult<Self>
    where
        F: FnMut(usize, usize) -> f32,
    {
        if rows == 0 || cols == 0 {
            return Err(TensorError::InvalidDimensions { rows, cols });
        }
        let mut data = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            for c in 0..cols {
                data.push(f(r, c));
            }
        }
        Self::from_vec(rows, cols, data)
    }

    /// Convenience constructor for a single-row tensor.
    pub fn row_vector(data: Vec<f32>) -> TensorResult<Self> {
        let cols = data.len();
        Self::from_vec(1, cols, data)
    }

    /// Attach `slots` zeroed per-element state banks to the tensor.
    pub fn with_state_slots(mut self, slots: usize) -> Self {
        self.state = vec![vec![0.0; self.data.len()]; slots];
        self
    }

    /// Returns the `(rows, cols)` pair.
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Total number of stored elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Borrow the underlying row-major buffer.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Borrow row `r` of the tensor.
    pub fn row(&self, r: usize) -> &[f32] {
        &self.data[r * self.cols..(r + 1) * self.cols]
    }

    /// Borrow the auxiliary state bank at `slot`, if attached.
    pub fn state_slot(&self, slot: usize) -> Option<&[f32]> {
        self.state.get(slot).map(Vec::as_slice)
    }

    /// Mutably borrow the auxiliary state bank at `slot`, if attached.
    pub fn state_slot_mut(&mut self, slot: usize) -> Option<&mut [f32]> {
        self.state.get_mut(slot).map(Vec::as_mut_slice)
    }

    /// Batched dot product against a bank of weight vectors.
    ///
    /// Treats each row of `self` as a weight vector and each row of `inputs`
    /// as a feature vector. The result holds one row per input vector and one
    /// column per weight vector; entry `(i, j)` is the inner product of input
    /// `i` with weight `j`. Column counts must agree.
    pub fn matmul_t(&self, inputs: &Tensor) -> TensorResult<Tensor> {
        if self.cols != inputs.cols {
            return Err(TensorError::ShapeMismatch {
                left: self.shape(),
                right: inputs.shape(),
            });
        }
        let mut data = Vec::with_capacity(self.rows * inputs.rows);
        for feature in inputs.data.chunks_exact(inputs.cols) {
            for weights in self.data.chunks_exact(self.cols) {
                data.push(dot(weights, feature));
            }
        }
        Tensor::from_vec(inputs.rows, self.rows, data)
    }

    /// Element-wise addition with cyclic broadcast of `other`.
    ///
    /// `other` is tiled over `self`, so `self.len()` must be a multiple of
    /// `other.len()`.
    pub fn add(&self, other: &Tensor) -> TensorResult<Tensor> {
        if other.data.is_empty() || self.data.len() % other.data.len() != 0 {
            return Err(TensorError::BroadcastMismatch {
                left: self.data.len(),
                right: other.data.len(),
            });
        }
        let tile = other.data.len();
        let data = self
            .data
            .iter()
            .enumerate()
            .map(|(i, value)| value + other.data[i % tile])
            .collect();
        Tensor::from_vec(self.rows, self.cols, data)
    }

    /// Transpose the tensor.
    pub fn transpose(&self) -> Tensor {
        let mut data = Vec::with_capacity(self.data.len());
        for c in 0..self.cols {
            for r in 0..self.rows {
                data.push(self.data[r * self.cols + c]);
            }
        }
        Tensor {
            rows: self.cols,
            cols: self.rows,
            data,
            state: Vec::new(),
        }
    }

    /// L2-normalize each row independently. A zero-norm row passes through
    /// unchanged rather than dividing by zero.
    pub fn normalize(&self) -> Tensor {
        let mut data = Vec::with_capacity(self.data.len());
        for row in self.data.chunks_exact(self.cols) {
            let sum: f32 = row.iter().map(|v| v * v).sum();
            let length = if sum == 0.0 { 1.0 } else { sum.sqrt() };
            data.extend(row.iter().map(|v| v / length));
        }
        Tensor {
            rows: self.rows,
            cols: self.cols,
            data,
            state: Vec::new(),
        }
    }

    /// Element-wise logistic sigmoid.
    pub fn sigmoid(&self) -> Tensor {
        self.map(|v| 1.0 / (1.0 + (-v).exp()))
    }

    /// Sign activation mapping every value to exactly +1 or -1.
    pub fn step(&self) -> Tensor {
        self.map(|v| if v > 0.0 { 1.0 } else { -1.0 })
    }

    /// Numerically shifted softmax applied to each row independently.
    pub fn softmax(&self) -> Tensor {
        let mut data = self.data.clone();
        for row in data.chunks_exact_mut(self.cols) {
            softmax_in_place(row);
        }
        Tensor {
            rows: self.rows,
            cols: self.cols,
            data,
            state: Vec::new(),
        }
    }

    /// Second-order Taylor approximation of softmax, per row:
    /// `v` maps to `(1 + v + v^2/2) / sum(1 + v + v^2/2)`.
    pub fn taylor_softmax(&self) -> Tensor {
        let mut data = Vec::with_capacity(self.data.len());
        for row in self.data.chunks_exact(self.cols) {
            let sum: f32 = row.iter().map(|v| 1.0 + v + v * v / 2.0).sum();
            data.extend(row.iter().map(|v| (1.0 + v + v * v / 2.0) / sum));
        }
        Tensor {
            rows: self.rows,
            cols: self.cols,
            data,
            state: Vec::new(),
        }
    }

    /// Everett activation: every value splits into its clipped negative and
    /// clipped positive parts, doubling the column count.
    pub fn everett_activation(&self) -> Tensor {
        let mut data = Vec::with_capacity(2 * self.data.len());
        for value in &self.data {
            data.push(value.min(0.0));
            data.push(value.max(0.0));
        }
        Tensor {
            rows: self.rows,
            cols: 2 * self.cols,
            data,
            state: Vec::new(),
        }
    }

    fn map<F>(&self, f: F) -> Tensor
    where
        F: Fn(f32) -> f32,
    {
        Tensor {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(|v| f(*v)).collect(),
            state: Vec::new(),
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Shifted softmax over one row. The shift is the row maximum scaled by a
/// constant just under one, matching the projection kernels downstream.
fn softmax_in_place(values: &mut [f32]) {
    let mut max = 0.0f32;
    for &v in values.iter() {
        if v > max {
            max = v;
        }
    }
    let shift = (max as f64 * SOFTMAX_SHIFT) as f32;
    let mut sum = 0.0f32;
    for v in values.iter_mut() {
        *v = (*v - shift).exp();
        sum += *v;
    }
    for v in values.iter_mut() {
        *v /= sum;
    }
}

fn check_attention_shapes(q: &Tensor, k: &Tensor, v: &Tensor) -> TensorResult<()> {
    if q.cols() != k.cols() {
        return Err(TensorError::ShapeMismatch {
            left: q.shape(),
            right: k.shape(),
        });
    }
    if v.rows() != q.rows() {
        return Err(TensorError::ShapeMismatch {
            left: q.shape(),
            right: v.shape(),
        });
    }
    Ok(())
}

/// Double-normalisation self attention.
///
/// For each row of `k`: dot-product scores against every row of `q`, softmax,
/// a weighted sum over the transposed rows of `v`, then a second softmax over
/// the combined row. The output holds one row per `k` row and one column per
/// `v` column.
pub fn self_attention(q: &Tensor, k: &Tensor, v: &Tensor) -> TensorResult<Tensor> {
    check_attention_shapes(q, k, v)?;
    let vt = v.transpose();
    let mut data = Vec::with_capacity(k.rows() * v.cols());
    let mut scores = vec![0.0f32; q.rows()];
    let mut combined = vec![0.0f32; v.cols()];
    for key in k.data().chunks_exact(k.cols()) {
        for (j, query) in q.data().chunks_exact(q.cols()).enumerate() {
            scores[j] = dot(key, query);
        }
        softmax_in_place(&mut scores);
        for (j, values) in vt.data().chunks_exact(vt.cols()).enumerate() {
            combined[j] = dot(&scores, values);
        }
        softmax_in_place(&mut combined);
        data.extend_from_slice(&combined);
    }
    Tensor::from_vec(k.rows(), v.cols(), data)
}

/// Shannon entropy of the self-attention output distribution, one scalar per
/// row of `k`. Structurally identical to [`self_attention`] up to the weighted
/// combination; instead of returning the combined values it measures how
/// spread out the softmax-normalised combination is.
pub fn self_entropy(q: &Tensor, k: &Tensor, v: &Tensor) -> TensorResult<Vec<f32>> {
    check_attention_shapes(q, k, v)?;
    let vt = v.transpose();
    let entropies = (0..k.rows())
        .into_par_iter()
        .map(|i| {
            let key = k.row(i);
            let mut scores = vec![0.0f32; q.rows()];
            for (j, query) in q.data().chunks_exact(q.cols()).enumerate() {
                scores[j] = dot(key, query);
            }
            softmax_in_place(&mut scores);
            let mut combined = vec![0.0f32; v.cols()];
            for (j, values) in vt.data().chunks_exact(vt.cols()).enumerate() {
                combined[j] = dot(&scores, values);
            }
            softmax_in_place(&mut combined);
            let entropy: f64 = combined
                .iter()
                .map(|&p| f64::from(p) * f64::from(p).ln())
                .sum();
            -entropy as f32
        })
        .collect();
    Ok(entropies)
}
