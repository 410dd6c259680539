//! Dense row-major tensor primitive for the tricam perception core.
//!
//! Everything here is plain safe Rust over flat `Vec<f32>` buffers: the
//! batched projection kernel (`matmul_t`), per-row normalisation and
//! activations, and the double-normalisation attention pair
//! ([`self_attention`] / [`self_entropy`]) that drives the decision network's
//! intrinsic confidence signal.

mod error;
mod tensor;

pub use error::{TensorError, TensorResult};
pub use tensor::{self_attention, self_entropy, Tensor};
