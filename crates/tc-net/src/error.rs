use tc_tensor::TensorError;
use thiserror::Error;

/// Result alias used throughout the net crate.
pub type NetResult<T> = Result<T, NetError>;

/// Errors emitted by network construction and firing.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum NetError {
    /// A network dimension that must be non-zero was zero.
    #[error("network {field} must be non-zero")]
    ZeroDimension { field: &'static str },
    /// The adaptation window fell outside `[1, samples]`.
    #[error("adaptation window {window} must lie in [1, {samples}]")]
    WindowOutOfRange { window: usize, samples: usize },
    /// The exponential blend rate fell outside `(0, 1]`.
    #[error("blend rate {rate} must lie in (0, 1]")]
    InvalidBlendRate { rate: f32 },
    /// The input to `fire` was not a single row of the configured width.
    #[error("input must be a single row of {expected} values, got {rows} x {cols}")]
    InputShape {
        expected: usize,
        rows: usize,
        cols: usize,
    },
    /// A tensor kernel rejected its operands.
    #[error(transparent)]
    Tensor(#[from] TensorError),
}
