use thiserror::Error;

/// Result alias used throughout the tensor crate.
pub type TensorResult<T> = Result<T, TensorError>;

/// Errors emitted by tensor constructors and kernels.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum TensorError {
    /// A constructor received a zero-sized axis.
    #[error("invalid tensor dimensions ({rows} x {cols}); both axes must be non-zero")]
    InvalidDimensions { rows: usize, cols: usize },
    /// Data provided to a constructor does not match the declared shape.
    #[error("data length mismatch: expected {expected}, got {got}")]
    DataLength { expected: usize, got: usize },
    /// An operator was asked to combine tensors of incompatible shapes.
    #[error("shape mismatch: left={left:?}, right={right:?} cannot be combined")]
    ShapeMismatch {
        left: (usize, usize),
        right: (usize, usize),
    },
    /// Cyclic broadcast requires the left length to be a multiple of the right.
    #[error("broadcast mismatch: {left} values cannot be tiled by {right}")]
    BroadcastMismatch { left: usize, right: usize },
}
