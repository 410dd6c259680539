use tc_net::NetError;
use tc_tensor::TensorError;
use thiserror::Error;

/// Result alias used throughout the vision crate.
pub type VisionResult<T> = Result<T, VisionError>;

/// Errors emitted by the per-camera fusion pipeline.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum VisionError {
    /// Frame dimensions too small to carve the quadrant grid. The frame is
    /// skippable; the control loop keeps running.
    #[error("degenerate frame dimensions {width} x {height}")]
    DegenerateFrame { width: usize, height: usize },
    /// RGB data handed to a frame constructor does not match its dimensions.
    #[error("pixel buffer holds {got} pixels, expected {expected}")]
    PixelCount { expected: usize, got: usize },
    /// A sub-net rejected its configuration or input.
    #[error(transparent)]
    Net(#[from] NetError),
    /// A tensor kernel rejected its operands.
    #[error(transparent)]
    Tensor(#[from] TensorError),
}
