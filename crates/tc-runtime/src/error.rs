use tc_net::NetError;
use tc_tensor::TensorError;
use tc_vision::VisionError;
use thiserror::Error;

/// Result alias used throughout the runtime crate.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Errors emitted while assembling or running the control loop.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// A reserved action code maps to a window outside `[1, samples]`.
    #[error("window code {code} maps to window {window}, outside [1, {samples}]")]
    InvalidWindowCode {
        code: u64,
        window: usize,
        samples: usize,
    },
    /// The OS refused to spawn a worker thread.
    #[error("failed to spawn {name} worker: {message}")]
    Spawn { name: &'static str, message: String },
    /// A camera pipeline rejected its configuration.
    #[error(transparent)]
    Vision(#[from] VisionError),
    /// The top-level net rejected its configuration.
    #[error(transparent)]
    Net(#[from] NetError),
    /// A tensor kernel rejected its operands.
    #[error(transparent)]
    Tensor(#[from] TensorError),
}
