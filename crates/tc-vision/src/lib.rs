//! Per-camera feature fusion.
//!
//! Each camera owns a [`CameraPipeline`]: sixteen single-role decision nets,
//! one per tile of a 4x4 partition of the frame, each reading a fixed
//! pseudo-random set of pixel coordinates chosen lazily from the first
//! usable frame. Per frame the pipeline samples YCbCr features, fires every
//! sub-net, and fuses the responses into one L2-normalized camera summary
//! vector.

mod error;
mod frame;
mod pipeline;

pub use error::{VisionError, VisionResult};
pub use frame::{CameraImage, YcbcrFrame};
pub use pipeline::{
    CameraPipeline, Coord, VisionConfig, PIXELS_PER_NET, SUB_NETS, SUB_NET_OUTPUTS, SUMMARY_WIDTH,
};
