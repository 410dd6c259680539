//! Top-level fusion and the perception-to-action control loop.
//!
//! Three producer threads run one [`tc_vision::CameraPipeline`] each and feed
//! bounded queues; the control thread reacts to whichever camera is ready
//! first, fuses the most recent summary per camera into the top-level
//! decision net, decodes an action, and hands it to the actuator
//! collaborator. Reserved action codes retune the adaptation window of every
//! net in the system.

mod action;
mod control;
mod error;
mod pacer;
pub mod telemetry;

pub use action::{ActionDecoder, Actuator, Decision};
pub use control::{
    CameraId, ControlHandle, ControlLoop, FrameSource, RuntimeConfig, QUEUE_CAPACITY, TOP_INPUTS,
};
pub use error::{RuntimeError, RuntimeResult};
pub use pacer::Pacer;
