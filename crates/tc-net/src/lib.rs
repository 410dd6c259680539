//! Entropy-ranked stochastic decision network.
//!
//! A [`Net`] adapts with no external reward: every [`Net::fire`] draws a
//! population of candidate sign-weight matrices from per-coordinate Gaussian
//! statistics, scores the candidates by the Shannon entropy of their own
//! batched responses under self attention, and pulls the statistics toward
//! the lowest-entropy elite. Lower entropy means a more decisive projection,
//! so the network continuously re-estimates its own sampling distribution
//! from the candidates it finds most decisive.

mod error;
mod net;
mod stats;

pub use error::{NetError, NetResult};
pub use net::{
    Net, NetConfig, RoleMode, UpdatePolicy, WindowHandle, DEFAULT_BLEND_RATE, DEFAULT_SAMPLES,
};
pub use stats::{Gaussian, StatsSet};
