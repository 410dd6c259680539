use once_cell::sync::OnceCell;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use tc_net::{Net, NetConfig, NetResult, UpdatePolicy, WindowHandle};
use tc_tensor::Tensor;

use crate::error::{VisionError, VisionResult};
use crate::frame::CameraImage;

/// Sub-nets per camera, one per tile of the 4x4 frame partition.
pub const SUB_NETS: usize = 16;
/// Pixel coordinates sampled per sub-net.
pub const PIXELS_PER_NET: usize = 128;
/// Response width of each sub-net.
pub const SUB_NET_OUTPUTS: usize = 8;
/// Width of the concatenated camera summary vector.
pub const SUMMARY_WIDTH: usize = SUB_NETS * SUB_NET_OUTPUTS;

const QUADRANT_SPLIT: usize = 4;

/// One sampled pixel location, relative to its sub-net's tile origin.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coord {
    pub x: usize,
    pub y: usize,
}

/// Construction parameters for a [`CameraPipeline`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VisionConfig {
    pub seed: u64,
    pub window: usize,
    pub samples: usize,
    pub update: UpdatePolicy,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            seed: 1,
            window: 128,
            samples: tc_net::DEFAULT_SAMPLES,
            update: UpdatePolicy::default(),
        }
    }
}

/// Fusion pipeline for one camera.
///
/// Owns sixteen single-role sub-nets, each bound to one tile of a 4x4
/// partition of the frame. The pixel coordinate grid is generated from the
/// first usable frame's dimensions and is immutable afterwards; behaviour
/// under a mid-session resolution change is undefined.
pub struct CameraPipeline {
    seed: u64,
    nets: Vec<Net>,
    grid: OnceCell<Vec<Vec<Coord>>>,
}

impl CameraPipeline {
    pub fn new(config: VisionConfig) -> VisionResult<Self> {
        let mut nets = Vec::with_capacity(SUB_NETS);
        for n in 0..SUB_NETS {
            let net_config = NetConfig::new(
                config.seed + 1 + n as u64,
                3 * PIXELS_PER_NET,
                SUB_NET_OUTPUTS,
                config.window,
            )
            .with_samples(config.samples)
            .with_update(config.update);
            nets.push(Net::new(net_config)?);
        }
        Ok(Self {
            seed: config.seed,
            nets,
            grid: OnceCell::new(),
        })
    }

    /// Window handles for every sub-net, for system-wide fan-out.
    pub fn window_handles(&self) -> Vec<WindowHandle> {
        self.nets.iter().map(Net::window_handle).collect()
    }

    /// Apply a new adaptation window to every sub-net.
    pub fn set_window(&self, window: usize) -> NetResult<()> {
        for net in &self.nets {
            net.window_handle().set(window)?;
        }
        Ok(())
    }

    /// The coordinate grid, if a frame has initialised it yet.
    pub fn grid(&self) -> Option<&[Vec<Coord>]> {
        self.grid.get().map(Vec::as_slice)
    }

    /// Fuse one frame into the camera summary vector.
    ///
    /// Samples each sub-net's coordinates from its tile, normalizes the
    /// feature vector, fires the sub-net, then concatenates and normalizes
    /// the sixteen responses. Frames too small for the 4x4 partition are
    /// rejected as degenerate and never touch the grid.
    pub fn process(&mut self, image: &impl CameraImage) -> VisionResult<Tensor> {
        let (width, height) = (image.width(), image.height());
        if width < QUADRANT_SPLIT || height < QUADRANT_SPLIT {
            return Err(VisionError::DegenerateFrame { width, height });
        }
        let grid = self
            .grid
            .get_or_init(|| build_grid(self.seed, width, height));
        let (tile_w, tile_h) = (width / QUADRANT_SPLIT, height / QUADRANT_SPLIT);
        let mut summary = Vec::with_capacity(SUMMARY_WIDTH);
        for (n, net) in self.nets.iter_mut().enumerate() {
            let origin_x = tile_w * (n % QUADRANT_SPLIT);
            let origin_y = tile_h * (n / QUADRANT_SPLIT);
            let mut feature = Vec::with_capacity(3 * PIXELS_PER_NET);
            for coord in &grid[n] {
                let [y, cb, cr] = image.ycbcr(origin_x + coord.x, origin_y + coord.y);
                feature.push(y / 255.0);
                feature.push(cb / 255.0);
                feature.push(cr / 255.0);
            }
            let input = Tensor::row_vector(feature)?.normalize();
            let mut responses = net.fire(&input)?;
            summary.extend_from_slice(responses.swap_remove(0).data());
        }
        Ok(Tensor::row_vector(summary)?.normalize())
    }
}

/// Generate the per-sub-net coordinate grids from the first usable frame.
fn build_grid(seed: u64, width: usize, height: usize) -> Vec<Vec<Coord>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let (tile_w, tile_h) = (width / QUADRANT_SPLIT, height / QUADRANT_SPLIT);
    let grid: Vec<Vec<Coord>> = (0..SUB_NETS)
        .map(|_| {
            (0..PIXELS_PER_NET)
                .map(|_| Coord {
                    x: rng.gen_range(0..tile_w),
                    y: rng.gen_range(0..tile_h),
                })
                .collect()
        })
        .collect();
    debug!(width, height, "coordinate grid initialised");
    grid
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::YcbcrFrame;

    fn test_config() -> VisionConfig {
        VisionConfig {
            seed: 9,
            window: 4,
            samples: 8,
            update: UpdatePolicy::default(),
        }
    }

    fn gradient_frame(width: usize, height: usize) -> YcbcrFrame {
        let mut data = Vec::with_capacity(3 * width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(((x * 7 + y * 13) % 256) as u8);
                data.push((x % 256) as u8);
                data.push((y % 256) as u8);
            }
        }
        YcbcrFrame::from_ycbcr(width, height, data).unwrap()
    }

    #[test]
    fn summary_is_normalized_and_full_width() {
        let mut pipeline = CameraPipeline::new(test_config()).unwrap();
        let summary = pipeline.process(&gradient_frame(16, 16)).unwrap();
        assert_eq!(summary.shape(), (1, SUMMARY_WIDTH));
        let norm: f32 = summary.data().iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn grid_initialises_once_and_stays_in_bounds() {
        let mut pipeline = CameraPipeline::new(test_config()).unwrap();
        assert!(pipeline.grid().is_none());
        pipeline.process(&gradient_frame(16, 12)).unwrap();
        let first: Vec<Vec<Coord>> = pipeline.grid().unwrap().to_vec();
        assert_eq!(first.len(), SUB_NETS);
        for coords in &first {
            assert_eq!(coords.len(), PIXELS_PER_NET);
            for coord in coords {
                assert!(coord.x < 16 / QUADRANT_SPLIT);
                assert!(coord.y < 12 / QUADRANT_SPLIT);
            }
        }
        pipeline.process(&gradient_frame(16, 12)).unwrap();
        assert_eq!(pipeline.grid().unwrap(), first.as_slice());
    }

    #[test]
    fn degenerate_frames_are_rejected_and_leave_the_grid_alone() {
        let mut pipeline = CameraPipeline::new(test_config()).unwrap();
        let result = pipeline.process(&gradient_frame(3, 16));
        assert!(matches!(
            result,
            Err(VisionError::DegenerateFrame {
                width: 3,
                height: 16
            })
        ));
        assert!(pipeline.grid().is_none());
    }

    #[test]
    fn identical_seeds_fuse_identically() {
        let frame = gradient_frame(16, 16);
        let mut a = CameraPipeline::new(test_config()).unwrap();
        let mut b = CameraPipeline::new(test_config()).unwrap();
        let sa = a.process(&frame).unwrap();
        let sb = b.process(&frame).unwrap();
        assert_eq!(sa.data(), sb.data());
    }

    #[test]
    fn set_window_fans_out_to_every_sub_net() {
        let pipeline = CameraPipeline::new(test_config()).unwrap();
        pipeline.set_window(8).unwrap();
        for handle in pipeline.window_handles() {
            assert_eq!(handle.get(), 8);
        }
        assert!(pipeline.set_window(9).is_err());
    }
}
