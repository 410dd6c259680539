use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, never, select, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use tc_net::{Net, NetConfig, NetResult, RoleMode, UpdatePolicy, WindowHandle};
use tc_tensor::Tensor;
use tc_vision::{CameraPipeline, VisionConfig, VisionError, YcbcrFrame, SUMMARY_WIDTH};

use crate::action::{ActionDecoder, Actuator, Decision};
use crate::error::{RuntimeError, RuntimeResult};
use crate::pacer::Pacer;

/// Bounded frames buffered per camera; overflow drops the newest frame.
pub const QUEUE_CAPACITY: usize = 8;

/// Width of the fused top-level input: one summary slot per camera.
pub const TOP_INPUTS: usize = 3 * SUMMARY_WIDTH;

/// Poll interval for the shutdown flag while no camera is ready.
const IDLE_POLL: Duration = Duration::from_millis(20);

/// The three fixed camera positions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CameraId {
    Center,
    Left,
    Right,
}

impl CameraId {
    pub const ALL: [CameraId; 3] = [CameraId::Center, CameraId::Left, CameraId::Right];

    pub fn index(self) -> usize {
        match self {
            CameraId::Center => 0,
            CameraId::Left => 1,
            CameraId::Right => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CameraId::Center => "center",
            CameraId::Left => "left",
            CameraId::Right => "right",
        }
    }
}

/// Contract with the out-of-scope camera collaborator.
///
/// Each call delivers the next captured frame; `None` ends the camera's
/// stream. Implementations should return promptly so the worker can observe
/// shutdown between frames.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Option<YcbcrFrame>;
}

/// Construction parameters for the control loop.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub seed: u64,
    /// Initial adaptation window applied to every net.
    pub window: usize,
    /// Candidate populations drawn per fire, for every net.
    pub samples: usize,
    pub update: UpdatePolicy,
    /// Role layout of the top-level net.
    pub roles: RoleMode,
    /// Output width of the top-level net.
    pub outputs: usize,
    pub decoder: ActionDecoder,
    /// Action codes reserved for adaptation-window changes.
    pub window_codes: BTreeMap<u64, usize>,
    /// Interval for the actuator keep-alive pacer, if any.
    pub pulse_interval: Option<Duration>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            seed: 1,
            window: 128,
            samples: tc_net::DEFAULT_SAMPLES,
            update: UpdatePolicy::default(),
            roles: RoleMode::Single,
            outputs: 8,
            decoder: ActionDecoder::ArgMax,
            window_codes: BTreeMap::from([(5, 128), (6, 32), (7, 16)]),
            pulse_interval: None,
        }
    }
}

impl RuntimeConfig {
    fn validate(&self) -> RuntimeResult<()> {
        for (&code, &window) in &self.window_codes {
            if window == 0 || window > self.samples {
                return Err(RuntimeError::InvalidWindowCode {
                    code,
                    window,
                    samples: self.samples,
                });
            }
        }
        Ok(())
    }
}

/// One camera's fused summary, queued for the control thread.
pub(crate) struct CameraFrame {
    pub(crate) camera: CameraId,
    pub(crate) summary: Tensor,
}

pub(crate) enum Offer {
    Sent,
    DroppedNewest,
    Disconnected,
}

/// Non-blocking enqueue: a full queue discards the incoming frame so the
/// producer is never delayed by more than the `try_send` itself.
pub(crate) fn offer_frame(tx: &Sender<CameraFrame>, frame: CameraFrame) -> Offer {
    match tx.try_send(frame) {
        Ok(()) => Offer::Sent,
        Err(TrySendError::Full(_)) => Offer::DroppedNewest,
        Err(TrySendError::Disconnected(_)) => Offer::Disconnected,
    }
}

/// The assembled perception-to-action system.
pub struct ControlLoop;

impl ControlLoop {
    /// Spawn one producer thread per camera plus the control thread, wired
    /// through bounded queues, and hand back the running system's handle.
    pub fn spawn(
        config: RuntimeConfig,
        sources: [Box<dyn FrameSource>; 3],
        actuator: Box<dyn Actuator>,
    ) -> RuntimeResult<ControlHandle> {
        config.validate()?;
        let shutdown = Arc::new(AtomicBool::new(false));
        let actuator = Arc::new(Mutex::new(actuator));

        let top = Net::new(
            NetConfig::new(config.seed + 3, TOP_INPUTS, config.outputs, config.window)
                .with_samples(config.samples)
                .with_roles(config.roles)
                .with_update(config.update),
        )?;
        let mut windows = vec![top.window_handle()];

        let mut pipelines = Vec::with_capacity(CameraId::ALL.len());
        for camera in CameraId::ALL {
            let pipeline = CameraPipeline::new(VisionConfig {
                seed: config.seed + camera.index() as u64,
                window: config.window,
                samples: config.samples,
                update: config.update,
            })?;
            windows.extend(pipeline.window_handles());
            pipelines.push(pipeline);
        }

        let (tx_center, rx_center) = bounded(QUEUE_CAPACITY);
        let (tx_left, rx_left) = bounded(QUEUE_CAPACITY);
        let (tx_right, rx_right) = bounded(QUEUE_CAPACITY);
        let senders = [tx_center, tx_left, tx_right];
        let receivers = [rx_center, rx_left, rx_right];

        let mut workers = Vec::with_capacity(4);
        for ((camera, source), (pipeline, tx)) in CameraId::ALL
            .into_iter()
            .zip(sources)
            .zip(pipelines.into_iter().zip(senders))
        {
            let flag = Arc::clone(&shutdown);
            let worker = thread::Builder::new()
                .name(format!("tricam-{}", camera.name()))
                .spawn(move || camera_worker(camera, source, pipeline, tx, flag))
                .map_err(|err| RuntimeError::Spawn {
                    name: camera.name(),
                    message: err.to_string(),
                })?;
            workers.push(worker);
        }

        let flag = Arc::clone(&shutdown);
        let control_windows = windows.clone();
        let decoder = config.decoder;
        let window_codes = config.window_codes.clone();
        let control_actuator = Arc::clone(&actuator);
        let control = thread::Builder::new()
            .name("tricam-control".into())
            .spawn(move || {
                control_worker(
                    top,
                    receivers,
                    control_windows,
                    decoder,
                    window_codes,
                    control_actuator,
                    flag,
                )
            })
            .map_err(|err| RuntimeError::Spawn {
                name: "control",
                message: err.to_string(),
            })?;
        workers.push(control);

        let pacer = match config.pulse_interval {
            Some(interval) => {
                let pulse_actuator = Arc::clone(&actuator);
                Some(Pacer::spawn(interval, move || {
                    let mut guard = match pulse_actuator.lock() {
                        Ok(guard) => guard,
                        Err(poisoned) => poisoned.into_inner(),
                    };
                    guard.pulse();
                })?)
            }
            None => None,
        };

        Ok(ControlHandle {
            shutdown,
            workers,
            pacer,
            windows,
        })
    }
}

/// Handle onto a running control loop.
pub struct ControlHandle {
    shutdown: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
    pacer: Option<Pacer>,
    windows: Vec<WindowHandle>,
}

impl ControlHandle {
    /// Window handles for every net in the system, top-level first.
    pub fn windows(&self) -> &[WindowHandle] {
        &self.windows
    }

    /// External adaptation-window request, fanned out to every net.
    pub fn set_window(&self, window: usize) -> NetResult<()> {
        for handle in &self.windows {
            handle.set(window)?;
        }
        info!(window, "adaptation window set externally");
        Ok(())
    }

    /// Signal every worker to stop and join them.
    pub fn shutdown(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(pacer) = self.pacer.take() {
            pacer.stop();
        }
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

impl Drop for ControlHandle {
    fn drop(&mut self) {
        self.halt();
    }
}

fn camera_worker(
    camera: CameraId,
    mut source: Box<dyn FrameSource>,
    mut pipeline: CameraPipeline,
    tx: Sender<CameraFrame>,
    shutdown: Arc<AtomicBool>,
) {
    while !shutdown.load(Ordering::Relaxed) {
        let Some(image) = source.next_frame() else {
            break;
        };
        let summary = match pipeline.process(&image) {
            Ok(summary) => summary,
            Err(err @ VisionError::DegenerateFrame { .. }) => {
                warn!(camera = camera.name(), %err, "skipping frame");
                continue;
            }
            Err(err) => {
                warn!(camera = camera.name(), %err, "frame processing failed");
                continue;
            }
        };
        match offer_frame(&tx, CameraFrame { camera, summary }) {
            Offer::Sent => {}
            Offer::DroppedNewest => {
                warn!(camera = camera.name(), "queue full, dropping newest frame");
            }
            Offer::Disconnected => break,
        }
    }
    debug!(camera = camera.name(), "camera worker stopped");
}

fn control_worker(
    mut top: Net,
    mut receivers: [Receiver<CameraFrame>; 3],
    windows: Vec<WindowHandle>,
    decoder: ActionDecoder,
    window_codes: BTreeMap<u64, usize>,
    actuator: Arc<Mutex<Box<dyn Actuator>>>,
    shutdown: Arc<AtomicBool>,
) {
    // Most-recent-value-per-camera slots; the loop reacts to whichever
    // camera is ready first and never waits for a synchronized triplet.
    let mut input = vec![0.0f32; TOP_INPUTS];
    let mut open = receivers.len();
    let mut cycle = 0u64;
    while !shutdown.load(Ordering::Relaxed) && open > 0 {
        let (index, message) = select! {
            recv(receivers[0]) -> msg => (0, msg),
            recv(receivers[1]) -> msg => (1, msg),
            recv(receivers[2]) -> msg => (2, msg),
            default(IDLE_POLL) => continue,
        };
        let frame = match message {
            Ok(frame) => frame,
            Err(_) => {
                // Producer gone; park the slot so select stops waking on it.
                receivers[index] = never();
                open -= 1;
                continue;
            }
        };
        let slot = frame.camera.index();
        input[slot * SUMMARY_WIDTH..(slot + 1) * SUMMARY_WIDTH]
            .copy_from_slice(frame.summary.data());

        let fused = match Tensor::row_vector(input.clone()) {
            Ok(tensor) => tensor,
            Err(err) => {
                warn!(%err, "fused input rejected");
                continue;
            }
        };
        let responses = match top.fire(&fused) {
            Ok(responses) => responses,
            Err(err) => {
                warn!(%err, "top-level fire failed");
                continue;
            }
        };
        // A triple-role net is decoded from its first (query) response.
        let Some(response) = responses.into_iter().next() else {
            continue;
        };
        let action = decoder.decode(&response);
        let window_request = window_codes.get(&action).copied();
        if let Some(window) = window_request {
            info!(window, action, "adaptation window change");
            for handle in &windows {
                if let Err(err) = handle.set(window) {
                    warn!(%err, "window update rejected");
                }
            }
        }
        cycle += 1;
        debug!(cycle, action, "decision");
        let decision = Decision {
            cycle,
            action,
            response,
            window_request,
        };
        let mut guard = match actuator.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.actuate(&decision);
    }
    debug!(cycle, "control worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_frame() -> CameraFrame {
        CameraFrame {
            camera: CameraId::Center,
            summary: Tensor::row_vector(vec![1.0]).unwrap(),
        }
    }

    #[test]
    fn overflowing_producers_drop_the_newest_frame() {
        let (tx, rx) = bounded(QUEUE_CAPACITY);
        let mut sent = 0;
        let mut dropped = 0;
        for _ in 0..100 {
            match offer_frame(&tx, dummy_frame()) {
                Offer::Sent => sent += 1,
                Offer::DroppedNewest => dropped += 1,
                Offer::Disconnected => unreachable!("receiver still alive"),
            }
        }
        assert_eq!(sent, QUEUE_CAPACITY);
        assert_eq!(dropped, 100 - QUEUE_CAPACITY);
        assert_eq!(rx.len(), QUEUE_CAPACITY);
    }

    #[test]
    fn offer_reports_disconnected_consumers() {
        let (tx, rx) = bounded(QUEUE_CAPACITY);
        drop(rx);
        assert!(matches!(
            offer_frame(&tx, dummy_frame()),
            Offer::Disconnected
        ));
    }

    #[test]
    fn default_config_is_valid() {
        assert!(RuntimeConfig::default().validate().is_ok());
    }

    #[test]
    fn window_codes_outside_sample_bound_are_rejected() {
        let mut config = RuntimeConfig::default();
        config.window_codes.insert(9, 1024);
        assert!(matches!(
            config.validate(),
            Err(RuntimeError::InvalidWindowCode {
                code: 9,
                window: 1024,
                samples: 256
            })
        ));
    }

    #[test]
    fn camera_ids_map_to_distinct_slots() {
        let indices: Vec<usize> = CameraId::ALL.iter().map(|c| c.index()).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(CameraId::Left.name(), "left");
    }
}
