use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tc_net::{RoleMode, UpdatePolicy};
use tc_runtime::{
    ActionDecoder, Actuator, ControlLoop, Decision, FrameSource, RuntimeConfig,
};
use tc_vision::YcbcrFrame;

struct ScriptedCamera {
    frames: VecDeque<YcbcrFrame>,
}

impl ScriptedCamera {
    fn new(count: usize, phase: u8) -> Self {
        let frames = (0..count)
            .map(|index| gradient_frame(16, 16, phase.wrapping_add(index as u8)))
            .collect();
        Self { frames }
    }
}

impl FrameSource for ScriptedCamera {
    fn next_frame(&mut self) -> Option<YcbcrFrame> {
        self.frames.pop_front()
    }
}

fn gradient_frame(width: usize, height: usize, phase: u8) -> YcbcrFrame {
    let mut data = Vec::with_capacity(3 * width * height);
    for y in 0..height {
        for x in 0..width {
            data.push(((x * 5 + y * 11) % 256) as u8 ^ phase);
            data.push((x % 256) as u8);
            data.push((y % 256) as u8);
        }
    }
    YcbcrFrame::from_ycbcr(width, height, data).unwrap()
}

#[derive(Clone, Default)]
struct Recorder {
    decisions: Arc<Mutex<Vec<Decision>>>,
    pulses: Arc<AtomicUsize>,
}

impl Recorder {
    fn decision_count(&self) -> usize {
        self.decisions.lock().unwrap().len()
    }
}

impl Actuator for Recorder {
    fn actuate(&mut self, decision: &Decision) {
        self.decisions.lock().unwrap().push(decision.clone());
    }

    fn pulse(&mut self) {
        self.pulses.fetch_add(1, Ordering::Relaxed);
    }
}

fn test_config() -> RuntimeConfig {
    RuntimeConfig {
        seed: 1,
        window: 4,
        samples: 8,
        update: UpdatePolicy::default(),
        roles: RoleMode::Single,
        outputs: 8,
        decoder: ActionDecoder::ArgMax,
        window_codes: BTreeMap::from([(5, 8)]),
        pulse_interval: None,
    }
}

fn wait_until(deadline: Duration, mut ready: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if ready() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    ready()
}

#[test]
fn every_produced_frame_becomes_a_decision() {
    let frames_per_camera = 6;
    let sources: [Box<dyn FrameSource>; 3] = [
        Box::new(ScriptedCamera::new(frames_per_camera, 0)),
        Box::new(ScriptedCamera::new(frames_per_camera, 64)),
        Box::new(ScriptedCamera::new(frames_per_camera, 128)),
    ];
    let recorder = Recorder::default();
    let config = test_config();
    let expected = 3 * frames_per_camera;
    let handle =
        ControlLoop::spawn(config.clone(), sources, Box::new(recorder.clone())).unwrap();
    assert!(
        wait_until(Duration::from_secs(30), || {
            recorder.decision_count() == expected
        }),
        "expected {expected} decisions, saw {}",
        recorder.decision_count()
    );
    handle.shutdown();

    let decisions = recorder.decisions.lock().unwrap();
    assert_eq!(decisions.len(), expected);
    for (index, decision) in decisions.iter().enumerate() {
        assert_eq!(decision.cycle, index as u64 + 1);
        assert_eq!(decision.response.shape(), (1, config.outputs));
        assert!((decision.action as usize) < config.outputs);
        assert_eq!(
            decision.window_request,
            config.window_codes.get(&decision.action).copied()
        );
    }
}

#[test]
fn reserved_codes_retune_every_window() {
    // Every reachable arg-max action requests window 2, so the first
    // decision must fan the change out to all 49 nets.
    let mut config = test_config();
    config.window_codes = (0..config.outputs as u64).map(|code| (code, 2)).collect();
    let sources: [Box<dyn FrameSource>; 3] = [
        Box::new(ScriptedCamera::new(2, 0)),
        Box::new(ScriptedCamera::new(2, 64)),
        Box::new(ScriptedCamera::new(2, 128)),
    ];
    let recorder = Recorder::default();
    let handle =
        ControlLoop::spawn(config, sources, Box::new(recorder.clone())).unwrap();
    assert!(wait_until(Duration::from_secs(30), || {
        recorder.decision_count() >= 1
    }));
    assert!(recorder.decisions.lock().unwrap()[0].window_request.is_some());
    for window in handle.windows() {
        assert_eq!(window.get(), 2);
    }
    handle.shutdown();
}

#[test]
fn external_window_requests_fan_out() {
    let sources: [Box<dyn FrameSource>; 3] = [
        Box::new(ScriptedCamera::new(0, 0)),
        Box::new(ScriptedCamera::new(0, 0)),
        Box::new(ScriptedCamera::new(0, 0)),
    ];
    let handle =
        ControlLoop::spawn(test_config(), sources, Box::new(Recorder::default())).unwrap();
    handle.set_window(2).unwrap();
    for window in handle.windows() {
        assert_eq!(window.get(), 2);
    }
    assert!(handle.set_window(9).is_err());
    handle.shutdown();
}

#[test]
fn pacer_pulses_the_actuator() {
    let mut config = test_config();
    config.pulse_interval = Some(Duration::from_millis(2));
    let sources: [Box<dyn FrameSource>; 3] = [
        Box::new(ScriptedCamera::new(1, 0)),
        Box::new(ScriptedCamera::new(1, 64)),
        Box::new(ScriptedCamera::new(1, 128)),
    ];
    let recorder = Recorder::default();
    let handle = ControlLoop::spawn(config, sources, Box::new(recorder.clone())).unwrap();
    assert!(wait_until(Duration::from_secs(30), || {
        recorder.pulses.load(Ordering::Relaxed) >= 1
    }));
    handle.shutdown();
    assert!(recorder.pulses.load(Ordering::Relaxed) >= 1);
}
