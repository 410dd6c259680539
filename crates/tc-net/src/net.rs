use std::cmp::Ordering;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tc_tensor::{self_entropy, Tensor};

use crate::error::{NetError, NetResult};
use crate::stats::StatsSet;

/// Default number of candidate populations drawn per fire.
pub const DEFAULT_SAMPLES: usize = 256;

/// Default exponential blend rate for the statistics update.
pub const DEFAULT_BLEND_RATE: f32 = 0.3;

/// How many independent projections the network carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoleMode {
    /// One projection; `fire` returns a single response.
    Single,
    /// Query, Key and Value projections, independently sampled and ranked.
    Triple,
}

impl RoleMode {
    pub fn count(self) -> usize {
        match self {
            RoleMode::Single => 1,
            RoleMode::Triple => 3,
        }
    }
}

/// How the live sampling statistics absorb the elite statistics.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum UpdatePolicy {
    /// Overwrite the live bank with the elite statistics.
    Replace,
    /// Exponential blend: `new = (1 - rate) * old + rate * elite`.
    Blend { rate: f32 },
}

impl Default for UpdatePolicy {
    fn default() -> Self {
        UpdatePolicy::Blend {
            rate: DEFAULT_BLEND_RATE,
        }
    }
}

/// Construction parameters for a [`Net`]. Validated eagerly by [`Net::new`];
/// an out-of-range value is a configuration error, never clamped.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NetConfig {
    pub seed: u64,
    pub inputs: usize,
    pub outputs: usize,
    pub window: usize,
    pub samples: usize,
    pub roles: RoleMode,
    pub update: UpdatePolicy,
}

impl NetConfig {
    pub fn new(seed: u64, inputs: usize, outputs: usize, window: usize) -> Self {
        Self {
            seed,
            inputs,
            outputs,
            window,
            samples: DEFAULT_SAMPLES,
            roles: RoleMode::Single,
            update: UpdatePolicy::default(),
        }
    }

    pub fn with_samples(mut self, samples: usize) -> Self {
        self.samples = samples;
        self
    }

    pub fn with_roles(mut self, roles: RoleMode) -> Self {
        self.roles = roles;
        self
    }

    pub fn with_update(mut self, update: UpdatePolicy) -> Self {
        self.update = update;
        self
    }

    fn validate(&self) -> NetResult<()> {
        if self.inputs == 0 {
            return Err(NetError::ZeroDimension { field: "inputs" });
        }
        if self.outputs == 0 {
            return Err(NetError::ZeroDimension { field: "outputs" });
        }
        if self.samples == 0 {
            return Err(NetError::ZeroDimension { field: "samples" });
        }
        if self.window == 0 || self.window > self.samples {
            return Err(NetError::WindowOutOfRange {
                window: self.window,
                samples: self.samples,
            });
        }
        if let UpdatePolicy::Blend { rate } = self.update {
            if !(rate > 0.0 && rate <= 1.0) {
                return Err(NetError::InvalidBlendRate { rate });
            }
        }
        Ok(())
    }
}

/// Cloneable handle onto a net's adaptation window.
///
/// Stores with relaxed ordering: an in-flight `fire` keeps the window it
/// loaded at its own start and the new value takes effect on the next call.
#[derive(Clone, Debug)]
pub struct WindowHandle {
    window: Arc<AtomicUsize>,
    samples: usize,
}

impl WindowHandle {
    pub fn set(&self, window: usize) -> NetResult<()> {
        if window == 0 || window > self.samples {
            return Err(NetError::WindowOutOfRange {
                window,
                samples: self.samples,
            });
        }
        self.window.store(window, AtomicOrdering::Relaxed);
        Ok(())
    }

    pub fn get(&self) -> usize {
        self.window.load(AtomicOrdering::Relaxed)
    }
}

/// One fully drawn candidate: the sign weight population, its projected
/// response, and the entropy score attached after ranking.
struct Candidate {
    entropy: f32,
    population: Tensor,
    response: Tensor,
}

/// Stable ascending sort by entropy; ties keep sampling order.
fn rank_by_entropy(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        a.entropy
            .partial_cmp(&b.entropy)
            .unwrap_or(Ordering::Equal)
    });
}

/// Self-adapting stochastic decision network.
///
/// Each `fire` runs one generation of an intrinsic-reward evolutionary
/// search: draw candidate sign-weight populations per role, score them by the
/// entropy of their own batched responses under self attention, keep the
/// lowest-entropy window as the elite, and pull the sampling statistics
/// toward the elite. No external label or reward is involved.
///
/// A `Net` is owned by exactly one task; only the adaptation window is shared
/// (through [`WindowHandle`]).
pub struct Net {
    config: NetConfig,
    rng: StdRng,
    window: Arc<AtomicUsize>,
    roles: Vec<StatsSet>,
}

impl Net {
    pub fn new(config: NetConfig) -> NetResult<Self> {
        config.validate()?;
        let roles = (0..config.roles.count())
            .map(|_| StatsSet::unit(config.outputs, config.inputs))
            .collect();
        Ok(Self {
            rng: StdRng::seed_from_u64(config.seed),
            window: Arc::new(AtomicUsize::new(config.window)),
            roles,
            config,
        })
    }

    pub fn config(&self) -> &NetConfig {
        &self.config
    }

    /// The window value the next `fire` will observe.
    pub fn window(&self) -> usize {
        self.window.load(AtomicOrdering::Relaxed)
    }

    pub fn window_handle(&self) -> WindowHandle {
        WindowHandle {
            window: Arc::clone(&self.window),
            samples: self.config.samples,
        }
    }

    /// Borrow the live statistics bank for `role` (0-based, Q/K/V order).
    pub fn role_stats(&self, role: usize) -> Option<&StatsSet> {
        self.roles.get(role)
    }

    /// Run one generation and return the rank-0 response per role, in
    /// Query/Key/Value order. A single-role net returns one response.
    pub fn fire(&mut self, input: &Tensor) -> NetResult<Vec<Tensor>> {
        let (rows, cols) = input.shape();
        if rows != 1 || cols != self.config.inputs {
            return Err(NetError::InputShape {
                expected: self.config.inputs,
                rows,
                cols,
            });
        }
        // The window observed here holds for the whole generation even if a
        // handle stores a new value mid-flight.
        let window = self.window.load(AtomicOrdering::Relaxed);
        let samples = self.config.samples;
        let mut responses = Vec::with_capacity(self.roles.len());
        for role in 0..self.roles.len() {
            let mut candidates = Vec::with_capacity(samples);
            for _ in 0..samples {
                let population = self.roles[role].sample_population(&mut self.rng);
                let response = population.matmul_t(input)?;
                candidates.push(Candidate {
                    entropy: 0.0,
                    population,
                    response,
                });
            }
            let stacked = stack_responses(&candidates, self.config.outputs)?;
            let entropies = self_entropy(&stacked, &stacked, &stacked)?;
            for (candidate, entropy) in candidates.iter_mut().zip(entropies) {
                candidate.entropy = entropy;
            }
            rank_by_entropy(&mut candidates);
            let elite = StatsSet::estimate(
                candidates[..window].iter().map(|c| &c.population),
                self.config.outputs,
                self.config.inputs,
            );
            match self.config.update {
                UpdatePolicy::Replace => self.roles[role] = elite,
                UpdatePolicy::Blend { rate } => self.roles[role].blend_from(&elite, rate),
            }
            responses.push(candidates[0].response.clone());
        }
        Ok(responses)
    }
}

fn stack_responses(candidates: &[Candidate], outputs: usize) -> NetResult<Tensor> {
    let mut data = Vec::with_capacity(candidates.len() * outputs);
    for candidate in candidates {
        data.extend_from_slice(candidate.response.data());
    }
    Ok(Tensor::from_vec(candidates.len(), outputs, data)?)
}
