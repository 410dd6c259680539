use rand::rngs::StdRng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};
use tc_tensor::Tensor;

/// Sampling distribution for one (output, input) weight coordinate.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Gaussian {
    pub mean: f32,
    pub std_dev: f32,
}

/// The `[outputs x inputs]` bank of coordinate distributions for one role.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatsSet {
    outputs: usize,
    inputs: usize,
    coords: Vec<Gaussian>,
}

impl StatsSet {
    /// A fresh bank with every coordinate at `Normal(0, 1)`.
    pub fn unit(outputs: usize, inputs: usize) -> Self {
        Self {
            outputs,
            inputs,
            coords: vec![
                Gaussian {
                    mean: 0.0,
                    std_dev: 1.0,
                };
                outputs * inputs
            ],
        }
    }

    pub fn outputs(&self) -> usize {
        self.outputs
    }

    pub fn inputs(&self) -> usize {
        self.inputs
    }

    pub fn get(&self, output: usize, input: usize) -> Gaussian {
        self.coords[output * self.inputs + input]
    }

    /// Draw one candidate weight population: `outputs` rows of `inputs`
    /// sign-discretised coordinates. A coordinate whose standard deviation is
    /// not positive samples deterministically at its mean, so a collapsed
    /// distribution never injects noise or NaNs.
    pub fn sample_population(&self, rng: &mut StdRng) -> Tensor {
        let mut data = Vec::with_capacity(self.coords.len());
        for coord in &self.coords {
            let value = if coord.std_dev > 0.0 {
                let noise: f64 = StandardNormal.sample(rng);
                noise as f32 * coord.std_dev + coord.mean
            } else {
                coord.mean
            };
            data.push(if value > 0.0 { 1.0 } else { -1.0 });
        }
        Tensor::from_vec(self.outputs, self.inputs, data)
            .expect("population shape is fixed by the stats bank")
    }

    /// Re-estimate per-coordinate mean and population standard deviation from
    /// an elite set of weight populations.
    pub fn estimate<'a, I>(populations: I, outputs: usize, inputs: usize) -> Self
    where
        I: IntoIterator<Item = &'a Tensor> + Clone,
    {
        let mut coords = vec![
            Gaussian {
                mean: 0.0,
                std_dev: 0.0,
            };
            outputs * inputs
        ];
        let mut count = 0usize;
        for population in populations.clone() {
            for (coord, value) in coords.iter_mut().zip(population.data()) {
                coord.mean += value;
            }
            count += 1;
        }
        if count == 0 {
            return Self {
                outputs,
                inputs,
                coords,
            };
        }
        let window = count as f32;
        for coord in coords.iter_mut() {
            coord.mean /= window;
        }
        for population in populations {
            for (coord, value) in coords.iter_mut().zip(population.data()) {
                let diff = coord.mean - value;
                coord.std_dev += diff * diff;
            }
        }
        for coord in coords.iter_mut() {
            coord.std_dev = (coord.std_dev / window).sqrt();
        }
        Self {
            outputs,
            inputs,
            coords,
        }
    }

    /// Move every coordinate toward `target` by the exponential blend
    /// `new = (1 - rate) * old + rate * target`.
    pub fn blend_from(&mut self, target: &StatsSet, rate: f32) {
        for (coord, other) in self.coords.iter_mut().zip(&target.coords) {
            coord.mean = (1.0 - rate) * coord.mean + rate * other.mean;
            coord.std_dev = (1.0 - rate) * coord.std_dev + rate * other.std_dev;
        }
    }
}
