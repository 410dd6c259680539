use serde::{Deserialize, Serialize};
use tc_tensor::Tensor;

/// How a top-level response vector becomes a discrete action code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionDecoder {
    /// The index of the largest response coordinate.
    ArgMax,
    /// Bit `i` of the code is set iff response coordinate `i` is positive.
    /// Reads at most the first 64 coordinates.
    SignBitmask,
}

impl ActionDecoder {
    pub fn decode(self, response: &Tensor) -> u64 {
        match self {
            ActionDecoder::ArgMax => {
                let mut best = 0usize;
                let mut max = f32::NEG_INFINITY;
                for (index, &value) in response.data().iter().enumerate() {
                    if value > max {
                        max = value;
                        best = index;
                    }
                }
                best as u64
            }
            ActionDecoder::SignBitmask => {
                let mut code = 0u64;
                for (index, &value) in response.data().iter().take(64).enumerate() {
                    if value > 0.0 {
                        code |= 1 << index;
                    }
                }
                code
            }
        }
    }
}

/// One decision cycle's output, handed to the actuator collaborator.
#[derive(Clone, Debug, PartialEq)]
pub struct Decision {
    /// Monotonic cycle counter, starting at 1.
    pub cycle: u64,
    /// Decoded discrete action code.
    pub action: u64,
    /// Raw top-level response the code was decoded from.
    pub response: Tensor,
    /// Present when the code is reserved for an adaptation-window change.
    pub window_request: Option<usize>,
}

/// Contract with the out-of-scope actuator collaborator.
///
/// `actuate` receives one decision per cycle from the control thread.
/// `pulse` is driven periodically by the [`crate::Pacer`] when one is
/// configured, for actuators that need a keep-alive or duty-cycle signal.
pub trait Actuator: Send {
    fn actuate(&mut self, decision: &Decision);

    fn pulse(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argmax_picks_the_first_maximum() {
        let response = Tensor::row_vector(vec![0.1, 0.9, -0.3, 0.9]).unwrap();
        assert_eq!(ActionDecoder::ArgMax.decode(&response), 1);
    }

    #[test]
    fn argmax_handles_all_negative_responses() {
        let response = Tensor::row_vector(vec![-3.0, -1.0, -2.0]).unwrap();
        assert_eq!(ActionDecoder::ArgMax.decode(&response), 1);
    }

    #[test]
    fn sign_bitmask_sets_one_bit_per_positive_coordinate() {
        let response = Tensor::row_vector(vec![0.5, -0.5, 0.0, 1.5]).unwrap();
        assert_eq!(ActionDecoder::SignBitmask.decode(&response), 0b1001);
    }

    #[test]
    fn sign_bitmask_ignores_coordinates_past_sixty_four() {
        let mut values = vec![-1.0; 70];
        values[65] = 1.0;
        let response = Tensor::row_vector(values).unwrap();
        assert_eq!(ActionDecoder::SignBitmask.decode(&response), 0);
    }
}
