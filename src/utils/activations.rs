//! Activation functions for element-wise layers
//!
//! This module provides the neuron types an [`Activation`](crate::layers::Activation)
//! layer can apply, each with its value and derivative with respect to the
//! pre-activation input:
//! - Linear: `x`
//! - Sigmoid: `1 / (1 + exp(-x))`
//! - LeCun sigmoid: `1.7159 * tanh(2x / 3)`
//! - Tanh
//! - ReLU and leaky ReLU
//! - Soft sign: `x / (1 + |x|)`

use serde::{Deserialize, Serialize};

/// Scale of the LeCun sigmoid.
const LECUN_SCALE: f32 = 1.7159;
/// Input gain of the LeCun sigmoid.
const LECUN_GAIN: f32 = 2.0 / 3.0;

/// Element-wise activation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Neuron {
    Linear,
    Sigmoid,
    LecunSigmoid,
    Tanh,
    Relu,
    LeakyRelu { alpha: f32 },
    SoftSign,
}

impl Neuron {
    /// Activation value at `x`.
    pub fn value(&self, x: f32) -> f32 {
        match *self {
            Neuron::Linear => x,
            Neuron::Sigmoid => sigmoid(x),
            Neuron::LecunSigmoid => LECUN_SCALE * (LECUN_GAIN * x).tanh(),
            Neuron::Tanh => x.tanh(),
            Neuron::Relu => x.max(0.0),
            Neuron::LeakyRelu { alpha } => {
                if x > 0.0 {
                    x
                } else {
                    alpha * x
                }
            }
            Neuron::SoftSign => x / (1.0 + x.abs()),
        }
    }

    /// Derivative of the activation at `x`.
    ///
    /// ReLU variants use the left derivative at 0.
    pub fn derivative(&self, x: f32) -> f32 {
        match *self {
            Neuron::Linear => 1.0,
            Neuron::Sigmoid => {
                let s = sigmoid(x);
                s * (1.0 - s)
            }
            Neuron::LecunSigmoid => {
                let t = (LECUN_GAIN * x).tanh();
                LECUN_SCALE * LECUN_GAIN * (1.0 - t * t)
            }
            Neuron::Tanh => {
                let t = x.tanh();
                1.0 - t * t
            }
            Neuron::Relu => {
                if x > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Neuron::LeakyRelu { alpha } => {
                if x > 0.0 {
                    1.0
                } else {
                    alpha
                }
            }
            Neuron::SoftSign => {
                let d = 1.0 + x.abs();
                1.0 / (d * d)
            }
        }
    }

    /// Parses the lowercase names used in architecture files.
    ///
    /// `alpha` is only read by `leaky_relu` and defaults to 0.01.
    pub fn from_name(name: &str, alpha: Option<f32>) -> Option<Neuron> {
        Some(match name {
            "linear" => Neuron::Linear,
            "sigmoid" => Neuron::Sigmoid,
            "lecun_sigmoid" => Neuron::LecunSigmoid,
            "tanh" => Neuron::Tanh,
            "relu" => Neuron::Relu,
            "leaky_relu" => Neuron::LeakyRelu {
                alpha: alpha.unwrap_or(0.01),
            },
            "soft_sign" => Neuron::SoftSign,
            _ => return None,
        })
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const ALL: [Neuron; 7] = [
        Neuron::Linear,
        Neuron::Sigmoid,
        Neuron::LecunSigmoid,
        Neuron::Tanh,
        Neuron::Relu,
        Neuron::LeakyRelu { alpha: 0.1 },
        Neuron::SoftSign,
    ];

    #[test]
    fn test_known_values() {
        assert_relative_eq!(Neuron::Sigmoid.value(0.0), 0.5);
        assert_relative_eq!(Neuron::Relu.value(-2.0), 0.0);
        assert_relative_eq!(Neuron::LeakyRelu { alpha: 0.1 }.value(-2.0), -0.2);
        assert_relative_eq!(Neuron::SoftSign.value(1.0), 0.5);
        assert_relative_eq!(Neuron::LecunSigmoid.value(1.5), 1.7159 * 1.0f32.tanh());
    }

    #[test]
    fn test_derivatives_match_finite_differences() {
        let h = 1e-3f32;
        for neuron in ALL {
            for &x in &[-1.3f32, -0.4, 0.7, 2.1] {
                let numeric = (neuron.value(x + h) - neuron.value(x - h)) / (2.0 * h);
                assert_relative_eq!(neuron.derivative(x), numeric, epsilon = 1e-2);
            }
        }
    }

    #[test]
    fn test_from_name() {
        assert_eq!(Neuron::from_name("relu", None), Some(Neuron::Relu));
        assert_eq!(
            Neuron::from_name("leaky_relu", None),
            Some(Neuron::LeakyRelu { alpha: 0.01 })
        );
        assert_eq!(Neuron::from_name("gelu", None), None);
    }
}
