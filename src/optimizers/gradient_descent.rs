//! Gradient descent optimizer implementation
//!
//! This module provides the plain gradient descent optimizer, which
//! accumulates gradients over backward calls and subtracts them scaled by
//! the learning rate on update.

use super::{Optimizer, Parameters};
use crate::error::{Error, Result};
use ndarray::{Array1, ArrayD, ArrayView1};

/// Gradient descent optimizer.
///
/// The update rule is `parameter = parameter - learning_rate * gradient`,
/// where `gradient` is the sum over every backward call since the last
/// update.
///
/// # Example
///
/// ```
/// use ffnn::optimizers::{GradientDescent, Optimizer};
///
/// let mut optimizer = GradientDescent::new(0.01);
/// optimizer.set_learning_rate(0.005);
/// assert_eq!(optimizer.learning_rate(), 0.005);
/// ```
#[derive(Debug, Clone)]
pub struct GradientDescent {
    learning_rate: f32,
    /// One accumulator per parameter tensor
    gradient: Vec<ArrayD<f32>>,
    /// Layer input recorded by the last forward
    prev_input: Array1<f32>,
    initialized: bool,
}

impl GradientDescent {
    /// Creates a gradient descent optimizer.
    ///
    /// # Arguments
    ///
    /// * `learning_rate` - Step size for parameter updates (must be positive)
    ///
    /// # Panics
    ///
    /// Panics if `learning_rate` is not positive.
    pub fn new(learning_rate: f32) -> Self {
        assert!(learning_rate > 0.0, "learning rate must be positive");
        Self {
            learning_rate,
            gradient: Vec::new(),
            prev_input: Array1::zeros(0),
            initialized: false,
        }
    }

    /// Accumulated gradients, in the layer's tensor order.
    pub fn gradient(&self) -> &[ArrayD<f32>] {
        &self.gradient
    }

    /// `true` once sized by [`Optimizer::initialize`].
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn require_initialized(&self) -> Result<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(Error::OptimizerNotInitialized(self.name().to_owned()))
        }
    }
}

impl Optimizer for GradientDescent {
    fn name(&self) -> &'static str {
        "GradientDescent"
    }

    fn initialize(&mut self, parameters: &dyn Parameters, input_size: usize) -> Result<()> {
        self.gradient = parameters
            .tensors()
            .iter()
            .map(|t| ArrayD::zeros(t.raw_dim()))
            .collect();
        self.prev_input = Array1::zeros(input_size);
        self.initialized = true;
        Ok(())
    }

    fn reset(&mut self) {
        for g in &mut self.gradient {
            g.fill(0.0);
        }
    }

    fn forward(&mut self, input: ArrayView1<f32>) -> Result<()> {
        self.require_initialized()?;
        if input.len() != self.prev_input.len() {
            return Err(Error::SizeMismatch {
                expected: self.prev_input.len(),
                actual: input.len(),
            });
        }
        self.prev_input.assign(&input);
        Ok(())
    }

    fn backward(
        &mut self,
        parameters: &dyn Parameters,
        forward_error: ArrayView1<f32>,
    ) -> Result<()> {
        self.require_initialized()?;
        parameters.accumulate_gradient(self.prev_input.view(), forward_error, &mut self.gradient)
    }

    fn update(&mut self, parameters: &mut dyn Parameters) -> Result<()> {
        self.require_initialized()?;
        let mut tensors = parameters.tensors_mut();
        if tensors.len() != self.gradient.len() {
            return Err(Error::SizeMismatch {
                expected: self.gradient.len(),
                actual: tensors.len(),
            });
        }
        for (tensor, gradient) in tensors.iter_mut().zip(&self.gradient) {
            tensor.scaled_add(-self.learning_rate, gradient);
        }
        self.reset();
        Ok(())
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, learning_rate: f32) {
        self.learning_rate = learning_rate;
    }
}
