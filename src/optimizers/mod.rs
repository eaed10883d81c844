//! Optimizer abstractions for layer parameter updates
//!
//! This module provides the Optimizer trait and implementations for the
//! optimization strategies a trainable layer can be configured with.
//!
//! # Overview
//!
//! A trainable layer keeps its parameter tensors and its optimizer in
//! separate fields. The layer describes its tensors and their gradient
//! through the [`Parameters`] trait; the optimizer owns everything else:
//! the forward input snapshot, gradient accumulators and any moment
//! estimates. Per step the layer calls:
//!
//! 1. `forward(input)` so the optimizer can snapshot the input
//! 2. `backward(parameters, forward_error)` to accumulate gradients
//! 3. `update(parameters)` to apply and clear them
//!
//! # Available Optimizers
//!
//! - [`NoOptimizer`]: forward-only layers; backward and update fail
//! - [`GradientDescent`]: `parameter -= learning_rate * gradient`
//! - [`Adam`]: bias-corrected adaptive moments on top of gradient descent
//!
//! # Example
//!
//! ```
//! use ffnn::optimizers::{Adam, Optimizer};
//!
//! let optimizer = Adam::new(0.001, 0.9, 0.999, 1e-8);
//! assert_eq!(optimizer.name(), "Adam");
//! assert_eq!(optimizer.learning_rate(), 0.001);
//! ```

pub mod adam;
pub mod gradient_descent;
pub mod none;

pub use adam::Adam;
pub use gradient_descent::GradientDescent;
pub use none::NoOptimizer;

use crate::error::Result;
use ndarray::{ArrayD, ArrayView1, ArrayViewD, ArrayViewMutD};

/// Trainable tensors of a layer.
///
/// Tensors are always listed in the same order, and
/// [`Parameters::accumulate_gradient`] adds into gradient buffers shaped like
/// those tensors in that order.
pub trait Parameters {
    /// Read-only views of every parameter tensor.
    fn tensors(&self) -> Vec<ArrayViewD<'_, f32>>;

    /// Mutable views of every parameter tensor.
    fn tensors_mut(&mut self) -> Vec<ArrayViewMutD<'_, f32>>;

    /// Adds the gradient for one sample to `gradient`.
    ///
    /// # Arguments
    ///
    /// * `input` - The layer input seen by the matching forward call
    /// * `forward_error` - Error at the layer output
    /// * `gradient` - One accumulator per tensor, in [`Parameters::tensors`] order
    fn accumulate_gradient(
        &self,
        input: ArrayView1<f32>,
        forward_error: ArrayView1<f32>,
        gradient: &mut [ArrayD<f32>],
    ) -> Result<()>;

    /// Total number of scalar parameters.
    fn count(&self) -> usize {
        self.tensors().iter().map(|t| t.len()).sum()
    }
}

/// Core trait for layer optimizers.
///
/// # State Management
///
/// Optimizers are sized by `initialize`, which the owning layer calls once
/// its parameters are allocated. Gradient accumulators are cleared by every
/// `update` and by `reset`.
pub trait Optimizer {
    /// Human-readable optimizer name.
    fn name(&self) -> &'static str;

    /// Sizes internal state for `parameters` and an input of `input_size`.
    fn initialize(&mut self, parameters: &dyn Parameters, input_size: usize) -> Result<()>;

    /// Clears accumulated gradients.
    fn reset(&mut self);

    /// Records the layer input for the coming backward call.
    fn forward(&mut self, input: ArrayView1<f32>) -> Result<()>;

    /// Accumulates the gradient for the recorded input and `forward_error`.
    ///
    /// # Errors
    ///
    /// [`NoOptimizer`] always fails here.
    fn backward(&mut self, parameters: &dyn Parameters, forward_error: ArrayView1<f32>)
        -> Result<()>;

    /// Applies and clears the accumulated gradient.
    ///
    /// # Errors
    ///
    /// [`NoOptimizer`] always fails here.
    fn update(&mut self, parameters: &mut dyn Parameters) -> Result<()>;

    fn learning_rate(&self) -> f32;

    fn set_learning_rate(&mut self, learning_rate: f32);
}
