//! Placeholder optimizer for layers that only run forward.

use super::{Optimizer, Parameters};
use crate::error::{Error, Result};
use ndarray::ArrayView1;

/// Optimizer attached to every trainable layer by default.
///
/// Forward passes work; `backward` and `update` fail with
/// [`Error::NoOptimizer`] so that training a layer nobody configured is
/// reported instead of silently doing nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOptimizer;

impl NoOptimizer {
    pub fn new() -> Self {
        NoOptimizer
    }
}

impl Optimizer for NoOptimizer {
    fn name(&self) -> &'static str {
        "None"
    }

    fn initialize(&mut self, _parameters: &dyn Parameters, _input_size: usize) -> Result<()> {
        Ok(())
    }

    fn reset(&mut self) {}

    fn forward(&mut self, _input: ArrayView1<f32>) -> Result<()> {
        Ok(())
    }

    fn backward(
        &mut self,
        _parameters: &dyn Parameters,
        _forward_error: ArrayView1<f32>,
    ) -> Result<()> {
        Err(Error::NoOptimizer {
            operation: "backward",
        })
    }

    fn update(&mut self, _parameters: &mut dyn Parameters) -> Result<()> {
        Err(Error::NoOptimizer { operation: "update" })
    }

    fn learning_rate(&self) -> f32 {
        0.0
    }

    fn set_learning_rate(&mut self, _learning_rate: f32) {}
}
