//! Fully connected layer implementation
//!
//! This module provides a FullyConnected layer (also known as Dense or
//! Linear) that performs the transformation `output = W · input + b`.

use super::base::{ForwardTarget, LayerBase};
use super::hidden::Hidden;
use super::Layer;
use crate::arena::Arena;
use crate::error::{Error, Result};
use crate::io::{InputArchive, OutputArchive};
use crate::optimizers::{NoOptimizer, Optimizer, Parameters};
use crate::shape::Shape;
use crate::utils::rng::seeded;
use crate::utils::Initializer;
use ndarray::linalg::{general_mat_mul, general_mat_vec_mul};
use ndarray::{
    Array1, Array2, ArrayD, ArrayView1, ArrayView2, ArrayViewD, ArrayViewMut1, ArrayViewMut2,
    ArrayViewMutD, Axis, Ix1, Ix2,
};
use std::any::Any;
use tracing::debug;

pub const SIGNATURE: &str = "ffnn::FullyConnected";

/// Weights and biases of a fully connected layer.
///
/// `weights` is `output_size × input_size`, so row `i` holds the weights of
/// output `i`.
#[derive(Debug, Clone, PartialEq)]
pub struct FullyConnectedParameters {
    pub weights: Array2<f32>,
    pub biases: Array1<f32>,
}

impl Parameters for FullyConnectedParameters {
    fn tensors(&self) -> Vec<ArrayViewD<'_, f32>> {
        vec![self.weights.view().into_dyn(), self.biases.view().into_dyn()]
    }

    fn tensors_mut(&mut self) -> Vec<ArrayViewMutD<'_, f32>> {
        vec![
            self.weights.view_mut().into_dyn(),
            self.biases.view_mut().into_dyn(),
        ]
    }

    /// `∂W += e · xᵀ`, `∂b += e`.
    fn accumulate_gradient(
        &self,
        input: ArrayView1<f32>,
        forward_error: ArrayView1<f32>,
        gradient: &mut [ArrayD<f32>],
    ) -> Result<()> {
        let count = gradient.len();
        let [weights, biases] = gradient else {
            return Err(Error::SizeMismatch {
                expected: 2,
                actual: count,
            });
        };
        let mut weights = weights.view_mut().into_dimensionality::<Ix2>()?;
        let mut biases = biases.view_mut().into_dimensionality::<Ix1>()?;

        let error = forward_error.insert_axis(Axis(1));
        let input = input.insert_axis(Axis(0));
        general_mat_mul(1.0, &error, &input, 1.0, &mut weights);
        biases += &forward_error;
        Ok(())
    }
}

/// Fully connected layer with weights and biases.
///
/// # Example
///
/// ```
/// use ffnn::layers::{FullyConnected, Layer};
/// use ffnn::optimizers::GradientDescent;
/// use ffnn::utils::Initializer;
///
/// let layer = FullyConnected::new(16)
///     .with_initializers(Initializer::Xavier, Initializer::Zeros)
///     .with_seed(42)
///     .with_optimizer(Box::new(GradientDescent::new(0.01)));
/// assert_eq!(layer.output_shape().size(), Some(16));
/// assert!(!layer.is_initialized());
/// ```
pub struct FullyConnected {
    hidden: Hidden,
    params: FullyConnectedParameters,
    optimizer: Box<dyn Optimizer>,
    weight_init: Initializer,
    bias_init: Initializer,
    seed: Option<u64>,
}

impl FullyConnected {
    /// Creates a layer with `output_size` outputs.
    ///
    /// The input size is taken from the producers at initialization.
    /// Weights and biases start at zero and no optimizer is attached.
    pub fn new(output_size: usize) -> Self {
        FullyConnected {
            hidden: Hidden::new(Shape::unresolved(), Shape::vector(output_size)),
            params: FullyConnectedParameters {
                weights: Array2::zeros((0, 0)),
                biases: Array1::zeros(0),
            },
            optimizer: Box::new(NoOptimizer),
            weight_init: Initializer::Zeros,
            bias_init: Initializer::Zeros,
            seed: None,
        }
    }

    /// Creates a layer that requires exactly `input_size` values from its
    /// producers.
    pub fn with_input(input_size: usize, output_size: usize) -> Self {
        let mut layer = FullyConnected::new(output_size);
        layer.hidden = Hidden::new(Shape::vector(input_size), Shape::vector(output_size));
        layer
    }

    /// Distributions the weights and biases are drawn from at setup.
    pub fn with_initializers(mut self, weights: Initializer, biases: Initializer) -> Self {
        self.weight_init = weights;
        self.bias_init = biases;
        self
    }

    /// Seed for the parameter initializers.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Attaches `optimizer` to a layer under construction.
    pub fn with_optimizer(mut self, optimizer: Box<dyn Optimizer>) -> Self {
        self.optimizer = optimizer;
        self
    }

    pub fn weights(&self) -> ArrayView2<'_, f32> {
        self.params.weights.view()
    }

    pub fn biases(&self) -> ArrayView1<'_, f32> {
        self.params.biases.view()
    }

    pub fn weights_mut(&mut self) -> ArrayViewMut2<'_, f32> {
        self.params.weights.view_mut()
    }

    pub fn biases_mut(&mut self) -> ArrayViewMut1<'_, f32> {
        self.params.biases.view_mut()
    }

    pub fn optimizer(&self) -> &dyn Optimizer {
        self.optimizer.as_ref()
    }

    pub fn hidden(&self) -> &Hidden {
        &self.hidden
    }

    fn sizes(&self) -> (usize, usize) {
        let base = self.hidden.base();
        (
            base.input_shape().size().unwrap_or(0),
            base.output_shape().size().unwrap_or(0),
        )
    }

    /// Draws fresh parameters for the resolved sizes.
    fn reset(&mut self) -> Result<()> {
        let (input_size, output_size) = self.sizes();
        let mut rng = seeded(self.seed);
        let mut weights = Array2::zeros((output_size, input_size));
        let mut biases = Array1::zeros(output_size);
        self.weight_init
            .fill(weights.iter_mut(), input_size, output_size, &mut rng)?;
        self.bias_init
            .fill(biases.iter_mut(), input_size, output_size, &mut rng)?;
        self.params = FullyConnectedParameters { weights, biases };
        Ok(())
    }

    fn setup(&mut self) -> Result<()> {
        let (input_size, output_size) = self.sizes();
        if self.hidden.base().setup_required() {
            self.reset()?;
        } else if self.params.weights.dim() != (output_size, input_size)
            || self.params.biases.len() != output_size
        {
            return Err(Error::SizeMismatch {
                expected: output_size * input_size,
                actual: self.params.weights.len(),
            });
        }
        self.optimizer.initialize(&self.params, input_size)
    }
}

impl Default for FullyConnected {
    fn default() -> Self {
        FullyConnected::new(0)
    }
}

impl Layer for FullyConnected {
    fn base(&self) -> &LayerBase {
        self.hidden.base()
    }

    fn base_mut(&mut self) -> &mut LayerBase {
        self.hidden.base_mut()
    }

    fn signature(&self) -> &'static str {
        SIGNATURE
    }

    fn initialize(&mut self, input_shape: Shape, arena: &mut Arena) -> Result<()> {
        self.hidden.initialize(input_shape, arena)?;
        if let Err(err) = self.setup() {
            self.hidden.base_mut().abort_initialization();
            return Err(err);
        }
        debug!(
            id = %self.id(),
            input = %self.input_shape(),
            output = %self.output_shape(),
            optimizer = self.optimizer.name(),
            "fully connected initialized"
        );
        Ok(())
    }

    fn connect_to_forward_layer(&mut self, next: &ForwardTarget, offset: usize) -> Result<usize> {
        self.hidden.connect_to_forward_layer(next, offset)
    }

    fn forward(&mut self, arena: &mut Arena) -> Result<()> {
        let params = &self.params;
        let optimizer = &mut self.optimizer;
        self.hidden.forward_with(arena, |input, mut output| {
            optimizer.forward(input.view())?;
            general_mat_vec_mul(1.0, &params.weights, &input, 0.0, &mut output);
            output += &params.biases;
            Ok(())
        })
    }

    fn backward(&mut self, arena: &mut Arena) -> Result<()> {
        let params = &self.params;
        let optimizer = &mut self.optimizer;
        self.hidden
            .backward_with(arena, |_, forward_error, mut backward_error| {
                general_mat_vec_mul(
                    1.0,
                    &params.weights.t(),
                    &forward_error,
                    0.0,
                    &mut backward_error,
                );
                optimizer.backward(params, forward_error)
            })
    }

    fn update(&mut self) -> Result<()> {
        self.hidden.base().require_initialized()?;
        self.optimizer.update(&mut self.params)
    }

    fn set_optimizer(&mut self, optimizer: Box<dyn Optimizer>) -> Result<()> {
        if self.is_initialized() {
            return Err(Error::AlreadyInitialized(self.id().clone()));
        }
        self.optimizer = optimizer;
        Ok(())
    }

    fn save(&self, archive: &mut OutputArchive) -> Result<()> {
        archive.sign(SIGNATURE);
        self.hidden.save(archive)?;
        archive.write("weights", &self.params.weights)?;
        archive.write("biases", &self.params.biases)
    }

    fn load(&mut self, archive: &mut InputArchive) -> Result<()> {
        archive.check(SIGNATURE)?;
        self.hidden.load(archive)?;
        self.params.weights = archive.read("weights")?;
        self.params.biases = archive.read("biases")?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn parameter_count(&self) -> usize {
        self.params.count()
    }
}
