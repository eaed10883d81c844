//! Sparsely connected layer implementation
//!
//! Like a fully connected layer, but only a random subset of the
//! input-output pairs carries a weight. Connections are sampled once at
//! setup with a fixed probability and can later be pruned.

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
use ndarray::{Array1, ArrayD, ArrayView1, ArrayViewD, ArrayViewMutD, Ix1};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::any::Any;
use tracing::debug;

pub const SIGNATURE: &str = "ffnn::SparselyConnected";

/// A stored weight position: output `row`, input `col`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub row: usize,
    pub col: usize,
}

/// Coordinate-list weights and dense biases.
///
/// `values[n]` is the weight at `connections[n]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseParameters {
    pub connections: Vec<Connection>,
    pub values: Array1<f32>,
    pub biases: Array1<f32>,
}

impl SparseParameters {
    fn empty() -> Self {
        SparseParameters {
            connections: Vec::new(),
            values: Array1::zeros(0),
            biases: Array1::zeros(0),
        }
    }
}

impl Parameters for SparseParameters {
    fn tensors(&self) -> Vec<ArrayViewD<'_, f32>> {
        vec![self.values.view().into_dyn(), self.biases.view().into_dyn()]
    }

    fn tensors_mut(&mut self) -> Vec<ArrayViewMutD<'_, f32>> {
        vec![
            self.values.view_mut().into_dyn(),
            self.biases.view_mut().into_dyn(),
        ]
    }

    /// Only stored connections receive a gradient.
    fn accumulate_gradient(
        &self,
        input: ArrayView1<f32>,
        forward_error: ArrayView1<f32>,
        gradient: &mut [ArrayD<f32>],
    ) -> Result<()> {
        let count = gradient.len();
        let [values, biases] = gradient else {
            return Err(Error::SizeMismatch {
                expected: 2,
                actual: count,
            });
        };
        let mut values = values.view_mut().into_dimensionality::<Ix1>()?;
        let mut biases = biases.view_mut().into_dimensionality::<Ix1>()?;
        for (g, c) in values.iter_mut().zip(&self.connections) {
            *g += forward_error[c.row] * input[c.col];
        }
        biases += &forward_error;
        Ok(())
    }
}

/// Sparsely connected layer.
///
/// # Example
///
/// ```
/// use ffnn::layers::{Layer, SparselyConnected};
///
/// let layer = SparselyConnected::new(8, 0.25).with_seed(3);
/// assert_eq!(layer.connection_probability(), 0.25);
/// assert_eq!(layer.output_shape().size(), Some(8));
/// ```
pub struct SparselyConnected {
    hidden: Hidden,
    params: SparseParameters,
    optimizer: Box<dyn Optimizer>,
    connection_probability: f32,
    weight_init: Initializer,
    bias_init: Initializer,
    seed: Option<u64>,
}

impl SparselyConnected {
    /// Creates a layer with `output_size` outputs where each input-output
    /// pair is connected with `connection_probability`.
    ///
    /// # Panics
    ///
    /// Panics if `connection_probability` is outside `(0.0, 1.0]`.
    pub fn new(output_size: usize, connection_probability: f32) -> Self {
        assert!(
            connection_probability > 0.0 && connection_probability <= 1.0,
            "connection_probability must be in range (0.0, 1.0]"
        );
        SparselyConnected {
            hidden: Hidden::new(Shape::unresolved(), Shape::vector(output_size)),
            params: SparseParameters::empty(),
            optimizer: Box::new(NoOptimizer),
            connection_probability,
            weight_init: Initializer::standard_normal(),
            bias_init: Initializer::standard_normal(),
            seed: None,
        }
    }

    pub fn with_initializers(mut self, weights: Initializer, biases: Initializer) -> Self {
        self.weight_init = weights;
        self.bias_init = biases;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_optimizer(mut self, optimizer: Box<dyn Optimizer>) -> Self {
        self.optimizer = optimizer;
        self
    }

    pub fn connection_probability(&self) -> f32 {
        self.connection_probability
    }

    pub fn connections(&self) -> &[Connection] {
        &self.params.connections
    }

    pub fn values(&self) -> ArrayView1<'_, f32> {
        self.params.values.view()
    }

    pub fn biases(&self) -> ArrayView1<'_, f32> {
        self.params.biases.view()
    }

    pub fn optimizer(&self) -> &dyn Optimizer {
        self.optimizer.as_ref()
    }

    /// Removes every connection whose weight magnitude is at most `epsilon`.
    ///
    /// Pending gradients are discarded and the optimizer is resized.
    ///
    /// # Returns
    ///
    /// The number of connections removed.
    pub fn prune(&mut self, epsilon: f32) -> Result<usize> {
        let before = self.params.connections.len();
        let (connections, values): (Vec<Connection>, Vec<f32>) = self
            .params
            .connections
            .iter()
            .zip(self.params.values.iter())
            .filter(|(_, w)| w.abs() > epsilon)
            .map(|(c, &w)| (*c, w))
            .unzip();
        self.params.connections = connections;
        self.params.values = Array1::from(values);

        if self.is_initialized() {
            let input_size = self.input_shape().size().unwrap_or(0);
            self.optimizer.initialize(&self.params, input_size)?;
        }
        let removed = before - self.params.connections.len();
        debug!(id = %self.id(), removed, kept = self.params.connections.len(), "connections pruned");
        Ok(removed)
    }

    fn sizes(&self) -> (usize, usize) {
        let base = self.hidden.base();
        (
            base.input_shape().size().unwrap_or(0),
            base.output_shape().size().unwrap_or(0),
        )
    }

    fn reset(&mut self) -> Result<()> {
        let (input_size, output_size) = self.sizes();
        let mut rng = seeded(self.seed);
        let mut connections = Vec::new();
        for row in 0..output_size {
            for col in 0..input_size {
                if rng.gen::<f32>() < self.connection_probability {
                    connections.push(Connection { row, col });
                }
            }
        }
        let mut values = Array1::zeros(connections.len());
        let mut biases = Array1::zeros(output_size);
        self.weight_init
            .fill(values.iter_mut(), input_size, output_size, &mut rng)?;
        self.bias_init
            .fill(biases.iter_mut(), input_size, output_size, &mut rng)?;
        self.params = SparseParameters {
            connections,
            values,
            biases,
        };
        Ok(())
    }

    fn setup(&mut self) -> Result<()> {
        let (input_size, output_size) = self.sizes();
        if self.hidden.base().setup_required() {
            self.reset()?;
        } else {
            let in_range = self
                .params
                .connections
                .iter()
                .all(|c| c.row < output_size && c.col < input_size);
            if !in_range
                || self.params.values.len() != self.params.connections.len()
                || self.params.biases.len() != output_size
            {
                return Err(Error::invalid(format!(
                    "loaded sparse weights do not fit {} -> {}",
                    input_size, output_size
                )));
            }
        }
        self.optimizer.initialize(&self.params, input_size)
    }
}

impl Default for SparselyConnected {
    fn default() -> Self {
        SparselyConnected::new(0, 1.0)
    }
}

impl Layer for SparselyConnected {
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
            connections = self.params.connections.len(),
            optimizer = self.optimizer.name(),
            "sparsely connected initialized"
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
            output.assign(&params.biases);
            for (c, &w) in params.connections.iter().zip(&params.values) {
                output[c.row] += w * input[c.col];
            }
            Ok(())
        })
    }

    fn backward(&mut self, arena: &mut Arena) -> Result<()> {
        let params = &self.params;
        let optimizer = &mut self.optimizer;
        self.hidden
            .backward_with(arena, |_, forward_error, mut backward_error| {
                backward_error.fill(0.0);
                for (c, &w) in params.connections.iter().zip(&params.values) {
                    backward_error[c.col] += w * forward_error[c.row];
                }
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
        archive.write("connection_probability", &self.connection_probability)?;
        archive.write("connections", &self.params.connections)?;
        archive.write("values", &self.params.values)?;
        archive.write("biases", &self.params.biases)
    }

    fn load(&mut self, archive: &mut InputArchive) -> Result<()> {
        archive.check(SIGNATURE)?;
        self.hidden.load(archive)?;
        self.connection_probability = archive.read("connection_probability")?;
        self.params.connections = archive.read("connections")?;
        self.params.values = archive.read("values")?;
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
