//! Layer trait definition for graph layers
//!
//! This module defines the core Layer trait that all layer types implement.
//! The trait provides a common interface for initialization, the
//! producer/consumer connection protocol, forward propagation, backward
//! propagation, parameter updates and persistence.

use super::base::{ForwardTarget, LayerBase};
use crate::arena::Arena;
use crate::error::{Error, Result};
use crate::id::LayerId;
use crate::io::{InputArchive, OutputArchive};
use crate::optimizers::Optimizer;
use crate::shape::Shape;
use std::any::Any;

/// Core trait for graph layers.
///
/// Layers do not own their propagation buffers: every buffer is a region of
/// the graph's [`Arena`], passed in for each operation. Layers are driven by
/// a [`Graph`](crate::graph::Graph), which owns both the layers and the arena.
///
/// # Lifecycle
///
/// 1. Construct the layer (or `load` it).
/// 2. Add it to a graph and `connect` it to its producers.
/// 3. `initialize`, producers before consumers.
/// 4. Per training step: `forward`, `backward`, `update`.
///
/// # Example
///
/// ```
/// use ffnn::graph::Graph;
/// use ffnn::layers::{FullyConnected, Input, Output};
///
/// let mut graph = Graph::new();
/// let input = graph.add(Input::new(4)).unwrap();
/// let hidden = graph.add(FullyConnected::new(2)).unwrap();
/// let output = graph.add(Output::new()).unwrap();
/// graph.connect(&input, &hidden).unwrap();
/// graph.connect(&hidden, &output).unwrap();
/// graph.initialize_all().unwrap();
///
/// graph.set_input(&input, &[1.0, 2.0, 3.0, 4.0]).unwrap();
/// graph.forward_all().unwrap();
/// assert_eq!(graph.output(&output).unwrap(), vec![0.0, 0.0]);
/// ```
pub trait Layer: Any {
    /// Shared layer state.
    fn base(&self) -> &LayerBase;

    /// Mutable shared layer state.
    fn base_mut(&mut self) -> &mut LayerBase;

    /// Type signature written first by [`Layer::save`].
    fn signature(&self) -> &'static str;

    /// Initializes the layer once its producers' output shapes are known.
    ///
    /// `input_shape` is the shape resolved from the producers. The layer
    /// allocates its input and backward-error buffers from `arena`, resolves
    /// its output shape and, if setup is required, resets its parameters.
    ///
    /// # Errors
    ///
    /// Fails if the layer is already initialized or if its shapes cannot be
    /// resolved. Connecting producers into the allocated buffers is done
    /// afterwards by the graph.
    fn initialize(&mut self, input_shape: Shape, arena: &mut Arena) -> Result<()>;

    /// Maps this layer's output onto `next`'s buffers starting at `offset`.
    ///
    /// # Returns
    ///
    /// The offset just past this layer's contribution, `offset + output size`.
    /// Terminal layers contribute nothing and return 0.
    fn connect_to_forward_layer(&mut self, next: &ForwardTarget, offset: usize) -> Result<usize>;

    /// Computes the output from the input buffer.
    fn forward(&mut self, arena: &mut Arena) -> Result<()>;

    /// Computes the backward error from the forward error and accumulates
    /// parameter gradients.
    fn backward(&mut self, arena: &mut Arena) -> Result<()>;

    /// Applies accumulated gradients to the parameters.
    fn update(&mut self) -> Result<()>;

    /// Writes the signature, the shared state and the layer's own fields.
    fn save(&self, archive: &mut OutputArchive) -> Result<()>;

    /// Reads back what [`Layer::save`] wrote, checking every signature.
    fn load(&mut self, archive: &mut InputArchive) -> Result<()>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Replaces the optimizer of a trainable layer.
    ///
    /// # Errors
    ///
    /// Fails once the layer is initialized, and always for layers without
    /// trainable parameters.
    fn set_optimizer(&mut self, optimizer: Box<dyn Optimizer>) -> Result<()> {
        Err(Error::invalid(format!(
            "`{}` has no parameters to attach optimizer `{}` to",
            self.signature(),
            optimizer.name()
        )))
    }

    /// Number of trainable parameters.
    fn parameter_count(&self) -> usize {
        0
    }

    fn id(&self) -> &LayerId {
        self.base().id()
    }

    fn input_shape(&self) -> Shape {
        self.base().input_shape()
    }

    fn output_shape(&self) -> Shape {
        self.base().output_shape()
    }

    fn is_initialized(&self) -> bool {
        self.base().is_initialized()
    }

    fn setup_required(&self) -> bool {
        self.base().setup_required()
    }
}
