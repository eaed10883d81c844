//! Layer registry and propagation driver.
//!
//! A [`Graph`] owns its layers and the [`Arena`] holding every propagation
//! buffer. Layers are addressed by [`LayerId`]; edges are recorded on the
//! consumer as an ordered producer list, and producers are mapped onto the
//! consumer's buffers when the consumer is initialized.

use crate::arena::Arena;
use crate::error::{Error, Result};
use crate::id::LayerId;
use crate::io::{self, InputArchive};
use crate::layers::{
    activation, convolution, dropout, fully_connected, input, output, sparsely_connected,
    Activation, Convolution, Dropout, FullyConnected, Input, Layer, Output, SparselyConnected,
};
use crate::optimizers::Optimizer;
use crate::shape::Shape;
use std::collections::HashMap;
use std::io::{BufRead, Write};
use tracing::{debug, error, warn};

/// A set of connected layers sharing one buffer arena.
///
/// Layers are kept in insertion order. [`Graph::initialize_all`] and
/// [`Graph::forward_all`] walk that order, [`Graph::backward_all`] walks it
/// in reverse, so adding layers producers-first is enough to drive a
/// feed-forward network.
#[derive(Default)]
pub struct Graph {
    layers: Vec<Box<dyn Layer>>,
    index: HashMap<LayerId, usize>,
    arena: Arena,
}

impl Graph {
    pub fn new() -> Self {
        Graph::default()
    }

    /// Registers `layer` and returns its id.
    pub fn add<L: Layer>(&mut self, layer: L) -> Result<LayerId> {
        self.add_boxed(Box::new(layer))
    }

    pub fn add_boxed(&mut self, layer: Box<dyn Layer>) -> Result<LayerId> {
        let id = layer.id().clone();
        if self.index.contains_key(&id) {
            return Err(Error::DuplicateId(id));
        }
        debug!(id = %id, signature = layer.signature(), "layer registered");
        self.index.insert(id.clone(), self.layers.len());
        self.layers.push(layer);
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn contains(&self, id: &LayerId) -> bool {
        self.index.contains_key(id)
    }

    /// Layer ids in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = &LayerId> {
        self.layers.iter().map(|layer| layer.id())
    }

    pub fn get(&self, id: &LayerId) -> Option<&dyn Layer> {
        self.index.get(id).map(|&i| self.layers[i].as_ref())
    }

    pub fn get_mut(&mut self, id: &LayerId) -> Option<&mut dyn Layer> {
        match self.index.get(id) {
            Some(&i) => Some(self.layers[i].as_mut()),
            None => None,
        }
    }

    /// The layer `id` as its concrete type.
    pub fn layer<T: Layer>(&self, id: &LayerId) -> Option<&T> {
        self.get(id)?.as_any().downcast_ref()
    }

    pub fn layer_mut<T: Layer>(&mut self, id: &LayerId) -> Option<&mut T> {
        self.get_mut(id)?.as_any_mut().downcast_mut()
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    pub fn arena_mut(&mut self) -> &mut Arena {
        &mut self.arena
    }

    fn position(&self, id: &LayerId) -> Result<usize> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| Error::UnknownLayer(id.clone()))
    }

    /// Connects `from` as the next producer of `to`.
    ///
    /// When `to` already holds a virtual connection from `from` (both layers
    /// loaded from an archive), the placeholder is confirmed instead.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownLayer`] if either id is not registered
    /// - [`Error::SelfConnection`] if `from == to`
    /// - [`Error::UnexpectedVirtualConnection`] if the edge already exists
    ///   and either layer was not loaded
    /// - [`Error::AlreadyInitialized`] if either layer is initialized
    pub fn connect(&mut self, from: &LayerId, to: &LayerId) -> Result<()> {
        let producer = self.position(from)?;
        let consumer = self.position(to)?;
        if producer == consumer {
            return Err(Error::SelfConnection(from.clone()));
        }

        let producer_loaded = !self.layers[producer].setup_required();
        let producer_initialized = self.layers[producer].is_initialized();
        let layer = self.layers[consumer].as_mut();

        if layer.base().has_producer(from) {
            if producer_loaded && !layer.setup_required() {
                layer.base_mut().resolve_virtual(from);
                debug!(from = %from, to = %to, "virtual connection resolved");
                return Ok(());
            }
            return Err(Error::UnexpectedVirtualConnection {
                from: from.clone(),
                to: to.clone(),
            });
        }

        if producer_initialized {
            return Err(Error::AlreadyInitialized(from.clone()));
        }
        if layer.is_initialized() {
            return Err(Error::AlreadyInitialized(to.clone()));
        }
        layer.base_mut().add_producer(from.clone());
        debug!(from = %from, to = %to, "layers connected");
        Ok(())
    }

    /// Confirms every virtual connection whose producer is registered.
    ///
    /// # Errors
    ///
    /// Fails on the first placeholder that names an unregistered layer.
    pub fn resolve_connections(&mut self) -> Result<()> {
        let pending: Vec<(LayerId, LayerId)> = self
            .layers
            .iter()
            .flat_map(|layer| {
                layer
                    .base()
                    .prev()
                    .iter()
                    .filter(|c| !c.resolved)
                    .map(move |c| (c.id.clone(), layer.id().clone()))
            })
            .collect();

        for (from, to) in pending {
            if !self.contains(&from) {
                return Err(Error::UnresolvedConnection { from, to });
            }
            self.connect(&from, &to)?;
        }
        Ok(())
    }

    /// Input shape of `id` as determined by its producers.
    ///
    /// A single producer passes its output shape through; several producers
    /// are concatenated into a vector; no producer yields an empty vector.
    pub fn evaluate_input_shape(&self, id: &LayerId) -> Result<Shape> {
        let layer = self.layers[self.position(id)?].as_ref();
        if let Some(from) = layer.base().first_unresolved() {
            return Err(Error::UnresolvedConnection {
                from: from.clone(),
                to: id.clone(),
            });
        }

        let mut shapes = Vec::with_capacity(layer.base().prev().len());
        for connection in layer.base().prev() {
            let producer = self.layers[self.position(&connection.id)?].as_ref();
            let shape = producer.output_shape();
            if !shape.is_resolved() {
                return Err(Error::UnresolvedShape(connection.id.clone()));
            }
            shapes.push(shape);
        }

        Ok(match shapes.as_slice() {
            [single] => *single,
            _ => Shape::vector(shapes.iter().filter_map(Shape::size).sum()),
        })
    }

    /// Total number of values the producers of `id` supply.
    pub fn evaluate_input_size(&self, id: &LayerId) -> Result<usize> {
        let shape = self.evaluate_input_shape(id)?;
        shape
            .size()
            .ok_or_else(|| Error::UnresolvedShape(id.clone()))
    }

    /// Initializes `id` and maps every producer onto its buffers.
    ///
    /// Producers must be initialized first. On failure the layer is left
    /// uninitialized.
    pub fn initialize(&mut self, id: &LayerId) -> Result<()> {
        let position = self.position(id)?;
        if self.layers[position].is_initialized() {
            warn!(id = %id, "layer is already initialized");
            return Err(Error::AlreadyInitialized(id.clone()));
        }

        let resolved = self.evaluate_input_shape(id)?;
        let supplied = self.evaluate_input_size(id)?;
        if let Some(expected) = self.layers[position].input_shape().size() {
            if expected != supplied {
                error!(id = %id, expected, supplied, "input size mismatch");
                return Err(Error::InputSizeMismatch {
                    id: id.clone(),
                    expected,
                    actual: supplied,
                });
            }
        }

        self.layers[position].initialize(resolved, &mut self.arena)?;
        match self.connect_producers(position) {
            Ok(()) => {
                let layer = self.layers[position].as_ref();
                debug!(
                    id = %id,
                    signature = layer.signature(),
                    input = %layer.input_shape(),
                    output = %layer.output_shape(),
                    "layer initialized"
                );
                Ok(())
            }
            Err(e) => {
                error!(id = %id, error = %e, "connecting producers failed");
                self.layers[position].base_mut().abort_initialization();
                Err(e)
            }
        }
    }

    fn connect_producers(&mut self, position: usize) -> Result<()> {
        let target = self.layers[position].base().forward_target()?;
        let producers: Vec<LayerId> = self.layers[position]
            .base()
            .prev()
            .iter()
            .map(|c| c.id.clone())
            .collect();

        let mut offset = 0;
        for producer in &producers {
            let index = self.position(producer)?;
            offset = self.layers[index].connect_to_forward_layer(&target, offset)?;
        }
        if offset != target.input.len() {
            return Err(Error::InputSizeMismatch {
                id: target.id,
                expected: target.input.len(),
                actual: offset,
            });
        }
        Ok(())
    }

    /// Initializes every uninitialized layer in insertion order.
    pub fn initialize_all(&mut self) -> Result<()> {
        let pending: Vec<LayerId> = self
            .layers
            .iter()
            .filter(|layer| !layer.is_initialized())
            .map(|layer| layer.id().clone())
            .collect();
        for id in &pending {
            self.initialize(id)?;
        }
        Ok(())
    }

    pub fn forward(&mut self, id: &LayerId) -> Result<()> {
        let position = self.position(id)?;
        self.layers[position].forward(&mut self.arena)
    }

    pub fn backward(&mut self, id: &LayerId) -> Result<()> {
        let position = self.position(id)?;
        self.layers[position].backward(&mut self.arena)
    }

    pub fn update(&mut self, id: &LayerId) -> Result<()> {
        let position = self.position(id)?;
        self.layers[position].update()
    }

    /// Runs forward on every layer in insertion order.
    pub fn forward_all(&mut self) -> Result<()> {
        for layer in self.layers.iter_mut() {
            layer.forward(&mut self.arena)?;
        }
        Ok(())
    }

    /// Runs backward on every layer in reverse insertion order.
    pub fn backward_all(&mut self) -> Result<()> {
        for layer in self.layers.iter_mut().rev() {
            layer.backward(&mut self.arena)?;
        }
        Ok(())
    }

    pub fn update_all(&mut self) -> Result<()> {
        for layer in self.layers.iter_mut() {
            layer.update()?;
        }
        Ok(())
    }

    /// Attaches `optimizer` to the parameterized layer `id`.
    pub fn set_optimizer(&mut self, id: &LayerId, optimizer: Box<dyn Optimizer>) -> Result<()> {
        let position = self.position(id)?;
        self.layers[position].set_optimizer(optimizer)
    }

    /// Writes `values` into the consumers of the input layer `id`.
    pub fn set_input(&mut self, id: &LayerId, values: &[f32]) -> Result<()> {
        let position = self.position(id)?;
        let input = self.layers[position]
            .as_any()
            .downcast_ref::<Input>()
            .ok_or_else(|| Error::invalid(format!("layer <{}> is not an input", id)))?;
        input.write(&mut self.arena, values)
    }

    /// Copies the values received by the output layer `id` into `out`.
    pub fn read_output(&self, id: &LayerId, out: &mut [f32]) -> Result<()> {
        self.output_layer(id)?.read(&self.arena, out)
    }

    /// Values received by the output layer `id`.
    pub fn output(&self, id: &LayerId) -> Result<Vec<f32>> {
        let layer = self.output_layer(id)?;
        let mut out = vec![0.0; layer.input_shape().size().unwrap_or(0)];
        layer.read(&self.arena, &mut out)?;
        Ok(out)
    }

    /// Sets the error of the output layer `id` to `output - target`.
    pub fn set_target(&mut self, id: &LayerId, target: &[f32]) -> Result<()> {
        let position = self.position(id)?;
        let layer = self.layers[position]
            .as_any()
            .downcast_ref::<Output>()
            .ok_or_else(|| Error::invalid(format!("layer <{}> is not an output", id)))?;
        layer.set_target(&mut self.arena, target)
    }

    fn output_layer(&self, id: &LayerId) -> Result<&Output> {
        self.layer::<Output>(id).ok_or_else(|| {
            if self.contains(id) {
                Error::invalid(format!("layer <{}> is not an output", id))
            } else {
                Error::UnknownLayer(id.clone())
            }
        })
    }

    /// Saves every layer, one line each, in insertion order.
    pub fn save<W: Write>(&self, writer: &mut W) -> Result<()> {
        for layer in &self.layers {
            io::save(writer, layer.as_ref())?;
        }
        Ok(())
    }

    /// Rebuilds a graph written by [`Graph::save`].
    ///
    /// Layers come back uninitialized, without optimizers, and with their
    /// connections resolved. Attach optimizers, then call
    /// [`Graph::initialize_all`].
    pub fn load<R: BufRead>(reader: &mut R) -> Result<Graph> {
        let mut graph = Graph::new();
        while let Some(archive) = InputArchive::try_read_from(reader)? {
            let signature = archive
                .peek_signature()
                .ok_or(Error::TruncatedArchive("signature"))?;
            let mut layer = layer_for_signature(signature).ok_or_else(|| {
                Error::invalid(format!("unknown layer signature `{}`", signature))
            })?;
            io::restore(archive, layer.as_mut())?;
            graph.add_boxed(layer)?;
        }
        graph.resolve_connections()?;
        Ok(graph)
    }
}

fn layer_for_signature(signature: &str) -> Option<Box<dyn Layer>> {
    let layer: Box<dyn Layer> = match signature {
        input::SIGNATURE => Box::new(Input::default()),
        output::SIGNATURE => Box::new(Output::default()),
        fully_connected::SIGNATURE => Box::new(FullyConnected::default()),
        convolution::SIGNATURE => Box::new(Convolution::default()),
        activation::SIGNATURE => Box::new(Activation::default()),
        dropout::SIGNATURE => Box::new(Dropout::default()),
        sparsely_connected::SIGNATURE => Box::new(SparselyConnected::default()),
        _ => return None,
    };
    Some(layer)
}
