//! State shared by every layer: identity, shapes, lifecycle flags,
//! the producer list and the input/backward-error buffers.

use crate::arena::{Arena, Region};
use crate::error::{Error, Result};
use crate::id::LayerId;
use crate::io::{InputArchive, OutputArchive};
use crate::shape::Shape;
use serde::{Deserialize, Serialize};

/// Signature written by [`LayerBase::save`].
pub const SIGNATURE: &str = "ffnn::Layer";

/// Edge from a producer, recorded on the consumer.
///
/// A virtual connection is a placeholder restored by `load`: it names the
/// producer but has not been confirmed by a `connect` call yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub id: LayerId,
    pub resolved: bool,
}

/// The buffers a consumer exposes to its producers.
#[derive(Debug, Clone)]
pub struct ForwardTarget {
    pub id: LayerId,
    pub input: Region,
    pub backward_error: Region,
}

/// Common layer state.
#[derive(Debug, Clone)]
pub struct LayerBase {
    id: LayerId,
    input_shape: Shape,
    output_shape: Shape,
    initialized: bool,
    setup_required: bool,
    input: Option<Region>,
    backward_error: Option<Region>,
    prev: Vec<Connection>,
}

impl LayerBase {
    /// A fresh, uninitialized layer with a newly generated id.
    ///
    /// Pass [`Shape::unresolved`] for either shape to have it resolved during
    /// initialization.
    pub fn new(input_shape: Shape, output_shape: Shape) -> Self {
        LayerBase {
            id: LayerId::generate(),
            input_shape,
            output_shape,
            initialized: false,
            setup_required: true,
            input: None,
            backward_error: None,
            prev: Vec::new(),
        }
    }

    pub fn id(&self) -> &LayerId {
        &self.id
    }

    pub fn input_shape(&self) -> Shape {
        self.input_shape
    }

    pub fn output_shape(&self) -> Shape {
        self.output_shape
    }

    pub fn set_output_shape(&mut self, shape: Shape) {
        self.output_shape = shape;
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// `false` once the layer was restored by `load`.
    pub fn setup_required(&self) -> bool {
        self.setup_required
    }

    pub fn input_region(&self) -> Option<Region> {
        self.input
    }

    pub fn backward_error_region(&self) -> Option<Region> {
        self.backward_error
    }

    /// Producers in connection order.
    pub fn prev(&self) -> &[Connection] {
        &self.prev
    }

    pub fn has_producer(&self, id: &LayerId) -> bool {
        self.prev.iter().any(|c| &c.id == id)
    }

    /// Records a confirmed edge from `id`.
    pub fn add_producer(&mut self, id: LayerId) {
        self.prev.push(Connection { id, resolved: true });
    }

    /// Records a placeholder edge from `id` to be confirmed by `connect`.
    pub fn declare_virtual(&mut self, id: LayerId) {
        self.prev.push(Connection {
            id,
            resolved: false,
        });
    }

    /// Confirms the placeholder edge from `id`.
    ///
    /// Returns `false` when there is no placeholder for `id`.
    pub fn resolve_virtual(&mut self, id: &LayerId) -> bool {
        match self
            .prev
            .iter_mut()
            .find(|c| &c.id == id && !c.resolved)
        {
            Some(connection) => {
                connection.resolved = true;
                true
            }
            None => false,
        }
    }

    /// First placeholder still waiting for `connect`.
    pub fn first_unresolved(&self) -> Option<&LayerId> {
        self.prev.iter().find(|c| !c.resolved).map(|c| &c.id)
    }

    /// Resolves the input shape and allocates the input and backward-error
    /// buffers.
    ///
    /// An unresolved input shape takes `resolved`; a fixed one is kept and
    /// must have been checked against the producers by the caller.
    pub fn initialize(&mut self, resolved: Shape, arena: &mut Arena) -> Result<()> {
        if self.initialized {
            return Err(Error::AlreadyInitialized(self.id.clone()));
        }
        if !self.input_shape.is_resolved() {
            self.input_shape = resolved;
        }
        let size = self
            .input_shape
            .size()
            .ok_or_else(|| Error::UnresolvedShape(self.id.clone()))?;

        self.input = Some(arena.allocate(size));
        self.backward_error = Some(arena.allocate(size));
        self.initialized = true;
        Ok(())
    }

    /// Marks the layer uninitialized after a failed connection phase.
    pub(crate) fn abort_initialization(&mut self) {
        self.initialized = false;
        self.input = None;
        self.backward_error = None;
    }

    /// The consumer-side view handed to producers while connecting.
    pub fn forward_target(&self) -> Result<ForwardTarget> {
        match (self.input, self.backward_error) {
            (Some(input), Some(backward_error)) if self.initialized => Ok(ForwardTarget {
                id: self.id.clone(),
                input,
                backward_error,
            }),
            _ => Err(Error::NotInitialized(self.id.clone())),
        }
    }

    pub(crate) fn require_initialized(&self) -> Result<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(Error::NotInitialized(self.id.clone()))
        }
    }

    pub fn save(&self, archive: &mut OutputArchive) -> Result<()> {
        archive.sign(SIGNATURE);
        archive.write("id", &self.id)?;
        archive.write("input_shape", &self.input_shape)?;
        archive.write("output_shape", &self.output_shape)?;
        let producers: Vec<&LayerId> = self.prev.iter().map(|c| &c.id).collect();
        archive.write("prev", &producers)
    }

    /// Restores identity, shapes and producers.
    ///
    /// Producers come back as virtual connections and the layer is marked as
    /// not requiring setup, so its parameters survive initialization.
    pub fn load(&mut self, archive: &mut InputArchive) -> Result<()> {
        if self.initialized {
            return Err(Error::AlreadyInitialized(self.id.clone()));
        }
        archive.check(SIGNATURE)?;
        self.id = archive.read("id")?;
        self.input_shape = archive.read("input_shape")?;
        self.output_shape = archive.read("output_shape")?;
        let producers: Vec<LayerId> = archive.read("prev")?;

        self.prev.clear();
        for id in producers {
            self.declare_virtual(id);
        }
        self.setup_required = false;
        Ok(())
    }
}
