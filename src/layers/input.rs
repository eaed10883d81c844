//! Network entry point.

use super::base::{ForwardTarget, LayerBase};
use super::Layer;
use crate::arena::{Arena, Region};
use crate::error::{Error, Result};
use crate::id::LayerId;
use crate::io::{InputArchive, OutputArchive};
use crate::shape::Shape;
use std::any::Any;
use tracing::debug;

pub const SIGNATURE: &str = "ffnn::Input";

/// Layer that injects external values into its consumers' input buffers.
///
/// An input layer has no producers and allocates nothing itself: its
/// output is the region of each consumer's input buffer it was connected
/// to, and [`Input::write`] copies into those regions.
#[derive(Debug, Clone)]
pub struct Input {
    base: LayerBase,
    targets: Vec<(LayerId, Region)>,
}

impl Input {
    /// An input of `size` values.
    pub fn new(size: usize) -> Self {
        Input::with_shape(Shape::vector(size))
    }

    /// An input carrying values of `shape`, e.g. an image for a convolution.
    pub fn with_shape(shape: Shape) -> Self {
        Input {
            base: LayerBase::new(Shape::vector(0), shape),
            targets: Vec::new(),
        }
    }

    /// Copies `values` into every connected consumer.
    ///
    /// # Errors
    ///
    /// Fails if no consumer has been connected yet.
    ///
    /// # Panics
    ///
    /// Panics if `values` does not hold exactly one value per output.
    pub fn write(&self, arena: &mut Arena, values: &[f32]) -> Result<()> {
        let size = self.base.output_shape().size().unwrap_or(0);
        assert_eq!(
            values.len(),
            size,
            "input expects {} values, got {}",
            size,
            values.len()
        );
        if self.targets.is_empty() {
            return Err(Error::NotConnected(self.base.id().clone()));
        }
        for (_, region) in &self.targets {
            arena.slice_mut(*region)?.copy_from_slice(values);
        }
        Ok(())
    }

    /// Region of the first consumer's input this layer writes to.
    pub fn output_region(&self) -> Option<Region> {
        self.targets.first().map(|(_, region)| *region)
    }
}

impl Default for Input {
    fn default() -> Self {
        Input::new(0)
    }
}

impl Layer for Input {
    fn base(&self) -> &LayerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut LayerBase {
        &mut self.base
    }

    fn signature(&self) -> &'static str {
        SIGNATURE
    }

    fn initialize(&mut self, input_shape: Shape, arena: &mut Arena) -> Result<()> {
        if !self.base.output_shape().valid() {
            return Err(Error::UnresolvedShape(self.base.id().clone()));
        }
        self.base.initialize(input_shape, arena)?;
        debug!(id = %self.base.id(), output = %self.base.output_shape(), "input initialized");
        Ok(())
    }

    fn connect_to_forward_layer(&mut self, next: &ForwardTarget, offset: usize) -> Result<usize> {
        let size = self.base.output_shape().size().unwrap_or(0);
        let region = next
            .input
            .sub(offset, size)
            .ok_or_else(|| Error::InputSizeMismatch {
                id: next.id.clone(),
                expected: next.input.len(),
                actual: offset + size,
            })?;
        match self.targets.iter_mut().find(|(id, _)| id == &next.id) {
            Some(target) => target.1 = region,
            None => self.targets.push((next.id.clone(), region)),
        }
        Ok(offset + size)
    }

    fn forward(&mut self, _arena: &mut Arena) -> Result<()> {
        Ok(())
    }

    fn backward(&mut self, _arena: &mut Arena) -> Result<()> {
        Ok(())
    }

    fn update(&mut self) -> Result<()> {
        Ok(())
    }

    fn save(&self, archive: &mut OutputArchive) -> Result<()> {
        archive.sign(SIGNATURE);
        self.base.save(archive)
    }

    fn load(&mut self, archive: &mut InputArchive) -> Result<()> {
        archive.check(SIGNATURE)?;
        self.base.load(archive)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
