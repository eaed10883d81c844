//! Network exit point.

use super::base::{ForwardTarget, LayerBase};
use super::Layer;
use crate::arena::Arena;
use crate::error::{Error, Result};
use crate::io::{InputArchive, OutputArchive};
use crate::shape::Shape;
use std::any::Any;
use tracing::debug;

pub const SIGNATURE: &str = "ffnn::Output";

/// Terminal layer holding the network output in its input buffer.
///
/// [`Output::read`] copies the output out. [`Output::set_target`] writes
/// `output - target` into the backward-error buffer, which is the forward
/// error of every producer.
#[derive(Debug, Clone)]
pub struct Output {
    base: LayerBase,
}

impl Output {
    /// An output sized by its producers at initialization.
    pub fn new() -> Self {
        Output {
            base: LayerBase::new(Shape::unresolved(), Shape::vector(0)),
        }
    }

    /// An output that requires exactly `size` values from its producers.
    pub fn with_size(size: usize) -> Self {
        Output {
            base: LayerBase::new(Shape::vector(size), Shape::vector(0)),
        }
    }

    fn size(&self) -> usize {
        self.base.input_shape().size().unwrap_or(0)
    }

    /// Copies the network output into `out`.
    ///
    /// # Panics
    ///
    /// Panics if `out` does not hold exactly one slot per output value.
    pub fn read(&self, arena: &Arena, out: &mut [f32]) -> Result<()> {
        assert_eq!(
            out.len(),
            self.size(),
            "output holds {} values, buffer has {}",
            self.size(),
            out.len()
        );
        let region = self
            .base
            .input_region()
            .ok_or_else(|| Error::NotInitialized(self.base.id().clone()))?;
        out.copy_from_slice(arena.slice(region)?);
        Ok(())
    }

    /// Sets the error fed back to the producers to `output - target`.
    ///
    /// # Panics
    ///
    /// Panics if `target` does not hold exactly one value per output.
    pub fn set_target(&self, arena: &mut Arena, target: &[f32]) -> Result<()> {
        assert_eq!(
            target.len(),
            self.size(),
            "output holds {} values, target has {}",
            self.size(),
            target.len()
        );
        let (input, error) = match (self.base.input_region(), self.base.backward_error_region()) {
            (Some(input), Some(error)) => (input, error),
            _ => return Err(Error::NotInitialized(self.base.id().clone())),
        };
        let ([output], error) = arena.split([input], error)?;
        for ((e, &y), &t) in error.iter_mut().zip(output).zip(target) {
            *e = y - t;
        }
        Ok(())
    }
}

impl Default for Output {
    fn default() -> Self {
        Output::new()
    }
}

impl Layer for Output {
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
        self.base.initialize(input_shape, arena)?;
        debug!(id = %self.base.id(), input = %self.base.input_shape(), "output initialized");
        Ok(())
    }

    fn connect_to_forward_layer(&mut self, _next: &ForwardTarget, _offset: usize) -> Result<usize> {
        Ok(0)
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
