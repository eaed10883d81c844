//! Buffer mapping for layers that have both an input and an output.
//!
//! A hidden layer owns no output storage. When a consumer initializes, the
//! hidden layer's output and forward-error buffers are mapped onto the slice
//! of the consumer's input and backward-error buffers starting at the
//! producer's offset. Forward therefore writes straight into the consumer's
//! input, and backward reads the consumer's backward error in place.
//!
//! With several consumers the first one connected receives the aliased
//! output; the others get a copy after each forward, and their forward errors
//! are summed before backward.

use super::base::{ForwardTarget, LayerBase};
use crate::arena::{Arena, Region};
use crate::error::{Error, Result};
use crate::id::LayerId;
use crate::io::{InputArchive, OutputArchive};
use crate::shape::Shape;
use ndarray::{ArrayView1, ArrayViewMut1};
use tracing::debug;

/// Signature written by [`Hidden::save`].
pub const SIGNATURE: &str = "ffnn::Hidden";

/// Output and forward-error regions inside one consumer's buffers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputMapping {
    pub consumer: LayerId,
    pub output: Region,
    pub forward_error: Region,
}

/// Shared state of every hidden layer.
#[derive(Debug, Clone)]
pub struct Hidden {
    base: LayerBase,
    successors: Vec<OutputMapping>,
    error_sum: Vec<f32>,
}

impl Hidden {
    pub fn new(input_shape: Shape, output_shape: Shape) -> Self {
        Hidden {
            base: LayerBase::new(input_shape, output_shape),
            successors: Vec::new(),
            error_sum: Vec::new(),
        }
    }

    pub fn base(&self) -> &LayerBase {
        &self.base
    }

    pub fn base_mut(&mut self) -> &mut LayerBase {
        &mut self.base
    }

    /// Allocates the input and backward-error buffers.
    pub fn initialize(&mut self, input_shape: Shape, arena: &mut Arena) -> Result<()> {
        self.base.initialize(input_shape, arena)
    }

    /// Consumers in connection order; the first holds the aliased output.
    pub fn successors(&self) -> &[OutputMapping] {
        &self.successors
    }

    /// Region of the aliased output, once a consumer is connected.
    pub fn output_region(&self) -> Option<Region> {
        self.successors.first().map(|m| m.output)
    }

    /// Region of the aliased forward error, once a consumer is connected.
    pub fn forward_error_region(&self) -> Option<Region> {
        self.successors.first().map(|m| m.forward_error)
    }

    /// Maps the output onto `next`'s buffers at `offset`.
    ///
    /// Connecting the same consumer again refreshes its mapping.
    ///
    /// # Returns
    ///
    /// `offset` plus the output size.
    pub fn connect_to_forward_layer(&mut self, next: &ForwardTarget, offset: usize) -> Result<usize> {
        let size = self
            .base
            .output_shape()
            .size()
            .ok_or_else(|| Error::UnresolvedShape(self.base.id().clone()))?;
        let overflow = || Error::InputSizeMismatch {
            id: next.id.clone(),
            expected: next.input.len(),
            actual: offset + size,
        };
        let mapping = OutputMapping {
            consumer: next.id.clone(),
            output: next.input.sub(offset, size).ok_or_else(overflow)?,
            forward_error: next.backward_error.sub(offset, size).ok_or_else(overflow)?,
        };

        match self.successors.iter_mut().find(|m| m.consumer == next.id) {
            Some(existing) => *existing = mapping,
            None => self.successors.push(mapping),
        }
        debug!(
            producer = %self.base.id(),
            consumer = %next.id,
            offset,
            size,
            "output mapped"
        );
        Ok(offset + size)
    }

    /// Runs `f` over the input and the aliased output.
    ///
    /// After `f` returns, the output is copied to every further consumer.
    pub fn forward_with<F>(&self, arena: &mut Arena, f: F) -> Result<()>
    where
        F: FnOnce(ArrayView1<f32>, ArrayViewMut1<f32>) -> Result<()>,
    {
        let input = self.input_region()?;
        let (primary, others) = self
            .successors
            .split_first()
            .ok_or_else(|| Error::NotConnected(self.base.id().clone()))?;

        let ([x], y) = arena.split([input], primary.output)?;
        f(ArrayView1::from(x), ArrayViewMut1::from(y))?;

        for mirror in others {
            arena.copy(primary.output, mirror.output)?;
        }
        Ok(())
    }

    /// Runs `f` over the input, the forward error and the backward error.
    ///
    /// With several consumers the forward error handed to `f` is the sum of
    /// all of theirs.
    pub fn backward_with<F>(&mut self, arena: &mut Arena, f: F) -> Result<()>
    where
        F: FnOnce(ArrayView1<f32>, ArrayView1<f32>, ArrayViewMut1<f32>) -> Result<()>,
    {
        let input = self.input_region()?;
        let backward_error = self
            .base
            .backward_error_region()
            .ok_or_else(|| Error::NotInitialized(self.base.id().clone()))?;

        match self.successors.as_slice() {
            [] => Err(Error::NotConnected(self.base.id().clone())),
            [only] => {
                let ([x, e], g) = arena.split([input, only.forward_error], backward_error)?;
                f(
                    ArrayView1::from(x),
                    ArrayView1::from(e),
                    ArrayViewMut1::from(g),
                )
            }
            many => {
                self.error_sum.clear();
                self.error_sum.resize(many[0].forward_error.len(), 0.0);
                for mapping in many {
                    for (sum, e) in self
                        .error_sum
                        .iter_mut()
                        .zip(arena.slice(mapping.forward_error)?)
                    {
                        *sum += e;
                    }
                }
                let ([x], g) = arena.split([input], backward_error)?;
                f(
                    ArrayView1::from(x),
                    ArrayView1::from(&self.error_sum[..]),
                    ArrayViewMut1::from(g),
                )
            }
        }
    }

    fn input_region(&self) -> Result<Region> {
        self.base.require_initialized()?;
        self.base
            .input_region()
            .ok_or_else(|| Error::NotInitialized(self.base.id().clone()))
    }

    pub fn save(&self, archive: &mut OutputArchive) -> Result<()> {
        archive.sign(SIGNATURE);
        self.base.save(archive)
    }

    pub fn load(&mut self, archive: &mut InputArchive) -> Result<()> {
        archive.check(SIGNATURE)?;
        self.base.load(archive)
    }
}
