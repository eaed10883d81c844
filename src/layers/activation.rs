//! Element-wise activation layer.

use super::base::{ForwardTarget, LayerBase};
use super::hidden::Hidden;
use super::Layer;
use crate::arena::Arena;
use crate::error::Result;
use crate::io::{InputArchive, OutputArchive};
use crate::shape::Shape;
use crate::utils::Neuron;
use ndarray::Zip;
use std::any::Any;
use tracing::debug;

pub const SIGNATURE: &str = "ffnn::Activation";

/// Applies a [`Neuron`] to every input value.
///
/// The output has the shape of the input. Backward computes
/// `backward_error = f'(input) ⊙ forward_error`.
#[derive(Debug, Clone)]
pub struct Activation {
    hidden: Hidden,
    neuron: Neuron,
}

impl Activation {
    pub fn new(neuron: Neuron) -> Self {
        Activation {
            hidden: Hidden::new(Shape::unresolved(), Shape::unresolved()),
            neuron,
        }
    }

    pub fn neuron(&self) -> Neuron {
        self.neuron
    }
}

impl Default for Activation {
    fn default() -> Self {
        Activation::new(Neuron::Linear)
    }
}

impl Layer for Activation {
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
        let resolved = self.hidden.base().input_shape();
        self.hidden.base_mut().set_output_shape(resolved);
        debug!(id = %self.id(), shape = %resolved, neuron = ?self.neuron, "activation initialized");
        Ok(())
    }

    fn connect_to_forward_layer(&mut self, next: &ForwardTarget, offset: usize) -> Result<usize> {
        self.hidden.connect_to_forward_layer(next, offset)
    }

    fn forward(&mut self, arena: &mut Arena) -> Result<()> {
        let neuron = self.neuron;
        self.hidden.forward_with(arena, |input, mut output| {
            Zip::from(&mut output)
                .and(&input)
                .for_each(|y, &x| *y = neuron.value(x));
            Ok(())
        })
    }

    fn backward(&mut self, arena: &mut Arena) -> Result<()> {
        let neuron = self.neuron;
        self.hidden
            .backward_with(arena, |input, forward_error, mut backward_error| {
                Zip::from(&mut backward_error)
                    .and(&input)
                    .and(&forward_error)
                    .for_each(|g, &x, &e| *g = neuron.derivative(x) * e);
                Ok(())
            })
    }

    fn update(&mut self) -> Result<()> {
        Ok(())
    }

    fn save(&self, archive: &mut OutputArchive) -> Result<()> {
        archive.sign(SIGNATURE);
        self.hidden.save(archive)?;
        archive.write("neuron", &self.neuron)
    }

    fn load(&mut self, archive: &mut InputArchive) -> Result<()> {
        archive.check(SIGNATURE)?;
        self.hidden.load(archive)?;
        self.neuron = archive.read("neuron")?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
