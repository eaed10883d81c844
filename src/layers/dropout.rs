//! Dropout layer implementation for regularization
//!
//! This module provides a Dropout layer that randomly drops (sets to zero) a
//! fraction of input units during training to prevent overfitting. During
//! inference, all units are kept and outputs are passed through unchanged.

use super::base::{ForwardTarget, LayerBase};
use super::hidden::Hidden;
use super::Layer;
use crate::arena::Arena;
use crate::error::Result;
use crate::io::{InputArchive, OutputArchive};
use crate::shape::Shape;
use crate::utils::rng::seeded;
use ndarray::{Array1, Zip};
use rand::rngs::StdRng;
use rand::Rng;
use std::any::Any;
use tracing::debug;

pub const SIGNATURE: &str = "ffnn::Dropout";

/// Dropout layer for regularization.
///
/// During training, sets each unit to zero with probability `drop_rate` and
/// scales the kept units by `1 / (1 - drop_rate)` to maintain expected
/// values. During inference, passes inputs through unchanged.
///
/// Backward applies the same mask and scale to the error, unless the layer
/// is `blind`, in which case the error passes through untouched.
///
/// # Example
///
/// ```
/// use ffnn::layers::{Dropout, Layer};
///
/// let mut layer = Dropout::new(0.3).with_seed(42);
/// layer.set_training(false);
/// assert_eq!(layer.drop_rate(), 0.3);
/// assert_eq!(layer.parameter_count(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct Dropout {
    hidden: Hidden,
    drop_rate: f32,
    blind: bool,
    training: bool,
    /// Scale applied to each unit by the last forward pass
    mask: Array1<f32>,
    rng: StdRng,
}

impl Dropout {
    /// Creates a dropout layer in training mode.
    ///
    /// # Panics
    ///
    /// Panics if `drop_rate` is outside `[0.0, 1.0)`.
    pub fn new(drop_rate: f32) -> Self {
        assert!(
            (0.0..1.0).contains(&drop_rate),
            "drop_rate must be in range [0.0, 1.0)"
        );
        Dropout {
            hidden: Hidden::new(Shape::unresolved(), Shape::unresolved()),
            drop_rate,
            blind: false,
            training: true,
            mask: Array1::zeros(0),
            rng: seeded(None),
        }
    }

    /// Seeds the mask generator.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = seeded(Some(seed));
        self
    }

    /// Makes backward pass the error through without masking.
    pub fn blind(mut self) -> Self {
        self.blind = true;
        self
    }

    pub fn drop_rate(&self) -> f32 {
        self.drop_rate
    }

    pub fn is_blind(&self) -> bool {
        self.blind
    }

    pub fn is_training(&self) -> bool {
        self.training
    }

    /// Switches between training (masking) and inference (identity).
    pub fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    /// Scale applied to each unit by the last forward pass.
    pub fn mask(&self) -> &Array1<f32> {
        &self.mask
    }
}

impl Default for Dropout {
    fn default() -> Self {
        Dropout::new(0.0)
    }
}

impl Layer for Dropout {
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
        self.mask = Array1::ones(resolved.size().unwrap_or(0));
        debug!(id = %self.id(), shape = %resolved, drop_rate = self.drop_rate, "dropout initialized");
        Ok(())
    }

    fn connect_to_forward_layer(&mut self, next: &ForwardTarget, offset: usize) -> Result<usize> {
        self.hidden.connect_to_forward_layer(next, offset)
    }

    fn forward(&mut self, arena: &mut Arena) -> Result<()> {
        if self.training {
            let keep = 1.0 - self.drop_rate;
            let scale = 1.0 / keep;
            let rng = &mut self.rng;
            self.mask.mapv_inplace(|_| {
                if rng.gen::<f32>() < keep {
                    scale
                } else {
                    0.0
                }
            });
        } else {
            self.mask.fill(1.0);
        }

        let mask = &self.mask;
        self.hidden.forward_with(arena, |input, mut output| {
            Zip::from(&mut output)
                .and(&input)
                .and(mask)
                .for_each(|y, &x, &m| *y = x * m);
            Ok(())
        })
    }

    fn backward(&mut self, arena: &mut Arena) -> Result<()> {
        let mask = &self.mask;
        let blind = self.blind;
        self.hidden
            .backward_with(arena, |_, forward_error, mut backward_error| {
                if blind {
                    backward_error.assign(&forward_error);
                } else {
                    Zip::from(&mut backward_error)
                        .and(&forward_error)
                        .and(mask)
                        .for_each(|g, &e, &m| *g = e * m);
                }
                Ok(())
            })
    }

    fn update(&mut self) -> Result<()> {
        Ok(())
    }

    fn save(&self, archive: &mut OutputArchive) -> Result<()> {
        archive.sign(SIGNATURE);
        self.hidden.save(archive)?;
        archive.write("drop_rate", &self.drop_rate)?;
        archive.write("blind", &self.blind)
    }

    fn load(&mut self, archive: &mut InputArchive) -> Result<()> {
        archive.check(SIGNATURE)?;
        self.hidden.load(archive)?;
        self.drop_rate = archive.read("drop_rate")?;
        self.blind = archive.read("blind")?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected(layer: &mut Dropout, arena: &mut Arena, size: usize) -> ForwardTarget {
        layer.initialize(Shape::vector(size), arena).unwrap();
        let next = ForwardTarget {
            id: "next".into(),
            input: arena.allocate(size),
            backward_error: arena.allocate(size),
        };
        layer.connect_to_forward_layer(&next, 0).unwrap();
        next
    }

    #[test]
    #[should_panic(expected = "drop_rate must be in range [0.0, 1.0)")]
    fn test_drop_rate_of_one_panics() {
        Dropout::new(1.0);
    }

    #[test]
    fn test_inference_is_identity() {
        let mut arena = Arena::new();
        let mut layer = Dropout::new(0.5).with_seed(1);
        let next = connected(&mut layer, &mut arena, 4);
        layer.set_training(false);

        let input = layer.base().input_region().unwrap();
        arena
            .slice_mut(input)
            .unwrap()
            .copy_from_slice(&[1.0, 2.0, 3.0, 4.0]);
        layer.forward(&mut arena).unwrap();
        assert_eq!(arena.slice(next.input).unwrap(), &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_training_drops_or_scales_each_unit() {
        let mut arena = Arena::new();
        let mut layer = Dropout::new(0.5).with_seed(9);
        let next = connected(&mut layer, &mut arena, 64);

        let input = layer.base().input_region().unwrap();
        arena.slice_mut(input).unwrap().fill(1.0);
        layer.forward(&mut arena).unwrap();

        let output = arena.slice(next.input).unwrap();
        assert!(output.iter().all(|&y| y == 0.0 || y == 2.0));
        assert!(output.iter().any(|&y| y == 0.0));
        assert!(output.iter().any(|&y| y == 2.0));
    }

    #[test]
    fn test_backward_masks_unless_blind() {
        for blind in [false, true] {
            let mut arena = Arena::new();
            let mut layer = Dropout::new(0.5).with_seed(3);
            if blind {
                layer = layer.blind();
            }
            let next = connected(&mut layer, &mut arena, 32);
            layer.forward(&mut arena).unwrap();

            arena.slice_mut(next.backward_error).unwrap().fill(1.0);
            layer.backward(&mut arena).unwrap();
            let own = layer.base().backward_error_region().unwrap();
            let error = arena.slice(own).unwrap();
            if blind {
                assert!(error.iter().all(|&g| g == 1.0));
            } else {
                for (g, m) in error.iter().zip(layer.mask()) {
                    assert_eq!(*g, *m);
                }
            }
        }
    }
}
