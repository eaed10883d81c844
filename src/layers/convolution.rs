//! Convolutional layer implementation
//!
//! This module provides a Convolution layer that slides a bank of filters
//! over a `height × width × depth` input. Every filter spans the full input
//! depth and produces one output channel, so the output is
//! `out_height × out_width × filter_count` with
//! `out = (in - kernel) / stride + 1` along each spatial axis. No padding is
//! applied.

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
use ndarray::{
    s, Array1, Array4, ArrayD, ArrayView1, ArrayView3, ArrayView4, ArrayViewD, ArrayViewMutD,
    Axis, Ix1, Ix3, Ix4, SliceInfo, SliceInfoElem, Zip,
};
use serde::{Deserialize, Serialize};
use std::any::Any;
use tracing::debug;

pub const SIGNATURE: &str = "ffnn::Convolution";

/// Output length along one axis, `None` when the kernel does not fit or the
/// stride is zero.
///
/// # Examples
///
/// ```
/// use ffnn::layers::convolution::output_dimension;
///
/// assert_eq!(output_dimension(64, 4, 3), Some(21));
/// assert_eq!(output_dimension(3, 4, 1), None);
/// ```
pub fn output_dimension(input: usize, kernel: usize, stride: usize) -> Option<usize> {
    if kernel == 0 || stride == 0 || kernel > input {
        return None;
    }
    Some((input - kernel) / stride + 1)
}

/// Sizes of a convolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Geometry {
    /// `(height, width, depth)` of the input
    pub input: (usize, usize, usize),
    /// `(height, width)` of every kernel
    pub kernel: (usize, usize),
    pub filter_count: usize,
    /// `(row, column)` strides
    pub stride: (usize, usize),
}

impl Geometry {
    /// Validates the sizes against `input_shape`.
    pub fn new(
        input_shape: Shape,
        kernel: (usize, usize),
        filter_count: usize,
        stride: (usize, usize),
    ) -> Result<Self> {
        let input = input_shape
            .dims()
            .filter(|_| input_shape.valid())
            .ok_or_else(|| Error::invalid(format!("convolution input {} is not valid", input_shape)))?;
        if filter_count == 0 {
            return Err(Error::invalid("convolution needs at least one filter"));
        }
        let geometry = Geometry {
            input,
            kernel,
            filter_count,
            stride,
        };
        geometry.output().ok_or_else(|| {
            Error::invalid(format!(
                "kernel {:?} with stride {:?} does not fit input {}",
                kernel, stride, input_shape
            ))
        })?;
        Ok(geometry)
    }

    /// `(height, width, filter_count)` of the output.
    pub fn output(&self) -> Option<(usize, usize, usize)> {
        Some((
            output_dimension(self.input.0, self.kernel.0, self.stride.0)?,
            output_dimension(self.input.1, self.kernel.1, self.stride.1)?,
            self.filter_count,
        ))
    }

    fn output_dims(&self) -> Result<(usize, usize, usize)> {
        self.output()
            .ok_or_else(|| Error::invalid("convolution geometry does not fit its input"))
    }

    /// Input window feeding output position `(i, j)`.
    fn window(&self, i: usize, j: usize) -> SliceInfo<[SliceInfoElem; 3], Ix3, Ix3> {
        let row = i * self.stride.0;
        let col = j * self.stride.1;
        s![row..row + self.kernel.0, col..col + self.kernel.1, ..]
    }
}

/// Filter bank and per-filter biases.
///
/// `kernels` is `filter_count × kernel_height × kernel_width × depth`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvolutionParameters {
    pub geometry: Geometry,
    pub kernels: Array4<f32>,
    pub biases: Array1<f32>,
}

impl Parameters for ConvolutionParameters {
    fn tensors(&self) -> Vec<ArrayViewD<'_, f32>> {
        vec![self.kernels.view().into_dyn(), self.biases.view().into_dyn()]
    }

    fn tensors_mut(&mut self) -> Vec<ArrayViewMutD<'_, f32>> {
        vec![
            self.kernels.view_mut().into_dyn(),
            self.biases.view_mut().into_dyn(),
        ]
    }

    /// `∂K_k += Σ_ij window(i, j) · e[i, j, k]`, `∂b_k += Σ_ij e[i, j, k]`.
    fn accumulate_gradient(
        &self,
        input: ArrayView1<f32>,
        forward_error: ArrayView1<f32>,
        gradient: &mut [ArrayD<f32>],
    ) -> Result<()> {
        let count = gradient.len();
        let [kernels, biases] = gradient else {
            return Err(Error::SizeMismatch {
                expected: 2,
                actual: count,
            });
        };
        let mut kernels = kernels.view_mut().into_dimensionality::<Ix4>()?;
        let mut biases = biases.view_mut().into_dimensionality::<Ix1>()?;
        let input = input.into_shape(self.geometry.input)?;
        let error = forward_error.into_shape(self.geometry.output_dims()?)?;

        for ((i, j, k), &e) in error.indexed_iter() {
            let window = input.slice(self.geometry.window(i, j));
            kernels.index_axis_mut(Axis(0), k).scaled_add(e, &window);
            biases[k] += e;
        }
        Ok(())
    }
}

/// Convolutional layer with learnable filters.
///
/// # Example
///
/// ```
/// use ffnn::layers::{Convolution, Layer};
/// use ffnn::Shape;
///
/// let layer = Convolution::new(Shape::vector(64), 4, 1, 2, 3).unwrap();
/// assert_eq!(layer.output_shape(), Shape::new(21, 1, 2));
/// ```
pub struct Convolution {
    hidden: Hidden,
    params: ConvolutionParameters,
    optimizer: Box<dyn Optimizer>,
    kernel_init: Initializer,
    bias_init: Initializer,
    seed: Option<u64>,
}

impl Convolution {
    /// Creates a convolution over a fixed `input_shape`.
    ///
    /// # Arguments
    ///
    /// * `input_shape` - `height × width × depth` of the input
    /// * `kernel_height`, `kernel_width` - Spatial kernel size
    /// * `filter_count` - Number of filters (output depth)
    /// * `stride` - Step between windows along both axes
    ///
    /// # Errors
    ///
    /// Fails if the kernel does not fit the input, the stride is zero or
    /// there are no filters.
    pub fn new(
        input_shape: Shape,
        kernel_height: usize,
        kernel_width: usize,
        filter_count: usize,
        stride: usize,
    ) -> Result<Self> {
        Convolution::with_strides(
            input_shape,
            (kernel_height, kernel_width),
            filter_count,
            (stride, stride),
        )
    }

    /// Like [`Convolution::new`] with separate row and column strides.
    pub fn with_strides(
        input_shape: Shape,
        kernel: (usize, usize),
        filter_count: usize,
        stride: (usize, usize),
    ) -> Result<Self> {
        let geometry = Geometry::new(input_shape, kernel, filter_count, stride)?;
        Ok(Convolution::from_geometry(geometry))
    }

    fn from_geometry(geometry: Geometry) -> Self {
        let (h, w, d) = geometry.input;
        let output = geometry.output().map_or_else(Shape::unresolved, |(oh, ow, od)| {
            Shape::new(oh, ow, od)
        });
        Convolution {
            hidden: Hidden::new(Shape::new(h, w, d), output),
            params: ConvolutionParameters {
                geometry,
                kernels: Array4::zeros((0, 0, 0, 0)),
                biases: Array1::zeros(0),
            },
            optimizer: Box::new(NoOptimizer),
            kernel_init: Initializer::standard_normal(),
            bias_init: Initializer::standard_normal(),
            seed: None,
        }
    }

    pub fn with_initializers(mut self, kernels: Initializer, biases: Initializer) -> Self {
        self.kernel_init = kernels;
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

    pub fn geometry(&self) -> &Geometry {
        &self.params.geometry
    }

    pub fn kernels(&self) -> ArrayView4<'_, f32> {
        self.params.kernels.view()
    }

    /// Kernel of filter `k`, `kernel_height × kernel_width × depth`.
    pub fn kernel(&self, k: usize) -> ArrayView3<'_, f32> {
        self.params.kernels.index_axis(Axis(0), k)
    }

    pub fn biases(&self) -> ArrayView1<'_, f32> {
        self.params.biases.view()
    }

    pub fn optimizer(&self) -> &dyn Optimizer {
        self.optimizer.as_ref()
    }

    fn kernel_dims(&self) -> (usize, usize, usize, usize) {
        let g = &self.params.geometry;
        (g.filter_count, g.kernel.0, g.kernel.1, g.input.2)
    }

    fn reset(&mut self) -> Result<()> {
        let dims = self.kernel_dims();
        let fan_in = dims.1 * dims.2 * dims.3;
        let fan_out = dims.0 * dims.1 * dims.2;
        let mut rng = seeded(self.seed);
        let mut kernels = Array4::zeros(dims);
        let mut biases = Array1::zeros(dims.0);
        self.kernel_init
            .fill(kernels.iter_mut(), fan_in, fan_out, &mut rng)?;
        self.bias_init
            .fill(biases.iter_mut(), fan_in, fan_out, &mut rng)?;
        self.params.kernels = kernels;
        self.params.biases = biases;
        Ok(())
    }

    fn setup(&mut self) -> Result<()> {
        let dims = self.kernel_dims();
        if self.hidden.base().setup_required() {
            self.reset()?;
        } else if self.params.kernels.dim() != dims || self.params.biases.len() != dims.0 {
            return Err(Error::SizeMismatch {
                expected: dims.0 * dims.1 * dims.2 * dims.3,
                actual: self.params.kernels.len(),
            });
        }
        let input_size = self.hidden.base().input_shape().size().unwrap_or(0);
        self.optimizer.initialize(&self.params, input_size)
    }
}

impl Default for Convolution {
    fn default() -> Self {
        Convolution::from_geometry(Geometry {
            input: (1, 1, 1),
            kernel: (1, 1),
            filter_count: 1,
            stride: (1, 1),
        })
    }
}

impl Layer for Convolution {
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
            "convolution initialized"
        );
        Ok(())
    }

    fn connect_to_forward_layer(&mut self, next: &ForwardTarget, offset: usize) -> Result<usize> {
        self.hidden.connect_to_forward_layer(next, offset)
    }

    fn forward(&mut self, arena: &mut Arena) -> Result<()> {
        let params = &self.params;
        let optimizer = &mut self.optimizer;
        self.hidden.forward_with(arena, |input, output| {
            optimizer.forward(input.view())?;
            let geometry = &params.geometry;
            let input = input.into_shape(geometry.input)?;
            let mut output = output.into_shape(geometry.output_dims()?)?;

            for ((i, j, k), y) in output.indexed_iter_mut() {
                let window = input.slice(geometry.window(i, j));
                let kernel = params.kernels.index_axis(Axis(0), k);
                *y = Zip::from(&kernel)
                    .and(&window)
                    .fold(params.biases[k], |acc, &w, &x| acc + w * x);
            }
            Ok(())
        })
    }

    fn backward(&mut self, arena: &mut Arena) -> Result<()> {
        let params = &self.params;
        let optimizer = &mut self.optimizer;
        self.hidden
            .backward_with(arena, |_, forward_error, backward_error| {
                let geometry = &params.geometry;
                let error = forward_error.into_shape(geometry.output_dims()?)?;
                let mut backward_error = backward_error.into_shape(geometry.input)?;
                backward_error.fill(0.0);

                for ((i, j, k), &e) in error.indexed_iter() {
                    let kernel = params.kernels.index_axis(Axis(0), k);
                    backward_error
                        .slice_mut(geometry.window(i, j))
                        .scaled_add(e, &kernel);
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
        archive.write("geometry", &self.params.geometry)?;
        archive.write("kernels", &self.params.kernels)?;
        archive.write("biases", &self.params.biases)
    }

    fn load(&mut self, archive: &mut InputArchive) -> Result<()> {
        archive.check(SIGNATURE)?;
        self.hidden.load(archive)?;
        self.params.geometry = archive.read("geometry")?;
        self.params.kernels = archive.read("kernels")?;
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_dimensions() {
        assert_eq!(output_dimension(64, 4, 3), Some(21));
        assert_eq!(output_dimension(28, 3, 1), Some(26));
        assert_eq!(output_dimension(5, 5, 2), Some(1));
        assert_eq!(output_dimension(5, 0, 1), None);
        assert_eq!(output_dimension(5, 2, 0), None);
    }

    #[test]
    fn test_output_shape_from_geometry() {
        let layer = Convolution::with_strides(Shape::new(28, 28, 3), (3, 5), 8, (1, 2)).unwrap();
        assert_eq!(layer.output_shape(), Shape::new(26, 12, 8));
        assert_eq!(layer.input_shape(), Shape::new(28, 28, 3));
    }

    #[test]
    fn test_kernel_larger_than_input_is_rejected() {
        assert!(Convolution::new(Shape::new(3, 3, 1), 4, 4, 1, 1).is_err());
        assert!(Convolution::new(Shape::new(3, 3, 1), 2, 2, 0, 1).is_err());
        assert!(Convolution::new(Shape::unresolved(), 1, 1, 1, 1).is_err());
    }

    #[test]
    fn test_initialize_allocates_filter_bank() {
        let mut arena = Arena::new();
        let mut layer = Convolution::new(Shape::new(6, 6, 2), 3, 3, 4, 1)
            .unwrap()
            .with_seed(5);
        layer.initialize(Shape::vector(72), &mut arena).unwrap();
        assert_eq!(layer.kernels().dim(), (4, 3, 3, 2));
        assert_eq!(layer.biases().len(), 4);
        assert_eq!(layer.parameter_count(), 4 * 18 + 4);
        assert!(layer.kernels().iter().any(|&w| w != 0.0));
    }

    #[test]
    fn test_window_gradient() {
        let geometry = Geometry::new(Shape::new(3, 1, 1), (2, 1), 1, (1, 1)).unwrap();
        let params = ConvolutionParameters {
            geometry,
            kernels: Array4::zeros((1, 2, 1, 1)),
            biases: Array1::zeros(1),
        };
        let mut gradient = vec![
            ArrayD::zeros(ndarray::IxDyn(&[1, 2, 1, 1])),
            ArrayD::zeros(ndarray::IxDyn(&[1])),
        ];
        let input = ndarray::arr1(&[1.0, 2.0, 3.0]);
        let error = ndarray::arr1(&[1.0, 10.0]);
        params
            .accumulate_gradient(input.view(), error.view(), &mut gradient)
            .unwrap();
        // windows [1, 2] and [2, 3] weighted by 1 and 10
        assert_eq!(gradient[0][[0, 0, 0, 0]], 21.0);
        assert_eq!(gradient[0][[0, 1, 0, 0]], 32.0);
        assert_eq!(gradient[1][[0]], 11.0);
    }
}
