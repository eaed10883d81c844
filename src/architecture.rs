//! Architecture configuration structures
//!
//! This module provides configuration structures for describing layer graphs
//! in JSON files, so topologies can be changed without code changes.

use crate::error::{Error, Result};
use crate::graph::Graph;
use crate::id::LayerId;
use crate::layers::{
    Activation, Convolution, Dropout, FullyConnected, Input, Layer, Output, SparselyConnected,
};
use crate::shape::Shape;
use crate::utils::Neuron;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Configuration for a single named layer of the graph.
///
/// Defines the layer type, its producers and its parameters. Different layer
/// types require different fields:
///
/// - **input**: Requires `size` or `input_shape`
/// - **output**: Optional `size` (otherwise sized by its producers)
/// - **fully_connected**: Requires `output_size`, optional `input_size`, `seed`
/// - **convolution**: Requires `input_shape`, `kernel_height`, `filter_count`,
///   and optional `kernel_width` (default `kernel_height`), `stride`
///   (default 1), `col_stride` (default `stride`), `seed`
/// - **activation**: Requires `neuron`, optional `alpha` for `leaky_relu`
/// - **dropout**: Requires `drop_rate`, optional `blind`, `seed`
/// - **sparsely_connected**: Requires `output_size` and
///   `connection_probability`, optional `seed`
///
/// `inputs` lists the names of the producers, in connection order. They must
/// be declared earlier in the file.
///
/// # Examples
///
/// ```json
/// {
///   "name": "hidden",
///   "layer_type": "fully_connected",
///   "inputs": ["pixels"],
///   "output_size": 64
/// }
/// ```
///
/// ```json
/// {
///   "name": "features",
///   "layer_type": "convolution",
///   "inputs": ["image"],
///   "input_shape": [28, 28, 1],
///   "kernel_height": 5,
///   "filter_count": 8,
///   "stride": 1
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct LayerConfig {
    /// Unique name used to refer to the layer in `inputs`
    pub name: String,

    /// Type of layer: "input", "output", "fully_connected", "convolution",
    /// "activation", "dropout" or "sparsely_connected"
    pub layer_type: String,

    /// Producers of this layer, by name
    #[serde(default)]
    pub inputs: Vec<String>,

    /// Number of values of an input or output layer
    pub size: Option<usize>,
    /// `[height, width, depth]` of an input or convolution layer
    pub input_shape: Option<[usize; 3]>,

    // FullyConnected and SparselyConnected parameters
    /// Fixed input size, checked against the producers
    pub input_size: Option<usize>,
    /// Number of outputs
    pub output_size: Option<usize>,
    /// Probability that a weight is kept by a sparsely connected layer
    pub connection_probability: Option<f32>,

    // Convolution parameters
    pub kernel_height: Option<usize>,
    pub kernel_width: Option<usize>,
    pub filter_count: Option<usize>,
    /// Row stride (default: 1)
    pub stride: Option<usize>,
    /// Column stride (default: `stride`)
    pub col_stride: Option<usize>,

    // Activation parameters
    /// Neuron name: "linear", "sigmoid", "lecun_sigmoid", "tanh", "relu",
    /// "leaky_relu" or "soft_sign"
    pub neuron: Option<String>,
    /// Slope of `leaky_relu` for negative inputs (default 0.01)
    pub alpha: Option<f32>,

    // Dropout parameters
    pub drop_rate: Option<f32>,
    /// Pass the error through backward without masking
    pub blind: Option<bool>,

    /// Seed for parameter initialization or dropout masks
    pub seed: Option<u64>,
}

/// Configuration for a whole layer graph.
///
/// Layers are added to the graph in the order they appear, which is also the
/// order in which [`Graph::initialize_all`] and [`Graph::forward_all`] visit
/// them.
///
/// # Example
///
/// ```json
/// {
///   "layers": [
///     { "name": "pixels", "layer_type": "input", "size": 784 },
///     { "name": "hidden", "layer_type": "fully_connected", "inputs": ["pixels"], "output_size": 64 },
///     { "name": "squash", "layer_type": "activation", "inputs": ["hidden"], "neuron": "sigmoid" },
///     { "name": "scores", "layer_type": "fully_connected", "inputs": ["squash"], "output_size": 10 },
///     { "name": "result", "layer_type": "output", "inputs": ["scores"] }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ArchitectureConfig {
    /// Layer configurations in insertion order
    pub layers: Vec<LayerConfig>,
}

/// Loads an architecture configuration from a JSON file.
///
/// Reads the file at `path` and deserializes its JSON contents into an `ArchitectureConfig`.
/// Performs basic validation on the configuration structure.
///
/// # Examples
///
/// ```no_run
/// use ffnn::architecture::load_architecture;
///
/// let arch = load_architecture("config/architectures/mlp.json").unwrap();
/// assert!(!arch.layers.is_empty());
/// ```
pub fn load_architecture<P: AsRef<Path>>(path: P) -> Result<ArchitectureConfig> {
    let contents = fs::read_to_string(path)?;
    let config: ArchitectureConfig = serde_json::from_str(&contents)?;
    validate_architecture(&config)?;
    Ok(config)
}

/// Validates an architecture configuration.
///
/// Checks that:
/// - Architecture has at least one layer
/// - Layer names are unique
/// - Each layer has the required fields for its type
/// - Parameter values are within valid ranges
/// - Every producer named in `inputs` is declared earlier
///
/// Sizes are not checked here; they are resolved when the built graph is
/// initialized.
pub fn validate_architecture(config: &ArchitectureConfig) -> Result<()> {
    if config.layers.is_empty() {
        return Err(Error::invalid("Architecture must have at least one layer"));
    }

    let mut declared = HashSet::new();
    for (i, layer) in config.layers.iter().enumerate() {
        validate_layer(layer, i)?;
        for input in &layer.inputs {
            if !declared.contains(input.as_str()) {
                return Err(Error::invalid(format!(
                    "Layer {}: input '{}' is not declared before '{}'",
                    i, input, layer.name
                )));
            }
        }
        if !declared.insert(layer.name.as_str()) {
            return Err(Error::invalid(format!(
                "Layer {}: duplicate layer name '{}'",
                i, layer.name
            )));
        }
    }

    Ok(())
}

fn require<T: Copy>(value: Option<T>, index: usize, layer_type: &str, field: &str) -> Result<T> {
    value.ok_or_else(|| {
        Error::invalid(format!(
            "Layer {}: {} layer requires '{}'",
            index, layer_type, field
        ))
    })
}

fn positive(value: usize, index: usize, field: &str) -> Result<()> {
    if value == 0 {
        return Err(Error::invalid(format!(
            "Layer {}: {} must be greater than 0",
            index, field
        )));
    }
    Ok(())
}

fn validate_shape(shape: [usize; 3], index: usize) -> Result<()> {
    if shape.contains(&0) {
        return Err(Error::invalid(format!(
            "Layer {}: input_shape dimensions must be greater than 0",
            index
        )));
    }
    Ok(())
}

/// Validates a single layer configuration.
///
/// Checks that the layer has all required fields for its type and that
/// parameter values are within valid ranges.
fn validate_layer(layer: &LayerConfig, index: usize) -> Result<()> {
    if layer.name.is_empty() {
        return Err(Error::invalid(format!("Layer {}: name must not be empty", index)));
    }

    match layer.layer_type.as_str() {
        "input" => {
            if !layer.inputs.is_empty() {
                return Err(Error::invalid(format!(
                    "Layer {}: input layer cannot have inputs",
                    index
                )));
            }
            match (layer.size, layer.input_shape) {
                (Some(size), None) => positive(size, index, "size")?,
                (None, Some(shape)) => validate_shape(shape, index)?,
                _ => {
                    return Err(Error::invalid(format!(
                        "Layer {}: input layer requires exactly one of 'size' or 'input_shape'",
                        index
                    )))
                }
            }
        }
        "output" => {
            if let Some(size) = layer.size {
                positive(size, index, "size")?;
            }
        }
        "fully_connected" => {
            let output_size = require(layer.output_size, index, "FullyConnected", "output_size")?;
            positive(output_size, index, "output_size")?;
            if let Some(input_size) = layer.input_size {
                positive(input_size, index, "input_size")?;
            }
        }
        "convolution" => {
            let shape = require(layer.input_shape, index, "Convolution", "input_shape")?;
            validate_shape(shape, index)?;
            let kernel_height =
                require(layer.kernel_height, index, "Convolution", "kernel_height")?;
            positive(kernel_height, index, "kernel_height")?;
            let filter_count = require(layer.filter_count, index, "Convolution", "filter_count")?;
            positive(filter_count, index, "filter_count")?;
            if let Some(kernel_width) = layer.kernel_width {
                positive(kernel_width, index, "kernel_width")?;
            }
            if let Some(stride) = layer.stride {
                positive(stride, index, "stride")?;
            }
            if let Some(col_stride) = layer.col_stride {
                positive(col_stride, index, "col_stride")?;
            }
        }
        "activation" => {
            let name = layer.neuron.as_deref().ok_or_else(|| {
                Error::invalid(format!("Layer {}: Activation layer requires 'neuron'", index))
            })?;
            if Neuron::from_name(name, layer.alpha).is_none() {
                return Err(Error::invalid(format!(
                    "Layer {}: Invalid neuron '{}'. Must be one of: linear, sigmoid, lecun_sigmoid, tanh, relu, leaky_relu, soft_sign",
                    index, name
                )));
            }
        }
        "dropout" => {
            let drop_rate = require(layer.drop_rate, index, "Dropout", "drop_rate")?;
            if !(0.0..1.0).contains(&drop_rate) {
                return Err(Error::invalid(format!(
                    "Layer {}: drop_rate must be in range [0.0, 1.0)",
                    index
                )));
            }
        }
        "sparsely_connected" => {
            let output_size =
                require(layer.output_size, index, "SparselyConnected", "output_size")?;
            positive(output_size, index, "output_size")?;
            let probability = require(
                layer.connection_probability,
                index,
                "SparselyConnected",
                "connection_probability",
            )?;
            if !(probability > 0.0 && probability <= 1.0) {
                return Err(Error::invalid(format!(
                    "Layer {}: connection_probability must be in range (0.0, 1.0]",
                    index
                )));
            }
        }
        _ => {
            return Err(Error::invalid(format!(
                "Layer {}: Invalid layer type '{}'. Must be one of: input, output, fully_connected, convolution, activation, dropout, sparsely_connected",
                index, layer.layer_type
            )));
        }
    }

    Ok(())
}

fn shape_of(dims: [usize; 3]) -> Shape {
    let [height, width, depth] = dims;
    Shape::new(height, width, depth)
}

/// Builds one layer from a validated configuration entry.
fn build_layer(config: &LayerConfig, index: usize) -> Result<Box<dyn Layer>> {
    let layer: Box<dyn Layer> = match config.layer_type.as_str() {
        "input" => match (config.size, config.input_shape) {
            (_, Some(dims)) => Box::new(Input::with_shape(shape_of(dims))),
            (size, None) => Box::new(Input::new(require(size, index, "Input", "size")?)),
        },
        "output" => match config.size {
            Some(size) => Box::new(Output::with_size(size)),
            None => Box::new(Output::new()),
        },
        "fully_connected" => {
            let output_size = require(config.output_size, index, "FullyConnected", "output_size")?;
            let mut layer = match config.input_size {
                Some(input_size) => FullyConnected::with_input(input_size, output_size),
                None => FullyConnected::new(output_size),
            };
            if let Some(seed) = config.seed {
                layer = layer.with_seed(seed);
            }
            Box::new(layer)
        }
        "convolution" => {
            let dims = require(config.input_shape, index, "Convolution", "input_shape")?;
            let kernel_height = require(config.kernel_height, index, "Convolution", "kernel_height")?;
            let filter_count = require(config.filter_count, index, "Convolution", "filter_count")?;
            let kernel_width = config.kernel_width.unwrap_or(kernel_height);
            let stride = config.stride.unwrap_or(1);
            let col_stride = config.col_stride.unwrap_or(stride);
            let mut layer = Convolution::with_strides(
                shape_of(dims),
                (kernel_height, kernel_width),
                filter_count,
                (stride, col_stride),
            )?;
            if let Some(seed) = config.seed {
                layer = layer.with_seed(seed);
            }
            Box::new(layer)
        }
        "activation" => {
            let neuron = config
                .neuron
                .as_deref()
                .and_then(|name| Neuron::from_name(name, config.alpha))
                .ok_or_else(|| {
                    Error::invalid(format!("Layer {}: Activation layer requires a valid 'neuron'", index))
                })?;
            Box::new(Activation::new(neuron))
        }
        "dropout" => {
            let mut layer = Dropout::new(require(config.drop_rate, index, "Dropout", "drop_rate")?);
            if let Some(seed) = config.seed {
                layer = layer.with_seed(seed);
            }
            if config.blind.unwrap_or(false) {
                layer = layer.blind();
            }
            Box::new(layer)
        }
        "sparsely_connected" => {
            let output_size =
                require(config.output_size, index, "SparselyConnected", "output_size")?;
            let probability = require(
                config.connection_probability,
                index,
                "SparselyConnected",
                "connection_probability",
            )?;
            let mut layer = SparselyConnected::new(output_size, probability);
            if let Some(seed) = config.seed {
                layer = layer.with_seed(seed);
            }
            Box::new(layer)
        }
        other => {
            return Err(Error::invalid(format!(
                "Layer {}: Invalid layer type '{}'",
                index, other
            )))
        }
    };
    Ok(layer)
}

/// Builds a layer graph from an architecture configuration.
///
/// Every layer is added in configuration order and connected to the
/// producers named in its `inputs`. The graph is returned uninitialized,
/// together with the id assigned to each layer name, so optimizers can be
/// attached before calling [`Graph::initialize_all`].
///
/// # Errors
///
/// Returns an error if the configuration fails validation or a layer cannot
/// be constructed.
///
/// # Examples
///
/// ```no_run
/// use ffnn::architecture::{build_graph, load_architecture};
///
/// let config = load_architecture("config/architectures/mlp.json").unwrap();
/// let (mut graph, names) = build_graph(&config).unwrap();
/// graph.initialize_all().unwrap();
/// assert_eq!(graph.len(), names.len());
/// ```
pub fn build_graph(config: &ArchitectureConfig) -> Result<(Graph, HashMap<String, LayerId>)> {
    validate_architecture(config)?;

    let mut graph = Graph::new();
    let mut names: HashMap<String, LayerId> = HashMap::new();
    for (i, layer_config) in config.layers.iter().enumerate() {
        let id = graph.add_boxed(build_layer(layer_config, i)?)?;
        for input in &layer_config.inputs {
            let producer = names.get(input).ok_or_else(|| {
                Error::invalid(format!("Layer {}: unknown input '{}'", i, input))
            })?;
            graph.connect(producer, &id)?;
        }
        debug!(name = %layer_config.name, id = %id, layer_type = %layer_config.layer_type, "layer built");
        names.insert(layer_config.name.clone(), id);
    }

    Ok((graph, names))
}
