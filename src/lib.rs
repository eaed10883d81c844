//! Feed-forward layer graphs
//!
//! Layers are connected into a directed graph and initialized producers
//! first. Every hidden layer writes its output straight into its consumer's
//! input buffer and reads its error straight from the consumer's
//! backward-error buffer, so no values are copied between layers.
//!
//! # Modules
//!
//! - `graph`: Layer registry, connection and propagation driver
//! - `layers`: Layer trait and implementations (FullyConnected, Convolution, etc.)
//! - `optimizers`: Optimizer trait and implementations (GradientDescent, Adam)
//! - `arena`: Buffer storage shared by the layers of a graph
//! - `io`: Signature-checked persistence
//! - `utils`: Neurons, initializers and RNG helpers
//! - `config`: Training configuration structures
//! - `architecture`: Architecture configuration and graph building

pub mod architecture;
pub mod arena;
pub mod config;
pub mod error;
pub mod graph;
pub mod id;
pub mod io;
pub mod layers;
pub mod optimizers;
pub mod shape;
pub mod utils;

pub use error::{Error, Result};
pub use graph::Graph;
pub use id::LayerId;
pub use shape::Shape;
