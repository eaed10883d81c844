//! Layer abstractions for propagation graphs
//!
//! This module provides the Layer trait, the state shared by all layers,
//! the buffer mapping of hidden layers and the concrete layer types.

mod r#trait;
pub mod activation;
pub mod base;
pub mod convolution;
pub mod dropout;
pub mod fully_connected;
pub mod hidden;
pub mod input;
pub mod output;
pub mod sparsely_connected;

// Re-export the Layer trait for convenience
pub use r#trait::Layer;
pub use activation::Activation;
pub use base::{Connection, ForwardTarget, LayerBase};
pub use convolution::Convolution;
pub use dropout::Dropout;
pub use fully_connected::FullyConnected;
pub use hidden::Hidden;
pub use input::Input;
pub use output::Output;
pub use sparsely_connected::SparselyConnected;
