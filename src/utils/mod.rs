//! Shared utilities for layer implementations
//!
//! This module provides seeded random number generation, parameter
//! initializers and activation functions used across layers.

pub mod activations;
pub mod init;
pub mod rng;

pub use activations::Neuron;
pub use init::Initializer;
