//! Configuration structures for training
//!
//! This module provides configuration structures for setting up training
//! parameters, in particular the optimizer attached to parameterized layers.

use crate::error::{Error, Result};
use crate::optimizers::{Adam, GradientDescent, NoOptimizer, Optimizer};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Learning rate used when a configuration names an optimizer without one.
pub const DEFAULT_LEARNING_RATE: f32 = 0.001;

/// Configuration for training.
///
/// This structure is used to parse training configuration from JSON files.
/// Different optimizers read different optional fields:
///
/// - **none**: No parameters; layers cannot be trained
/// - **gradient_descent**: Optional `learning_rate`
/// - **adam**: Optional `learning_rate`, `beta1` (default 0.9),
///   `beta2` (default 0.999) and `epsilon` (default 1e-8)
///
/// # Example
///
/// ```json
/// {
///   "optimizer": "adam",
///   "learning_rate": 0.001,
///   "beta1": 0.9,
///   "iterations": 1000
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct TrainingConfig {
    /// Optimizer kind: "none", "gradient_descent" or "adam"
    pub optimizer: String,

    /// Step size for gradient descent and Adam
    pub learning_rate: Option<f32>,

    /// Decay of Adam's first moment estimate
    pub beta1: Option<f32>,

    /// Decay of Adam's second moment estimate
    pub beta2: Option<f32>,

    /// Adam's numerical stabilizer
    pub epsilon: Option<f32>,

    /// Number of training iterations
    pub iterations: Option<usize>,
}

impl TrainingConfig {
    /// Builds a fresh optimizer as described by this configuration.
    ///
    /// Every parameterized layer needs its own instance.
    ///
    /// # Errors
    ///
    /// Fails if the configuration does not pass validation.
    pub fn build_optimizer(&self) -> Result<Box<dyn Optimizer>> {
        validate_config(self)?;
        let learning_rate = self.learning_rate.unwrap_or(DEFAULT_LEARNING_RATE);
        let optimizer: Box<dyn Optimizer> = match self.optimizer.as_str() {
            "gradient_descent" => Box::new(GradientDescent::new(learning_rate)),
            "adam" => {
                let defaults = Adam::default();
                Box::new(Adam::new(
                    learning_rate,
                    self.beta1.unwrap_or(defaults.beta1()),
                    self.beta2.unwrap_or(defaults.beta2()),
                    self.epsilon.unwrap_or(defaults.epsilon()),
                ))
            }
            _ => Box::new(NoOptimizer::new()),
        };
        Ok(optimizer)
    }
}

/// Loads a training configuration from a JSON file.
///
/// Reads the file at `path` and deserializes its JSON contents into a `TrainingConfig`.
///
/// # Returns
///
/// `Ok(TrainingConfig)` on success, or an error if the file cannot be read,
/// the JSON is invalid or a value is out of range.
///
/// # Examples
///
/// ```no_run
/// use ffnn::config::load_config;
///
/// let cfg = load_config("config/training.json").unwrap();
/// let optimizer = cfg.build_optimizer().unwrap();
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<TrainingConfig> {
    let contents = fs::read_to_string(path)?;
    let config: TrainingConfig = serde_json::from_str(&contents)?;
    validate_config(&config)?;
    Ok(config)
}

/// Checks the optimizer kind and the ranges of its parameters.
pub fn validate_config(config: &TrainingConfig) -> Result<()> {
    let valid_optimizers = ["none", "gradient_descent", "adam"];
    if !valid_optimizers.contains(&config.optimizer.as_str()) {
        return Err(Error::invalid(format!(
            "Invalid optimizer '{}'. Must be one of: {}",
            config.optimizer,
            valid_optimizers.join(", ")
        )));
    }

    if let Some(learning_rate) = config.learning_rate {
        if !(learning_rate > 0.0) {
            return Err(Error::invalid("learning_rate must be positive"));
        }
    }

    for (name, beta) in [("beta1", config.beta1), ("beta2", config.beta2)] {
        if let Some(beta) = beta {
            if !(beta > 0.0 && beta < 1.0) {
                return Err(Error::invalid(format!("{} must be in range (0.0, 1.0)", name)));
            }
        }
    }

    if let Some(epsilon) = config.epsilon {
        if !(epsilon > 0.0) {
            return Err(Error::invalid("epsilon must be positive"));
        }
    }

    if config.iterations == Some(0) {
        return Err(Error::invalid("iterations must be greater than 0"));
    }

    Ok(())
}
