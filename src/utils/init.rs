//! Parameter initializers.

use crate::error::{Error, Result};
use rand::Rng;
use rand_distr::{Distribution, Normal, Uniform};
use serde::{Deserialize, Serialize};

/// Distribution parameters are drawn from when a layer is set up.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Initializer {
    Zeros,
    Constant { value: f32 },
    Uniform { low: f32, high: f32 },
    Normal { mean: f32, std_dev: f32 },
    /// Glorot uniform: `±sqrt(6 / (fan_in + fan_out))`
    Xavier,
}

impl Initializer {
    /// The standard normal distribution.
    pub fn standard_normal() -> Self {
        Initializer::Normal {
            mean: 0.0,
            std_dev: 1.0,
        }
    }

    /// Overwrites every value yielded by `values`.
    ///
    /// # Errors
    ///
    /// Fails when the distribution parameters are invalid (negative standard
    /// deviation, empty uniform range).
    pub fn fill<'a, I, R>(&self, values: I, fan_in: usize, fan_out: usize, rng: &mut R) -> Result<()>
    where
        I: IntoIterator<Item = &'a mut f32>,
        R: Rng + ?Sized,
    {
        match *self {
            Initializer::Zeros => values.into_iter().for_each(|v| *v = 0.0),
            Initializer::Constant { value } => values.into_iter().for_each(|v| *v = value),
            Initializer::Uniform { low, high } => {
                if !(low < high) {
                    return Err(Error::invalid(format!(
                        "uniform range [{}, {}) is empty",
                        low, high
                    )));
                }
                let dist = Uniform::new(low, high);
                values.into_iter().for_each(|v| *v = dist.sample(rng));
            }
            Initializer::Normal { mean, std_dev } => {
                let dist = Normal::new(mean, std_dev).map_err(|e| Error::invalid(e.to_string()))?;
                values.into_iter().for_each(|v| *v = dist.sample(rng));
            }
            Initializer::Xavier => {
                let limit = (6.0 / (fan_in + fan_out).max(1) as f32).sqrt();
                let dist = Uniform::new_inclusive(-limit, limit);
                values.into_iter().for_each(|v| *v = dist.sample(rng));
            }
        }
        Ok(())
    }
}
