//! Random number generation for reproducibility.
//!
//! Layers that draw random values (parameter initialization, dropout masks,
//! sparse connectivity) take an optional seed. A seeded layer produces the
//! same values on every run; an unseeded one draws its seed from the OS.

use rand::rngs::StdRng;
use rand::SeedableRng;

/// Creates the generator for an optional seed.
pub fn seeded(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}
