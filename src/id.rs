//! Globally unique layer identifiers.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a layer, stable across save and load.
///
/// Fresh ids are 128 random bits rendered in the usual
/// `8-4-4-4-12` hexadecimal form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerId(String);

impl LayerId {
    /// Generates a new random id.
    pub fn generate() -> Self {
        let bits: u128 = rand::thread_rng().gen();
        let hex = format!("{:032x}", bits);
        LayerId(format!(
            "{}-{}-{}-{}-{}",
            &hex[0..8],
            &hex[8..12],
            &hex[12..16],
            &hex[16..20],
            &hex[20..32]
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LayerId {
    fn from(value: &str) -> Self {
        LayerId(value.to_owned())
    }
}

impl From<String> for LayerId {
    fn from(value: String) -> Self {
        LayerId(value)
    }
}
