//! Error type shared by every fallible operation in the crate.

use crate::arena::Region;
use crate::id::LayerId;

/// Errors reported by graph construction, propagation and persistence.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("layer <{0}> is already initialized")]
    AlreadyInitialized(LayerId),

    #[error("layer <{0}> is not initialized")]
    NotInitialized(LayerId),

    #[error("no layer with id <{0}> is registered")]
    UnknownLayer(LayerId),

    #[error("a layer with id <{0}> is already registered")]
    DuplicateId(LayerId),

    #[error("layer <{0}> cannot be connected to itself")]
    SelfConnection(LayerId),

    #[error("unexpected virtual connection <{from}> -> <{to}>")]
    UnexpectedVirtualConnection { from: LayerId, to: LayerId },

    #[error("virtual connection <{from}> -> <{to}> was never resolved")]
    UnresolvedConnection { from: LayerId, to: LayerId },

    #[error("layer <{id}> expects {expected} input values but its producers supply {actual}")]
    InputSizeMismatch {
        id: LayerId,
        expected: usize,
        actual: usize,
    },

    #[error("layer <{0}> has an unresolved output shape")]
    UnresolvedShape(LayerId),

    #[error("layer <{0}> has no forward connection")]
    NotConnected(LayerId),

    #[error("no optimizer is attached, cannot run {operation}")]
    NoOptimizer { operation: &'static str },

    #[error("optimizer `{0}` used before initialization")]
    OptimizerNotInitialized(String),

    #[error("size mismatch: expected {expected}, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("regions {0:?} and {1:?} overlap")]
    AliasedRegions(Region, Region),

    #[error("region {region:?} exceeds arena of {len} values")]
    RegionOutOfBounds { region: Region, len: usize },

    #[error("signature mismatch: expected `{expected}`, found `{found}`")]
    SignatureMismatch { expected: String, found: String },

    #[error("archive ended before `{0}` could be read")]
    TruncatedArchive(&'static str),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Error::InvalidConfiguration(message.into())
    }
}
