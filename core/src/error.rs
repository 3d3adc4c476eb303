//! Error types for pooled collections.

use thiserror::Error;

/// Errors reported by the pooled collections.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollectionError {
    /// Positional access past the end of a collection.
    #[error("index {index} is out of range for a collection of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    /// A snapshot was taken before a structural mutation.
    #[error("collection was modified since the snapshot was taken (version {expected}, now {actual})")]
    StaleSnapshot { expected: u64, actual: u64 },

    /// The key is already present in the map.
    #[error("key is already present in the map")]
    DuplicateKey,

    /// The key is not present in the map.
    #[error("key is not present in the map")]
    KeyNotFound,

    /// A destination slice cannot hold every element.
    #[error("destination holds {provided} elements but {required} are required")]
    DestinationTooSmall { required: usize, provided: usize },

    /// A byte buffer larger than the pool's configured maximum was requested.
    #[error("requested {requested} bytes but the pool serves at most {max}")]
    BufferTooLarge { requested: usize, max: usize },

    /// Zero-length rentals are not served.
    #[error("cannot rent an empty buffer")]
    EmptyRental,

    /// The token does not refer to a live rental of this pool.
    #[error("buffer token does not belong to a live rental")]
    InvalidRental,
}
