//! Version counters and snapshots for stale-access detection.
//!
//! Every pooled collection bumps its version on structural mutation. A
//! [`Snapshot`] captures `(version, len)` at one point in time; positional
//! reads through a snapshot fail with
//! [`CollectionError::StaleSnapshot`] once the collection has changed shape.

use crate::error::CollectionError;

/// A collection that tracks structural mutations.
pub trait Versioned {
    /// Current version. Increases on every structural mutation.
    fn version(&self) -> u64;

    /// Number of elements at the current version.
    fn element_count(&self) -> usize;
}

/// The observable shape of a collection at one version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    version: u64,
    len: usize,
}

impl Snapshot {
    /// Capture the current shape of `collection`.
    pub fn of<C: Versioned + ?Sized>(collection: &C) -> Self {
        Self {
            version: collection.version(),
            len: collection.element_count(),
        }
    }

    /// Version captured by this snapshot.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Length captured by this snapshot.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the snapshot saw an empty collection.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Fail if `collection` was structurally mutated after the snapshot.
    pub fn validate<C: Versioned + ?Sized>(&self, collection: &C) -> Result<(), CollectionError> {
        let actual = collection.version();
        if actual != self.version {
            return Err(CollectionError::StaleSnapshot {
                expected: self.version,
                actual,
            });
        }
        Ok(())
    }

    /// [`validate`](Self::validate), then bounds-check `index`.
    pub fn check_index<C: Versioned + ?Sized>(
        &self,
        collection: &C,
        index: usize,
    ) -> Result<(), CollectionError> {
        self.validate(collection)?;
        if index >= self.len {
            return Err(CollectionError::IndexOutOfRange {
                index,
                len: self.len,
            });
        }
        Ok(())
    }
}
