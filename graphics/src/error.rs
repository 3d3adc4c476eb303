//! Resource runtime error types.

use tether_core::CollectionError;
use thiserror::Error;

use crate::backend::NativeError;

/// Coarse classification of a [`ResourceError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Operation on a default-constructed resource value.
    InvalidObject,
    /// Operation on a resource whose disposal was already accepted.
    Disposed,
    /// Disposal of a resource that still has dependents.
    DependencyViolation,
    /// The native backend reported a failure.
    NativeInterop,
    /// Positional access or buffer size out of bounds.
    Range,
    /// An enumeration outlived a mutation of the dependency graph.
    StaleEnumeration,
    /// A resource was requested as the wrong type.
    TypeMismatch,
    /// A caller-supplied argument was rejected.
    InvalidParameter,
    /// The owning factory or queue can no longer accept work.
    Unavailable,
}

/// Errors that can occur in the resource runtime.
#[derive(Debug, Error)]
pub enum ResourceError {
    /// The resource value was never initialized.
    #[error("{type_name} resource is not initialized")]
    InvalidObject { type_name: &'static str },

    /// The resource was disposed.
    #[error("{type_name} resource has been disposed")]
    Disposed { type_name: &'static str },

    /// Disposal blocked by live dependents.
    #[error(
        "cannot dispose {type_name} '{name}' while it is in use by: {}",
        .dependents.join(", ")
    )]
    DependencyViolation {
        type_name: &'static str,
        name: String,
        dependents: Vec<String>,
    },

    /// A native backend call failed.
    #[error("native {operation} failed")]
    NativeInterop {
        operation: &'static str,
        #[source]
        source: NativeError,
    },

    /// Positional query outside valid bounds.
    #[error("index {index} is out of range (count {count})")]
    OutOfRange { index: usize, count: usize },

    /// Destination buffer cannot hold the result.
    #[error("destination holds {provided} bytes but {required} are required")]
    BufferTooSmall { required: usize, provided: usize },

    /// The dependency graph changed after the enumeration was created.
    #[error("dependency enumeration is stale (generation {expected}, tracker now at {actual})")]
    StaleEnumeration { expected: u64, actual: u64 },

    /// A type-erased resource was requested as another type.
    #[error("expected a {expected} resource but found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// Invalid argument supplied by the caller.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The resource group no longer accepts members.
    #[error("resource group '{0}' is sealed")]
    GroupSealed(String),

    /// A deferred native teardown failed earlier; native state is unknown.
    #[error("deferred disposal queue is poisoned by an earlier native teardown failure")]
    QueuePoisoned,

    /// The factory was shut down.
    #[error("{0} cannot be used after the factory was shut down")]
    FactoryDisposed(&'static str),

    /// A pooled collection rejected the operation.
    #[error(transparent)]
    Collection(#[from] CollectionError),
}

impl ResourceError {
    /// Wrap a backend failure with the operation that triggered it.
    pub fn native(operation: &'static str, source: NativeError) -> Self {
        Self::NativeInterop { operation, source }
    }

    /// Coarse classification of the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidObject { .. } => ErrorKind::InvalidObject,
            Self::Disposed { .. } => ErrorKind::Disposed,
            Self::DependencyViolation { .. } => ErrorKind::DependencyViolation,
            Self::NativeInterop { .. } => ErrorKind::NativeInterop,
            Self::OutOfRange { .. } | Self::BufferTooSmall { .. } => ErrorKind::Range,
            Self::StaleEnumeration { .. } => ErrorKind::StaleEnumeration,
            Self::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            Self::InvalidParameter(_) | Self::GroupSealed(_) => ErrorKind::InvalidParameter,
            Self::QueuePoisoned | Self::FactoryDisposed(_) => ErrorKind::Unavailable,
            Self::Collection(inner) => match inner {
                CollectionError::IndexOutOfRange { .. }
                | CollectionError::DestinationTooSmall { .. }
                | CollectionError::BufferTooLarge { .. } => ErrorKind::Range,
                CollectionError::StaleSnapshot { .. } => ErrorKind::StaleEnumeration,
                _ => ErrorKind::InvalidParameter,
            },
        }
    }
}

/// Result type for resource operations.
pub type ResourceResult<T> = Result<T, ResourceError>;
