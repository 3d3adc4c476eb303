//! Resource handles, providers, names and the dependency tracker.

pub mod handle;
pub mod names;
pub mod provider;
pub(crate) mod table;
pub mod tracker;

#[cfg(test)]
pub(crate) mod testing;

pub use handle::{RawHandle, ResourceHandle, ResourceIdent, ResourceKind, TypeTag, markers};
pub use names::NameStore;
pub use provider::{
    AsResourceStub, ErasedProvider, FromStub, Resource, ResourceProvider, ResourceStub,
};
pub use tracker::{DependencyTracker, Referents, ReferentsIter, TrackerScope};
