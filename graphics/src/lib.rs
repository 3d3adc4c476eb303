//! # Tether Graphics
//!
//! Resource lifecycle and dependency safety for GPU-backed objects.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`ResourceFactory`] - Owns the runtime and hands out one builder per resource type
//! - [`Resource`] - A typed handle paired with the builder that provides it
//! - [`DependencyTracker`] - Directed "requires" edges that gate disposal
//! - [`DeferredDisposalQueue`] - Native teardown delayed until in-flight frames retire
//! - [`NativeBackend`] - The boundary to the native rendering library, with a
//!   [`DummyBackend`] for testing
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tether_graphics::*;
//!
//! let factory = ResourceFactory::new(ResourceConfig::default(), Arc::new(DummyBackend::new()))?;
//! let mesh = factory.meshes().create_mesh(&MeshDescriptor::new(&vertices, &triangles))?;
//! let material = factory.materials().create_material(&MaterialDescriptor::new(&[]))?;
//! let instance = factory
//!     .model_instances()
//!     .create_model_instance(&ModelInstanceDescriptor::new(&mesh, &material))?;
//!
//! assert!(mesh.dispose().is_err()); // still drawn by `instance`
//! instance.dispose()?;
//! mesh.dispose()?;
//! ```

pub mod backend;
pub mod builders;
pub mod config;
pub mod deferred;
pub mod error;
pub mod factory;
mod globals;
pub mod resource;

pub use backend::{NativeBackend, NativeError, NativeHandle, NativeKind, NativeRequest};
#[cfg(feature = "dummy")]
pub use backend::DummyBackend;
pub use builders::{
    ApplicationLoopBuilder, ApplicationLoopDescriptor, BYTES_PER_TEXEL, CameraBuilder,
    CameraDescriptor, CameraProjection, LightBuilder, LightDescriptor, LightKind,
    MaterialBuilder, MaterialDescriptor, MeshBuilder, MeshDescriptor, MeshRange, MeshTriangle,
    MeshVertex, ModelInstanceBuilder, ModelInstanceDescriptor, RendererBuilder,
    RendererDescriptor, ResourceGroupBuilder, ResourceGroupDescriptor, SceneBuilder,
    SceneDescriptor, TextureBuilder, TextureDescriptor, WindowBuilder, WindowDescriptor,
};
pub use config::{ConfigError, MAX_FRAMES_IN_FLIGHT, ResourceConfig};
pub use deferred::{DeferredDisposalQueue, DeferredTeardown};
pub use error::{ErrorKind, ResourceError, ResourceResult};
pub use factory::ResourceFactory;
pub use resource::{
    AsResourceStub, DependencyTracker, FromStub, RawHandle, Referents, Resource, ResourceHandle,
    ResourceIdent, ResourceKind, ResourceProvider, ResourceStub, TrackerScope, TypeTag, markers,
};

pub type Mesh = Resource<MeshBuilder>;
pub type Texture = Resource<TextureBuilder>;
pub type Material = Resource<MaterialBuilder>;
pub type ModelInstance = Resource<ModelInstanceBuilder>;
pub type Light = Resource<LightBuilder>;
pub type Camera = Resource<CameraBuilder>;
pub type Scene = Resource<SceneBuilder>;
pub type Window = Resource<WindowBuilder>;
pub type ApplicationLoop = Resource<ApplicationLoopBuilder>;
pub type Renderer = Resource<RendererBuilder>;
pub type ResourceGroup = Resource<ResourceGroupBuilder>;

/// Graphics library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_dummy_backend() {
        let backend = DummyBackend::new();
        assert_eq!(backend.name(), "Dummy");
    }

    static_assertions::assert_impl_all!(Mesh: Send, Sync, Clone);
    static_assertions::assert_impl_all!(ResourceFactory: Send, Sync);
}
