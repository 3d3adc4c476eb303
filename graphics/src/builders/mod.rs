//! Resource builders.
//!
//! Each builder is the provider of one resource type: it allocates native
//! objects through the backend, keeps a [`ResourceTable`](crate::resource::table::ResourceTable)
//! of live handles, registers the dependency edges its resources need, and
//! on disposal runs the dependency gate before handing the native teardown
//! to the deferred queue.
//!
//! Builders are always held in an `Arc` and keep a weak reference to
//! themselves so they can mint [`ResourceStub`]s for their own handles.
//! Their state lock is never held across a call into the tracker or into
//! another builder.

pub mod app_loop;
pub mod camera;
pub mod group;
pub mod light;
pub mod material;
pub mod mesh;
pub mod object;
pub mod renderer;
pub mod scene;
pub mod texture;
pub mod window;

use std::sync::{Arc, Weak};

use crate::backend::NativeHandle;
use crate::error::{ResourceError, ResourceResult};
use crate::globals::FactoryGlobals;
use crate::resource::{
    ErasedProvider, RawHandle, Resource, ResourceHandle, ResourceProvider, ResourceStub,
    TrackerScope,
};

pub use app_loop::{ApplicationLoopBuilder, ApplicationLoopDescriptor};
pub use camera::{CameraBuilder, CameraDescriptor, CameraProjection};
pub use group::{ResourceGroupBuilder, ResourceGroupDescriptor};
pub use light::{LightBuilder, LightDescriptor, LightKind};
pub use material::{MaterialBuilder, MaterialDescriptor};
pub use mesh::{MeshBuilder, MeshDescriptor, MeshRange, MeshTriangle, MeshVertex};
pub use object::{ModelInstanceBuilder, ModelInstanceDescriptor};
pub use renderer::{RendererBuilder, RendererDescriptor};
pub use scene::{SceneBuilder, SceneDescriptor};
pub use texture::{BYTES_PER_TEXEL, TextureBuilder, TextureDescriptor};
pub use window::{WindowBuilder, WindowDescriptor};

/// Factory-side view of a builder, used to tear everything down at shutdown.
pub(crate) trait ManagedBuilder: ErasedProvider {
    /// Raw handles of every live resource.
    fn live_handles(&self) -> Vec<RawHandle>;

    /// Dispose one resource during factory shutdown.
    fn dispose_for_shutdown(&self, raw: RawHandle) -> ResourceResult<()> {
        self.dispose_raw(raw)
    }
}

/// Stub for `handle`, owned by the builder behind `self_ref`.
pub(crate) fn stub_for<P: ResourceProvider>(
    self_ref: &Weak<P>,
    scope: TrackerScope,
    handle: ResourceHandle<P::Kind>,
) -> ResourceStub {
    let provider: Weak<dyn ErasedProvider> = self_ref.clone();
    ResourceStub::new(handle.ident(), scope, provider)
}

/// Fail unless `other` was created by the same factory as `globals`.
pub(crate) fn ensure_same_factory(
    globals: &Arc<FactoryGlobals>,
    other: &Arc<FactoryGlobals>,
    what: &str,
) -> ResourceResult<()> {
    if Arc::ptr_eq(globals, other) {
        Ok(())
    } else {
        Err(ResourceError::InvalidParameter(format!(
            "{what} belongs to a different factory"
        )))
    }
}

/// Register `dependent -> target` for every target, undoing all of them on failure.
pub(crate) fn link_dependencies(
    globals: &FactoryGlobals,
    dependent: &ResourceStub,
    targets: &[ResourceStub],
) -> ResourceResult<()> {
    for target in targets {
        if let Err(err) = globals.tracker().register_dependency(dependent, target) {
            globals.tracker().deregister_all_dependencies(dependent)?;
            return Err(err);
        }
    }
    Ok(())
}

/// Destroy a native object that never became visible to a frame.
pub(crate) fn discard_native(
    globals: &FactoryGlobals,
    kind: crate::backend::NativeKind,
    handle: NativeHandle,
) {
    if let Err(err) = globals.backend().dispose(kind, handle) {
        log::error!("Failed to discard unused {} {}: {}", kind, handle, err);
    }
}

/// Native handle behind a resource owned by a builder exposing `native_handle`.
pub(crate) trait NativeBacked: ResourceProvider {
    fn globals(&self) -> &Arc<FactoryGlobals>;

    fn native_handle(&self, handle: ResourceHandle<Self::Kind>) -> ResourceResult<NativeHandle>;
}

/// Resolve the native handle of `resource`, checking it is live and from the same factory.
pub(crate) fn native_of<P: NativeBacked>(
    globals: &Arc<FactoryGlobals>,
    resource: &Resource<P>,
) -> ResourceResult<NativeHandle> {
    let provider = resource.provider()?;
    ensure_same_factory(globals, provider.globals(), <P::Kind as crate::resource::ResourceKind>::NAME)?;
    provider.native_handle(resource.handle()?)
}
