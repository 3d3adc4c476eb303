//! Scenes: the set of model instances and lights a renderer draws.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::backend::{NativeHandle, NativeKind, NativeRequest};
use crate::builders::light::LightBuilder;
use crate::builders::object::ModelInstanceBuilder;
use crate::builders::{ManagedBuilder, NativeBacked, discard_native, native_of, stub_for};
use crate::error::{ResourceError, ResourceResult};
use crate::globals::FactoryGlobals;
use crate::resource::table::ResourceTable;
use crate::resource::{
    NameStore, RawHandle, Referents, Resource, ResourceHandle, ResourceProvider, ResourceStub,
    TrackerScope, TypeTag, markers,
};
use crate::{Light, ModelInstance, Scene};

/// Descriptor for creating an empty scene.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SceneDescriptor {
    pub label: Option<String>,
}

impl SceneDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

struct SceneData {
    native: NativeHandle,
}

/// Provider of [`Scene`] resources.
///
/// A scene depends on every model instance and light added to it, so those
/// cannot be disposed until they are removed or the scene is disposed.
pub struct SceneBuilder {
    globals: Arc<FactoryGlobals>,
    self_ref: Weak<Self>,
    table: Mutex<ResourceTable<markers::Scene, SceneData>>,
}

impl SceneBuilder {
    pub(crate) fn new(globals: Arc<FactoryGlobals>) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            globals,
            self_ref: self_ref.clone(),
            table: Mutex::new(ResourceTable::new()),
        })
    }

    /// Create an empty scene.
    pub fn create_scene(self: &Arc<Self>, descriptor: &SceneDescriptor) -> ResourceResult<Scene> {
        self.globals.ensure_open("Scene")?;
        let native = self.globals.allocate("create scene", &NativeRequest::Scene)?;
        let inserted = self.table.lock().insert(SceneData { native });
        let handle = match inserted {
            Ok(handle) => handle,
            Err(err) => {
                discard_native(&self.globals, NativeKind::Scene, native);
                return Err(err);
            }
        };
        if let Some(label) = &descriptor.label {
            self.globals.names().set(handle.ident(), label);
        }
        log::trace!("Created {}", handle.ident());
        Ok(Resource::new(handle, self.clone()))
    }

    fn live_stub(
        &self,
        handle: ResourceHandle<markers::Scene>,
    ) -> ResourceResult<(ResourceStub, NativeHandle)> {
        let native = self.table.lock().get(handle)?.native;
        Ok((stub_for(&self.self_ref, self.scope(), handle), native))
    }

    /// Attach `child` natively and record the scene's dependency on it.
    /// Adding a child twice is a no-op.
    fn add_child(
        &self,
        handle: ResourceHandle<markers::Scene>,
        kind: NativeKind,
        child: &ResourceStub,
        child_native: NativeHandle,
    ) -> ResourceResult<()> {
        let (stub, native) = self.live_stub(handle)?;
        let tracker = self.globals.tracker();
        if tracker.depends_on(&stub, child)? {
            return Ok(());
        }
        self.globals
            .backend()
            .attach(native, kind, child_native)
            .map_err(|err| ResourceError::native("attach to scene", err))?;
        if let Err(err) = tracker.register_dependency(&stub, child) {
            if let Err(detach) = self.globals.backend().detach(native, kind, child_native) {
                log::error!("Failed to undo attach of {}: {}", child.ident(), detach);
            }
            return Err(err);
        }
        log::trace!("Added {} to {}", child.ident(), handle.ident());
        Ok(())
    }

    /// Detach `child` natively and drop the dependency. Removing a child that
    /// is not in the scene is a no-op.
    fn remove_child(
        &self,
        handle: ResourceHandle<markers::Scene>,
        kind: NativeKind,
        child: &ResourceStub,
        child_native: NativeHandle,
    ) -> ResourceResult<()> {
        let (stub, native) = self.live_stub(handle)?;
        let tracker = self.globals.tracker();
        if !tracker.depends_on(&stub, child)? {
            return Ok(());
        }
        self.globals
            .backend()
            .detach(native, kind, child_native)
            .map_err(|err| ResourceError::native("detach from scene", err))?;
        tracker.deregister_dependency(&stub, child)?;
        log::trace!("Removed {} from {}", child.ident(), handle.ident());
        Ok(())
    }

    /// Attach `instance`. Adding it twice is a no-op.
    pub fn add_model_instance(
        &self,
        handle: ResourceHandle<markers::Scene>,
        instance: &ModelInstance,
    ) -> ResourceResult<()> {
        let child_native = native_of(&self.globals, instance)?;
        self.add_child(handle, NativeKind::ModelInstance, &instance.stub()?, child_native)
    }

    /// Detach `instance` if attached.
    pub fn remove_model_instance(
        &self,
        handle: ResourceHandle<markers::Scene>,
        instance: &ModelInstance,
    ) -> ResourceResult<()> {
        let child_native = native_of(&self.globals, instance)?;
        self.remove_child(handle, NativeKind::ModelInstance, &instance.stub()?, child_native)
    }

    /// Attach `light`. Adding it twice is a no-op.
    pub fn add_light(&self, handle: ResourceHandle<markers::Scene>, light: &Light) -> ResourceResult<()> {
        let child_native = native_of(&self.globals, light)?;
        self.add_child(handle, NativeKind::Light, &light.stub()?, child_native)
    }

    /// Detach `light` if attached.
    pub fn remove_light(
        &self,
        handle: ResourceHandle<markers::Scene>,
        light: &Light,
    ) -> ResourceResult<()> {
        let child_native = native_of(&self.globals, light)?;
        self.remove_child(handle, NativeKind::Light, &light.stub()?, child_native)
    }

    /// Model instances in the scene, in the order they were added.
    pub fn model_instances(
        &self,
        handle: ResourceHandle<markers::Scene>,
    ) -> ResourceResult<Referents<'_, ModelInstance>> {
        let (stub, _) = self.live_stub(handle)?;
        self.globals
            .tracker()
            .targets_of_type::<ModelInstanceBuilder>(&stub)
    }

    /// Lights in the scene, in the order they were added.
    pub fn lights(&self, handle: ResourceHandle<markers::Scene>) -> ResourceResult<Referents<'_, Light>> {
        let (stub, _) = self.live_stub(handle)?;
        self.globals.tracker().targets_of_type::<LightBuilder>(&stub)
    }

    /// Detach every child of a scene that is about to be disposed.
    ///
    /// Each detached child is released from the scene straight away, so a
    /// failed pass can be retried. Returns the first failure after trying all.
    fn detach_all(&self, stub: &ResourceStub, native: NativeHandle) -> ResourceResult<()> {
        let children: Vec<ResourceStub> = {
            let view = self.globals.tracker().targets(stub)?;
            view.iter().collect::<ResourceResult<_>>()?
        };
        let mut first_error = None;
        for child in &children {
            if let Err(err) = self.detach_child(stub, native, child) {
                log::warn!("Failed to detach {} from {}: {}", child.ident(), stub.ident(), err);
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn detach_child(
        &self,
        stub: &ResourceStub,
        native: NativeHandle,
        child: &ResourceStub,
    ) -> ResourceResult<()> {
        let (kind, child_native) = if child.type_tag() == TypeTag::of::<markers::Light>() {
            let light = child.downcast::<LightBuilder>()?;
            (NativeKind::Light, native_of(&self.globals, &light)?)
        } else {
            let instance = child.downcast::<ModelInstanceBuilder>()?;
            (NativeKind::ModelInstance, native_of(&self.globals, &instance)?)
        };
        self.globals
            .backend()
            .detach(native, kind, child_native)
            .map_err(|err| ResourceError::native("detach from scene", err))?;
        self.globals.tracker().deregister_dependency(stub, child)
    }

    /// Number of live scenes.
    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    /// Whether no scene is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResourceProvider for SceneBuilder {
    type Kind = markers::Scene;

    fn is_disposed(&self, handle: ResourceHandle<markers::Scene>) -> bool {
        !self.table.lock().contains(handle)
    }

    fn dispose(&self, handle: ResourceHandle<markers::Scene>) -> ResourceResult<()> {
        let Ok((stub, native)) = self.live_stub(handle) else {
            return Ok(());
        };
        self.globals.ensure_disposal_open()?;
        self.globals.tracker().throw_for_premature_disposal(&stub)?;
        self.detach_all(&stub, native)?;
        let Some(data) = self.table.lock().remove(handle) else {
            return Ok(());
        };
        self.globals.release(&stub)?;
        log::trace!("Disposed {}", handle.ident());
        self.globals
            .schedule_teardown(handle.ident(), NativeKind::Scene, data.native)
    }

    fn name_store(&self) -> &NameStore {
        self.globals.names()
    }

    fn scope(&self) -> TrackerScope {
        self.globals.tracker().scope()
    }
}

impl NativeBacked for SceneBuilder {
    fn globals(&self) -> &Arc<FactoryGlobals> {
        &self.globals
    }

    fn native_handle(&self, handle: ResourceHandle<markers::Scene>) -> ResourceResult<NativeHandle> {
        Ok(self.table.lock().get(handle)?.native)
    }
}

impl ManagedBuilder for SceneBuilder {
    fn live_handles(&self) -> Vec<RawHandle> {
        self.table.lock().raw_handles()
    }
}

impl Resource<SceneBuilder> {
    pub fn add_model_instance(&self, instance: &ModelInstance) -> ResourceResult<()> {
        self.provider()?.add_model_instance(self.handle()?, instance)
    }

    pub fn remove_model_instance(&self, instance: &ModelInstance) -> ResourceResult<()> {
        self.provider()?.remove_model_instance(self.handle()?, instance)
    }

    pub fn add_light(&self, light: &Light) -> ResourceResult<()> {
        self.provider()?.add_light(self.handle()?, light)
    }

    pub fn remove_light(&self, light: &Light) -> ResourceResult<()> {
        self.provider()?.remove_light(self.handle()?, light)
    }

    /// Attached model instances, in insertion order.
    pub fn model_instances(&self) -> ResourceResult<Vec<ModelInstance>> {
        let view = self.provider()?.model_instances(self.handle()?)?;
        view.iter().collect()
    }

    /// Attached lights, in insertion order.
    pub fn lights(&self) -> ResourceResult<Vec<Light>> {
        let view = self.provider()?.lights(self.handle()?)?;
        view.iter().collect()
    }
}
