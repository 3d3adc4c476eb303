//! Model instances: a mesh drawn with a material.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::backend::{NativeHandle, NativeKind, NativeRequest};
use crate::builders::material::MaterialBuilder;
use crate::builders::mesh::MeshBuilder;
use crate::builders::{
    ManagedBuilder, NativeBacked, discard_native, ensure_same_factory, link_dependencies,
    native_of, stub_for,
};
use crate::error::{ResourceError, ResourceResult};
use crate::globals::FactoryGlobals;
use crate::resource::table::ResourceTable;
use crate::resource::{
    NameStore, RawHandle, Resource, ResourceHandle, ResourceProvider, ResourceStub,
    TrackerScope, markers,
};
use crate::{Material, Mesh, ModelInstance};

/// Descriptor for creating a model instance.
#[derive(Debug, Clone)]
pub struct ModelInstanceDescriptor<'a> {
    pub label: Option<String>,
    pub mesh: &'a Mesh,
    pub material: &'a Material,
}

impl<'a> ModelInstanceDescriptor<'a> {
    pub fn new(mesh: &'a Mesh, material: &'a Material) -> Self {
        Self {
            label: None,
            mesh,
            material,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

struct InstanceData {
    native: NativeHandle,
}

/// Provider of [`ModelInstance`] resources.
///
/// Every instance depends on its mesh and its material.
pub struct ModelInstanceBuilder {
    globals: Arc<FactoryGlobals>,
    self_ref: Weak<Self>,
    table: Mutex<ResourceTable<markers::ModelInstance, InstanceData>>,
}

impl ModelInstanceBuilder {
    pub(crate) fn new(globals: Arc<FactoryGlobals>) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            globals,
            self_ref: self_ref.clone(),
            table: Mutex::new(ResourceTable::new()),
        })
    }

    /// Create an instance drawing the descriptor's mesh with its material.
    pub fn create_model_instance(
        self: &Arc<Self>,
        descriptor: &ModelInstanceDescriptor<'_>,
    ) -> ResourceResult<ModelInstance> {
        self.globals.ensure_open("ModelInstance")?;
        let meshes = descriptor.mesh.provider()?;
        ensure_same_factory(&self.globals, meshes.globals(), "Mesh")?;
        let draw = meshes.draw(descriptor.mesh.handle()?)?;
        let material = native_of(&self.globals, descriptor.material)?;
        let targets = [descriptor.mesh.stub()?, descriptor.material.stub()?];

        let native = self.globals.allocate(
            "create model instance",
            &NativeRequest::ModelInstance {
                vertex_buffer: draw.vertex_buffer,
                index_buffer: draw.index_buffer,
                first_index: draw.range.first_index,
                index_count: draw.range.index_count,
                material,
            },
        )?;
        let inserted = self.table.lock().insert(InstanceData { native });
        let handle = match inserted {
            Ok(handle) => handle,
            Err(err) => {
                discard_native(&self.globals, NativeKind::ModelInstance, native);
                return Err(err);
            }
        };

        let stub = stub_for(&self.self_ref, self.scope(), handle);
        if let Err(err) = link_dependencies(&self.globals, &stub, &targets) {
            self.table.lock().remove(handle);
            discard_native(&self.globals, NativeKind::ModelInstance, native);
            return Err(err);
        }
        if let Some(label) = &descriptor.label {
            self.globals.names().set(handle.ident(), label);
        }
        log::trace!(
            "Created {} drawing {} with {}",
            handle.ident(),
            descriptor.mesh.ident(),
            descriptor.material.ident()
        );
        Ok(Resource::new(handle, self.clone()))
    }

    fn live_stub(
        &self,
        handle: ResourceHandle<markers::ModelInstance>,
    ) -> ResourceResult<(ResourceStub, NativeHandle)> {
        let native = self.table.lock().get(handle)?.native;
        Ok((stub_for(&self.self_ref, self.scope(), handle), native))
    }

    /// Mesh drawn by `handle`.
    pub fn mesh_of(&self, handle: ResourceHandle<markers::ModelInstance>) -> ResourceResult<Mesh> {
        let (stub, _) = self.live_stub(handle)?;
        self.globals
            .tracker()
            .nth_target_of_type::<MeshBuilder>(&stub, 0)
    }

    /// Material `handle` is drawn with.
    pub fn material_of(
        &self,
        handle: ResourceHandle<markers::ModelInstance>,
    ) -> ResourceResult<Material> {
        let (stub, _) = self.live_stub(handle)?;
        self.globals
            .tracker()
            .nth_target_of_type::<MaterialBuilder>(&stub, 0)
    }

    /// Draw `handle` with `material` from now on, moving the dependency edge.
    pub fn set_material(
        &self,
        handle: ResourceHandle<markers::ModelInstance>,
        material: &Material,
    ) -> ResourceResult<()> {
        let (stub, native) = self.live_stub(handle)?;
        let material_native = native_of(&self.globals, material)?;
        let previous = self.material_of(handle)?;
        if previous == *material {
            return Ok(());
        }

        let tracker = self.globals.tracker();
        tracker.register_dependency(&stub, material)?;
        if let Err(err) = self
            .globals
            .backend()
            .set_instance_material(native, material_native)
        {
            tracker.deregister_dependency(&stub, material)?;
            return Err(ResourceError::native("set instance material", err));
        }
        tracker.deregister_dependency(&stub, &previous)?;
        log::trace!(
            "{} now uses {} instead of {}",
            handle.ident(),
            material.ident(),
            previous.ident()
        );
        Ok(())
    }

    /// Number of live model instances.
    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    /// Whether no model instance is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResourceProvider for ModelInstanceBuilder {
    type Kind = markers::ModelInstance;

    fn is_disposed(&self, handle: ResourceHandle<markers::ModelInstance>) -> bool {
        !self.table.lock().contains(handle)
    }

    fn dispose(&self, handle: ResourceHandle<markers::ModelInstance>) -> ResourceResult<()> {
        if self.is_disposed(handle) {
            return Ok(());
        }
        let stub = stub_for(&self.self_ref, self.scope(), handle);
        self.globals.ensure_disposal_open()?;
        self.globals.tracker().throw_for_premature_disposal(&stub)?;
        let Some(data) = self.table.lock().remove(handle) else {
            return Ok(());
        };
        self.globals.release(&stub)?;
        log::trace!("Disposed {}", handle.ident());
        self.globals
            .schedule_teardown(handle.ident(), NativeKind::ModelInstance, data.native)
    }

    fn name_store(&self) -> &NameStore {
        self.globals.names()
    }

    fn scope(&self) -> TrackerScope {
        self.globals.tracker().scope()
    }
}

impl NativeBacked for ModelInstanceBuilder {
    fn globals(&self) -> &Arc<FactoryGlobals> {
        &self.globals
    }

    fn native_handle(
        &self,
        handle: ResourceHandle<markers::ModelInstance>,
    ) -> ResourceResult<NativeHandle> {
        Ok(self.table.lock().get(handle)?.native)
    }
}

impl ManagedBuilder for ModelInstanceBuilder {
    fn live_handles(&self) -> Vec<RawHandle> {
        self.table.lock().raw_handles()
    }
}

impl Resource<ModelInstanceBuilder> {
    /// Mesh drawn by this instance.
    pub fn mesh(&self) -> ResourceResult<Mesh> {
        self.provider()?.mesh_of(self.handle()?)
    }

    /// Current material.
    pub fn material(&self) -> ResourceResult<Material> {
        self.provider()?.material_of(self.handle()?)
    }

    /// Swap the material, moving the dependency edge with it.
    pub fn set_material(&self, material: &Material) -> ResourceResult<()> {
        self.provider()?.set_material(self.handle()?, material)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::material::MaterialDescriptor;
    use crate::builders::mesh::{MeshDescriptor, MeshTriangle, MeshVertex};
    use crate::error::ErrorKind;
    use crate::globals::test_support::dummy_globals;

    struct Fixture {
        globals: Arc<FactoryGlobals>,
        meshes: Arc<MeshBuilder>,
        materials: Arc<MaterialBuilder>,
        instances: Arc<ModelInstanceBuilder>,
    }

    impl Fixture {
        fn new() -> Self {
            let (_, globals) = dummy_globals();
            Self {
                meshes: MeshBuilder::new(globals.clone()),
                materials: MaterialBuilder::new(globals.clone()),
                instances: ModelInstanceBuilder::new(globals.clone()),
                globals,
            }
        }

        fn mesh(&self) -> Mesh {
            let vertices = [MeshVertex::default(); 3];
            let triangles = [MeshTriangle::new(0, 1, 2)];
            self.meshes
                .create_mesh(&MeshDescriptor::new(&vertices, &triangles).with_label("Triangle"))
                .unwrap()
        }

        fn material(&self, label: &str) -> Material {
            self.materials
                .create_material(&MaterialDescriptor::new(&[]).with_label(label))
                .unwrap()
        }
    }

    #[test]
    fn test_instance_blocks_mesh_and_material() {
        let fixture = Fixture::new();
        let mesh = fixture.mesh();
        let material = fixture.material("Steel");
        let instance = fixture
            .instances
            .create_model_instance(&ModelInstanceDescriptor::new(&mesh, &material))
            .unwrap();

        assert_eq!(instance.mesh().unwrap(), mesh);
        assert_eq!(instance.material().unwrap(), material);
        assert_eq!(
            mesh.dispose().unwrap_err().kind(),
            ErrorKind::DependencyViolation
        );
        assert_eq!(
            material.dispose().unwrap_err().kind(),
            ErrorKind::DependencyViolation
        );

        instance.dispose().unwrap();
        mesh.dispose().unwrap();
        material.dispose().unwrap();
        assert_eq!(fixture.globals.tracker().edge_count(), 0);
    }

    #[test]
    fn test_set_material_moves_edge() {
        let fixture = Fixture::new();
        let mesh = fixture.mesh();
        let steel = fixture.material("Steel");
        let glass = fixture.material("Glass");
        let instance = fixture
            .instances
            .create_model_instance(&ModelInstanceDescriptor::new(&mesh, &steel))
            .unwrap();

        instance.set_material(&glass).unwrap();
        assert_eq!(instance.material().unwrap(), glass);
        steel.dispose().unwrap();
        assert_eq!(
            glass.dispose().unwrap_err().kind(),
            ErrorKind::DependencyViolation
        );

        instance.set_material(&glass).unwrap();
        assert_eq!(fixture.globals.tracker().edge_count(), 2);
    }

    #[test]
    fn test_disposed_mesh_is_rejected() {
        let fixture = Fixture::new();
        let mesh = fixture.mesh();
        let material = fixture.material("Steel");
        mesh.dispose().unwrap();
        let err = fixture
            .instances
            .create_model_instance(&ModelInstanceDescriptor::new(&mesh, &material))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Disposed);
        assert!(fixture.instances.is_empty());
    }
}
