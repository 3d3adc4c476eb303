//! Materials and their texture dependencies.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::backend::{NativeHandle, NativeKind, NativeRequest};
use crate::builders::texture::TextureBuilder;
use crate::builders::{
    ManagedBuilder, NativeBacked, discard_native, link_dependencies, native_of, stub_for,
};
use crate::error::ResourceResult;
use crate::globals::FactoryGlobals;
use crate::resource::table::ResourceTable;
use crate::resource::{
    NameStore, RawHandle, Referents, Resource, ResourceHandle, ResourceProvider, ResourceStub,
    TrackerScope, markers,
};
use crate::{Material, Texture};

/// Descriptor for creating a material.
///
/// A material holds a dependency on every texture it samples, so none of
/// them can be disposed while the material is live.
#[derive(Debug, Clone, Default)]
pub struct MaterialDescriptor<'a> {
    pub label: Option<String>,
    pub textures: &'a [Texture],
}

impl<'a> MaterialDescriptor<'a> {
    pub fn new(textures: &'a [Texture]) -> Self {
        Self {
            label: None,
            textures,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

struct MaterialData {
    native: NativeHandle,
}

/// Provider of [`Material`] resources.
pub struct MaterialBuilder {
    globals: Arc<FactoryGlobals>,
    self_ref: Weak<Self>,
    table: Mutex<ResourceTable<markers::Material, MaterialData>>,
}

impl MaterialBuilder {
    pub(crate) fn new(globals: Arc<FactoryGlobals>) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            globals,
            self_ref: self_ref.clone(),
            table: Mutex::new(ResourceTable::new()),
        })
    }

    /// Create a material sampling the descriptor's textures.
    pub fn create_material(
        self: &Arc<Self>,
        descriptor: &MaterialDescriptor<'_>,
    ) -> ResourceResult<Material> {
        self.globals.ensure_open("Material")?;
        let mut natives = Vec::with_capacity(descriptor.textures.len());
        let mut stubs = Vec::with_capacity(descriptor.textures.len());
        for texture in descriptor.textures {
            natives.push(native_of(&self.globals, texture)?);
            stubs.push(texture.stub()?);
        }

        let native = self.globals.allocate(
            "create material",
            &NativeRequest::Material { textures: &natives },
        )?;
        let inserted = self.table.lock().insert(MaterialData { native });
        let handle = match inserted {
            Ok(handle) => handle,
            Err(err) => {
                discard_native(&self.globals, NativeKind::Material, native);
                return Err(err);
            }
        };

        let stub = stub_for(&self.self_ref, self.scope(), handle);
        if let Err(err) = link_dependencies(&self.globals, &stub, &stubs) {
            self.table.lock().remove(handle);
            discard_native(&self.globals, NativeKind::Material, native);
            return Err(err);
        }
        if let Some(label) = &descriptor.label {
            self.globals.names().set(handle.ident(), label);
        }
        log::trace!("Created {} with {} textures", handle.ident(), stubs.len());
        Ok(Resource::new(handle, self.clone()))
    }

    /// Textures sampled by `handle`, in creation order.
    pub fn textures(
        &self,
        handle: ResourceHandle<markers::Material>,
    ) -> ResourceResult<Referents<'_, Texture>> {
        let stub = self.live_stub(handle)?;
        self.globals
            .tracker()
            .targets_of_type::<TextureBuilder>(&stub)
    }

    fn live_stub(&self, handle: ResourceHandle<markers::Material>) -> ResourceResult<ResourceStub> {
        self.table.lock().get(handle)?;
        Ok(stub_for(&self.self_ref, self.scope(), handle))
    }

    /// Number of live materials.
    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    /// Whether no material is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResourceProvider for MaterialBuilder {
    type Kind = markers::Material;

    fn is_disposed(&self, handle: ResourceHandle<markers::Material>) -> bool {
        !self.table.lock().contains(handle)
    }

    fn dispose(&self, handle: ResourceHandle<markers::Material>) -> ResourceResult<()> {
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
            .schedule_teardown(handle.ident(), NativeKind::Material, data.native)
    }

    fn name_store(&self) -> &NameStore {
        self.globals.names()
    }

    fn scope(&self) -> TrackerScope {
        self.globals.tracker().scope()
    }
}

impl NativeBacked for MaterialBuilder {
    fn globals(&self) -> &Arc<FactoryGlobals> {
        &self.globals
    }

    fn native_handle(&self, handle: ResourceHandle<markers::Material>) -> ResourceResult<NativeHandle> {
        Ok(self.table.lock().get(handle)?.native)
    }
}

impl ManagedBuilder for MaterialBuilder {
    fn live_handles(&self) -> Vec<RawHandle> {
        self.table.lock().raw_handles()
    }
}

impl Resource<MaterialBuilder> {
    /// Textures sampled by this material, collected into a `Vec`.
    pub fn textures(&self) -> ResourceResult<Vec<Texture>> {
        let provider = self.provider()?;
        let view = provider.textures(self.handle()?)?;
        view.iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::texture::TextureDescriptor;
    use crate::error::ErrorKind;
    use crate::globals::test_support::dummy_globals;

    fn texture(builder: &Arc<TextureBuilder>, label: &str) -> Texture {
        builder
            .create_texture(&TextureDescriptor::new(1, 1, &[0; 4]).with_label(label))
            .unwrap()
    }

    #[test]
    fn test_material_pins_its_textures() {
        let (_, globals) = dummy_globals();
        let textures = TextureBuilder::new(globals.clone());
        let materials = MaterialBuilder::new(globals.clone());
        let albedo = texture(&textures, "Albedo");
        let normal = texture(&textures, "Normal");

        let material = materials
            .create_material(
                &MaterialDescriptor::new(&[albedo.clone(), normal.clone()]).with_label("Brick"),
            )
            .unwrap();
        assert_eq!(material.textures().unwrap(), vec![albedo.clone(), normal.clone()]);

        let err = albedo.dispose().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DependencyViolation);
        assert_eq!(
            err.to_string(),
            "cannot dispose Texture 'Albedo' while it is in use by: Material 'Brick'"
        );
        assert!(!albedo.is_disposed().unwrap());

        material.dispose().unwrap();
        albedo.dispose().unwrap();
        normal.dispose().unwrap();
        assert_eq!(globals.tracker().edge_count(), 0);
    }

    #[test]
    fn test_disposed_texture_is_rejected() {
        let (backend, globals) = dummy_globals();
        let textures = TextureBuilder::new(globals.clone());
        let materials = MaterialBuilder::new(globals);
        let albedo = texture(&textures, "Albedo");
        albedo.dispose().unwrap();

        let err = materials
            .create_material(&MaterialDescriptor::new(&[albedo]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Disposed);
        assert_eq!(backend.live_count_of(NativeKind::Material), 0);
    }

    #[test]
    fn test_texture_from_other_factory_is_rejected() {
        let (_, globals) = dummy_globals();
        let (_, other_globals) = dummy_globals();
        let foreign = texture(&TextureBuilder::new(other_globals), "Foreign");
        let materials = MaterialBuilder::new(globals);
        let err = materials
            .create_material(&MaterialDescriptor::new(&[foreign]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
    }
}
