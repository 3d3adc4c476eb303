//! RGBA8 textures.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::Texture;
use crate::backend::{NativeHandle, NativeKind, NativeRequest};
use crate::builders::{ManagedBuilder, NativeBacked, discard_native, stub_for};
use crate::error::{ResourceError, ResourceResult};
use crate::globals::FactoryGlobals;
use crate::resource::table::ResourceTable;
use crate::resource::{
    NameStore, RawHandle, Resource, ResourceHandle, ResourceProvider, TrackerScope, markers,
};

/// Bytes per RGBA8 texel.
pub const BYTES_PER_TEXEL: usize = 4;

/// Descriptor for creating a texture from tightly packed RGBA8 texels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureDescriptor<'a> {
    pub label: Option<String>,
    pub width: u32,
    pub height: u32,
    pub texels: &'a [u8],
}

impl<'a> TextureDescriptor<'a> {
    pub fn new(width: u32, height: u32, texels: &'a [u8]) -> Self {
        Self {
            label: None,
            width,
            height,
            texels,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    fn validate(&self) -> ResourceResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(ResourceError::InvalidParameter(format!(
                "texture size must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        let expected = (self.width as usize)
            .checked_mul(self.height as usize)
            .and_then(|texels| texels.checked_mul(BYTES_PER_TEXEL))
            .ok_or_else(|| {
                ResourceError::InvalidParameter(format!(
                    "texture size {}x{} overflows",
                    self.width, self.height
                ))
            })?;
        if self.texels.len() != expected {
            return Err(ResourceError::InvalidParameter(format!(
                "{}x{} RGBA8 texture needs {} bytes, got {}",
                self.width,
                self.height,
                expected,
                self.texels.len()
            )));
        }
        Ok(())
    }
}

struct TextureData {
    native: NativeHandle,
    width: u32,
    height: u32,
}

/// Provider of [`Texture`] resources.
pub struct TextureBuilder {
    globals: Arc<FactoryGlobals>,
    self_ref: Weak<Self>,
    table: Mutex<ResourceTable<markers::Texture, TextureData>>,
}

impl TextureBuilder {
    pub(crate) fn new(globals: Arc<FactoryGlobals>) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            globals,
            self_ref: self_ref.clone(),
            table: Mutex::new(ResourceTable::new()),
        })
    }

    /// Create a texture from RGBA8 texels.
    pub fn create_texture(
        self: &Arc<Self>,
        descriptor: &TextureDescriptor<'_>,
    ) -> ResourceResult<Texture> {
        self.globals.ensure_open("Texture")?;
        descriptor.validate()?;
        let native = self.globals.allocate(
            "create texture",
            &NativeRequest::Texture {
                width: descriptor.width,
                height: descriptor.height,
                texels: descriptor.texels,
            },
        )?;
        let inserted = self.table.lock().insert(TextureData {
            native,
            width: descriptor.width,
            height: descriptor.height,
        });
        let handle = match inserted {
            Ok(handle) => handle,
            Err(err) => {
                discard_native(&self.globals, NativeKind::Texture, native);
                return Err(err);
            }
        };
        if let Some(label) = &descriptor.label {
            self.globals.names().set(handle.ident(), label);
        }
        log::trace!(
            "Created {} ({}x{})",
            handle.ident(),
            descriptor.width,
            descriptor.height
        );
        Ok(Resource::new(handle, self.clone()))
    }

    /// Texture size as `(width, height)`.
    pub fn size(&self, handle: ResourceHandle<markers::Texture>) -> ResourceResult<(u32, u32)> {
        let table = self.table.lock();
        let data = table.get(handle)?;
        Ok((data.width, data.height))
    }

    /// Number of live textures.
    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    /// Whether no texture is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResourceProvider for TextureBuilder {
    type Kind = markers::Texture;

    fn is_disposed(&self, handle: ResourceHandle<markers::Texture>) -> bool {
        !self.table.lock().contains(handle)
    }

    fn dispose(&self, handle: ResourceHandle<markers::Texture>) -> ResourceResult<()> {
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
            .schedule_teardown(handle.ident(), NativeKind::Texture, data.native)
    }

    fn name_store(&self) -> &NameStore {
        self.globals.names()
    }

    fn scope(&self) -> TrackerScope {
        self.globals.tracker().scope()
    }
}

impl NativeBacked for TextureBuilder {
    fn globals(&self) -> &Arc<FactoryGlobals> {
        &self.globals
    }

    fn native_handle(&self, handle: ResourceHandle<markers::Texture>) -> ResourceResult<NativeHandle> {
        Ok(self.table.lock().get(handle)?.native)
    }
}

impl ManagedBuilder for TextureBuilder {
    fn live_handles(&self) -> Vec<RawHandle> {
        self.table.lock().raw_handles()
    }
}

impl Resource<TextureBuilder> {
    /// Width and height in texels.
    pub fn size(&self) -> ResourceResult<(u32, u32)> {
        self.provider()?.size(self.handle()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::globals::test_support::dummy_globals;

    #[test]
    fn test_create_texture() {
        let (backend, globals) = dummy_globals();
        let builder = TextureBuilder::new(globals);
        let texels = [255u8; 2 * 2 * BYTES_PER_TEXEL];
        let texture = builder
            .create_texture(&TextureDescriptor::new(2, 2, &texels).with_label("Checker"))
            .unwrap();
        assert_eq!(texture.size().unwrap(), (2, 2));
        assert_eq!(texture.name().unwrap(), "Checker");
        assert_eq!(backend.live_count_of(NativeKind::Texture), 1);
    }

    #[test]
    fn test_texel_count_must_match_size() {
        let (backend, globals) = dummy_globals();
        let builder = TextureBuilder::new(globals);
        let texels = [0u8; 15];
        let err = builder
            .create_texture(&TextureDescriptor::new(2, 2, &texels))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
        assert!(
            builder
                .create_texture(&TextureDescriptor::new(0, 2, &[]))
                .is_err()
        );
        assert_eq!(backend.live_count(), 0);
    }

    #[test]
    fn test_handles_are_not_reused() {
        let (_, globals) = dummy_globals();
        let builder = TextureBuilder::new(globals);
        let texels = [0u8; BYTES_PER_TEXEL];
        let first = builder
            .create_texture(&TextureDescriptor::new(1, 1, &texels))
            .unwrap();
        first.dispose().unwrap();
        let second = builder
            .create_texture(&TextureDescriptor::new(1, 1, &texels))
            .unwrap();
        assert_ne!(first.ident(), second.ident());
        assert!(first.is_disposed().unwrap());
        assert!(!second.is_disposed().unwrap());
    }
}
