//! Light sources.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::Light;
use crate::backend::{NativeHandle, NativeKind, NativeRequest};
use crate::builders::{ManagedBuilder, NativeBacked, discard_native, stub_for};
use crate::error::ResourceResult;
use crate::globals::FactoryGlobals;
use crate::resource::table::ResourceTable;
use crate::resource::{
    NameStore, RawHandle, Resource, ResourceHandle, ResourceProvider, TrackerScope, markers,
};

/// Type of light source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightKind {
    Point,
    Spot,
    Directional,
}

/// Descriptor for creating a light.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LightDescriptor {
    pub label: Option<String>,
    pub kind: LightKind,
}

impl LightDescriptor {
    /// Descriptor for a light of `kind`.
    pub fn new(kind: LightKind) -> Self {
        Self { label: None, kind }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

struct LightData {
    native: NativeHandle,
    kind: LightKind,
}

/// Provider of [`Light`] resources.
pub struct LightBuilder {
    globals: Arc<FactoryGlobals>,
    self_ref: Weak<Self>,
    table: Mutex<ResourceTable<markers::Light, LightData>>,
}

impl LightBuilder {
    pub(crate) fn new(globals: Arc<FactoryGlobals>) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            globals,
            self_ref: self_ref.clone(),
            table: Mutex::new(ResourceTable::new()),
        })
    }

    /// Create a light from `descriptor`.
    pub fn create_light(self: &Arc<Self>, descriptor: &LightDescriptor) -> ResourceResult<Light> {
        self.globals.ensure_open("Light")?;
        let native = self.globals.allocate(
            "create light",
            &NativeRequest::Light {
                kind: descriptor.kind,
            },
        )?;
        let inserted = self.table.lock().insert(LightData {
            native,
            kind: descriptor.kind,
        });
        let handle = match inserted {
            Ok(handle) => handle,
            Err(err) => {
                discard_native(&self.globals, NativeKind::Light, native);
                return Err(err);
            }
        };
        if let Some(label) = &descriptor.label {
            self.globals.names().set(handle.ident(), label);
        }
        log::trace!("Created {} ({:?})", handle.ident(), descriptor.kind);
        Ok(Resource::new(handle, self.clone()))
    }

    /// Type of a light.
    pub fn kind(&self, handle: ResourceHandle<markers::Light>) -> ResourceResult<LightKind> {
        Ok(self.table.lock().get(handle)?.kind)
    }

    /// Number of live lights.
    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    /// Whether no light is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResourceProvider for LightBuilder {
    type Kind = markers::Light;

    fn is_disposed(&self, handle: ResourceHandle<markers::Light>) -> bool {
        !self.table.lock().contains(handle)
    }

    fn dispose(&self, handle: ResourceHandle<markers::Light>) -> ResourceResult<()> {
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
            .schedule_teardown(handle.ident(), NativeKind::Light, data.native)
    }

    fn name_store(&self) -> &NameStore {
        self.globals.names()
    }

    fn scope(&self) -> TrackerScope {
        self.globals.tracker().scope()
    }
}

impl NativeBacked for LightBuilder {
    fn globals(&self) -> &Arc<FactoryGlobals> {
        &self.globals
    }

    fn native_handle(&self, handle: ResourceHandle<markers::Light>) -> ResourceResult<NativeHandle> {
        Ok(self.table.lock().get(handle)?.native)
    }
}

impl ManagedBuilder for LightBuilder {
    fn live_handles(&self) -> Vec<RawHandle> {
        self.table.lock().raw_handles()
    }
}

impl Resource<LightBuilder> {
    /// Type of this light.
    pub fn kind(&self) -> ResourceResult<LightKind> {
        self.provider()?.kind(self.handle()?)
    }
}
