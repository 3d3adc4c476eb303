//! Presentation windows.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::Window;
use crate::backend::{NativeHandle, NativeKind, NativeRequest};
use crate::builders::{ManagedBuilder, NativeBacked, discard_native, stub_for};
use crate::error::{ResourceError, ResourceResult};
use crate::globals::FactoryGlobals;
use crate::resource::table::ResourceTable;
use crate::resource::{
    NameStore, RawHandle, Resource, ResourceHandle, ResourceProvider, TrackerScope, markers,
};

/// Descriptor for creating a window.
///
/// The title doubles as the resource name unless a label is given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowDescriptor {
    pub label: Option<String>,
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl WindowDescriptor {
    pub fn new(title: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            label: None,
            title: title.into(),
            width,
            height,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

struct WindowData {
    native: NativeHandle,
    width: u32,
    height: u32,
}

/// Provider of [`Window`] resources.
pub struct WindowBuilder {
    globals: Arc<FactoryGlobals>,
    self_ref: Weak<Self>,
    table: Mutex<ResourceTable<markers::Window, WindowData>>,
}

impl WindowBuilder {
    pub(crate) fn new(globals: Arc<FactoryGlobals>) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            globals,
            self_ref: self_ref.clone(),
            table: Mutex::new(ResourceTable::new()),
        })
    }

    /// Open a window.
    pub fn create_window(self: &Arc<Self>, descriptor: &WindowDescriptor) -> ResourceResult<Window> {
        self.globals.ensure_open("Window")?;
        if descriptor.width == 0 || descriptor.height == 0 {
            return Err(ResourceError::InvalidParameter(format!(
                "window size must be non-zero, got {}x{}",
                descriptor.width, descriptor.height
            )));
        }
        let native = self.globals.allocate(
            "create window",
            &NativeRequest::Window {
                title: &descriptor.title,
                width: descriptor.width,
                height: descriptor.height,
            },
        )?;
        let inserted = self.table.lock().insert(WindowData {
            native,
            width: descriptor.width,
            height: descriptor.height,
        });
        let handle = match inserted {
            Ok(handle) => handle,
            Err(err) => {
                discard_native(&self.globals, NativeKind::Window, native);
                return Err(err);
            }
        };
        let name = descriptor.label.as_deref().unwrap_or(&descriptor.title);
        self.globals.names().set(handle.ident(), name);
        log::trace!(
            "Created {} ({}x{})",
            handle.ident(),
            descriptor.width,
            descriptor.height
        );
        Ok(Resource::new(handle, self.clone()))
    }

    /// Client area size as `(width, height)`.
    pub fn size(&self, handle: ResourceHandle<markers::Window>) -> ResourceResult<(u32, u32)> {
        let table = self.table.lock();
        let data = table.get(handle)?;
        Ok((data.width, data.height))
    }

    /// Number of live windows.
    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    /// Whether no window is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResourceProvider for WindowBuilder {
    type Kind = markers::Window;

    fn is_disposed(&self, handle: ResourceHandle<markers::Window>) -> bool {
        !self.table.lock().contains(handle)
    }

    fn dispose(&self, handle: ResourceHandle<markers::Window>) -> ResourceResult<()> {
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
            .schedule_teardown(handle.ident(), NativeKind::Window, data.native)
    }

    fn name_store(&self) -> &NameStore {
        self.globals.names()
    }

    fn scope(&self) -> TrackerScope {
        self.globals.tracker().scope()
    }
}

impl NativeBacked for WindowBuilder {
    fn globals(&self) -> &Arc<FactoryGlobals> {
        &self.globals
    }

    fn native_handle(&self, handle: ResourceHandle<markers::Window>) -> ResourceResult<NativeHandle> {
        Ok(self.table.lock().get(handle)?.native)
    }
}

impl ManagedBuilder for WindowBuilder {
    fn live_handles(&self) -> Vec<RawHandle> {
        self.table.lock().raw_handles()
    }
}

impl Resource<WindowBuilder> {
    /// Client area size in pixels.
    pub fn size(&self) -> ResourceResult<(u32, u32)> {
        self.provider()?.size(self.handle()?)
    }
}
