//! Application loops that pace frames.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::ApplicationLoop;
use crate::backend::{NativeHandle, NativeKind, NativeRequest};
use crate::builders::{ManagedBuilder, NativeBacked, discard_native, stub_for};
use crate::error::{ResourceError, ResourceResult};
use crate::globals::FactoryGlobals;
use crate::resource::table::ResourceTable;
use crate::resource::{
    NameStore, RawHandle, Resource, ResourceHandle, ResourceProvider, TrackerScope, markers,
};

/// Descriptor for creating an application loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplicationLoopDescriptor {
    pub label: Option<String>,
    /// Maximum frames per second, `None` for uncapped.
    pub frame_rate_cap: Option<u32>,
}

impl ApplicationLoopDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_frame_rate_cap(mut self, frames_per_second: u32) -> Self {
        self.frame_rate_cap = Some(frames_per_second);
        self
    }
}

struct LoopData {
    native: NativeHandle,
    frame_rate_cap: Option<u32>,
    iterations: u64,
}

/// Provider of [`ApplicationLoop`] resources.
pub struct ApplicationLoopBuilder {
    globals: Arc<FactoryGlobals>,
    self_ref: Weak<Self>,
    table: Mutex<ResourceTable<markers::ApplicationLoop, LoopData>>,
}

impl ApplicationLoopBuilder {
    pub(crate) fn new(globals: Arc<FactoryGlobals>) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            globals,
            self_ref: self_ref.clone(),
            table: Mutex::new(ResourceTable::new()),
        })
    }

    /// Create an application loop.
    pub fn create_loop(
        self: &Arc<Self>,
        descriptor: &ApplicationLoopDescriptor,
    ) -> ResourceResult<ApplicationLoop> {
        self.globals.ensure_open("ApplicationLoop")?;
        if descriptor.frame_rate_cap == Some(0) {
            return Err(ResourceError::InvalidParameter(
                "frame rate cap must be greater than zero".to_string(),
            ));
        }
        let native = self.globals.allocate(
            "create application loop",
            &NativeRequest::ApplicationLoop {
                frame_rate_cap: descriptor.frame_rate_cap,
            },
        )?;
        let inserted = self.table.lock().insert(LoopData {
            native,
            frame_rate_cap: descriptor.frame_rate_cap,
            iterations: 0,
        });
        let handle = match inserted {
            Ok(handle) => handle,
            Err(err) => {
                discard_native(&self.globals, NativeKind::ApplicationLoop, native);
                return Err(err);
            }
        };
        if let Some(label) = &descriptor.label {
            self.globals.names().set(handle.ident(), label);
        }
        log::trace!("Created {}", handle.ident());
        Ok(Resource::new(handle, self.clone()))
    }

    /// Frame rate cap, if any.
    pub fn frame_rate_cap(
        &self,
        handle: ResourceHandle<markers::ApplicationLoop>,
    ) -> ResourceResult<Option<u32>> {
        Ok(self.table.lock().get(handle)?.frame_rate_cap)
    }

    /// Change or clear the frame rate cap.
    pub fn set_frame_rate_cap(
        &self,
        handle: ResourceHandle<markers::ApplicationLoop>,
        frame_rate_cap: Option<u32>,
    ) -> ResourceResult<()> {
        if frame_rate_cap == Some(0) {
            return Err(ResourceError::InvalidParameter(
                "frame rate cap must be greater than zero".to_string(),
            ));
        }
        self.table.lock().get_mut(handle)?.frame_rate_cap = frame_rate_cap;
        Ok(())
    }

    /// Run one loop iteration. Returns the total iteration count.
    pub fn iterate_once(&self, handle: ResourceHandle<markers::ApplicationLoop>) -> ResourceResult<u64> {
        let mut table = self.table.lock();
        let data = table.get_mut(handle)?;
        data.iterations += 1;
        Ok(data.iterations)
    }

    /// Number of completed iterations.
    pub fn iteration_count(
        &self,
        handle: ResourceHandle<markers::ApplicationLoop>,
    ) -> ResourceResult<u64> {
        Ok(self.table.lock().get(handle)?.iterations)
    }

    /// Number of live application loops.
    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    /// Whether no application loop is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResourceProvider for ApplicationLoopBuilder {
    type Kind = markers::ApplicationLoop;

    fn is_disposed(&self, handle: ResourceHandle<markers::ApplicationLoop>) -> bool {
        !self.table.lock().contains(handle)
    }

    fn dispose(&self, handle: ResourceHandle<markers::ApplicationLoop>) -> ResourceResult<()> {
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
        log::trace!("Disposed {} after {} iterations", handle.ident(), data.iterations);
        self.globals
            .schedule_teardown(handle.ident(), NativeKind::ApplicationLoop, data.native)
    }

    fn name_store(&self) -> &NameStore {
        self.globals.names()
    }

    fn scope(&self) -> TrackerScope {
        self.globals.tracker().scope()
    }
}

impl NativeBacked for ApplicationLoopBuilder {
    fn globals(&self) -> &Arc<FactoryGlobals> {
        &self.globals
    }

    fn native_handle(
        &self,
        handle: ResourceHandle<markers::ApplicationLoop>,
    ) -> ResourceResult<NativeHandle> {
        Ok(self.table.lock().get(handle)?.native)
    }
}

impl ManagedBuilder for ApplicationLoopBuilder {
    fn live_handles(&self) -> Vec<RawHandle> {
        self.table.lock().raw_handles()
    }
}

impl Resource<ApplicationLoopBuilder> {
    pub fn frame_rate_cap(&self) -> ResourceResult<Option<u32>> {
        self.provider()?.frame_rate_cap(self.handle()?)
    }

    pub fn set_frame_rate_cap(&self, frame_rate_cap: Option<u32>) -> ResourceResult<()> {
        self.provider()?.set_frame_rate_cap(self.handle()?, frame_rate_cap)
    }

    /// Run one iteration, returning the new iteration count.
    pub fn iterate_once(&self) -> ResourceResult<u64> {
        self.provider()?.iterate_once(self.handle()?)
    }

    pub fn iteration_count(&self) -> ResourceResult<u64> {
        self.provider()?.iteration_count(self.handle()?)
    }
}
