//! State shared by every builder of one factory.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tether_core::FixedByteBufferPool;

use crate::backend::{NativeBackend, NativeHandle, NativeKind, NativeRequest};
use crate::config::ResourceConfig;
use crate::deferred::DeferredDisposalQueue;
use crate::error::{ResourceError, ResourceResult};
use crate::resource::{DependencyTracker, NameStore, ResourceIdent, ResourceStub};

/// Backend, tracker, disposal queue, names and staging memory of a factory.
pub(crate) struct FactoryGlobals {
    config: ResourceConfig,
    backend: Arc<dyn NativeBackend>,
    tracker: DependencyTracker,
    disposal: DeferredDisposalQueue,
    names: NameStore,
    staging: Mutex<FixedByteBufferPool>,
    shut_down: AtomicBool,
}

impl FactoryGlobals {
    pub(crate) fn new(
        config: ResourceConfig,
        backend: Arc<dyn NativeBackend>,
    ) -> ResourceResult<Self> {
        let disposal = DeferredDisposalQueue::new(backend.clone(), config.frames_in_flight)?;
        Ok(Self {
            tracker: DependencyTracker::new(config.dependency_list_capacity),
            staging: Mutex::new(FixedByteBufferPool::new(config.staging_buffer_bytes)),
            names: NameStore::new(),
            shut_down: AtomicBool::new(false),
            disposal,
            backend,
            config,
        })
    }

    pub(crate) fn config(&self) -> &ResourceConfig {
        &self.config
    }

    pub(crate) fn backend(&self) -> &dyn NativeBackend {
        self.backend.as_ref()
    }

    pub(crate) fn tracker(&self) -> &DependencyTracker {
        &self.tracker
    }

    pub(crate) fn disposal(&self) -> &DeferredDisposalQueue {
        &self.disposal
    }

    pub(crate) fn names(&self) -> &NameStore {
        &self.names
    }

    pub(crate) fn staging(&self) -> &Mutex<FixedByteBufferPool> {
        &self.staging
    }

    pub(crate) fn mark_shut_down(&self) {
        self.shut_down.store(true, Ordering::Release);
    }

    pub(crate) fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Fail if the factory no longer accepts new resources.
    pub(crate) fn ensure_open(&self, what: &'static str) -> ResourceResult<()> {
        if self.is_shut_down() {
            return Err(ResourceError::FactoryDisposed(what));
        }
        Ok(())
    }

    /// Allocate a native object, tagging failures with `operation`.
    pub(crate) fn allocate(
        &self,
        operation: &'static str,
        request: &NativeRequest<'_>,
    ) -> ResourceResult<NativeHandle> {
        self.backend
            .allocate(request)
            .map_err(|err| ResourceError::native(operation, err))
    }

    /// Fail if a disposal accepted now could not queue its native teardown.
    ///
    /// Shutdown is exempt: teardowns then fall back to immediate destruction.
    pub(crate) fn ensure_disposal_open(&self) -> ResourceResult<()> {
        if self.disposal.is_poisoned() && !self.is_shut_down() {
            return Err(ResourceError::QueuePoisoned);
        }
        Ok(())
    }

    /// Queue the native teardown of a disposed resource.
    ///
    /// A poisoned queue no longer retires frames, so the object is destroyed
    /// at once instead. Outside shutdown the poisoning is still reported.
    pub(crate) fn schedule_teardown(
        &self,
        ident: ResourceIdent,
        kind: NativeKind,
        handle: NativeHandle,
    ) -> ResourceResult<()> {
        match self.disposal.schedule(ident, kind, handle) {
            Err(ResourceError::QueuePoisoned) => {
                log::warn!(
                    "Disposal queue is poisoned, destroying {} {} of {} immediately",
                    kind,
                    handle,
                    ident
                );
                self.backend
                    .dispose(kind, handle)
                    .map_err(|err| ResourceError::native("destroy native object", err))?;
                if self.is_shut_down() {
                    Ok(())
                } else {
                    Err(ResourceError::QueuePoisoned)
                }
            }
            result => result,
        }
    }

    /// Drop the outgoing edges and name of a resource whose disposal was accepted.
    pub(crate) fn release(&self, stub: &ResourceStub) -> ResourceResult<()> {
        self.tracker.deregister_all_dependencies(stub)?;
        self.names.remove(stub.ident());
        Ok(())
    }
}

impl std::fmt::Debug for FactoryGlobals {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FactoryGlobals")
            .field("backend", &self.backend.name())
            .field("config", &self.config)
            .field("tracker", &self.tracker)
            .field("disposal", &self.disposal)
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}
