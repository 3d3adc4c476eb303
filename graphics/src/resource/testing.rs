//! Minimal provider used by unit tests of the resource protocol.

use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::ResourceResult;
use crate::resource::handle::{ResourceHandle, ResourceKind};
use crate::resource::names::NameStore;
use crate::resource::provider::{Resource, ResourceProvider};
use crate::resource::tracker::TrackerScope;

pub(crate) struct TestProvider<K> {
    state: Mutex<(usize, Vec<usize>)>,
    names: NameStore,
    scope: TrackerScope,
    _kind: PhantomData<fn() -> K>,
}

impl<K: ResourceKind> TestProvider<K> {
    /// Provider whose resources register with the tracker owning `scope`.
    pub(crate) fn new_in(scope: TrackerScope) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new((0, Vec::new())),
            names: NameStore::new(),
            scope,
            _kind: PhantomData,
        })
    }

    pub(crate) fn create(self: &Arc<Self>, name: &str) -> Resource<Self> {
        let handle = {
            let mut state = self.state.lock();
            state.0 += 1;
            let raw = state.0;
            state.1.push(raw);
            ResourceHandle::from_usize(raw)
        };
        self.names.set(handle.ident(), name);
        Resource::new(handle, self.clone())
    }
}

impl<K: ResourceKind> ResourceProvider for TestProvider<K> {
    type Kind = K;

    fn is_disposed(&self, handle: ResourceHandle<K>) -> bool {
        !self.state.lock().1.contains(&handle.as_usize())
    }

    fn dispose(&self, handle: ResourceHandle<K>) -> ResourceResult<()> {
        self.state.lock().1.retain(|raw| *raw != handle.as_usize());
        Ok(())
    }

    fn name_store(&self) -> &NameStore {
        &self.names
    }

    fn scope(&self) -> TrackerScope {
        self.scope
    }
}
