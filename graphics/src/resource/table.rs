//! Per-builder handle table.

use tether_core::PooledMap;

use crate::error::ResourceResult;
use crate::resource::handle::{RawHandle, ResourceHandle, ResourceKind};
use crate::resource::provider::{disposed, invalid};

/// Map from live handles to a builder's private per-resource data.
///
/// Handle values are issued from 1 upwards and never reused, so a stale
/// handle can never alias a newer resource.
pub(crate) struct ResourceTable<K, D> {
    active: PooledMap<ResourceHandle<K>, D>,
    last_issued: usize,
}

impl<K: ResourceKind, D> ResourceTable<K, D> {
    pub(crate) fn new() -> Self {
        Self {
            active: PooledMap::new(),
            last_issued: 0,
        }
    }

    pub(crate) fn insert(&mut self, data: D) -> ResourceResult<ResourceHandle<K>> {
        self.last_issued += 1;
        let handle = ResourceHandle::from_usize(self.last_issued);
        self.active.insert(handle, data)?;
        Ok(handle)
    }

    pub(crate) fn contains(&self, handle: ResourceHandle<K>) -> bool {
        self.active.contains_key(&handle)
    }

    pub(crate) fn get(&self, handle: ResourceHandle<K>) -> ResourceResult<&D> {
        if handle.is_default() {
            return Err(invalid::<K>());
        }
        self.active.get(&handle).ok_or_else(disposed::<K>)
    }

    pub(crate) fn get_mut(&mut self, handle: ResourceHandle<K>) -> ResourceResult<&mut D> {
        if handle.is_default() {
            return Err(invalid::<K>());
        }
        self.active.get_mut(&handle).ok_or_else(disposed::<K>)
    }

    pub(crate) fn remove(&mut self, handle: ResourceHandle<K>) -> Option<D> {
        self.active.remove(&handle)
    }

    pub(crate) fn raw_handles(&self) -> Vec<RawHandle> {
        self.active.keys().map(|handle| handle.raw()).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.active.len()
    }
}
