//! Resource groups: an ordered bundle of resources of any type.
//!
//! A group depends on each member, so members cannot be disposed while they
//! belong to a live group. Once sealed a group rejects new members. Disposing
//! a group releases its members in reverse insertion order and, if asked to,
//! disposes them as well.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::ResourceGroup;
use crate::builders::{ManagedBuilder, stub_for};
use crate::error::{ResourceError, ResourceResult};
use crate::globals::FactoryGlobals;
use crate::resource::table::ResourceTable;
use crate::resource::{
    AsResourceStub, NameStore, RawHandle, Referents, Resource, ResourceHandle, ResourceKind,
    ResourceProvider, ResourceStub, TrackerScope, markers,
};

/// Descriptor for creating a resource group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceGroupDescriptor {
    pub label: Option<String>,
    /// Dispose members when the group is disposed through [`Resource::dispose`].
    pub dispose_contained_by_default: bool,
}

impl ResourceGroupDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn disposing_contained(mut self) -> Self {
        self.dispose_contained_by_default = true;
        self
    }
}

struct GroupData {
    sealed: bool,
    dispose_contained: bool,
}

/// Provider of [`ResourceGroup`] resources.
pub struct ResourceGroupBuilder {
    globals: Arc<FactoryGlobals>,
    self_ref: Weak<Self>,
    table: Mutex<ResourceTable<markers::ResourceGroup, GroupData>>,
}

impl ResourceGroupBuilder {
    pub(crate) fn new(globals: Arc<FactoryGlobals>) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            globals,
            self_ref: self_ref.clone(),
            table: Mutex::new(ResourceTable::new()),
        })
    }

    /// Create an empty, unsealed group.
    pub fn create_group(
        self: &Arc<Self>,
        descriptor: &ResourceGroupDescriptor,
    ) -> ResourceResult<ResourceGroup> {
        self.globals.ensure_open("ResourceGroup")?;
        let handle = self.table.lock().insert(GroupData {
            sealed: false,
            dispose_contained: descriptor.dispose_contained_by_default,
        })?;
        if let Some(label) = &descriptor.label {
            self.globals.names().set(handle.ident(), label);
        }
        log::trace!("Created {}", handle.ident());
        Ok(Resource::new(handle, self.clone()))
    }

    fn live_stub(&self, handle: ResourceHandle<markers::ResourceGroup>) -> ResourceResult<ResourceStub> {
        self.table.lock().get(handle)?;
        Ok(stub_for(&self.self_ref, self.scope(), handle))
    }

    /// Append `member`. Adding a resource already in the group is a no-op.
    pub fn add(
        &self,
        handle: ResourceHandle<markers::ResourceGroup>,
        member: &impl AsResourceStub,
    ) -> ResourceResult<()> {
        if self.table.lock().get(handle)?.sealed {
            let name = self.with_name(handle, str::to_owned)?;
            return Err(ResourceError::GroupSealed(name));
        }
        let stub = stub_for(&self.self_ref, self.scope(), handle);
        self.globals.tracker().register_dependency(&stub, member)
    }

    /// Stop accepting new members. Sealing twice is a no-op.
    pub fn seal(&self, handle: ResourceHandle<markers::ResourceGroup>) -> ResourceResult<()> {
        self.table.lock().get_mut(handle)?.sealed = true;
        Ok(())
    }

    /// Whether the group rejects new members.
    pub fn is_sealed(&self, handle: ResourceHandle<markers::ResourceGroup>) -> ResourceResult<bool> {
        Ok(self.table.lock().get(handle)?.sealed)
    }

    /// Number of members.
    pub fn member_count(&self, handle: ResourceHandle<markers::ResourceGroup>) -> ResourceResult<usize> {
        self.members(handle)?.len()
    }

    /// Every member, in insertion order.
    pub fn members(
        &self,
        handle: ResourceHandle<markers::ResourceGroup>,
    ) -> ResourceResult<Referents<'_, ResourceStub>> {
        let stub = self.live_stub(handle)?;
        self.globals.tracker().targets(&stub)
    }

    /// Members provided by `P`, in insertion order.
    pub fn resources_of_type<P: ResourceProvider>(
        &self,
        handle: ResourceHandle<markers::ResourceGroup>,
    ) -> ResourceResult<Referents<'_, Resource<P>>> {
        let stub = self.live_stub(handle)?;
        self.globals.tracker().targets_of_type::<P>(&stub)
    }

    /// The `index`-th member provided by `P`.
    pub fn nth_resource_of_type<P: ResourceProvider>(
        &self,
        handle: ResourceHandle<markers::ResourceGroup>,
        index: usize,
    ) -> ResourceResult<Resource<P>> {
        self.resources_of_type::<P>(handle)?.get(index)
    }

    /// Dispose the group, releasing members last-added first.
    ///
    /// With `dispose_contained` every member is disposed as well. All members
    /// are attempted; the first failure is returned.
    pub fn dispose_with(
        &self,
        handle: ResourceHandle<markers::ResourceGroup>,
        dispose_contained: bool,
    ) -> ResourceResult<()> {
        if self.is_disposed(handle) {
            return Ok(());
        }
        let stub = stub_for(&self.self_ref, self.scope(), handle);
        let tracker = self.globals.tracker();
        tracker.throw_for_premature_disposal(&stub)?;
        let members: Vec<ResourceStub> = {
            let view = tracker.targets(&stub)?;
            view.iter().collect::<ResourceResult<_>>()?
        };
        if self.table.lock().remove(handle).is_none() {
            return Ok(());
        }

        let mut first_error = None;
        for member in members.iter().rev() {
            if let Err(err) = tracker.deregister_dependency(&stub, member) {
                first_error.get_or_insert(err);
                continue;
            }
            if dispose_contained && let Err(err) = member.dispose() {
                log::warn!(
                    "Failed to dispose {} contained in {}: {}",
                    member.ident(),
                    handle.ident(),
                    err
                );
                first_error.get_or_insert(err);
            }
        }
        self.globals.names().remove(handle.ident());
        log::trace!(
            "Disposed {} ({} members, contained: {})",
            handle.ident(),
            members.len(),
            dispose_contained
        );
        first_error.map_or(Ok(()), Err)
    }

    /// Number of live groups.
    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    /// Whether no group is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResourceProvider for ResourceGroupBuilder {
    type Kind = markers::ResourceGroup;

    fn is_disposed(&self, handle: ResourceHandle<markers::ResourceGroup>) -> bool {
        !self.table.lock().contains(handle)
    }

    fn dispose(&self, handle: ResourceHandle<markers::ResourceGroup>) -> ResourceResult<()> {
        let dispose_contained = match self.table.lock().get(handle) {
            Ok(data) => data.dispose_contained,
            Err(_) => return Ok(()),
        };
        self.dispose_with(handle, dispose_contained)
    }

    fn name_store(&self) -> &NameStore {
        self.globals.names()
    }

    fn scope(&self) -> TrackerScope {
        self.globals.tracker().scope()
    }
}

impl ManagedBuilder for ResourceGroupBuilder {
    fn live_handles(&self) -> Vec<RawHandle> {
        self.table.lock().raw_handles()
    }

    /// Members are disposed by their own builders during shutdown.
    fn dispose_for_shutdown(&self, raw: RawHandle) -> ResourceResult<()> {
        self.dispose_with(ResourceHandle::from_raw(raw), false)
    }
}

impl Resource<ResourceGroupBuilder> {
    /// Append `member`; see [`ResourceGroupBuilder::add`].
    pub fn add(&self, member: &impl AsResourceStub) -> ResourceResult<()> {
        self.provider()?.add(self.handle()?, member)
    }

    /// Stop accepting new members.
    pub fn seal(&self) -> ResourceResult<()> {
        self.provider()?.seal(self.handle()?)
    }

    pub fn is_sealed(&self) -> ResourceResult<bool> {
        self.provider()?.is_sealed(self.handle()?)
    }

    /// Number of members.
    pub fn len(&self) -> ResourceResult<usize> {
        self.provider()?.member_count(self.handle()?)
    }

    /// Whether the group has no members.
    pub fn is_empty(&self) -> ResourceResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Members provided by `P`, in insertion order.
    pub fn resources_of_type<P: ResourceProvider>(&self) -> ResourceResult<Vec<Resource<P>>> {
        let view = self.provider()?.resources_of_type::<P>(self.handle()?)?;
        view.iter().collect()
    }

    pub fn nth_resource_of_type<P: ResourceProvider>(&self, index: usize) -> ResourceResult<Resource<P>> {
        self.provider()?.nth_resource_of_type::<P>(self.handle()?, index)
    }

    /// Dispose the group, optionally disposing its members too.
    pub fn dispose_with(&self, dispose_contained: bool) -> ResourceResult<()> {
        match self.provider() {
            Ok(provider) => provider.dispose_with(self.handle()?, dispose_contained),
            Err(ResourceError::Disposed { .. }) => Ok(()),
            Err(err) => Err(err),
        }
    }
}

impl std::fmt::Debug for ResourceGroupBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceGroupBuilder")
            .field("kind", &markers::ResourceGroup::NAME)
            .field("live", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::light::{LightBuilder, LightDescriptor, LightKind};
    use crate::builders::texture::{TextureBuilder, TextureDescriptor};
    use crate::error::ErrorKind;
    use crate::globals::test_support::dummy_globals;
    use crate::{Light, Texture};

    struct Fixture {
        groups: Arc<ResourceGroupBuilder>,
        lights: Arc<LightBuilder>,
        textures: Arc<TextureBuilder>,
    }

    fn fixture() -> Fixture {
        let (_, globals) = dummy_globals();
        Fixture {
            groups: ResourceGroupBuilder::new(globals.clone()),
            lights: LightBuilder::new(globals.clone()),
            textures: TextureBuilder::new(globals),
        }
    }

    impl Fixture {
        fn light(&self) -> Light {
            self.lights
                .create_light(&LightDescriptor::new(LightKind::Point))
                .unwrap()
        }

        fn texture(&self) -> Texture {
            self.textures
                .create_texture(&TextureDescriptor::new(1, 1, &[0; 4]))
                .unwrap()
        }
    }

    #[test]
    fn test_typed_members_in_insertion_order() {
        let f = fixture();
        let group = f.groups.create_group(&ResourceGroupDescriptor::new()).unwrap();
        let (a, t, b) = (f.light(), f.texture(), f.light());
        group.add(&a).unwrap();
        group.add(&t).unwrap();
        group.add(&b).unwrap();
        group.add(&a).unwrap();

        assert_eq!(group.len().unwrap(), 3);
        assert_eq!(group.resources_of_type::<LightBuilder>().unwrap(), vec![a.clone(), b.clone()]);
        assert_eq!(group.nth_resource_of_type::<TextureBuilder>(0).unwrap(), t);
        assert_eq!(
            group
                .nth_resource_of_type::<TextureBuilder>(1)
                .unwrap_err()
                .kind(),
            ErrorKind::Range
        );
        assert_eq!(a.dispose().unwrap_err().kind(), ErrorKind::DependencyViolation);
    }

    #[test]
    fn test_sealed_group_rejects_members() {
        let f = fixture();
        let group = f
            .groups
            .create_group(&ResourceGroupDescriptor::new().with_label("Level 1"))
            .unwrap();
        group.add(&f.light()).unwrap();
        group.seal().unwrap();
        assert!(group.is_sealed().unwrap());

        let err = group.add(&f.light()).unwrap_err();
        assert!(matches!(&err, ResourceError::GroupSealed(name) if name == "Level 1"));
        assert_eq!(group.len().unwrap(), 1);
    }

    #[test]
    fn test_dispose_without_contained_releases_members() {
        let f = fixture();
        let group = f.groups.create_group(&ResourceGroupDescriptor::new()).unwrap();
        let light = f.light();
        group.add(&light).unwrap();

        group.dispose().unwrap();
        assert!(!light.is_disposed().unwrap());
        light.dispose().unwrap();
    }

    #[test]
    fn test_dispose_contained_by_default() {
        let f = fixture();
        let group = f
            .groups
            .create_group(&ResourceGroupDescriptor::new().disposing_contained())
            .unwrap();
        let (light, texture) = (f.light(), f.texture());
        group.add(&light).unwrap();
        group.add(&texture).unwrap();

        group.dispose().unwrap();
        assert!(light.is_disposed().unwrap());
        assert!(texture.is_disposed().unwrap());
        assert!(group.dispose_with(true).is_ok());
    }

    #[test]
    fn test_dispose_with_reports_blocked_member() {
        let f = fixture();
        let outer = f.groups.create_group(&ResourceGroupDescriptor::new()).unwrap();
        let inner = f.groups.create_group(&ResourceGroupDescriptor::new()).unwrap();
        let (shared, own) = (f.light(), f.light());
        outer.add(&shared).unwrap();
        inner.add(&shared).unwrap();
        inner.add(&own).unwrap();

        let err = inner.dispose_with(true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DependencyViolation);
        assert!(inner.is_disposed().unwrap());
        assert!(own.is_disposed().unwrap());
        assert!(!shared.is_disposed().unwrap());
    }

    #[test]
    fn test_member_from_another_factory_is_rejected() {
        let home = fixture();
        let away = fixture();
        let group = home.groups.create_group(&ResourceGroupDescriptor::new()).unwrap();
        let local = home.light();
        let foreign = away.light();
        assert_eq!(local.ident(), foreign.ident());

        let err = group.add(&foreign).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
        assert!(group.is_empty().unwrap());

        // Neither light is held by the group.
        foreign.dispose().unwrap();
        local.dispose().unwrap();
        assert!(local.is_disposed().unwrap());
    }
}
