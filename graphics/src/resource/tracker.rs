//! Dependency tracking between resources.
//!
//! The tracker records directed edges "dependent requires target" between
//! resources of any type. It does not keep anything alive; it only answers
//! whether a target may be disposed, and enumerates edges in either
//! direction.
//!
//! # Architecture
//!
//! ```text
//! targets_of:    dependent ident ──► [target stub, target stub, ...]
//! dependents_of: target ident    ──► [dependent stub, ...]
//! ```
//!
//! Both maps are [`PooledMap`]s whose per-resource lists are [`PooledVec`]s
//! recycled through an [`ObjectPool`]. Every mutation of the edge set bumps a
//! generation counter; [`Referents`] enumerations capture the generation when
//! created and refuse to read once it has moved.
//!
//! The internal lock is never held while calling into a provider, so
//! providers may query the tracker from inside their own operations as long
//! as they do not hold their own state lock across the call.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tether_core::{ArrayPool, ObjectPool, PooledMap, PooledVec};

use crate::error::{ResourceError, ResourceResult};
use crate::resource::handle::ResourceIdent;
use crate::resource::provider::{
    AsResourceStub, FromStub, Resource, ResourceProvider, ResourceStub,
};

type EdgeLists = PooledMap<ResourceIdent, PooledVec<ResourceStub>>;

struct TrackerState {
    targets_of: EdgeLists,
    dependents_of: EdgeLists,
    lists: ObjectPool<PooledVec<ResourceStub>>,
    generation: u64,
    edge_count: usize,
}

impl TrackerState {
    fn list(&self, direction: Direction, key: &ResourceIdent) -> Option<&PooledVec<ResourceStub>> {
        match direction {
            Direction::Dependents => self.dependents_of.get(key),
            Direction::Targets => self.targets_of.get(key),
        }
    }
}

/// Remove `value` from the list stored under `key`, recycling emptied lists.
fn remove_edge(
    map: &mut EdgeLists,
    lists: &mut ObjectPool<PooledVec<ResourceStub>>,
    key: ResourceIdent,
    value: ResourceIdent,
) -> bool {
    let Some(list) = map.get_mut(&key) else {
        return false;
    };
    let Some(index) = list.position(|stub| stub.ident() == value) else {
        return false;
    };
    let _ = list.remove(index);
    if list.is_empty()
        && let Some(list) = map.remove(&key)
    {
        lists.give_back(list);
    }
    true
}

/// Identity of one [`DependencyTracker`].
///
/// Resource identities are only unique within one factory, so every provider
/// reports the scope of the tracker it registers edges with and a tracker
/// refuses resources reporting any other scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackerScope(u64);

impl TrackerScope {
    /// A scope no earlier call returned.
    pub fn unique() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for TrackerScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope#{}", self.0)
    }
}

/// Bidirectional dependency graph over resource identities.
pub struct DependencyTracker {
    scope: TrackerScope,
    state: Mutex<TrackerState>,
}

impl DependencyTracker {
    /// Create a tracker whose per-resource lists start with `list_capacity` slots.
    pub fn new(list_capacity: usize) -> Self {
        let stub_pool = Arc::new(ArrayPool::new());
        let entry_pool = Arc::new(ArrayPool::new());
        Self {
            scope: TrackerScope::unique(),
            state: Mutex::new(TrackerState {
                targets_of: PooledMap::new_in(entry_pool.clone()),
                dependents_of: PooledMap::new_in(entry_pool),
                lists: ObjectPool::with_factory(move || {
                    PooledVec::with_capacity_in(list_capacity, stub_pool.clone())
                }),
                generation: 0,
                edge_count: 0,
            }),
        }
    }

    /// Scope that providers registering with this tracker must report.
    pub fn scope(&self) -> TrackerScope {
        self.scope
    }

    /// Stub of `resource`, rejecting resources owned by another tracker.
    fn local_stub(&self, resource: &impl AsResourceStub) -> ResourceResult<ResourceStub> {
        let stub = resource.to_stub()?;
        if stub.scope() != self.scope {
            return Err(ResourceError::InvalidParameter(format!(
                "{} belongs to a different factory",
                stub.ident()
            )));
        }
        Ok(stub)
    }

    /// Record that `dependent` requires `target`. Registering an existing edge
    /// is a no-op.
    ///
    /// Fails if either side is uninitialized, disposed or owned by another
    /// tracker, or if both are the same resource.
    pub fn register_dependency(
        &self,
        dependent: &impl AsResourceStub,
        target: &impl AsResourceStub,
    ) -> ResourceResult<()> {
        let dependent = self.local_stub(dependent)?;
        let target = self.local_stub(target)?;
        if dependent == target {
            return Err(ResourceError::InvalidParameter(format!(
                "{} cannot depend on itself",
                dependent.ident()
            )));
        }
        for stub in [&dependent, &target] {
            if stub.is_disposed() {
                return Err(ResourceError::Disposed {
                    type_name: stub.type_tag().name(),
                });
            }
        }

        let mut guard = self.state.lock();
        let TrackerState {
            targets_of,
            dependents_of,
            lists,
            generation,
            edge_count,
        } = &mut *guard;

        let targets = targets_of.get_or_insert_with(dependent.ident(), || lists.rent());
        if targets.contains(&target) {
            return Ok(());
        }
        log::trace!("{} now depends on {}", dependent.ident(), target.ident());
        targets.push(target.clone());
        dependents_of
            .get_or_insert_with(target.ident(), || lists.rent())
            .push(dependent);
        *generation += 1;
        *edge_count += 1;
        Ok(())
    }

    /// Remove the edge `dependent -> target` if present.
    pub fn deregister_dependency(
        &self,
        dependent: &impl AsResourceStub,
        target: &impl AsResourceStub,
    ) -> ResourceResult<()> {
        let dependent = self.local_stub(dependent)?.ident();
        let target = self.local_stub(target)?.ident();

        let mut guard = self.state.lock();
        let TrackerState {
            targets_of,
            dependents_of,
            lists,
            generation,
            edge_count,
        } = &mut *guard;

        if remove_edge(targets_of, lists, dependent, target) {
            remove_edge(dependents_of, lists, target, dependent);
            log::trace!("{} no longer depends on {}", dependent, target);
            *generation += 1;
            *edge_count -= 1;
        }
        Ok(())
    }

    /// Remove every outgoing edge of `dependent`.
    pub fn deregister_all_dependencies(
        &self,
        dependent: &impl AsResourceStub,
    ) -> ResourceResult<()> {
        let dependent = self.local_stub(dependent)?.ident();

        let mut guard = self.state.lock();
        let TrackerState {
            targets_of,
            dependents_of,
            lists,
            generation,
            edge_count,
        } = &mut *guard;

        let Some(targets) = targets_of.remove(&dependent) else {
            return Ok(());
        };
        for target in targets.iter() {
            remove_edge(dependents_of, lists, target.ident(), dependent);
        }
        log::trace!("{} released {} dependencies", dependent, targets.len());
        *edge_count -= targets.len();
        *generation += 1;
        lists.give_back(targets);
        Ok(())
    }

    /// Fail with [`ResourceError::DependencyViolation`] if anything still
    /// depends on `target`.
    pub fn throw_for_premature_disposal(&self, target: &impl AsResourceStub) -> ResourceResult<()> {
        let target = self.local_stub(target)?;
        let blocking: Vec<ResourceStub> = {
            let state = self.state.lock();
            match state.dependents_of.get(&target.ident()) {
                Some(list) if !list.is_empty() => list.iter().cloned().collect(),
                _ => return Ok(()),
            }
        };

        let dependents = blocking.iter().map(ResourceStub::describe).collect();
        let name = target
            .name()
            .unwrap_or_else(|_| target.ident().to_string());
        Err(ResourceError::DependencyViolation {
            type_name: target.type_tag().name(),
            name,
            dependents,
        })
    }

    /// Whether the edge `dependent -> target` exists.
    pub fn depends_on(
        &self,
        dependent: &impl AsResourceStub,
        target: &impl AsResourceStub,
    ) -> ResourceResult<bool> {
        let dependent = self.local_stub(dependent)?.ident();
        let target = self.local_stub(target)?.ident();
        let state = self.state.lock();
        Ok(state
            .targets_of
            .get(&dependent)
            .is_some_and(|targets| targets.iter().any(|stub| stub.ident() == target)))
    }

    /// Whether anything depends on `target`.
    pub fn has_dependents(&self, target: &impl AsResourceStub) -> ResourceResult<bool> {
        let target = self.local_stub(target)?.ident();
        Ok(self.state.lock().dependents_of.contains_key(&target))
    }

    /// Current generation. Changes on every edge set mutation.
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    /// Number of registered edges.
    pub fn edge_count(&self) -> usize {
        self.state.lock().edge_count
    }

    /// Every resource that depends on `target`.
    pub fn dependents(&self, target: &impl AsResourceStub) -> ResourceResult<Referents<'_, ResourceStub>> {
        Referents::new(self, self.local_stub(target)?.ident(), Direction::Dependents)
    }

    /// Every resource `dependent` depends on.
    pub fn targets(&self, dependent: &impl AsResourceStub) -> ResourceResult<Referents<'_, ResourceStub>> {
        Referents::new(self, self.local_stub(dependent)?.ident(), Direction::Targets)
    }

    /// Dependents of `target` provided by `P`, in registration order.
    pub fn dependents_of_type<P: ResourceProvider>(
        &self,
        target: &impl AsResourceStub,
    ) -> ResourceResult<Referents<'_, Resource<P>>> {
        Referents::new(self, self.local_stub(target)?.ident(), Direction::Dependents)
    }

    /// Targets of `dependent` provided by `P`, in registration order.
    pub fn targets_of_type<P: ResourceProvider>(
        &self,
        dependent: &impl AsResourceStub,
    ) -> ResourceResult<Referents<'_, Resource<P>>> {
        Referents::new(self, self.local_stub(dependent)?.ident(), Direction::Targets)
    }

    /// The `index`-th dependent of `target` provided by `P`.
    pub fn nth_dependent_of_type<P: ResourceProvider>(
        &self,
        target: &impl AsResourceStub,
        index: usize,
    ) -> ResourceResult<Resource<P>> {
        self.dependents_of_type::<P>(target)?.get(index)
    }

    /// The `index`-th target of `dependent` provided by `P`.
    pub fn nth_target_of_type<P: ResourceProvider>(
        &self,
        dependent: &impl AsResourceStub,
        index: usize,
    ) -> ResourceResult<Resource<P>> {
        self.targets_of_type::<P>(dependent)?.get(index)
    }
}

impl fmt::Debug for DependencyTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("DependencyTracker")
            .field("scope", &self.scope)
            .field("edges", &state.edge_count)
            .field("generation", &state.generation)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Dependents,
    Targets,
}

/// A generation-checked view over one resource's dependents or targets.
///
/// The view yields `T` for every edge whose other end `T` accepts (any stub,
/// or resources of one provider type). Reads fail with
/// [`ResourceError::StaleEnumeration`] once the tracker has been mutated.
pub struct Referents<'t, T> {
    tracker: &'t DependencyTracker,
    key: ResourceIdent,
    direction: Direction,
    generation: u64,
    count: usize,
    _item: PhantomData<fn() -> T>,
}

impl<'t, T: FromStub> Referents<'t, T> {
    fn new(
        tracker: &'t DependencyTracker,
        key: ResourceIdent,
        direction: Direction,
    ) -> ResourceResult<Self> {
        let state = tracker.state.lock();
        let count = state.list(direction, &key).map_or(0, |list| {
            list.iter().filter(|stub| T::accepts(stub.type_tag())).count()
        });
        Ok(Self {
            tracker,
            key,
            direction,
            generation: state.generation,
            count,
            _item: PhantomData,
        })
    }

    fn check(&self, state: &TrackerState) -> ResourceResult<()> {
        if state.generation != self.generation {
            return Err(ResourceError::StaleEnumeration {
                expected: self.generation,
                actual: state.generation,
            });
        }
        Ok(())
    }

    /// Number of matching edges.
    pub fn len(&self) -> ResourceResult<usize> {
        self.check(&self.tracker.state.lock())?;
        Ok(self.count)
    }

    /// Whether no edge matches.
    pub fn is_empty(&self) -> ResourceResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Generation this view was taken at.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The `index`-th matching resource, in registration order.
    pub fn get(&self, index: usize) -> ResourceResult<T> {
        let stub = {
            let state = self.tracker.state.lock();
            self.check(&state)?;
            state
                .list(self.direction, &self.key)
                .and_then(|list| {
                    list.iter()
                        .filter(|stub| T::accepts(stub.type_tag()))
                        .nth(index)
                        .cloned()
                })
                .ok_or(ResourceError::OutOfRange {
                    index,
                    count: self.count,
                })?
        };
        T::from_stub(&stub)
    }

    /// Iterate the matching resources in registration order.
    pub fn iter(&self) -> ReferentsIter<'_, 't, T> {
        ReferentsIter {
            referents: self,
            index: 0,
        }
    }
}

impl<T> fmt::Debug for Referents<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Referents")
            .field("key", &self.key)
            .field("direction", &self.direction)
            .field("generation", &self.generation)
            .field("count", &self.count)
            .finish()
    }
}

/// Iterator over a [`Referents`] view. Yields an error (and then stops) if
/// the tracker changes mid-iteration.
pub struct ReferentsIter<'a, 't, T> {
    referents: &'a Referents<'t, T>,
    index: usize,
}

impl<T: FromStub> Iterator for ReferentsIter<'_, '_, T> {
    type Item = ResourceResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.referents.count {
            return None;
        }
        let item = self.referents.get(self.index);
        self.index = if item.is_err() {
            self.referents.count
        } else {
            self.index + 1
        };
        Some(item)
    }
}

impl<'a, 't, T: FromStub> IntoIterator for &'a Referents<'t, T> {
    type Item = ResourceResult<T>;
    type IntoIter = ReferentsIter<'a, 't, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::error::ErrorKind;
    use crate::resource::handle::markers;
    use crate::resource::testing::TestProvider;

    type Meshes = TestProvider<markers::Mesh>;
    type Materials = TestProvider<markers::Material>;
    type Instances = TestProvider<markers::ModelInstance>;

    struct Fixture {
        tracker: DependencyTracker,
        meshes: Arc<Meshes>,
        materials: Arc<Materials>,
        instances: Arc<Instances>,
    }

    fn fixture() -> Fixture {
        let tracker = DependencyTracker::new(4);
        let scope = tracker.scope();
        Fixture {
            tracker,
            meshes: Meshes::new_in(scope),
            materials: Materials::new_in(scope),
            instances: Instances::new_in(scope),
        }
    }

    #[test]
    fn test_register_is_idempotent() {
        let f = fixture();
        let mesh = f.meshes.create("Cube");
        let instance = f.instances.create("A");

        f.tracker.register_dependency(&instance, &mesh).unwrap();
        let generation = f.tracker.generation();
        f.tracker.register_dependency(&instance, &mesh).unwrap();

        assert_eq!(f.tracker.edge_count(), 1);
        assert_eq!(f.tracker.generation(), generation);
        assert_eq!(f.tracker.dependents(&mesh).unwrap().len().unwrap(), 1);
    }

    #[test]
    fn test_deregister_absent_edge_is_noop() {
        let f = fixture();
        let mesh = f.meshes.create("Cube");
        let instance = f.instances.create("A");
        let generation = f.tracker.generation();

        f.tracker.deregister_dependency(&instance, &mesh).unwrap();
        f.tracker.deregister_all_dependencies(&instance).unwrap();
        assert_eq!(f.tracker.generation(), generation);
        assert_eq!(f.tracker.edge_count(), 0);
    }

    #[test]
    fn test_gate_blocks_until_all_dependents_removed() {
        let f = fixture();
        let mesh = f.meshes.create("Cube");
        let a = f.instances.create("A");
        let b = f.instances.create("B");
        f.tracker.register_dependency(&a, &mesh).unwrap();
        f.tracker.register_dependency(&b, &mesh).unwrap();

        let err = f.tracker.throw_for_premature_disposal(&mesh).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DependencyViolation);
        assert_eq!(
            err.to_string(),
            "cannot dispose Mesh 'Cube' while it is in use by: ModelInstance 'A', ModelInstance 'B'"
        );

        f.tracker.deregister_dependency(&a, &mesh).unwrap();
        assert!(f.tracker.throw_for_premature_disposal(&mesh).is_err());
        f.tracker.deregister_all_dependencies(&b).unwrap();
        assert!(f.tracker.throw_for_premature_disposal(&mesh).is_ok());
    }

    #[test]
    fn test_bidirectional_consistency() {
        let f = fixture();
        let mesh = f.meshes.create("Cube");
        let material = f.materials.create("Red");
        let instance = f.instances.create("A");
        f.tracker.register_dependency(&instance, &mesh).unwrap();
        f.tracker.register_dependency(&instance, &material).unwrap();

        let targets: Vec<_> = f
            .tracker
            .targets(&instance)
            .unwrap()
            .iter()
            .map(Result::unwrap)
            .collect();
        assert_eq!(targets, vec![mesh.stub().unwrap(), material.stub().unwrap()]);

        for target in &targets {
            let dependents = f.tracker.dependents(target).unwrap();
            assert_eq!(dependents.len().unwrap(), 1);
            assert_eq!(dependents.get(0).unwrap(), instance.stub().unwrap());
            assert!(f.tracker.depends_on(&instance, target).unwrap());
        }
    }

    #[test]
    fn test_typed_queries_filter_and_keep_order() {
        let f = fixture();
        let instance = f.instances.create("A");
        let mesh_a = f.meshes.create("M1");
        let material = f.materials.create("Mat");
        let mesh_b = f.meshes.create("M2");
        f.tracker.register_dependency(&instance, &mesh_a).unwrap();
        f.tracker.register_dependency(&instance, &material).unwrap();
        f.tracker.register_dependency(&instance, &mesh_b).unwrap();

        let meshes = f.tracker.targets_of_type::<Meshes>(&instance).unwrap();
        assert_eq!(meshes.len().unwrap(), 2);
        assert_eq!(meshes.get(0).unwrap(), mesh_a);
        assert_eq!(meshes.get(1).unwrap(), mesh_b);

        assert_eq!(
            f.tracker.nth_target_of_type::<Materials>(&instance, 0).unwrap(),
            material
        );
        assert!(matches!(
            f.tracker.nth_target_of_type::<Materials>(&instance, 1),
            Err(ResourceError::OutOfRange { index: 1, count: 1 })
        ));
        assert_eq!(
            f.tracker.nth_dependent_of_type::<Instances>(&mesh_b, 0).unwrap(),
            instance
        );
    }

    #[test]
    fn test_enumeration_goes_stale_after_mutation() {
        let f = fixture();
        let mesh = f.meshes.create("Cube");
        let a = f.instances.create("A");
        let b = f.instances.create("B");
        f.tracker.register_dependency(&a, &mesh).unwrap();

        let dependents = f.tracker.dependents_of_type::<Instances>(&mesh).unwrap();
        assert_eq!(dependents.len().unwrap(), 1);

        f.tracker.register_dependency(&b, &mesh).unwrap();
        assert!(matches!(
            dependents.len(),
            Err(ResourceError::StaleEnumeration { .. })
        ));
        assert!(matches!(
            dependents.get(0),
            Err(ResourceError::StaleEnumeration { .. })
        ));
        let collected: Vec<_> = dependents.iter().collect();
        assert_eq!(collected.len(), 1);
        assert!(collected[0].is_err());
    }

    #[test]
    fn test_deregister_invalidates_enumeration() {
        let f = fixture();
        let mesh = f.meshes.create("Cube");
        let a = f.instances.create("A");
        f.tracker.register_dependency(&a, &mesh).unwrap();

        let targets = f.tracker.targets(&a).unwrap();
        f.tracker.deregister_dependency(&a, &mesh).unwrap();
        assert!(targets.get(0).is_err());
        assert_eq!(f.tracker.targets(&a).unwrap().len().unwrap(), 0);
    }

    #[test]
    fn test_register_against_disposed_fails() {
        let f = fixture();
        let mesh = f.meshes.create("Cube");
        let instance = f.instances.create("A");
        mesh.dispose().unwrap();

        let err = f.tracker.register_dependency(&instance, &mesh).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Disposed);
        assert_eq!(f.tracker.edge_count(), 0);
    }

    #[test]
    fn test_register_uninitialized_or_self_fails() {
        let f = fixture();
        let mesh = f.meshes.create("Cube");
        let uninit = Resource::<Instances>::default();

        assert_eq!(
            f.tracker
                .register_dependency(&uninit, &mesh)
                .unwrap_err()
                .kind(),
            ErrorKind::InvalidObject
        );
        assert_eq!(
            f.tracker.register_dependency(&mesh, &mesh).unwrap_err().kind(),
            ErrorKind::InvalidParameter
        );
    }

    #[test]
    fn test_emptied_lists_are_recycled() {
        let f = fixture();
        let mesh = f.meshes.create("Cube");
        let a = f.instances.create("A");
        f.tracker.register_dependency(&a, &mesh).unwrap();
        f.tracker.deregister_dependency(&a, &mesh).unwrap();

        let state = f.tracker.state.lock();
        assert!(state.targets_of.is_empty());
        assert!(state.dependents_of.is_empty());
        assert_eq!(state.lists.available(), 2);
    }

    #[test]
    fn test_resources_of_another_tracker_are_rejected() {
        let f = fixture();
        let other = DependencyTracker::new(4);
        let foreign_meshes = Meshes::new_in(other.scope());

        // Both meshes carry the same identity; only the scope tells them apart.
        let local = f.meshes.create("Local");
        let foreign = foreign_meshes.create("Foreign");
        assert_eq!(local.ident(), foreign.ident());
        let instance = f.instances.create("A");

        let err = f.tracker.register_dependency(&instance, &foreign).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
        assert!(err.to_string().contains("different factory"));
        assert_eq!(f.tracker.edge_count(), 0);

        f.tracker.register_dependency(&instance, &local).unwrap();
        assert!(f.tracker.depends_on(&instance, &foreign).is_err());
        assert!(f.tracker.deregister_dependency(&instance, &foreign).is_err());
        assert!(f.tracker.throw_for_premature_disposal(&foreign).is_err());
        assert!(f.tracker.depends_on(&instance, &local).unwrap());
        assert_eq!(f.tracker.edge_count(), 1);
    }

    #[test]
    fn test_scopes_are_unique() {
        assert_ne!(DependencyTracker::new(1).scope(), DependencyTracker::new(1).scope());
        assert_ne!(TrackerScope::unique(), TrackerScope::unique());
    }

    static_assertions::assert_impl_all!(DependencyTracker: Send, Sync);
}
