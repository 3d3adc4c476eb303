//! The handle + implementation-provider pairing.
//!
//! Every resource type has one provider (its builder) implementing
//! [`ResourceProvider`]. Calling code holds [`Resource<P>`] values, which are
//! a handle plus an `Arc` to the provider; all behavior dispatches through the
//! provider. Where the type is not known statically (the dependency tracker,
//! resource groups) resources travel as [`ResourceStub`]s holding a weak,
//! type-erased provider reference.

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

use crate::error::{ResourceError, ResourceResult};
use crate::resource::handle::{RawHandle, ResourceHandle, ResourceIdent, ResourceKind, TypeTag};
use crate::resource::names::NameStore;
use crate::resource::tracker::TrackerScope;

/// Operations valid on handles of one resource type.
pub trait ResourceProvider: Send + Sync + Sized + 'static {
    type Kind: ResourceKind;

    /// Whether `handle` is no longer live. Unknown handles count as disposed.
    fn is_disposed(&self, handle: ResourceHandle<Self::Kind>) -> bool;

    /// Dispose `handle`. A second call for the same handle is a no-op.
    fn dispose(&self, handle: ResourceHandle<Self::Kind>) -> ResourceResult<()>;

    /// Store holding the names of this provider's resources.
    fn name_store(&self) -> &NameStore;

    /// Scope of the dependency tracker this provider's resources belong to.
    fn scope(&self) -> TrackerScope;

    /// Run `f` with the name of a live resource.
    fn with_name<R>(
        &self,
        handle: ResourceHandle<Self::Kind>,
        f: impl FnOnce(&str) -> R,
    ) -> ResourceResult<R> {
        if self.is_disposed(handle) {
            return Err(disposed::<Self::Kind>());
        }
        Ok(self
            .name_store()
            .with_name(handle.ident(), Self::Kind::DEFAULT_NAME, f))
    }
}

pub(crate) fn disposed<K: ResourceKind>() -> ResourceError {
    ResourceError::Disposed { type_name: K::NAME }
}

pub(crate) fn invalid<K: ResourceKind>() -> ResourceError {
    ResourceError::InvalidObject { type_name: K::NAME }
}

/// Object-safe view of a [`ResourceProvider`], keyed by raw handles.
pub trait ErasedProvider: Send + Sync + 'static {
    fn type_tag(&self) -> TypeTag;
    fn is_disposed_raw(&self, raw: RawHandle) -> bool;
    fn dispose_raw(&self, raw: RawHandle) -> ResourceResult<()>;
    fn name_raw(&self, raw: RawHandle) -> ResourceResult<String>;
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<P: ResourceProvider> ErasedProvider for P {
    fn type_tag(&self) -> TypeTag {
        TypeTag::of::<P::Kind>()
    }

    fn is_disposed_raw(&self, raw: RawHandle) -> bool {
        self.is_disposed(ResourceHandle::from_raw(raw))
    }

    fn dispose_raw(&self, raw: RawHandle) -> ResourceResult<()> {
        self.dispose(ResourceHandle::from_raw(raw))
    }

    fn name_raw(&self, raw: RawHandle) -> ResourceResult<String> {
        self.with_name(ResourceHandle::from_raw(raw), str::to_owned)
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// A resource as seen by calling code: a handle paired with its provider.
///
/// The default value is "not initialized" and fails every operation with
/// [`ResourceError::InvalidObject`]. Once disposal is accepted, every
/// operation except [`dispose`](Self::dispose) fails with
/// [`ResourceError::Disposed`].
pub struct Resource<P: ResourceProvider> {
    handle: ResourceHandle<P::Kind>,
    provider: Option<Arc<P>>,
}

impl<P: ResourceProvider> Resource<P> {
    pub(crate) fn new(handle: ResourceHandle<P::Kind>, provider: Arc<P>) -> Self {
        Self {
            handle,
            provider: Some(provider),
        }
    }

    fn initialized(&self) -> ResourceResult<&Arc<P>> {
        self.provider.as_ref().ok_or_else(invalid::<P::Kind>)
    }

    fn live(&self) -> ResourceResult<&Arc<P>> {
        let provider = self.initialized()?;
        if provider.is_disposed(self.handle) {
            return Err(disposed::<P::Kind>());
        }
        Ok(provider)
    }

    /// The handle, if the resource is still live.
    pub fn handle(&self) -> ResourceResult<ResourceHandle<P::Kind>> {
        self.live()?;
        Ok(self.handle)
    }

    /// The provider, if the resource is still live.
    pub fn provider(&self) -> ResourceResult<&Arc<P>> {
        self.live()
    }

    /// Identity of this resource. Available even after disposal.
    pub fn ident(&self) -> ResourceIdent {
        self.handle.ident()
    }

    /// Whether this value was created by a builder.
    pub fn is_initialized(&self) -> bool {
        self.provider.is_some()
    }

    /// Whether disposal has been accepted.
    pub fn is_disposed(&self) -> ResourceResult<bool> {
        Ok(self.initialized()?.is_disposed(self.handle))
    }

    /// Dispose the resource. Disposing twice is a no-op.
    pub fn dispose(&self) -> ResourceResult<()> {
        self.initialized()?.dispose(self.handle)
    }

    /// Run `f` with the resource's name.
    pub fn with_name<R>(&self, f: impl FnOnce(&str) -> R) -> ResourceResult<R> {
        self.initialized()?.with_name(self.handle, f)
    }

    /// The resource's name, or its kind's default name.
    pub fn name(&self) -> ResourceResult<String> {
        self.with_name(str::to_owned)
    }

    /// Length of the name in bytes.
    pub fn name_len(&self) -> ResourceResult<usize> {
        self.with_name(str::len)
    }

    /// Copy the UTF-8 name into `dest`, returning the number of bytes written.
    pub fn copy_name_into(&self, dest: &mut [u8]) -> ResourceResult<usize> {
        self.with_name(|name| {
            let bytes = name.as_bytes();
            if dest.len() < bytes.len() {
                return Err(ResourceError::BufferTooSmall {
                    required: bytes.len(),
                    provided: dest.len(),
                });
            }
            dest[..bytes.len()].copy_from_slice(bytes);
            Ok(bytes.len())
        })?
    }

    /// Type-erased form for the dependency tracker and resource groups.
    pub fn stub(&self) -> ResourceResult<ResourceStub> {
        let provider = self.initialized()?;
        let weak: Weak<P> = Arc::downgrade(provider);
        Ok(ResourceStub {
            ident: self.ident(),
            scope: provider.scope(),
            provider: weak,
        })
    }
}

impl<P: ResourceProvider> Default for Resource<P> {
    fn default() -> Self {
        Self {
            handle: ResourceHandle::default(),
            provider: None,
        }
    }
}

impl<P: ResourceProvider> Clone for Resource<P> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle,
            provider: self.provider.clone(),
        }
    }
}

impl<P: ResourceProvider> PartialEq for Resource<P> {
    fn eq(&self, other: &Self) -> bool {
        let same_provider = match (&self.provider, &other.provider) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        same_provider && self.handle == other.handle
    }
}

impl<P: ResourceProvider> Eq for Resource<P> {}

impl<P: ResourceProvider> Hash for Resource<P> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.handle.hash(state);
    }
}

impl<P: ResourceProvider> fmt::Debug for Resource<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.provider.is_some() {
            write!(f, "Resource({})", self.ident())
        } else {
            write!(f, "Resource<{}>(uninitialized)", P::Kind::NAME)
        }
    }
}

/// Type-erased resource reference used where the type is only known at runtime.
///
/// Equality and hashing use the identity alone. The provider is held weakly,
/// so stubs stored in the tracker never keep a builder alive.
#[derive(Clone)]
pub struct ResourceStub {
    ident: ResourceIdent,
    scope: TrackerScope,
    provider: Weak<dyn ErasedProvider>,
}

impl ResourceStub {
    pub(crate) fn new(
        ident: ResourceIdent,
        scope: TrackerScope,
        provider: Weak<dyn ErasedProvider>,
    ) -> Self {
        Self {
            ident,
            scope,
            provider,
        }
    }

    pub fn ident(&self) -> ResourceIdent {
        self.ident
    }

    /// Scope of the tracker that owns this resource's edges.
    pub fn scope(&self) -> TrackerScope {
        self.scope
    }

    pub fn type_tag(&self) -> TypeTag {
        self.ident.type_tag()
    }

    /// Whether the resource is disposed or its provider dropped.
    pub fn is_disposed(&self) -> bool {
        match self.provider.upgrade() {
            Some(provider) => provider.is_disposed_raw(self.ident.raw()),
            None => true,
        }
    }

    /// Dispose through the erased provider. A dropped provider counts as disposed.
    pub fn dispose(&self) -> ResourceResult<()> {
        match self.provider.upgrade() {
            Some(provider) => provider.dispose_raw(self.ident.raw()),
            None => Ok(()),
        }
    }

    pub fn name(&self) -> ResourceResult<String> {
        let provider = self.provider.upgrade().ok_or(ResourceError::Disposed {
            type_name: self.type_tag().name(),
        })?;
        provider.name_raw(self.ident.raw())
    }

    /// Recover the typed resource.
    pub fn downcast<P: ResourceProvider>(&self) -> ResourceResult<Resource<P>> {
        let mismatch = || ResourceError::TypeMismatch {
            expected: P::Kind::NAME,
            found: self.type_tag().name(),
        };
        if self.type_tag() != TypeTag::of::<P::Kind>() {
            return Err(mismatch());
        }
        let provider = self.provider.upgrade().ok_or_else(disposed::<P::Kind>)?;
        let provider = provider.into_any().downcast::<P>().map_err(|_| mismatch())?;
        Ok(Resource::new(
            ResourceHandle::from_raw(self.ident.raw()),
            provider,
        ))
    }

    /// `Type 'name'`, or `Type#raw` when the name is unavailable.
    pub(crate) fn describe(&self) -> String {
        match self.name() {
            Ok(name) => format!("{} '{}'", self.type_tag().name(), name),
            Err(_) => self.ident.to_string(),
        }
    }
}

impl PartialEq for ResourceStub {
    fn eq(&self, other: &Self) -> bool {
        self.ident == other.ident
    }
}

impl Eq for ResourceStub {}

impl Hash for ResourceStub {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ident.hash(state);
    }
}

impl fmt::Debug for ResourceStub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceStub({})", self.ident)
    }
}

/// Anything that can be handed to the dependency tracker.
pub trait AsResourceStub {
    fn to_stub(&self) -> ResourceResult<ResourceStub>;
}

impl<P: ResourceProvider> AsResourceStub for Resource<P> {
    fn to_stub(&self) -> ResourceResult<ResourceStub> {
        self.stub()
    }
}

impl AsResourceStub for ResourceStub {
    fn to_stub(&self) -> ResourceResult<ResourceStub> {
        Ok(self.clone())
    }
}

/// Values that tracker enumerations can yield.
pub trait FromStub: Sized {
    /// Whether a stub of type `tag` converts to `Self`.
    fn accepts(tag: TypeTag) -> bool;

    fn from_stub(stub: &ResourceStub) -> ResourceResult<Self>;
}

impl FromStub for ResourceStub {
    fn accepts(_tag: TypeTag) -> bool {
        true
    }

    fn from_stub(stub: &ResourceStub) -> ResourceResult<Self> {
        Ok(stub.clone())
    }
}

impl<P: ResourceProvider> FromStub for Resource<P> {
    fn accepts(tag: TypeTag) -> bool {
        tag == TypeTag::of::<P::Kind>()
    }

    fn from_stub(stub: &ResourceStub) -> ResourceResult<Self> {
        stub.downcast::<P>()
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;
    use crate::resource::handle::markers;

    /// Minimal provider: handles 1..=live are live unless disposed.
    struct CounterProvider {
        disposed: Mutex<Vec<usize>>,
        names: NameStore,
        scope: TrackerScope,
    }

    impl Default for CounterProvider {
        fn default() -> Self {
            Self {
                disposed: Mutex::default(),
                names: NameStore::new(),
                scope: TrackerScope::unique(),
            }
        }
    }

    impl ResourceProvider for CounterProvider {
        type Kind = markers::Light;

        fn is_disposed(&self, handle: ResourceHandle<markers::Light>) -> bool {
            handle.is_default() || self.disposed.lock().contains(&handle.as_usize())
        }

        fn dispose(&self, handle: ResourceHandle<markers::Light>) -> ResourceResult<()> {
            let mut disposed = self.disposed.lock();
            if !disposed.contains(&handle.as_usize()) {
                disposed.push(handle.as_usize());
            }
            Ok(())
        }

        fn name_store(&self) -> &NameStore {
            &self.names
        }

        fn scope(&self) -> TrackerScope {
            self.scope
        }
    }

    fn light(provider: &Arc<CounterProvider>, raw: usize) -> Resource<CounterProvider> {
        Resource::new(ResourceHandle::from_usize(raw), provider.clone())
    }

    #[test]
    fn test_default_resource_is_invalid_not_disposed() {
        let resource = Resource::<CounterProvider>::default();
        assert!(!resource.is_initialized());
        assert!(matches!(
            resource.handle(),
            Err(ResourceError::InvalidObject { type_name: "Light" })
        ));
        assert!(matches!(
            resource.dispose(),
            Err(ResourceError::InvalidObject { .. })
        ));
        assert!(resource.stub().is_err());
    }

    #[test]
    fn test_disposed_resource_fails_but_dispose_is_idempotent() {
        let provider = Arc::new(CounterProvider::default());
        let resource = light(&provider, 1);
        assert_eq!(resource.name().unwrap(), "Unnamed Light");

        resource.dispose().unwrap();
        assert!(resource.is_disposed().unwrap());
        assert!(matches!(
            resource.name(),
            Err(ResourceError::Disposed { type_name: "Light" })
        ));
        assert!(resource.dispose().is_ok());
    }

    #[test]
    fn test_copy_name_into() {
        let provider = Arc::new(CounterProvider::default());
        let resource = light(&provider, 2);
        provider.names.set(resource.ident(), "Sun");

        let mut buffer = [0u8; 8];
        assert_eq!(resource.copy_name_into(&mut buffer).unwrap(), 3);
        assert_eq!(&buffer[..3], b"Sun");
        assert_eq!(resource.name_len().unwrap(), 3);

        let mut small = [0u8; 2];
        assert!(matches!(
            resource.copy_name_into(&mut small),
            Err(ResourceError::BufferTooSmall {
                required: 3,
                provided: 2
            })
        ));
    }

    #[test]
    fn test_stub_round_trip_and_mismatch() {
        let provider = Arc::new(CounterProvider::default());
        let resource = light(&provider, 3);
        let stub = resource.stub().unwrap();
        assert_eq!(stub.ident(), resource.ident());
        assert_eq!(stub.scope(), provider.scope());
        assert_eq!(stub.downcast::<CounterProvider>().unwrap(), resource);
        assert_eq!(stub.describe(), "Light 'Unnamed Light'");
    }

    #[test]
    fn test_stub_outliving_provider_reads_as_disposed() {
        let provider = Arc::new(CounterProvider::default());
        let stub = light(&provider, 4).stub().unwrap();
        drop(provider);
        assert!(stub.is_disposed());
        assert!(stub.dispose().is_ok());
        assert!(stub.downcast::<CounterProvider>().is_err());
        assert_eq!(stub.describe(), "Light#4");
    }

    #[test]
    fn test_equality_requires_same_provider() {
        let a = Arc::new(CounterProvider::default());
        let b = Arc::new(CounterProvider::default());
        assert_eq!(light(&a, 1), light(&a, 1));
        assert_ne!(light(&a, 1), light(&b, 1));
        assert_ne!(light(&a, 1), light(&a, 2));
    }

    static_assertions::assert_impl_all!(ResourceStub: Send, Sync);
    static_assertions::assert_obj_safe!(ErasedProvider);
}
