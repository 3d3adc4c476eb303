//! Typed resource handles and identities.

use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Compile-time description of a resource type.
///
/// Implemented by the uninhabited marker types in [`markers`].
pub trait ResourceKind: 'static + Send + Sync {
    /// Type name used in errors and logs.
    const NAME: &'static str;
    /// Name reported for resources created without one.
    const DEFAULT_NAME: &'static str;
}

/// Per-process identity of a resource type.
///
/// Derived from [`TypeId`], so it is stable for the lifetime of the process
/// but must never be persisted.
#[derive(Clone, Copy)]
pub struct TypeTag {
    id: TypeId,
    name: &'static str,
}

impl TypeTag {
    /// Tag of resource kind `K`.
    pub fn of<K: ResourceKind>() -> Self {
        Self {
            id: TypeId::of::<K>(),
            name: K::NAME,
        }
    }

    /// Name of the tagged resource type.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeTag {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeTag {}

impl Hash for TypeTag {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Untyped handle value. Zero is reserved for "never initialized".
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RawHandle(usize);

impl RawHandle {
    pub const NONE: Self = Self(0);

    pub const fn new(value: usize) -> Self {
        Self(value)
    }

    pub const fn get(self) -> usize {
        self.0
    }

    pub const fn is_none(self) -> bool {
        self.0 == 0
    }
}

/// `(type, handle)` pair naming one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceIdent {
    type_tag: TypeTag,
    raw: RawHandle,
}

impl ResourceIdent {
    pub fn new(type_tag: TypeTag, raw: RawHandle) -> Self {
        Self { type_tag, raw }
    }

    pub fn type_tag(&self) -> TypeTag {
        self.type_tag
    }

    pub fn raw(&self) -> RawHandle {
        self.raw
    }
}

impl fmt::Display for ResourceIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.type_tag.name, self.raw.0)
    }
}

/// A copyable handle to a resource of kind `K`.
///
/// Handles are plain integers and carry no reference to their provider; pair
/// one with its provider through [`Resource`](crate::resource::Resource) to
/// operate on it.
pub struct ResourceHandle<K> {
    raw: RawHandle,
    _kind: PhantomData<fn() -> K>,
}

impl<K: ResourceKind> ResourceHandle<K> {
    pub const fn from_raw(raw: RawHandle) -> Self {
        Self {
            raw,
            _kind: PhantomData,
        }
    }

    pub const fn from_usize(value: usize) -> Self {
        Self::from_raw(RawHandle::new(value))
    }

    pub const fn raw(self) -> RawHandle {
        self.raw
    }

    pub const fn as_usize(self) -> usize {
        self.raw.get()
    }

    /// Whether this is the reserved "never initialized" handle.
    pub const fn is_default(self) -> bool {
        self.raw.is_none()
    }

    /// Identity of the resource this handle names.
    pub fn ident(self) -> ResourceIdent {
        ResourceIdent::new(TypeTag::of::<K>(), self.raw)
    }
}

impl<K> Clone for ResourceHandle<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K> Copy for ResourceHandle<K> {}

impl<K> PartialEq for ResourceHandle<K> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<K> Eq for ResourceHandle<K> {}

impl<K> Hash for ResourceHandle<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl<K> Default for ResourceHandle<K> {
    fn default() -> Self {
        Self {
            raw: RawHandle::NONE,
            _kind: PhantomData,
        }
    }
}

impl<K: ResourceKind> fmt::Debug for ResourceHandle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceHandle<{}>({})", K::NAME, self.raw.0)
    }
}

impl<K: ResourceKind> From<ResourceHandle<K>> for RawHandle {
    fn from(handle: ResourceHandle<K>) -> Self {
        handle.raw
    }
}

macro_rules! resource_kinds {
    ($($(#[$meta:meta])* $name:ident => $display:literal;)*) => {
        $(
            $(#[$meta])*
            #[derive(Debug)]
            pub enum $name {}

            impl $crate::resource::handle::ResourceKind for $name {
                const NAME: &'static str = $display;
                const DEFAULT_NAME: &'static str = concat!("Unnamed ", $display);
            }
        )*
    };
}

/// Marker types identifying each resource kind.
pub mod markers {
    resource_kinds! {
        /// Vertex/index data plus the range drawn from it.
        Mesh => "Mesh";
        /// Sampled image.
        Texture => "Texture";
        /// Surface description referencing textures.
        Material => "Material";
        /// A mesh drawn with a material.
        ModelInstance => "ModelInstance";
        /// Light source.
        Light => "Light";
        /// View into a scene.
        Camera => "Camera";
        /// Collection of model instances and lights.
        Scene => "Scene";
        /// Presentation surface.
        Window => "Window";
        /// Frame pacing loop.
        ApplicationLoop => "ApplicationLoop";
        /// Draws a scene from a camera into a window.
        Renderer => "Renderer";
        /// Bundle of other resources.
        ResourceGroup => "ResourceGroup";
    }
}

#[cfg(test)]
mod tests {
    use super::markers::{Mesh, Texture};
    use super::*;

    #[test]
    fn test_default_handle_is_reserved() {
        let handle = ResourceHandle::<Mesh>::default();
        assert!(handle.is_default());
        assert_eq!(handle.as_usize(), 0);
    }

    #[test]
    fn test_raw_conversion() {
        let handle = ResourceHandle::<Mesh>::from_usize(17);
        assert_eq!(RawHandle::from(handle), RawHandle::new(17));
        assert_eq!(ResourceHandle::<Mesh>::from_raw(handle.raw()), handle);
    }

    #[test]
    fn test_ident_distinguishes_types() {
        let mesh = ResourceHandle::<Mesh>::from_usize(1).ident();
        let texture = ResourceHandle::<Texture>::from_usize(1).ident();
        assert_ne!(mesh, texture);
        assert_eq!(mesh, ResourceHandle::<Mesh>::from_usize(1).ident());
        assert_eq!(mesh.to_string(), "Mesh#1");
    }

    #[test]
    fn test_default_names() {
        assert_eq!(Mesh::DEFAULT_NAME, "Unnamed Mesh");
        assert_eq!(TypeTag::of::<Texture>().name(), "Texture");
    }

    static_assertions::assert_eq_size!(ResourceHandle<Mesh>, usize);
    static_assertions::assert_impl_all!(ResourceHandle<Mesh>: Send, Sync, Copy);
}
