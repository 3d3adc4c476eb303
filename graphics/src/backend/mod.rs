//! Native backend boundary.
//!
//! Builders never touch native objects directly. Every allocation, teardown
//! and scene attachment goes through a [`NativeBackend`], which returns an
//! opaque [`NativeHandle`] or a typed [`NativeError`].
//!
//! # Available Backends
//!
//! - `dummy` (default feature): in-memory backend for tests and tooling
//!
//! Real backends live outside this crate and are injected into
//! [`ResourceFactory::new`](crate::ResourceFactory::new).

#[cfg(feature = "dummy")]
pub mod dummy;
mod error;

use std::fmt;
use std::num::NonZeroU64;

pub use error::NativeError;

#[cfg(feature = "dummy")]
pub use dummy::DummyBackend;

use crate::builders::light::LightKind;

/// Opaque handle to a native object. Never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeHandle(NonZeroU64);

impl NativeHandle {
    /// Wrap a raw native value. Returns `None` for zero.
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    /// Raw handle value.
    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0.get())
    }
}

/// Kind of native object behind a [`NativeHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeKind {
    VertexBuffer,
    IndexBuffer,
    Texture,
    Material,
    ModelInstance,
    Light,
    Camera,
    Scene,
    Window,
    ApplicationLoop,
    Renderer,
}

impl NativeKind {
    /// Display name of the kind.
    pub fn name(self) -> &'static str {
        match self {
            Self::VertexBuffer => "VertexBuffer",
            Self::IndexBuffer => "IndexBuffer",
            Self::Texture => "Texture",
            Self::Material => "Material",
            Self::ModelInstance => "ModelInstance",
            Self::Light => "Light",
            Self::Camera => "Camera",
            Self::Scene => "Scene",
            Self::Window => "Window",
            Self::ApplicationLoop => "ApplicationLoop",
            Self::Renderer => "Renderer",
        }
    }
}

impl fmt::Display for NativeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parameters for one native allocation.
#[derive(Debug, Clone, Copy)]
pub enum NativeRequest<'a> {
    VertexBuffer {
        data: &'a [u8],
        vertex_count: u32,
    },
    IndexBuffer {
        data: &'a [u8],
        index_count: u32,
    },
    Texture {
        width: u32,
        height: u32,
        texels: &'a [u8],
    },
    Material {
        textures: &'a [NativeHandle],
    },
    ModelInstance {
        vertex_buffer: NativeHandle,
        index_buffer: NativeHandle,
        first_index: u32,
        index_count: u32,
        material: NativeHandle,
    },
    Light {
        kind: LightKind,
    },
    Camera {
        vertical_fov_degrees: f32,
        near_plane: f32,
        far_plane: f32,
    },
    Scene,
    Window {
        title: &'a str,
        width: u32,
        height: u32,
    },
    ApplicationLoop {
        frame_rate_cap: Option<u32>,
    },
    Renderer {
        scene: NativeHandle,
        camera: NativeHandle,
        window: NativeHandle,
        frames_in_flight: u32,
    },
}

impl NativeRequest<'_> {
    /// Kind of object this request allocates.
    pub fn kind(&self) -> NativeKind {
        match self {
            Self::VertexBuffer { .. } => NativeKind::VertexBuffer,
            Self::IndexBuffer { .. } => NativeKind::IndexBuffer,
            Self::Texture { .. } => NativeKind::Texture,
            Self::Material { .. } => NativeKind::Material,
            Self::ModelInstance { .. } => NativeKind::ModelInstance,
            Self::Light { .. } => NativeKind::Light,
            Self::Camera { .. } => NativeKind::Camera,
            Self::Scene => NativeKind::Scene,
            Self::Window { .. } => NativeKind::Window,
            Self::ApplicationLoop { .. } => NativeKind::ApplicationLoop,
            Self::Renderer { .. } => NativeKind::Renderer,
        }
    }
}

/// The managed-side contract of a native rendering backend.
///
/// A backend is the sole owner of native state; the runtime only holds the
/// handles it returns. Calls are made from the frame thread, but the trait is
/// `Send + Sync` so a backend can be shared by every builder of a factory.
pub trait NativeBackend: Send + Sync + 'static {
    /// Human readable backend name.
    fn name(&self) -> &str;

    /// Allocate a native object.
    fn allocate(&self, request: &NativeRequest<'_>) -> Result<NativeHandle, NativeError>;

    /// Destroy a native object. Called once per allocated handle.
    fn dispose(&self, kind: NativeKind, handle: NativeHandle) -> Result<(), NativeError>;

    /// Attach a model instance or light to a scene.
    fn attach(
        &self,
        scene: NativeHandle,
        kind: NativeKind,
        child: NativeHandle,
    ) -> Result<(), NativeError>;

    /// Detach a model instance or light from a scene.
    fn detach(
        &self,
        scene: NativeHandle,
        kind: NativeKind,
        child: NativeHandle,
    ) -> Result<(), NativeError>;

    /// Point a model instance at a different material.
    fn set_instance_material(
        &self,
        instance: NativeHandle,
        material: NativeHandle,
    ) -> Result<(), NativeError>;
}
