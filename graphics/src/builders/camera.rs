//! Cameras.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::Camera;
use crate::backend::{NativeHandle, NativeKind, NativeRequest};
use crate::builders::{ManagedBuilder, NativeBacked, discard_native, stub_for};
use crate::error::{ResourceError, ResourceResult};
use crate::globals::FactoryGlobals;
use crate::resource::table::ResourceTable;
use crate::resource::{
    NameStore, RawHandle, Resource, ResourceHandle, ResourceProvider, TrackerScope, markers,
};

/// Descriptor for creating a perspective camera.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraDescriptor {
    pub label: Option<String>,
    /// Vertical field of view in degrees, in (0, 180).
    pub vertical_fov_degrees: f32,
    pub near_plane: f32,
    pub far_plane: f32,
}

impl Default for CameraDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            vertical_fov_degrees: 60.0,
            near_plane: 0.1,
            far_plane: 1000.0,
        }
    }
}

impl CameraDescriptor {
    pub fn new(vertical_fov_degrees: f32, near_plane: f32, far_plane: f32) -> Self {
        Self {
            label: None,
            vertical_fov_degrees,
            near_plane,
            far_plane,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    fn validate(&self) -> ResourceResult<()> {
        if !(self.vertical_fov_degrees > 0.0 && self.vertical_fov_degrees < 180.0) {
            return Err(ResourceError::InvalidParameter(format!(
                "camera field of view must be in (0, 180) degrees, got {}",
                self.vertical_fov_degrees
            )));
        }
        if !(self.near_plane > 0.0 && self.near_plane < self.far_plane) {
            return Err(ResourceError::InvalidParameter(format!(
                "camera planes must satisfy 0 < near < far, got near {} far {}",
                self.near_plane, self.far_plane
            )));
        }
        Ok(())
    }
}

/// Projection parameters of a live camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraProjection {
    pub vertical_fov_degrees: f32,
    pub near_plane: f32,
    pub far_plane: f32,
}

struct CameraData {
    native: NativeHandle,
    projection: CameraProjection,
}

/// Provider of [`Camera`] resources.
pub struct CameraBuilder {
    globals: Arc<FactoryGlobals>,
    self_ref: Weak<Self>,
    table: Mutex<ResourceTable<markers::Camera, CameraData>>,
}

impl CameraBuilder {
    pub(crate) fn new(globals: Arc<FactoryGlobals>) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            globals,
            self_ref: self_ref.clone(),
            table: Mutex::new(ResourceTable::new()),
        })
    }

    /// Create a camera from `descriptor`.
    pub fn create_camera(self: &Arc<Self>, descriptor: &CameraDescriptor) -> ResourceResult<Camera> {
        self.globals.ensure_open("Camera")?;
        descriptor.validate()?;
        let native = self.globals.allocate(
            "create camera",
            &NativeRequest::Camera {
                vertical_fov_degrees: descriptor.vertical_fov_degrees,
                near_plane: descriptor.near_plane,
                far_plane: descriptor.far_plane,
            },
        )?;
        let projection = CameraProjection {
            vertical_fov_degrees: descriptor.vertical_fov_degrees,
            near_plane: descriptor.near_plane,
            far_plane: descriptor.far_plane,
        };
        let inserted = self.table.lock().insert(CameraData { native, projection });
        let handle = match inserted {
            Ok(handle) => handle,
            Err(err) => {
                discard_native(&self.globals, NativeKind::Camera, native);
                return Err(err);
            }
        };
        if let Some(label) = &descriptor.label {
            self.globals.names().set(handle.ident(), label);
        }
        log::trace!("Created {}", handle.ident());
        Ok(Resource::new(handle, self.clone()))
    }

    /// Projection parameters of a camera.
    pub fn projection(
        &self,
        handle: ResourceHandle<markers::Camera>,
    ) -> ResourceResult<CameraProjection> {
        Ok(self.table.lock().get(handle)?.projection)
    }

    /// Number of live cameras.
    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    /// Whether no camera is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResourceProvider for CameraBuilder {
    type Kind = markers::Camera;

    fn is_disposed(&self, handle: ResourceHandle<markers::Camera>) -> bool {
        !self.table.lock().contains(handle)
    }

    fn dispose(&self, handle: ResourceHandle<markers::Camera>) -> ResourceResult<()> {
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
            .schedule_teardown(handle.ident(), NativeKind::Camera, data.native)
    }

    fn name_store(&self) -> &NameStore {
        self.globals.names()
    }

    fn scope(&self) -> TrackerScope {
        self.globals.tracker().scope()
    }
}

impl NativeBacked for CameraBuilder {
    fn globals(&self) -> &Arc<FactoryGlobals> {
        &self.globals
    }

    fn native_handle(&self, handle: ResourceHandle<markers::Camera>) -> ResourceResult<NativeHandle> {
        Ok(self.table.lock().get(handle)?.native)
    }
}

impl ManagedBuilder for CameraBuilder {
    fn live_handles(&self) -> Vec<RawHandle> {
        self.table.lock().raw_handles()
    }
}

impl Resource<CameraBuilder> {
    /// Projection parameters.
    pub fn projection(&self) -> ResourceResult<CameraProjection> {
        self.provider()?.projection(self.handle()?)
    }
}
