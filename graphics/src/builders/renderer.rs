//! Renderers: draw a scene through a camera into a window.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::backend::{NativeHandle, NativeKind, NativeRequest};
use crate::builders::camera::CameraBuilder;
use crate::builders::scene::SceneBuilder;
use crate::builders::window::WindowBuilder;
use crate::builders::{
    ManagedBuilder, NativeBacked, discard_native, link_dependencies, native_of, stub_for,
};
use crate::error::{ResourceError, ResourceResult};
use crate::globals::FactoryGlobals;
use crate::resource::table::ResourceTable;
use crate::resource::{
    NameStore, RawHandle, Resource, ResourceHandle, ResourceProvider, ResourceStub,
    TrackerScope, markers,
};
use crate::{Camera, Renderer, Scene, Window};

/// Descriptor for creating a renderer.
#[derive(Debug, Clone)]
pub struct RendererDescriptor<'a> {
    pub label: Option<String>,
    pub scene: &'a Scene,
    pub camera: &'a Camera,
    pub window: &'a Window,
    /// Frames the renderer may queue ahead. `None` uses the factory depth.
    pub frames_in_flight: Option<usize>,
}

impl<'a> RendererDescriptor<'a> {
    pub fn new(scene: &'a Scene, camera: &'a Camera, window: &'a Window) -> Self {
        Self {
            label: None,
            scene,
            camera,
            window,
            frames_in_flight: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_frames_in_flight(mut self, frames_in_flight: usize) -> Self {
        self.frames_in_flight = Some(frames_in_flight);
        self
    }
}

struct RendererData {
    native: NativeHandle,
    frames_in_flight: usize,
}

/// Provider of [`Renderer`] resources.
pub struct RendererBuilder {
    globals: Arc<FactoryGlobals>,
    self_ref: Weak<Self>,
    table: Mutex<ResourceTable<markers::Renderer, RendererData>>,
}

impl RendererBuilder {
    pub(crate) fn new(globals: Arc<FactoryGlobals>) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            globals,
            self_ref: self_ref.clone(),
            table: Mutex::new(ResourceTable::new()),
        })
    }

    /// Create a renderer drawing a scene through a camera into a window.
    pub fn create_renderer(
        self: &Arc<Self>,
        descriptor: &RendererDescriptor<'_>,
    ) -> ResourceResult<Renderer> {
        self.globals.ensure_open("Renderer")?;
        let max_depth = self.globals.config().frames_in_flight;
        let frames_in_flight = descriptor.frames_in_flight.unwrap_or(max_depth);
        if !(1..=max_depth).contains(&frames_in_flight) {
            return Err(ResourceError::InvalidParameter(format!(
                "renderer frames_in_flight must be between 1 and {max_depth}, got {frames_in_flight}"
            )));
        }

        let scene = native_of(&self.globals, descriptor.scene)?;
        let camera = native_of(&self.globals, descriptor.camera)?;
        let window = native_of(&self.globals, descriptor.window)?;
        let targets = [
            descriptor.scene.stub()?,
            descriptor.camera.stub()?,
            descriptor.window.stub()?,
        ];

        let native = self.globals.allocate(
            "create renderer",
            &NativeRequest::Renderer {
                scene,
                camera,
                window,
                frames_in_flight: frames_in_flight as u32,
            },
        )?;
        let inserted = self.table.lock().insert(RendererData {
            native,
            frames_in_flight,
        });
        let handle = match inserted {
            Ok(handle) => handle,
            Err(err) => {
                discard_native(&self.globals, NativeKind::Renderer, native);
                return Err(err);
            }
        };

        let stub = stub_for(&self.self_ref, self.scope(), handle);
        if let Err(err) = link_dependencies(&self.globals, &stub, &targets) {
            self.table.lock().remove(handle);
            discard_native(&self.globals, NativeKind::Renderer, native);
            return Err(err);
        }
        if let Some(label) = &descriptor.label {
            self.globals.names().set(handle.ident(), label);
        }
        log::trace!(
            "Created {} ({} frames in flight)",
            handle.ident(),
            frames_in_flight
        );
        Ok(Resource::new(handle, self.clone()))
    }

    fn live_stub(&self, handle: ResourceHandle<markers::Renderer>) -> ResourceResult<ResourceStub> {
        self.table.lock().get(handle)?;
        Ok(stub_for(&self.self_ref, self.scope(), handle))
    }

    /// Frames the renderer keeps in flight.
    pub fn frames_in_flight(&self, handle: ResourceHandle<markers::Renderer>) -> ResourceResult<usize> {
        Ok(self.table.lock().get(handle)?.frames_in_flight)
    }

    /// Scene drawn by a renderer.
    pub fn scene_of(&self, handle: ResourceHandle<markers::Renderer>) -> ResourceResult<Scene> {
        let stub = self.live_stub(handle)?;
        self.globals
            .tracker()
            .nth_target_of_type::<SceneBuilder>(&stub, 0)
    }

    /// Camera a renderer draws through.
    pub fn camera_of(&self, handle: ResourceHandle<markers::Renderer>) -> ResourceResult<Camera> {
        let stub = self.live_stub(handle)?;
        self.globals
            .tracker()
            .nth_target_of_type::<CameraBuilder>(&stub, 0)
    }

    /// Window a renderer presents to.
    pub fn window_of(&self, handle: ResourceHandle<markers::Renderer>) -> ResourceResult<Window> {
        let stub = self.live_stub(handle)?;
        self.globals
            .tracker()
            .nth_target_of_type::<WindowBuilder>(&stub, 0)
    }

    /// Number of live renderers.
    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    /// Whether no renderer is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResourceProvider for RendererBuilder {
    type Kind = markers::Renderer;

    fn is_disposed(&self, handle: ResourceHandle<markers::Renderer>) -> bool {
        !self.table.lock().contains(handle)
    }

    fn dispose(&self, handle: ResourceHandle<markers::Renderer>) -> ResourceResult<()> {
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
            .schedule_teardown(handle.ident(), NativeKind::Renderer, data.native)
    }

    fn name_store(&self) -> &NameStore {
        self.globals.names()
    }

    fn scope(&self) -> TrackerScope {
        self.globals.tracker().scope()
    }
}

impl NativeBacked for RendererBuilder {
    fn globals(&self) -> &Arc<FactoryGlobals> {
        &self.globals
    }

    fn native_handle(&self, handle: ResourceHandle<markers::Renderer>) -> ResourceResult<NativeHandle> {
        Ok(self.table.lock().get(handle)?.native)
    }
}

impl ManagedBuilder for RendererBuilder {
    fn live_handles(&self) -> Vec<RawHandle> {
        self.table.lock().raw_handles()
    }
}

impl Resource<RendererBuilder> {
    /// Frames kept in flight.
    pub fn frames_in_flight(&self) -> ResourceResult<usize> {
        self.provider()?.frames_in_flight(self.handle()?)
    }

    pub fn scene(&self) -> ResourceResult<Scene> {
        self.provider()?.scene_of(self.handle()?)
    }

    pub fn camera(&self) -> ResourceResult<Camera> {
        self.provider()?.camera_of(self.handle()?)
    }

    pub fn window(&self) -> ResourceResult<Window> {
        self.provider()?.window_of(self.handle()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::camera::CameraDescriptor;
    use crate::builders::scene::SceneDescriptor;
    use crate::builders::window::WindowDescriptor;
    use crate::error::ErrorKind;
    use crate::globals::test_support::dummy_globals;

    struct Fixture {
        renderers: Arc<RendererBuilder>,
        scene: Scene,
        camera: Camera,
        window: Window,
    }

    fn fixture() -> Fixture {
        let (_, globals) = dummy_globals();
        Fixture {
            scene: SceneBuilder::new(globals.clone())
                .create_scene(&SceneDescriptor::new())
                .unwrap(),
            camera: CameraBuilder::new(globals.clone())
                .create_camera(&CameraDescriptor::default())
                .unwrap(),
            window: WindowBuilder::new(globals.clone())
                .create_window(&WindowDescriptor::new("Main", 1280, 720))
                .unwrap(),
            renderers: RendererBuilder::new(globals),
        }
    }

    #[test]
    fn test_renderer_depends_on_its_inputs() {
        let f = fixture();
        let renderer = f
            .renderers
            .create_renderer(&RendererDescriptor::new(&f.scene, &f.camera, &f.window))
            .unwrap();
        assert_eq!(renderer.frames_in_flight().unwrap(), 3);
        assert_eq!(renderer.scene().unwrap(), f.scene);
        assert_eq!(renderer.camera().unwrap(), f.camera);
        assert_eq!(renderer.window().unwrap(), f.window);

        for err in [f.scene.dispose(), f.camera.dispose(), f.window.dispose()] {
            assert_eq!(err.unwrap_err().kind(), ErrorKind::DependencyViolation);
        }
        renderer.dispose().unwrap();
        f.window.dispose().unwrap();
    }

    #[test]
    fn test_frames_in_flight_bounded_by_config() {
        let f = fixture();
        let too_deep = RendererDescriptor::new(&f.scene, &f.camera, &f.window).with_frames_in_flight(4);
        assert_eq!(
            f.renderers.create_renderer(&too_deep).unwrap_err().kind(),
            ErrorKind::InvalidParameter
        );
        let shallow = RendererDescriptor::new(&f.scene, &f.camera, &f.window).with_frames_in_flight(1);
        let renderer = f.renderers.create_renderer(&shallow).unwrap();
        assert_eq!(renderer.frames_in_flight().unwrap(), 1);
    }
}
