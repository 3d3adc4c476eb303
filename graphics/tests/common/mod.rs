//! Common utilities for lifecycle integration tests.

use std::sync::Arc;

use tether_graphics::{
    Camera, CameraDescriptor, DummyBackend, Light, LightDescriptor, LightKind, Material,
    MaterialDescriptor, Mesh, MeshDescriptor, MeshTriangle, MeshVertex, ModelInstance,
    ModelInstanceDescriptor, ResourceConfig, ResourceFactory, Scene, SceneDescriptor, Texture,
    TextureDescriptor, Window, WindowDescriptor,
};

/// Install a test logger once per process.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A factory over a dummy backend that the test can inspect.
pub struct TestContext {
    pub backend: Arc<DummyBackend>,
    pub factory: ResourceFactory,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_config(ResourceConfig::default())
    }

    pub fn with_config(config: ResourceConfig) -> Self {
        init_logging();
        let backend = Arc::new(DummyBackend::new());
        let factory = ResourceFactory::new(config, backend.clone())
            .expect("dummy factory should always be creatable");
        Self { backend, factory }
    }

    pub fn with_frames_in_flight(frames_in_flight: usize) -> Self {
        Self::with_config(ResourceConfig::default().with_frames_in_flight(frames_in_flight))
    }

    pub fn triangle_mesh(&self, label: &str) -> Mesh {
        let vertices = [
            MeshVertex::new([0.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 0.0]),
            MeshVertex::new([1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [1.0, 0.0]),
            MeshVertex::new([0.0, 1.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0]),
        ];
        let triangles = [MeshTriangle::new(0, 1, 2)];
        self.factory
            .meshes()
            .create_mesh(&MeshDescriptor::new(&vertices, &triangles).with_label(label))
            .expect("mesh creation")
    }

    pub fn texture(&self, label: &str) -> Texture {
        let texels = [0x80u8; 4 * 4 * 4];
        self.factory
            .textures()
            .create_texture(&TextureDescriptor::new(4, 4, &texels).with_label(label))
            .expect("texture creation")
    }

    pub fn material(&self, label: &str, textures: &[Texture]) -> Material {
        self.factory
            .materials()
            .create_material(&MaterialDescriptor::new(textures).with_label(label))
            .expect("material creation")
    }

    pub fn instance(&self, label: &str, mesh: &Mesh, material: &Material) -> ModelInstance {
        self.factory
            .model_instances()
            .create_model_instance(&ModelInstanceDescriptor::new(mesh, material).with_label(label))
            .expect("model instance creation")
    }

    pub fn light(&self, label: &str) -> Light {
        self.factory
            .lights()
            .create_light(&LightDescriptor::new(LightKind::Point).with_label(label))
            .expect("light creation")
    }

    pub fn scene(&self, label: &str) -> Scene {
        self.factory
            .scenes()
            .create_scene(&SceneDescriptor::new().with_label(label))
            .expect("scene creation")
    }

    pub fn camera(&self) -> Camera {
        self.factory
            .cameras()
            .create_camera(&CameraDescriptor::default())
            .expect("camera creation")
    }

    pub fn window(&self, title: &str) -> Window {
        self.factory
            .windows()
            .create_window(&WindowDescriptor::new(title, 640, 480))
            .expect("window creation")
    }

    /// Advance `frames` frames, returning the total number of teardowns run.
    pub fn advance(&self, frames: usize) -> usize {
        (0..frames)
            .map(|_| self.factory.advance_frame().expect("frame advance"))
            .sum()
    }
}
