//! Resource factory: owns the shared runtime state and every builder.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tether_graphics::{DummyBackend, ResourceConfig, ResourceFactory, SceneDescriptor};
//!
//! let mut factory = ResourceFactory::new(ResourceConfig::default(), Arc::new(DummyBackend::new()))?;
//! let scene = factory.scenes().create_scene(&SceneDescriptor::new().with_label("Main"))?;
//!
//! // Once per completed GPU frame:
//! factory.advance_frame()?;
//!
//! factory.shutdown()?;
//! ```

use std::sync::Arc;

use crate::backend::NativeBackend;
use crate::builders::{
    ApplicationLoopBuilder, CameraBuilder, LightBuilder, ManagedBuilder, MaterialBuilder,
    MeshBuilder, ModelInstanceBuilder, RendererBuilder, ResourceGroupBuilder, SceneBuilder,
    TextureBuilder, WindowBuilder,
};
use crate::config::ResourceConfig;
use crate::deferred::DeferredDisposalQueue;
use crate::error::{ErrorKind, ResourceError, ResourceResult};
use crate::globals::FactoryGlobals;
use crate::resource::DependencyTracker;

/// Entry point of the resource runtime.
///
/// A factory is created with an injected [`NativeBackend`] and hands out one
/// builder per resource type. All builders share one dependency tracker and
/// one deferred disposal queue.
pub struct ResourceFactory {
    globals: Arc<FactoryGlobals>,
    meshes: Arc<MeshBuilder>,
    textures: Arc<TextureBuilder>,
    materials: Arc<MaterialBuilder>,
    model_instances: Arc<ModelInstanceBuilder>,
    lights: Arc<LightBuilder>,
    cameras: Arc<CameraBuilder>,
    scenes: Arc<SceneBuilder>,
    windows: Arc<WindowBuilder>,
    loops: Arc<ApplicationLoopBuilder>,
    renderers: Arc<RendererBuilder>,
    groups: Arc<ResourceGroupBuilder>,
    is_shut_down: bool,
}

impl ResourceFactory {
    /// Create a factory over `backend`.
    pub fn new(config: ResourceConfig, backend: Arc<dyn NativeBackend>) -> ResourceResult<Self> {
        config
            .validate()
            .map_err(|err| ResourceError::InvalidParameter(err.to_string()))?;
        log::info!(
            "Creating resource factory on {} backend ({} frames in flight)",
            backend.name(),
            config.frames_in_flight
        );
        let globals = Arc::new(FactoryGlobals::new(config, backend)?);
        Ok(Self {
            meshes: MeshBuilder::new(globals.clone()),
            textures: TextureBuilder::new(globals.clone()),
            materials: MaterialBuilder::new(globals.clone()),
            model_instances: ModelInstanceBuilder::new(globals.clone()),
            lights: LightBuilder::new(globals.clone()),
            cameras: CameraBuilder::new(globals.clone()),
            scenes: SceneBuilder::new(globals.clone()),
            windows: WindowBuilder::new(globals.clone()),
            loops: ApplicationLoopBuilder::new(globals.clone()),
            renderers: RendererBuilder::new(globals.clone()),
            groups: ResourceGroupBuilder::new(globals.clone()),
            globals,
            is_shut_down: false,
        })
    }

    /// Configuration the factory was created with.
    pub fn config(&self) -> &ResourceConfig {
        self.globals.config()
    }

    /// Builder of [`Mesh`](crate::Mesh) resources.
    pub fn meshes(&self) -> &Arc<MeshBuilder> {
        &self.meshes
    }

    /// Builder of [`Texture`](crate::Texture) resources.
    pub fn textures(&self) -> &Arc<TextureBuilder> {
        &self.textures
    }

    /// Builder of [`Material`](crate::Material) resources.
    pub fn materials(&self) -> &Arc<MaterialBuilder> {
        &self.materials
    }

    /// Builder of [`ModelInstance`](crate::ModelInstance) resources.
    pub fn model_instances(&self) -> &Arc<ModelInstanceBuilder> {
        &self.model_instances
    }

    /// Builder of [`Light`](crate::Light) resources.
    pub fn lights(&self) -> &Arc<LightBuilder> {
        &self.lights
    }

    /// Builder of [`Camera`](crate::Camera) resources.
    pub fn cameras(&self) -> &Arc<CameraBuilder> {
        &self.cameras
    }

    /// Builder of [`Scene`](crate::Scene) resources.
    pub fn scenes(&self) -> &Arc<SceneBuilder> {
        &self.scenes
    }

    /// Builder of [`Window`](crate::Window) resources.
    pub fn windows(&self) -> &Arc<WindowBuilder> {
        &self.windows
    }

    /// Builder of [`ApplicationLoop`](crate::ApplicationLoop) resources.
    pub fn application_loops(&self) -> &Arc<ApplicationLoopBuilder> {
        &self.loops
    }

    /// Builder of [`Renderer`](crate::Renderer) resources.
    pub fn renderers(&self) -> &Arc<RendererBuilder> {
        &self.renderers
    }

    /// Builder of [`ResourceGroup`](crate::ResourceGroup) resources.
    pub fn groups(&self) -> &Arc<ResourceGroupBuilder> {
        &self.groups
    }

    /// Tracker shared by every builder of this factory.
    pub fn dependency_tracker(&self) -> &DependencyTracker {
        self.globals.tracker()
    }

    /// Queue holding native teardowns until their frame retires.
    pub fn disposal_queue(&self) -> &DeferredDisposalQueue {
        self.globals.disposal()
    }

    /// Signal that the GPU finished the oldest in-flight frame.
    ///
    /// Returns the number of native teardowns executed.
    pub fn advance_frame(&self) -> ResourceResult<usize> {
        self.globals.disposal().advance_frame()
    }

    /// Whether [`shutdown`](Self::shutdown) has run.
    pub fn is_shut_down(&self) -> bool {
        self.is_shut_down
    }

    /// Builders in dependents-first order.
    fn shutdown_order(&self) -> [(&'static str, Arc<dyn ManagedBuilder>); 11] {
        fn managed<B: ManagedBuilder>(builder: &Arc<B>) -> Arc<dyn ManagedBuilder> {
            builder.clone()
        }

        [
            ("ResourceGroup", managed(&self.groups)),
            ("Renderer", managed(&self.renderers)),
            ("ApplicationLoop", managed(&self.loops)),
            ("Window", managed(&self.windows)),
            ("Scene", managed(&self.scenes)),
            ("Camera", managed(&self.cameras)),
            ("ModelInstance", managed(&self.model_instances)),
            ("Light", managed(&self.lights)),
            ("Material", managed(&self.materials)),
            ("Texture", managed(&self.textures)),
            ("Mesh", managed(&self.meshes)),
        ]
    }

    fn live_count(builders: &[(&'static str, Arc<dyn ManagedBuilder>)]) -> usize {
        builders
            .iter()
            .map(|(_, builder)| builder.live_handles().len())
            .sum()
    }

    /// Dispose every live resource, then flush all pending native teardowns.
    ///
    /// New resources cannot be created afterwards. Resources are disposed
    /// dependents first; the dependency gate still applies, so anything kept
    /// alive by a dependency the factory cannot release is left in place and
    /// reported. Calling this twice is a no-op.
    pub fn shutdown(&mut self) -> ResourceResult<()> {
        if self.is_shut_down {
            return Ok(());
        }
        self.is_shut_down = true;
        self.globals.mark_shut_down();
        log::info!("Shutting down resource factory");

        let builders = self.shutdown_order();
        let mut first_error = None;
        let mut remaining = Self::live_count(&builders);
        let mut pass = 0;
        while remaining > 0 {
            pass += 1;
            for (type_name, builder) in &builders {
                for raw in builder.live_handles() {
                    match builder.dispose_for_shutdown(raw) {
                        Ok(()) => {}
                        Err(err) if err.kind() == ErrorKind::DependencyViolation => {
                            log::debug!("Shutdown pass {}: {}#{} still blocked", pass, type_name, raw.get());
                        }
                        Err(err) => {
                            log::error!("Failed to dispose {}#{} at shutdown: {}", type_name, raw.get(), err);
                            first_error.get_or_insert(err);
                        }
                    }
                }
            }
            let now = Self::live_count(&builders);
            if now >= remaining {
                log::warn!("{} resources could not be disposed at shutdown", now);
                for (type_name, builder) in &builders {
                    for raw in builder.live_handles() {
                        let name = builder
                            .name_raw(raw)
                            .unwrap_or_else(|_| format!("#{}", raw.get()));
                        log::warn!("  leaked {} '{}'", type_name, name);
                    }
                }
                break;
            }
            remaining = now;
        }

        match self.globals.disposal().flush_all() {
            Ok(count) => log::debug!("Flushed {} native teardowns at shutdown", count),
            Err(err) => {
                first_error.get_or_insert(err);
            }
        }
        log::info!("Resource factory shut down after {} passes", pass);
        first_error.map_or(Ok(()), Err)
    }
}

impl Drop for ResourceFactory {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            log::error!("Resource factory shutdown failed: {}", err);
        }
    }
}

impl std::fmt::Debug for ResourceFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceFactory")
            .field("globals", &self.globals)
            .field("is_shut_down", &self.is_shut_down)
            .finish()
    }
}
