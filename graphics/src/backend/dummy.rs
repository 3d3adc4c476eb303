//! Dummy native backend for testing and development.
//!
//! This backend doesn't talk to any native library. It hands out
//! increasing handle values, remembers which handles are live and records
//! every teardown in order, so tests can check exactly when and how often
//! the runtime destroys native objects. Failures can be injected per kind.

use std::collections::HashMap;

use parking_lot::Mutex;

use super::{NativeBackend, NativeError, NativeHandle, NativeKind, NativeRequest};

#[derive(Debug, Default)]
struct DummyState {
    last_handle: u64,
    live: HashMap<NativeHandle, NativeKind>,
    teardowns: Vec<(NativeKind, NativeHandle)>,
    attachments: Vec<(NativeHandle, NativeHandle)>,
    fail_allocation: Option<NativeKind>,
    fail_dispose: Option<NativeKind>,
    fail_detach: Option<NativeKind>,
}

impl DummyState {
    fn expect_live(&self, kind: NativeKind, handle: NativeHandle) -> Result<(), NativeError> {
        match self.live.get(&handle) {
            Some(live_kind) if *live_kind == kind => Ok(()),
            _ => Err(NativeError::UnknownHandle { kind, handle }),
        }
    }
}

/// In-memory [`NativeBackend`].
#[derive(Debug, Default)]
pub struct DummyBackend {
    state: Mutex<DummyState>,
}

impl DummyBackend {
    /// Create a new dummy backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live native objects.
    pub fn live_count(&self) -> usize {
        self.state.lock().live.len()
    }

    /// Number of live native objects of `kind`.
    pub fn live_count_of(&self, kind: NativeKind) -> usize {
        self.state.lock().live.values().filter(|k| **k == kind).count()
    }

    /// Whether `handle` names a live native object.
    pub fn is_live(&self, handle: NativeHandle) -> bool {
        self.state.lock().live.contains_key(&handle)
    }

    /// Every successful teardown so far, in call order.
    pub fn teardown_log(&self) -> Vec<(NativeKind, NativeHandle)> {
        self.state.lock().teardowns.clone()
    }

    /// Number of successful teardowns of `kind`.
    pub fn teardown_count_of(&self, kind: NativeKind) -> usize {
        self.state
            .lock()
            .teardowns
            .iter()
            .filter(|(k, _)| *k == kind)
            .count()
    }

    /// Children currently attached to `scene`.
    pub fn attached_to(&self, scene: NativeHandle) -> Vec<NativeHandle> {
        self.state
            .lock()
            .attachments
            .iter()
            .filter(|(s, _)| *s == scene)
            .map(|(_, child)| *child)
            .collect()
    }

    /// Make the next allocation of `kind` fail.
    pub fn fail_next_allocation(&self, kind: NativeKind) {
        self.state.lock().fail_allocation = Some(kind);
    }

    /// Make the next teardown of `kind` fail.
    pub fn fail_next_dispose(&self, kind: NativeKind) {
        self.state.lock().fail_dispose = Some(kind);
    }

    /// Make the next detach of a child of `kind` fail.
    pub fn fail_next_detach(&self, kind: NativeKind) {
        self.state.lock().fail_detach = Some(kind);
    }
}

impl NativeBackend for DummyBackend {
    fn name(&self) -> &str {
        "Dummy"
    }

    fn allocate(&self, request: &NativeRequest<'_>) -> Result<NativeHandle, NativeError> {
        let kind = request.kind();
        let mut state = self.state.lock();
        if state.fail_allocation == Some(kind) {
            state.fail_allocation = None;
            return Err(NativeError::CallFailed {
                call: "allocate",
                status: -1,
            });
        }

        match *request {
            NativeRequest::ModelInstance {
                vertex_buffer,
                index_buffer,
                material,
                ..
            } => {
                state.expect_live(NativeKind::VertexBuffer, vertex_buffer)?;
                state.expect_live(NativeKind::IndexBuffer, index_buffer)?;
                state.expect_live(NativeKind::Material, material)?;
            }
            NativeRequest::Material { textures } => {
                for texture in textures {
                    state.expect_live(NativeKind::Texture, *texture)?;
                }
            }
            NativeRequest::Renderer {
                scene,
                camera,
                window,
                ..
            } => {
                state.expect_live(NativeKind::Scene, scene)?;
                state.expect_live(NativeKind::Camera, camera)?;
                state.expect_live(NativeKind::Window, window)?;
            }
            NativeRequest::VertexBuffer { data, .. }
            | NativeRequest::IndexBuffer { data, .. }
                if data.is_empty() =>
            {
                return Err(NativeError::InvalidParameter(format!(
                    "empty {kind} data"
                )));
            }
            _ => {}
        }

        state.last_handle += 1;
        let handle = NativeHandle::new(state.last_handle).ok_or(NativeError::OutOfMemory)?;
        state.live.insert(handle, kind);
        log::trace!("DummyBackend: allocated {} {}", kind, handle);
        Ok(handle)
    }

    fn dispose(&self, kind: NativeKind, handle: NativeHandle) -> Result<(), NativeError> {
        let mut state = self.state.lock();
        if state.fail_dispose == Some(kind) {
            state.fail_dispose = None;
            return Err(NativeError::CallFailed {
                call: "dispose",
                status: -1,
            });
        }
        state.expect_live(kind, handle)?;
        state.live.remove(&handle);
        state.attachments.retain(|(scene, child)| *scene != handle && *child != handle);
        state.teardowns.push((kind, handle));
        log::trace!("DummyBackend: disposed {} {}", kind, handle);
        Ok(())
    }

    fn attach(
        &self,
        scene: NativeHandle,
        kind: NativeKind,
        child: NativeHandle,
    ) -> Result<(), NativeError> {
        let mut state = self.state.lock();
        state.expect_live(NativeKind::Scene, scene)?;
        state.expect_live(kind, child)?;
        state.attachments.push((scene, child));
        Ok(())
    }

    fn detach(
        &self,
        scene: NativeHandle,
        kind: NativeKind,
        child: NativeHandle,
    ) -> Result<(), NativeError> {
        let mut state = self.state.lock();
        if state.fail_detach == Some(kind) {
            state.fail_detach = None;
            return Err(NativeError::CallFailed {
                call: "detach",
                status: -1,
            });
        }
        state.expect_live(NativeKind::Scene, scene)?;
        state.expect_live(kind, child)?;
        let index = state
            .attachments
            .iter()
            .position(|entry| *entry == (scene, child))
            .ok_or(NativeError::UnknownHandle { kind, handle: child })?;
        state.attachments.remove(index);
        Ok(())
    }

    fn set_instance_material(
        &self,
        instance: NativeHandle,
        material: NativeHandle,
    ) -> Result<(), NativeError> {
        let state = self.state.lock();
        state.expect_live(NativeKind::ModelInstance, instance)?;
        state.expect_live(NativeKind::Material, material)
    }
}
