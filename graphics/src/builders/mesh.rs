//! Meshes and their shared vertex/index buffers.
//!
//! Mesh data is copied into the factory's staging pool before it is handed
//! to the backend, so winding can be flipped in place without touching the
//! caller's slices. Several meshes may draw different index ranges of the
//! same native buffers; the builder reference counts each buffer and only
//! schedules its teardown when the last mesh using it is disposed.

use std::sync::{Arc, Weak};

use bytemuck::{Pod, Zeroable};
use parking_lot::Mutex;
use tether_core::{FixedByteBuffer, FixedByteBufferPool, PooledMap};

use crate::Mesh;
use crate::backend::{NativeHandle, NativeKind, NativeRequest};
use crate::builders::{ManagedBuilder, discard_native, stub_for};
use crate::error::{ResourceError, ResourceResult};
use crate::globals::FactoryGlobals;
use crate::resource::table::ResourceTable;
use crate::resource::{
    NameStore, RawHandle, Resource, ResourceHandle, ResourceProvider, TrackerScope, markers,
};

/// Interleaved vertex layout.
///
/// # Memory Layout
///
/// `#[repr(C)]`, 32 bytes, no padding.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl MeshVertex {
    pub fn new(position: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            uv,
        }
    }
}

/// Three indices into the vertex list, counter-clockwise front face.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct MeshTriangle {
    pub indices: [u32; 3],
}

impl MeshTriangle {
    pub fn new(a: u32, b: u32, c: u32) -> Self {
        Self { indices: [a, b, c] }
    }

    /// Same triangle with the opposite winding.
    pub fn flipped(self) -> Self {
        let [a, b, c] = self.indices;
        Self::new(a, c, b)
    }
}

/// Indices per triangle.
const INDICES_PER_TRIANGLE: u32 = 3;

/// Descriptor for creating a mesh from vertex and triangle lists.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshDescriptor<'a> {
    pub label: Option<String>,
    pub vertices: &'a [MeshVertex],
    pub triangles: &'a [MeshTriangle],
    /// Reverse the winding of every triangle on upload.
    pub flip_winding: bool,
}

impl<'a> MeshDescriptor<'a> {
    pub fn new(vertices: &'a [MeshVertex], triangles: &'a [MeshTriangle]) -> Self {
        Self {
            label: None,
            vertices,
            triangles,
            flip_winding: false,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_flipped_winding(mut self) -> Self {
        self.flip_winding = true;
        self
    }

    fn validate(&self) -> ResourceResult<(u32, u32)> {
        if self.vertices.is_empty() || self.triangles.is_empty() {
            return Err(ResourceError::InvalidParameter(
                "mesh needs at least one vertex and one triangle".to_string(),
            ));
        }
        let vertex_count = u32::try_from(self.vertices.len()).map_err(|_| {
            ResourceError::InvalidParameter(format!("{} vertices exceed u32", self.vertices.len()))
        })?;
        let index_count = u32::try_from(self.triangles.len())
            .ok()
            .and_then(|count| count.checked_mul(INDICES_PER_TRIANGLE))
            .ok_or_else(|| {
                ResourceError::InvalidParameter(format!(
                    "{} triangles exceed u32 indices",
                    self.triangles.len()
                ))
            })?;
        if let Some(index) = self
            .triangles
            .iter()
            .flat_map(|triangle| triangle.indices)
            .find(|index| *index >= vertex_count)
        {
            return Err(ResourceError::InvalidParameter(format!(
                "index {index} is out of range for {vertex_count} vertices"
            )));
        }
        Ok((vertex_count, index_count))
    }
}

/// Index range drawn by a mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshRange {
    pub first_index: u32,
    pub index_count: u32,
}

/// Everything a model instance needs to draw a mesh.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MeshDraw {
    pub(crate) vertex_buffer: NativeHandle,
    pub(crate) index_buffer: NativeHandle,
    pub(crate) range: MeshRange,
}

struct MeshData {
    vertex_buffer: NativeHandle,
    index_buffer: NativeHandle,
    vertex_count: u32,
    /// Indices in the whole index buffer, which may exceed `range`.
    buffer_index_count: u32,
    range: MeshRange,
}

struct MeshState {
    table: ResourceTable<markers::Mesh, MeshData>,
    vertex_refs: PooledMap<NativeHandle, u32>,
    index_refs: PooledMap<NativeHandle, u32>,
}

/// Decrement a buffer's user count. Returns `true` when it reached zero.
fn release_buffer(refs: &mut PooledMap<NativeHandle, u32>, buffer: NativeHandle) -> bool {
    let Some(count) = refs.get_mut(&buffer) else {
        return false;
    };
    *count -= 1;
    if *count == 0 {
        refs.remove(&buffer);
        true
    } else {
        false
    }
}

/// Swap the second and third index of every staged triangle.
fn flip_staged_winding(bytes: &mut [u8]) {
    const INDEX_BYTES: usize = std::mem::size_of::<u32>();
    for triangle in bytes.chunks_exact_mut(std::mem::size_of::<MeshTriangle>()) {
        let (b, c) = triangle[INDEX_BYTES..].split_at_mut(INDEX_BYTES);
        b.swap_with_slice(c);
    }
}

/// Provider of [`Mesh`] resources.
pub struct MeshBuilder {
    globals: Arc<FactoryGlobals>,
    self_ref: Weak<Self>,
    state: Mutex<MeshState>,
}

impl MeshBuilder {
    pub(crate) fn new(globals: Arc<FactoryGlobals>) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            globals,
            self_ref: self_ref.clone(),
            state: Mutex::new(MeshState {
                table: ResourceTable::new(),
                vertex_refs: PooledMap::new(),
                index_refs: PooledMap::new(),
            }),
        })
    }

    /// Create a mesh, uploading vertices and indices through staging memory.
    pub fn create_mesh(self: &Arc<Self>, descriptor: &MeshDescriptor<'_>) -> ResourceResult<Mesh> {
        self.globals.ensure_open("Mesh")?;
        let (vertex_count, index_count) = descriptor.validate()?;
        let (vertex_buffer, index_buffer) = self.upload(descriptor, vertex_count, index_count)?;

        let inserted = {
            let mut state = self.state.lock();
            let inserted = state.table.insert(MeshData {
                vertex_buffer,
                index_buffer,
                vertex_count,
                buffer_index_count: index_count,
                range: MeshRange {
                    first_index: 0,
                    index_count,
                },
            });
            if inserted.is_ok() {
                state.vertex_refs.insert_or_replace(vertex_buffer, 1);
                state.index_refs.insert_or_replace(index_buffer, 1);
            }
            inserted
        };
        let handle = match inserted {
            Ok(handle) => handle,
            Err(err) => {
                discard_native(&self.globals, NativeKind::VertexBuffer, vertex_buffer);
                discard_native(&self.globals, NativeKind::IndexBuffer, index_buffer);
                return Err(err);
            }
        };
        if let Some(label) = &descriptor.label {
            self.globals.names().set(handle.ident(), label);
        }
        log::trace!(
            "Created {} ({} vertices, {} indices)",
            handle.ident(),
            vertex_count,
            index_count
        );
        Ok(Resource::new(handle, self.clone()))
    }

    /// Create a mesh drawing `range` of `source`'s buffers.
    ///
    /// The buffers stay alive until every mesh sharing them is disposed;
    /// `source` itself may be disposed first.
    pub fn create_mesh_sharing_buffers(
        self: &Arc<Self>,
        source: &Mesh,
        range: MeshRange,
        label: Option<&str>,
    ) -> ResourceResult<Mesh> {
        self.globals.ensure_open("Mesh")?;
        if !Arc::ptr_eq(source.provider()?, self) {
            return Err(ResourceError::InvalidParameter(
                "source mesh belongs to a different builder".to_string(),
            ));
        }
        if range.index_count == 0 || range.index_count % INDICES_PER_TRIANGLE != 0 {
            return Err(ResourceError::InvalidParameter(format!(
                "shared index count must be a non-zero multiple of 3, got {}",
                range.index_count
            )));
        }
        let source_handle = source.handle()?;

        let handle = {
            let mut state = self.state.lock();
            let data = state.table.get(source_handle)?;
            let end = range.first_index.checked_add(range.index_count);
            if end.is_none_or(|end| end > data.buffer_index_count) {
                return Err(ResourceError::OutOfRange {
                    index: range.first_index as usize + range.index_count as usize,
                    count: data.buffer_index_count as usize,
                });
            }
            let shared = MeshData {
                vertex_buffer: data.vertex_buffer,
                index_buffer: data.index_buffer,
                vertex_count: data.vertex_count,
                buffer_index_count: data.buffer_index_count,
                range,
            };
            let (vertex_buffer, index_buffer) = (shared.vertex_buffer, shared.index_buffer);
            let handle = state.table.insert(shared)?;
            *state.vertex_refs.get_or_insert_with(vertex_buffer, || 0) += 1;
            *state.index_refs.get_or_insert_with(index_buffer, || 0) += 1;
            handle
        };
        if let Some(label) = label {
            self.globals.names().set(handle.ident(), label);
        }
        log::trace!(
            "Created {} sharing buffers of {} (indices {}..{})",
            handle.ident(),
            source.ident(),
            range.first_index,
            range.first_index + range.index_count
        );
        Ok(Resource::new(handle, self.clone()))
    }

    /// Stage vertex and index data and allocate both native buffers.
    fn upload(
        &self,
        descriptor: &MeshDescriptor<'_>,
        vertex_count: u32,
        index_count: u32,
    ) -> ResourceResult<(NativeHandle, NativeHandle)> {
        let mut staging = self.globals.staging().lock();
        let vertex_stage = staging.rent_and_copy(bytemuck::cast_slice(descriptor.vertices))?;
        let index_stage = match staging.rent_and_copy(bytemuck::cast_slice(descriptor.triangles)) {
            Ok(stage) => stage,
            Err(err) => {
                return_stage(&mut staging, vertex_stage);
                return Err(err.into());
            }
        };

        let result = self.allocate_staged(
            &mut staging,
            (vertex_stage, vertex_count),
            (index_stage, index_count),
            descriptor.flip_winding,
        );
        return_stage(&mut staging, vertex_stage);
        return_stage(&mut staging, index_stage);
        result
    }

    fn allocate_staged(
        &self,
        staging: &mut FixedByteBufferPool,
        (vertex_stage, vertex_count): (FixedByteBuffer, u32),
        (index_stage, index_count): (FixedByteBuffer, u32),
        flip_winding: bool,
    ) -> ResourceResult<(NativeHandle, NativeHandle)> {
        if flip_winding {
            flip_staged_winding(staging.bytes_mut(&index_stage)?);
        }
        let vertex_buffer = self.globals.allocate(
            "create vertex buffer",
            &NativeRequest::VertexBuffer {
                data: staging.bytes(&vertex_stage)?,
                vertex_count,
            },
        )?;
        let index_buffer = staging
            .bytes(&index_stage)
            .map_err(ResourceError::from)
            .and_then(|data| {
                self.globals.allocate(
                    "create index buffer",
                    &NativeRequest::IndexBuffer { data, index_count },
                )
            });
        match index_buffer {
            Ok(index_buffer) => Ok((vertex_buffer, index_buffer)),
            Err(err) => {
                discard_native(&self.globals, NativeKind::VertexBuffer, vertex_buffer);
                Err(err)
            }
        }
    }

    /// Number of vertices in the mesh's vertex buffer.
    pub fn vertex_count(&self, handle: ResourceHandle<markers::Mesh>) -> ResourceResult<u32> {
        Ok(self.state.lock().table.get(handle)?.vertex_count)
    }

    /// Index range drawn by the mesh.
    pub fn range(&self, handle: ResourceHandle<markers::Mesh>) -> ResourceResult<MeshRange> {
        Ok(self.state.lock().table.get(handle)?.range)
    }

    pub(crate) fn draw(&self, handle: ResourceHandle<markers::Mesh>) -> ResourceResult<MeshDraw> {
        let state = self.state.lock();
        let data = state.table.get(handle)?;
        Ok(MeshDraw {
            vertex_buffer: data.vertex_buffer,
            index_buffer: data.index_buffer,
            range: data.range,
        })
    }

    pub(crate) fn globals(&self) -> &Arc<FactoryGlobals> {
        &self.globals
    }

    /// Number of live meshes using the index buffer of `handle`.
    pub fn buffer_users(&self, handle: ResourceHandle<markers::Mesh>) -> ResourceResult<u32> {
        let state = self.state.lock();
        let buffer = state.table.get(handle)?.index_buffer;
        Ok(state.index_refs.get(&buffer).copied().unwrap_or(0))
    }

    /// Number of live meshes.
    pub fn len(&self) -> usize {
        self.state.lock().table.len()
    }

    /// Whether no mesh is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn return_stage(staging: &mut FixedByteBufferPool, stage: FixedByteBuffer) {
    if let Err(err) = staging.give_back(stage) {
        log::warn!("Failed to return mesh staging buffer: {}", err);
    }
}

impl ResourceProvider for MeshBuilder {
    type Kind = markers::Mesh;

    fn is_disposed(&self, handle: ResourceHandle<markers::Mesh>) -> bool {
        !self.state.lock().table.contains(handle)
    }

    fn dispose(&self, handle: ResourceHandle<markers::Mesh>) -> ResourceResult<()> {
        if self.is_disposed(handle) {
            return Ok(());
        }
        let stub = stub_for(&self.self_ref, self.scope(), handle);
        self.globals.ensure_disposal_open()?;
        self.globals.tracker().throw_for_premature_disposal(&stub)?;
        let (data, vertex_released, index_released) = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let Some(data) = state.table.remove(handle) else {
                return Ok(());
            };
            let vertex_released = release_buffer(&mut state.vertex_refs, data.vertex_buffer);
            let index_released = release_buffer(&mut state.index_refs, data.index_buffer);
            (data, vertex_released, index_released)
        };
        self.globals.release(&stub)?;
        log::trace!("Disposed {}", handle.ident());

        let ident = handle.ident();
        let vertex = if vertex_released {
            self.globals
                .schedule_teardown(ident, NativeKind::VertexBuffer, data.vertex_buffer)
        } else {
            Ok(())
        };
        let index = if index_released {
            self.globals
                .schedule_teardown(ident, NativeKind::IndexBuffer, data.index_buffer)
        } else {
            Ok(())
        };
        vertex.and(index)
    }

    fn name_store(&self) -> &NameStore {
        self.globals.names()
    }

    fn scope(&self) -> TrackerScope {
        self.globals.tracker().scope()
    }
}

impl ManagedBuilder for MeshBuilder {
    fn live_handles(&self) -> Vec<RawHandle> {
        self.state.lock().table.raw_handles()
    }
}

impl Resource<MeshBuilder> {
    /// Number of vertices.
    pub fn vertex_count(&self) -> ResourceResult<u32> {
        self.provider()?.vertex_count(self.handle()?)
    }

    /// Index range drawn by this mesh.
    pub fn range(&self) -> ResourceResult<MeshRange> {
        self.provider()?.range(self.handle()?)
    }
}
