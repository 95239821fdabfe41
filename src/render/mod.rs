pub mod pool;
pub mod record;

pub use pool::{BufferAllocator, BufferDescriptor, BufferPool, BufferRef, PoolStats};
pub use record::{CommandList, HostBuffer, HostBufferAllocator, HostMaterial, HostMesh};

use crate::asset::Assets;
use crate::scene::GpuScene;

/// Profiling region wrapping every mesh pass draw.
pub const DRAW_PROFILER_LABEL: &str = "RenderLoop.DrawMeshBatcher";

/// Shader-visible names of the per-draw parameters. Backends that bind the
/// offset as the first instance of the draw leave `MESH_BATCH_OFFSET` unbound.
pub mod shader_params {
    pub const MESH_BATCH_OFFSET: &str = "_MeshBatchOffset";
    pub const MESH_BATCH_INDEXS: &str = "_MeshBatchIndexs";
    pub const MESH_BATCH_BUFFER: &str = "_MeshBatchBuffer";
}

/// Per-draw parameters of one instanced draw.
///
/// Instance `i` of the draw reads `batch_indices[batch_offset + i]` to find
/// its slot in `instance_data`.
pub struct DrawParams<'a, B> {
    pub batch_offset: u32,
    pub batch_indices: &'a B,
    pub instance_data: &'a B,
}

/// Command-recording surface a mesh pass draws through.
pub trait CommandRecorder {
    type Buffer;
    type Mesh;
    type Material;

    fn begin_region(&mut self, label: &str);

    fn end_region(&mut self);

    fn set_buffer_data(&mut self, buffer: &Self::Buffer, data: &[u32]);

    /// Records one instanced draw of `section_index` of `mesh`. Returns
    /// `false` when the draw cannot be recorded, e.g. the mesh has no such
    /// section.
    fn draw_mesh_instanced(
        &mut self,
        mesh: &Self::Mesh,
        section_index: u32,
        material: &Self::Material,
        pass_index: u32,
        instance_count: u32,
        params: &DrawParams<'_, Self::Buffer>,
    ) -> bool;
}

/// Everything the draw phase of a pass needs from the frame.
pub struct PassContext<'a, R, A>
where
    R: CommandRecorder,
    A: BufferAllocator<Buffer = R::Buffer>,
{
    pub recorder: &'a mut R,
    pub resources: &'a mut BufferPool<A>,
    pub assets: &'a Assets<R::Mesh, R::Material>,
    pub scene: &'a GpuScene<R::Buffer>,
}
