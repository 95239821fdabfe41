//! wgpu implementation of the mesh pass recording surface.
//!
//! Materials carry one render pipeline per pass index. Every pipeline must
//! declare the batch bindings of [`mesh_batch_bindings_wgsl`] in group 0. The
//! batch offset of a draw is applied as the first instance of its instance
//! range, so the shader indexes the batch buffer with `instance_index`
//! directly.
//!
//! Batch indices are uploaded with `Queue::write_buffer`, which runs before
//! every command buffer of the next submit. Call
//! [`BufferPool::end_frame`](crate::render::BufferPool::end_frame) only after
//! that submit so each pass of a frame keeps its own upload target.

use std::collections::HashMap;
use std::ops::Range;

use wgpu::util::DeviceExt;

use crate::render::shader_params::{MESH_BATCH_BUFFER, MESH_BATCH_INDEXS};
use crate::render::{BufferAllocator, BufferDescriptor, CommandRecorder, DrawParams};

/// WGSL declarations of the batch-index and instance-data bindings.
pub fn mesh_batch_bindings_wgsl() -> String {
    format!(
        "@group(0) @binding(0) var<storage, read> {MESH_BATCH_INDEXS}: array<u32>;\n\
         @group(0) @binding(1) var<storage, read> {MESH_BATCH_BUFFER}: array<mat4x4<f32>>;\n"
    )
}

pub struct WgpuBufferAllocator {
    device: wgpu::Device,
}

impl WgpuBufferAllocator {
    pub fn new(device: wgpu::Device) -> Self {
        Self { device }
    }
}

impl BufferAllocator for WgpuBufferAllocator {
    type Buffer = wgpu::Buffer;

    fn allocate(&mut self, descriptor: &BufferDescriptor) -> wgpu::Buffer {
        self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("MeshBatchIndexsBuffer"),
            size: descriptor.size_in_bytes().max(4),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshSection {
    pub index_range: Range<u32>,
    pub base_vertex: i32,
}

pub struct GpuMesh {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    sections: Vec<MeshSection>,
}

impl GpuMesh {
    pub fn from_sections<V: bytemuck::Pod>(
        device: &wgpu::Device,
        vertices: &[V],
        indices: &[u32],
        sections: Vec<MeshSection>,
    ) -> Self {
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("VertexBuffer"),
            contents: bytemuck::cast_slice(vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("IndexBuffer"),
            contents: bytemuck::cast_slice(indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        Self {
            vertex_buffer,
            index_buffer,
            sections,
        }
    }

    /// A mesh with one section covering every index.
    pub fn from_vertices<V: bytemuck::Pod>(
        device: &wgpu::Device,
        vertices: &[V],
        indices: &[u32],
    ) -> Self {
        let whole = MeshSection {
            index_range: 0..indices.len() as u32,
            base_vertex: 0,
        };
        Self::from_sections(device, vertices, indices, vec![whole])
    }

    pub fn section(&self, index: u32) -> Option<&MeshSection> {
        self.sections.get(index as usize)
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }
}

pub struct GpuMaterial {
    id: u64,
    pipelines: Vec<Option<wgpu::RenderPipeline>>,
}

impl GpuMaterial {
    /// `pipelines[pass_index]` renders the material in that pass; `None`
    /// entries mark passes the material does not take part in.
    pub fn new(id: u64, pipelines: Vec<Option<wgpu::RenderPipeline>>) -> Self {
        Self { id, pipelines }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn pipeline(&self, pass_index: u32) -> Option<&wgpu::RenderPipeline> {
        self.pipelines.get(pass_index as usize)?.as_ref()
    }
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct BindGroupKey {
    material: u64,
    pass_index: u32,
    batch_indices: wgpu::Buffer,
    instance_data: wgpu::Buffer,
}

/// Records mesh pass draws into an open wgpu render pass.
pub struct WgpuRecorder<'a, 'pass> {
    device: &'a wgpu::Device,
    queue: &'a wgpu::Queue,
    pass: &'a mut wgpu::RenderPass<'pass>,
    bind_groups: HashMap<BindGroupKey, wgpu::BindGroup>,
}

impl<'a, 'pass> WgpuRecorder<'a, 'pass> {
    pub fn new(
        device: &'a wgpu::Device,
        queue: &'a wgpu::Queue,
        pass: &'a mut wgpu::RenderPass<'pass>,
    ) -> Self {
        Self {
            device,
            queue,
            pass,
            bind_groups: HashMap::new(),
        }
    }
}

impl CommandRecorder for WgpuRecorder<'_, '_> {
    type Buffer = wgpu::Buffer;
    type Mesh = GpuMesh;
    type Material = GpuMaterial;

    fn begin_region(&mut self, label: &str) {
        self.pass.push_debug_group(label);
    }

    fn end_region(&mut self) {
        self.pass.pop_debug_group();
    }

    fn set_buffer_data(&mut self, buffer: &wgpu::Buffer, data: &[u32]) {
        if !data.is_empty() {
            self.queue
                .write_buffer(buffer, 0, bytemuck::cast_slice(data));
        }
    }

    fn draw_mesh_instanced(
        &mut self,
        mesh: &GpuMesh,
        section_index: u32,
        material: &GpuMaterial,
        pass_index: u32,
        instance_count: u32,
        params: &DrawParams<'_, wgpu::Buffer>,
    ) -> bool {
        let Some(pipeline) = material.pipeline(pass_index) else {
            log::warn!(
                "Material {} has no pipeline for pass {}; draw skipped",
                material.id(),
                pass_index
            );
            return false;
        };
        let Some(section) = mesh.section(section_index) else {
            log::warn!("Mesh has no section {}; draw skipped", section_index);
            return false;
        };

        let key = BindGroupKey {
            material: material.id(),
            pass_index,
            batch_indices: params.batch_indices.clone(),
            instance_data: params.instance_data.clone(),
        };
        let device = self.device;
        let bind_group = self.bind_groups.entry(key).or_insert_with(|| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("MeshBatchBindGroup"),
                layout: &pipeline.get_bind_group_layout(0),
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: params.batch_indices.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: params.instance_data.as_entire_binding(),
                    },
                ],
            })
        });

        self.pass.set_pipeline(pipeline);
        self.pass.set_bind_group(0, &*bind_group, &[]);
        self.pass
            .set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
        self.pass
            .set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);

        let first_instance = params.batch_offset;
        self.pass.draw_indexed(
            section.index_range.clone(),
            section.base_vertex,
            first_instance..first_instance + instance_count,
        );
        true
    }
}
