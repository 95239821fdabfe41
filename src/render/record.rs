use super::pool::{BufferAllocator, BufferDescriptor};
use super::{CommandRecorder, DrawParams};

/// Opaque buffer identity used by the headless recorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostBuffer {
    pub id: u64,
    pub size_in_bytes: u64,
}

#[derive(Debug, Default)]
pub struct HostBufferAllocator {
    next_id: u64,
}

impl HostBufferAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, descriptor: &BufferDescriptor) -> HostBuffer {
        self.next_id += 1;
        HostBuffer {
            id: self.next_id,
            size_in_bytes: descriptor.size_in_bytes(),
        }
    }
}

impl BufferAllocator for HostBufferAllocator {
    type Buffer = HostBuffer;

    fn allocate(&mut self, descriptor: &BufferDescriptor) -> HostBuffer {
        self.create(descriptor)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostMesh {
    pub name: String,
    pub section_count: u32,
}

impl HostMesh {
    pub fn new(name: impl Into<String>, section_count: u32) -> Self {
        Self {
            name: name.into(),
            section_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostMaterial {
    pub name: String,
}

impl HostMaterial {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedDraw {
    pub mesh: String,
    pub section_index: u32,
    pub material: String,
    pub pass_index: u32,
    pub instance_count: u32,
    pub batch_offset: u32,
    pub batch_indices: HostBuffer,
    pub instance_data: HostBuffer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCommand {
    BeginRegion(String),
    EndRegion,
    SetBufferData { buffer: HostBuffer, data: Vec<u32> },
    DrawMeshInstanced(RecordedDraw),
}

/// Headless recorder that keeps every command for inspection.
#[derive(Debug, Default)]
pub struct CommandList {
    commands: Vec<RecordedCommand>,
    open_regions: usize,
}

impl CommandList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[RecordedCommand] {
        &self.commands
    }

    pub fn draws(&self) -> impl Iterator<Item = &RecordedDraw> {
        self.commands.iter().filter_map(|command| match command {
            RecordedCommand::DrawMeshInstanced(draw) => Some(draw),
            _ => None,
        })
    }

    pub fn uploads(&self) -> impl Iterator<Item = (&HostBuffer, &[u32])> {
        self.commands.iter().filter_map(|command| match command {
            RecordedCommand::SetBufferData { buffer, data } => Some((buffer, data.as_slice())),
            _ => None,
        })
    }

    pub fn open_regions(&self) -> usize {
        self.open_regions
    }

    pub fn clear(&mut self) {
        if self.open_regions > 0 {
            log::warn!("Clearing command list with {} open regions", self.open_regions);
        }
        self.commands.clear();
        self.open_regions = 0;
    }
}

impl CommandRecorder for CommandList {
    type Buffer = HostBuffer;
    type Mesh = HostMesh;
    type Material = HostMaterial;

    fn begin_region(&mut self, label: &str) {
        self.open_regions += 1;
        self.commands
            .push(RecordedCommand::BeginRegion(label.to_string()));
    }

    fn end_region(&mut self) {
        if self.open_regions == 0 {
            log::warn!("end_region without a matching begin_region");
            return;
        }
        self.open_regions -= 1;
        self.commands.push(RecordedCommand::EndRegion);
    }

    fn set_buffer_data(&mut self, buffer: &HostBuffer, data: &[u32]) {
        let bytes = std::mem::size_of_val(data) as u64;
        if bytes > buffer.size_in_bytes {
            log::error!(
                "Upload of {} bytes overflows buffer {} ({} bytes)",
                bytes,
                buffer.id,
                buffer.size_in_bytes
            );
        }
        self.commands.push(RecordedCommand::SetBufferData {
            buffer: *buffer,
            data: data.to_vec(),
        });
    }

    fn draw_mesh_instanced(
        &mut self,
        mesh: &HostMesh,
        section_index: u32,
        material: &HostMaterial,
        pass_index: u32,
        instance_count: u32,
        params: &DrawParams<'_, HostBuffer>,
    ) -> bool {
        if section_index >= mesh.section_count {
            log::warn!(
                "Mesh '{}' has no section {}; draw skipped",
                mesh.name,
                section_index
            );
            return false;
        }

        self.commands
            .push(RecordedCommand::DrawMeshInstanced(RecordedDraw {
                mesh: mesh.name.clone(),
                section_index,
                material: material.name.clone(),
                pass_index,
                instance_count,
                batch_offset: params.batch_offset,
                batch_indices: *params.batch_indices,
                instance_data: *params.instance_data,
            }));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regions_must_balance() {
        let mut list = CommandList::new();
        list.begin_region("outer");
        list.end_region();
        list.end_region();

        assert_eq!(list.open_regions(), 0);
        assert_eq!(list.commands().len(), 2);
    }

    #[test]
    fn draws_of_missing_sections_are_dropped() {
        let mut allocator = HostBufferAllocator::new();
        let buffer = allocator.create(&BufferDescriptor::of::<u32>(4));
        let params = DrawParams {
            batch_offset: 0,
            batch_indices: &buffer,
            instance_data: &buffer,
        };
        let mut list = CommandList::new();
        let quad = HostMesh::new("quad", 1);
        let lit = HostMaterial::new("lit");

        assert!(!list.draw_mesh_instanced(&quad, 1, &lit, 0, 3, &params));
        assert_eq!(list.draws().count(), 0);
        assert!(list.draw_mesh_instanced(&quad, 0, &lit, 0, 3, &params));
        assert_eq!(list.draws().count(), 1);
    }
}
