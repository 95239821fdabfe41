use bitflags::bitflags;
use glam::Vec3;

bitflags! {
    /// Per-element rendering flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ElementFlags: u32 {
        /// The element renders its own per-object motion vectors, so passes
        /// that exclude motion-vector objects must skip it.
        const MOTION_VECTORS = 1 << 0;
    }
}

/// The identity an instanced draw call is keyed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MeshBatchKey {
    pub mesh: u32,
    pub section: u32,
    pub material: u32,
}

/// One renderable unit tracked by the scene for a frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshElement {
    pub mesh_index: u32,
    pub section_index: u32,
    pub material_index: u32,
    pub render_queue: i32,
    pub layer_mask: u32,
    pub flags: ElementFlags,
    pub bounds_center: Vec3,
}

impl MeshElement {
    pub fn new(mesh_index: u32, section_index: u32, material_index: u32) -> Self {
        Self {
            mesh_index,
            section_index,
            material_index,
            render_queue: 2000,
            layer_mask: 1,
            flags: ElementFlags::empty(),
            bounds_center: Vec3::ZERO,
        }
    }

    pub fn with_render_queue(mut self, render_queue: i32) -> Self {
        self.render_queue = render_queue;
        self
    }

    pub fn with_layer_mask(mut self, layer_mask: u32) -> Self {
        self.layer_mask = layer_mask;
        self
    }

    pub fn with_flags(mut self, flags: ElementFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_bounds_center(mut self, bounds_center: Vec3) -> Self {
        self.bounds_center = bounds_center;
        self
    }

    pub fn batch_key(&self) -> MeshBatchKey {
        MeshBatchKey {
            mesh: self.mesh_index,
            section: self.section_index,
            material: self.material_index,
        }
    }

    pub fn has_motion_vectors(&self) -> bool {
        self.flags.contains(ElementFlags::MOTION_VECTORS)
    }
}
