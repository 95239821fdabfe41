use std::sync::Arc;

use bitflags::bitflags;
use glam::Vec3;

bitflags! {
    /// Capabilities a view advertises to the passes that render it.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ViewFlags: u32 {
        /// The view's visible elements go through per-pass mesh batching.
        const MESH_BATCHING = 1 << 0;
        const SCENE_VIEW = 1 << 1;
    }
}

/// Output of upstream culling for one view.
#[derive(Debug, Clone, Default)]
pub struct CullingData {
    /// Indices into the scene element table, `None` when culling has not
    /// produced a list for this view.
    pub view_elements: Option<Arc<[u32]>>,
    pub flags: ViewFlags,
    pub view_origin: Vec3,
}

impl CullingData {
    pub fn new(view_elements: impl Into<Arc<[u32]>>, flags: ViewFlags, view_origin: Vec3) -> Self {
        Self {
            view_elements: Some(view_elements.into()),
            flags,
            view_origin,
        }
    }

    /// A view with no visible-element list.
    pub fn unallocated() -> Self {
        Self::default()
    }

    pub fn is_created(&self) -> bool {
        self.view_elements.is_some()
    }

    pub fn requires_mesh_batching(&self) -> bool {
        self.flags.contains(ViewFlags::MESH_BATCHING)
    }

    pub fn visible_count(&self) -> usize {
        self.view_elements.as_ref().map_or(0, |v| v.len())
    }
}
