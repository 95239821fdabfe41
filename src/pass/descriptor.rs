use serde::{Deserialize, Serialize};

/// Inclusive range of render-queue values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RenderQueueRange {
    pub lower_bound: i32,
    pub upper_bound: i32,
}

impl RenderQueueRange {
    pub const ALL: Self = Self::new(0, 5000);
    pub const OPAQUE: Self = Self::new(0, 2500);
    pub const TRANSPARENT: Self = Self::new(2501, 5000);

    pub const fn new(lower_bound: i32, upper_bound: i32) -> Self {
        Self {
            lower_bound,
            upper_bound,
        }
    }

    pub fn contains(&self, queue: i32) -> bool {
        self.lower_bound <= queue && queue <= self.upper_bound
    }
}

impl Default for RenderQueueRange {
    fn default() -> Self {
        Self::ALL
    }
}

/// Secondary ordering applied inside groups of identical mesh, section and
/// material. Grouping always wins over depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortPolicy {
    /// Keep the filtered (source) order inside each group.
    #[default]
    Batching,
    FrontToBack,
    BackToFront,
}

impl SortPolicy {
    /// Passes that only cover queues past the opaque range blend, so they
    /// draw back to front.
    pub fn for_queue_range(range: RenderQueueRange) -> Self {
        if range.lower_bound > RenderQueueRange::OPAQUE.upper_bound {
            Self::BackToFront
        } else {
            Self::Batching
        }
    }

    pub fn uses_depth(self) -> bool {
        !matches!(self, Self::Batching)
    }
}

/// Generic renderer-list request a pass is configured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RendererListDesc {
    pub render_queue_range: RenderQueueRange,
    pub layer_mask: u32,
    pub exclude_object_motion_vectors: bool,
    pub sort_policy: SortPolicy,
}

impl RendererListDesc {
    pub fn new(render_queue_range: RenderQueueRange) -> Self {
        Self {
            render_queue_range,
            layer_mask: 0,
            exclude_object_motion_vectors: false,
            sort_policy: SortPolicy::for_queue_range(render_queue_range),
        }
    }

    pub fn with_layer_mask(mut self, layer_mask: u32) -> Self {
        self.layer_mask = layer_mask;
        self
    }

    pub fn excluding_motion_vectors(mut self) -> Self {
        self.exclude_object_motion_vectors = true;
        self
    }

    pub fn with_sort_policy(mut self, sort_policy: SortPolicy) -> Self {
        self.sort_policy = sort_policy;
        self
    }
}

/// Selection criteria for one mesh pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshPassDescriptor {
    pub render_queue_min: i32,
    pub render_queue_max: i32,
    /// Zero selects every layer.
    pub render_layer_mask: u32,
    pub exclude_motion_vector_objects: bool,
    pub sort_policy: SortPolicy,
}

impl MeshPassDescriptor {
    pub fn from_renderer_list(desc: &RendererListDesc) -> Self {
        Self {
            render_queue_min: desc.render_queue_range.lower_bound,
            render_queue_max: desc.render_queue_range.upper_bound,
            render_layer_mask: desc.layer_mask,
            exclude_motion_vector_objects: desc.exclude_object_motion_vectors,
            sort_policy: desc.sort_policy,
        }
    }

    pub fn with_queue_range(min_queue: i32, max_queue: i32) -> Self {
        Self {
            render_queue_min: min_queue,
            render_queue_max: max_queue,
            render_layer_mask: 0,
            exclude_motion_vector_objects: false,
            sort_policy: SortPolicy::default(),
        }
    }

    pub fn queue_range(&self) -> RenderQueueRange {
        RenderQueueRange::new(self.render_queue_min, self.render_queue_max)
    }

    pub fn accepts_layer(&self, layer_mask: u32) -> bool {
        self.render_layer_mask == 0 || layer_mask & self.render_layer_mask != 0
    }
}

impl From<&RendererListDesc> for MeshPassDescriptor {
    fn from(desc: &RendererListDesc) -> Self {
        Self::from_renderer_list(desc)
    }
}
