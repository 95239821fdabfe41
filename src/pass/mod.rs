pub mod descriptor;
pub mod processor;
pub mod stages;

pub use descriptor::{MeshPassDescriptor, RenderQueueRange, RendererListDesc, SortPolicy};
pub use processor::{DispatchSummary, MeshPassProcessor, TransientCounts};
pub use stages::{MeshDrawCommand, PassMeshSection};
