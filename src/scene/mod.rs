pub mod element;
pub mod gpu_scene;

pub use element::{ElementFlags, MeshBatchKey, MeshElement};
pub use gpu_scene::GpuScene;
