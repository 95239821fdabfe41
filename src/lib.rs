pub mod asset;
pub mod culling;
pub mod error;
#[cfg(feature = "wgpu")]
pub mod gpu;
pub mod pass;
pub mod render;
pub mod scene;
pub mod settings;
pub mod task;

pub use culling::{CullingData, ViewFlags};
pub use error::BatchError;
pub use pass::{
    DispatchSummary, MeshDrawCommand, MeshPassDescriptor, MeshPassProcessor, RenderQueueRange,
    RendererListDesc, SortPolicy,
};
pub use render::{CommandRecorder, PassContext};
pub use scene::{ElementFlags, GpuScene, MeshElement};
pub use settings::BatchSettings;
pub use task::{TaskHandle, TaskRegistry, TaskScheduler, TasksComplete};

pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .try_init();
}
