pub mod cache;
pub mod handle;

pub use cache::AssetCache;
pub use handle::Handle;

/// Mesh and material registries a pass resolves its draw commands against.
pub struct Assets<M, Mat> {
    pub meshes: AssetCache<M>,
    pub materials: AssetCache<Mat>,
}

impl<M, Mat> Assets<M, Mat> {
    pub fn new() -> Self {
        Self {
            meshes: AssetCache::new(),
            materials: AssetCache::new(),
        }
    }
}

impl<M, Mat> Default for Assets<M, Mat> {
    fn default() -> Self {
        Self::new()
    }
}
