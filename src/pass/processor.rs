use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::descriptor::MeshPassDescriptor;
use super::stages::{self, MeshDrawCommand, PassMeshSection};
use crate::asset::Handle;
use crate::culling::CullingData;
use crate::render::{
    BufferAllocator, BufferDescriptor, CommandRecorder, DrawParams, PassContext,
    DRAW_PROFILER_LABEL,
};
use crate::scene::GpuScene;
use crate::settings::BatchSettings;
use crate::task::{FrameId, TaskHandle, TaskRegistry, TaskScheduler, TasksComplete};

#[derive(Debug, Default)]
struct TransientStats {
    allocated: AtomicUsize,
    freed: AtomicUsize,
}

/// How many transient array sets a processor has allocated and freed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TransientCounts {
    pub allocated: usize,
    pub freed: usize,
}

/// The per-cycle arrays shared by the filter, sort and build jobs. Dropping
/// the value frees them.
struct PassArrays {
    batch_indices: Vec<u32>,
    sections: Vec<PassMeshSection>,
    commands: Vec<MeshDrawCommand>,
    stats: Arc<TransientStats>,
}

impl PassArrays {
    fn allocate(capacity: usize, stats: &Arc<TransientStats>) -> Self {
        stats.allocated.fetch_add(1, Ordering::Relaxed);
        Self {
            batch_indices: Vec::with_capacity(capacity),
            sections: Vec::with_capacity(capacity),
            commands: Vec::with_capacity(capacity),
            stats: Arc::clone(stats),
        }
    }
}

impl Drop for PassArrays {
    fn drop(&mut self) {
        self.stats.freed.fetch_add(1, Ordering::Relaxed);
    }
}

type SharedArrays = Arc<Mutex<PassArrays>>;

fn lock_arrays(arrays: &Mutex<PassArrays>) -> MutexGuard<'_, PassArrays> {
    arrays.lock().unwrap_or_else(PoisonError::into_inner)
}

struct PendingPass {
    build: TaskHandle,
    frame: FrameId,
    arrays: SharedArrays,
}

/// Result of one draw phase.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSummary {
    pub draw_calls: usize,
    pub instances: usize,
    /// Commands dropped because their mesh or material did not resolve, or
    /// because the recorder refused the draw.
    pub skipped: usize,
}

/// Compiles one render pass's visible elements into instanced draws.
///
/// Each frame runs one [`dispatch_setup`](Self::dispatch_setup), which
/// schedules the filter, sort and build jobs, followed by one
/// [`dispatch_draw`](Self::dispatch_draw) once the frame's task registry has
/// been waited on.
pub struct MeshPassProcessor {
    scheduler: Arc<TaskScheduler>,
    parallel_threshold: usize,
    staging_min_capacity: usize,
    pending: Option<PendingPass>,
    stats: Arc<TransientStats>,
}

impl MeshPassProcessor {
    pub fn new(scheduler: Arc<TaskScheduler>, settings: &BatchSettings) -> Self {
        Self {
            scheduler,
            parallel_threshold: settings.parallel_threshold,
            staging_min_capacity: settings.staging_min_capacity,
            pending: None,
            stats: Arc::default(),
        }
    }

    /// Schedules filter, sort and build for this pass and registers the build
    /// job's handle with `registry`.
    ///
    /// Returns `None` without allocating when the scene or the view has
    /// nothing to batch.
    pub fn dispatch_setup<B>(
        &mut self,
        scene: &GpuScene<B>,
        culling: &CullingData,
        descriptor: &MeshPassDescriptor,
        registry: &mut TaskRegistry,
    ) -> Option<TaskHandle> {
        if self.pending.take().is_some() {
            log::warn!("Mesh pass set up again before its previous draw; dropping stale batches");
        }

        let elements = scene.elements()?;
        let visible = culling.view_elements.as_ref()?;
        if !culling.requires_mesh_batching() || visible.is_empty() {
            return None;
        }

        let arrays: SharedArrays = Arc::new(Mutex::new(PassArrays::allocate(
            visible.len(),
            &self.stats,
        )));
        let threshold = self.parallel_threshold;

        let filter = {
            let elements = Arc::clone(elements);
            let visible = Arc::clone(visible);
            let arrays = Arc::clone(&arrays);
            let descriptor = *descriptor;
            let view_origin = culling.view_origin;
            self.scheduler.schedule(move || {
                let mut arrays = lock_arrays(&arrays);
                stages::filter_sections(
                    &elements,
                    &visible,
                    &descriptor,
                    view_origin,
                    threshold,
                    &mut arrays.sections,
                );
            })
        };

        let sort = {
            let arrays = Arc::clone(&arrays);
            let policy = descriptor.sort_policy;
            self.scheduler.schedule_after(&filter, move || {
                let mut arrays = lock_arrays(&arrays);
                stages::sort_sections(&mut arrays.sections, policy, threshold);
            })
        };

        let build = {
            let arrays = Arc::clone(&arrays);
            self.scheduler.schedule_after(&sort, move || {
                let mut guard = lock_arrays(&arrays);
                let PassArrays {
                    batch_indices,
                    sections,
                    commands,
                    ..
                } = &mut *guard;
                stages::build_commands(sections, batch_indices, commands);
                log::debug!(
                    "Mesh pass built {} draw commands for {} elements",
                    commands.len(),
                    batch_indices.len()
                );
            })
        };

        registry.push(build.clone());
        self.pending = Some(PendingPass {
            build: build.clone(),
            frame: registry.current_frame(),
            arrays,
        });
        Some(build)
    }

    /// Uploads the batch indices and issues one instanced draw per command.
    ///
    /// Returns `None` when no setup is pending, or when `ready` comes from a
    /// wait cycle other than the one the pending setup registered in. In the
    /// latter case the setup stays pending for a draw with the right token.
    /// Otherwise the pass's arrays are released once the draw is recorded.
    pub fn dispatch_draw<R, A>(
        &mut self,
        ctx: &mut PassContext<'_, R, A>,
        pass_index: u32,
        ready: &TasksComplete,
    ) -> Option<DispatchSummary>
    where
        R: CommandRecorder,
        A: BufferAllocator<Buffer = R::Buffer>,
    {
        let frame = self.pending.as_ref()?.frame;
        if !ready.covers(frame) {
            log::error!(
                "Mesh pass drawn with a readiness token that does not cover its setup; draw deferred"
            );
            return None;
        }
        let pending = self.pending.take()?;
        debug_assert!(pending.build.is_complete());

        let assets = ctx.assets;
        let scene = ctx.scene;
        let arrays = lock_arrays(&pending.arrays);
        let mut summary = DispatchSummary::default();

        ctx.recorder.begin_region(DRAW_PROFILER_LABEL);
        {
            let capacity = arrays.batch_indices.len().max(self.staging_min_capacity);
            let staging = ctx
                .resources
                .get_buffer(BufferDescriptor::of::<u32>(capacity));
            ctx.recorder
                .set_buffer_data(&staging.buffer, &arrays.batch_indices);

            for command in &arrays.commands {
                let mesh = assets.meshes.get(Handle::from_index(command.mesh_index));
                let material = assets
                    .materials
                    .get(Handle::from_index(command.material_index));
                let (Some(mesh), Some(material)) = (mesh, material) else {
                    log::warn!(
                        "Skipping draw with unresolved mesh {} or material {}",
                        command.mesh_index,
                        command.material_index
                    );
                    summary.skipped += 1;
                    continue;
                };

                let params = DrawParams {
                    batch_offset: command.offset,
                    batch_indices: &staging.buffer,
                    instance_data: scene.instance_buffer(),
                };
                let drawn = ctx.recorder.draw_mesh_instanced(
                    mesh,
                    command.section_index,
                    material,
                    pass_index,
                    command.count,
                    &params,
                );
                if drawn {
                    summary.draw_calls += 1;
                    summary.instances += command.count as usize;
                } else {
                    summary.skipped += 1;
                }
            }

            ctx.resources.release_buffer(staging);
        }
        ctx.recorder.end_region();

        drop(arrays);
        drop(pending);
        Some(summary)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn transient_counts(&self) -> TransientCounts {
        TransientCounts {
            allocated: self.stats.allocated.load(Ordering::Relaxed),
            freed: self.stats.freed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::Assets;
    use crate::culling::ViewFlags;
    use crate::render::{BufferPool, CommandList, HostBufferAllocator, HostMaterial, HostMesh};
    use crate::scene::MeshElement;
    use glam::Vec3;

    fn processor() -> MeshPassProcessor {
        let settings = BatchSettings {
            worker_threads: Some(2),
            ..BatchSettings::default()
        };
        let scheduler = Arc::new(TaskScheduler::new(&settings).expect("thread pool"));
        MeshPassProcessor::new(scheduler, &settings)
    }

    fn visible_view(count: u32) -> CullingData {
        CullingData::new(
            (0..count).collect::<Vec<_>>(),
            ViewFlags::MESH_BATCHING,
            Vec3::ZERO,
        )
    }

    #[test]
    fn setup_skips_views_without_batching_capability() {
        let mut processor = processor();
        let mut registry = TaskRegistry::new();
        let scene = GpuScene::with_elements((), vec![MeshElement::new(0, 0, 0)]);
        let culling = CullingData::new(vec![0u32], ViewFlags::SCENE_VIEW, Vec3::ZERO);

        let handle = processor.dispatch_setup(
            &scene,
            &culling,
            &MeshPassDescriptor::with_queue_range(0, 5000),
            &mut registry,
        );

        assert!(handle.is_none());
        assert!(registry.is_empty());
        assert_eq!(processor.transient_counts(), TransientCounts::default());
    }

    #[test]
    fn setup_skips_unpopulated_scene_and_empty_view() {
        let mut processor = processor();
        let mut registry = TaskRegistry::new();
        let descriptor = MeshPassDescriptor::with_queue_range(0, 5000);

        let empty_scene: GpuScene<()> = GpuScene::new(());
        assert!(processor
            .dispatch_setup(&empty_scene, &visible_view(1), &descriptor, &mut registry)
            .is_none());

        let mut scene = GpuScene::with_elements((), vec![MeshElement::new(0, 0, 0)]);
        assert!(processor
            .dispatch_setup(&scene, &visible_view(0), &descriptor, &mut registry)
            .is_none());

        scene.clear_elements();
        assert!(!scene.is_created());
        assert!(processor
            .dispatch_setup(&scene, &visible_view(1), &descriptor, &mut registry)
            .is_none());

        assert!(!processor.is_pending());
        assert!(registry.is_empty());
    }

    #[test]
    fn repeated_setup_frees_the_stale_arrays() {
        let mut processor = processor();
        let mut registry = TaskRegistry::new();
        let scene = GpuScene::with_elements((), vec![MeshElement::new(0, 0, 0); 4]);
        let descriptor = MeshPassDescriptor::with_queue_range(0, 5000);

        processor.dispatch_setup(&scene, &visible_view(4), &descriptor, &mut registry);
        processor.dispatch_setup(&scene, &visible_view(4), &descriptor, &mut registry);
        let _ready = registry.wait_all();

        let counts = processor.transient_counts();
        assert_eq!(counts.allocated, 2);
        assert_eq!(counts.freed, 1);
        assert!(processor.is_pending());
    }

    #[test]
    fn draw_releases_arrays_and_staging_buffer() {
        let mut processor = processor();
        let mut registry = TaskRegistry::new();
        let mut allocator = HostBufferAllocator::new();
        let instance_buffer = allocator.create(&BufferDescriptor::of::<[f32; 16]>(4));
        let scene = GpuScene::with_elements(
            instance_buffer,
            vec![
                MeshElement::new(0, 0, 0),
                MeshElement::new(0, 0, 1),
                MeshElement::new(0, 0, 0),
            ],
        );
        let mut assets = Assets::new();
        assets.meshes.insert(HostMesh::new("cube", 1));
        assets.materials.insert(HostMaterial::new("red"));
        assets.materials.insert(HostMaterial::new("blue"));
        let mut pool = BufferPool::new(allocator);
        let mut recorder = CommandList::new();

        processor.dispatch_setup(
            &scene,
            &visible_view(3),
            &MeshPassDescriptor::with_queue_range(0, 5000),
            &mut registry,
        );
        let ready = registry.wait_all();

        let mut ctx = PassContext {
            recorder: &mut recorder,
            resources: &mut pool,
            assets: &assets,
            scene: &scene,
        };
        let summary = processor.dispatch_draw(&mut ctx, 0, &ready);

        assert_eq!(
            summary,
            Some(DispatchSummary {
                draw_calls: 2,
                instances: 3,
                skipped: 0,
            })
        );
        assert_eq!(pool.stats().outstanding(), 0);
        let counts = processor.transient_counts();
        assert_eq!(counts.allocated, counts.freed);

        let mut ctx = PassContext {
            recorder: &mut recorder,
            resources: &mut pool,
            assets: &assets,
            scene: &scene,
        };
        assert!(processor.dispatch_draw(&mut ctx, 0, &ready).is_none());
        assert_eq!(pool.stats().acquired, 1);
    }

    #[test]
    fn foreign_token_defers_the_draw_until_its_own_registry_is_waited() {
        let mut processor = processor();
        let mut registry = TaskRegistry::new();
        let mut allocator = HostBufferAllocator::new();
        let instance_buffer = allocator.create(&BufferDescriptor::of::<[f32; 16]>(2));
        let scene = GpuScene::with_elements(instance_buffer, vec![MeshElement::new(0, 0, 0); 2]);
        let mut assets = Assets::new();
        assets.meshes.insert(HostMesh::new("cube", 1));
        assets.materials.insert(HostMaterial::new("red"));
        let mut pool = BufferPool::new(allocator);
        let mut recorder = CommandList::new();

        let stale = registry.wait_all();
        processor.dispatch_setup(
            &scene,
            &visible_view(2),
            &MeshPassDescriptor::with_queue_range(0, 5000),
            &mut registry,
        );
        let foreign = TaskRegistry::new().wait_all();

        for token in [&stale, &foreign] {
            let mut ctx = PassContext {
                recorder: &mut recorder,
                resources: &mut pool,
                assets: &assets,
                scene: &scene,
            };
            assert!(processor.dispatch_draw(&mut ctx, 0, token).is_none());
            assert!(processor.is_pending());
        }
        assert!(recorder.commands().is_empty());
        assert_eq!(pool.stats().acquired, 0);
        assert_eq!(processor.transient_counts().freed, 0);

        let ready = registry.wait_all();
        let mut ctx = PassContext {
            recorder: &mut recorder,
            resources: &mut pool,
            assets: &assets,
            scene: &scene,
        };
        let summary = processor
            .dispatch_draw(&mut ctx, 0, &ready)
            .expect("setup still pending");

        assert_eq!(summary.instances, 2);
        assert!(!processor.is_pending());
        let counts = processor.transient_counts();
        assert_eq!((counts.allocated, counts.freed), (1, 1));
    }

    #[test]
    fn refused_draws_are_counted_as_skipped() {
        let mut processor = processor();
        let mut registry = TaskRegistry::new();
        let mut allocator = HostBufferAllocator::new();
        let instance_buffer = allocator.create(&BufferDescriptor::of::<[f32; 16]>(3));
        let scene = GpuScene::with_elements(
            instance_buffer,
            vec![
                MeshElement::new(0, 0, 0),
                MeshElement::new(0, 3, 0),
                MeshElement::new(0, 3, 0),
            ],
        );
        let mut assets = Assets::new();
        assets.meshes.insert(HostMesh::new("quad", 1));
        assets.materials.insert(HostMaterial::new("lit"));
        let mut pool = BufferPool::new(allocator);
        let mut recorder = CommandList::new();

        processor.dispatch_setup(
            &scene,
            &visible_view(3),
            &MeshPassDescriptor::with_queue_range(0, 5000),
            &mut registry,
        );
        let ready = registry.wait_all();
        let mut ctx = PassContext {
            recorder: &mut recorder,
            resources: &mut pool,
            assets: &assets,
            scene: &scene,
        };

        assert_eq!(
            processor.dispatch_draw(&mut ctx, 0, &ready),
            Some(DispatchSummary {
                draw_calls: 1,
                instances: 1,
                skipped: 1,
            })
        );
        assert_eq!(recorder.draws().count(), 1);
    }
}
