use std::sync::Arc;

use glam::Vec3;
use mesh_pass::asset::Assets;
use mesh_pass::render::{
    BufferDescriptor, BufferPool, CommandList, HostBufferAllocator, HostMaterial, HostMesh,
};
use mesh_pass::{
    BatchError, BatchSettings, CullingData, ElementFlags, GpuScene, MeshElement,
    MeshPassDescriptor, MeshPassProcessor, PassContext, RenderQueueRange, RendererListDesc,
    TaskRegistry, TaskScheduler, ViewFlags,
};
use rand::{rngs::SmallRng, Rng, SeedableRng};

const MESH_COUNT: u32 = 12;
const MATERIAL_COUNT: u32 = 6;
const ELEMENT_COUNT: usize = 20_000;
const FRAME_COUNT: usize = 3;

struct DemoPass {
    name: &'static str,
    index: u32,
    descriptor: MeshPassDescriptor,
    processor: MeshPassProcessor,
}

fn build_elements(rng: &mut SmallRng) -> Vec<MeshElement> {
    (0..ELEMENT_COUNT)
        .map(|_| {
            let transparent = rng.gen_bool(0.2);
            let queue = if transparent { 3000 } else { 2000 };
            let flags = if rng.gen_bool(0.1) {
                ElementFlags::MOTION_VECTORS
            } else {
                ElementFlags::empty()
            };

            MeshElement::new(
                rng.gen_range(0..MESH_COUNT),
                rng.gen_range(0..2),
                rng.gen_range(0..MATERIAL_COUNT),
            )
            .with_render_queue(queue)
            .with_layer_mask(1u32 << rng.gen_range(0..3u32))
            .with_flags(flags)
            .with_bounds_center(Vec3::new(
                rng.gen_range(-200.0..200.0),
                rng.gen_range(0.0..40.0),
                rng.gen_range(-200.0..200.0),
            ))
        })
        .collect()
}

fn build_assets() -> Assets<HostMesh, HostMaterial> {
    let mut assets = Assets::new();
    for i in 0..MESH_COUNT {
        assets.meshes.insert(HostMesh::new(format!("mesh_{i}"), 2));
    }
    for i in 0..MATERIAL_COUNT {
        assets.materials.insert(HostMaterial::new(format!("material_{i}")));
    }
    assets
}

fn run() -> Result<(), BatchError> {
    let settings = BatchSettings::load();
    let scheduler = Arc::new(TaskScheduler::new(&settings)?);
    let mut rng = SmallRng::seed_from_u64(0x5eed);

    let mut allocator = HostBufferAllocator::new();
    let instance_buffer = allocator.create(&BufferDescriptor::of::<[f32; 16]>(ELEMENT_COUNT));
    let mut scene = GpuScene::new(instance_buffer);
    let assets = build_assets();
    let mut pool = BufferPool::new(allocator);

    let mut passes = [
        (
            "DepthPrepass",
            RendererListDesc::new(RenderQueueRange::OPAQUE).excluding_motion_vectors(),
        ),
        ("Opaque", RendererListDesc::new(RenderQueueRange::OPAQUE)),
        (
            "Transparent",
            RendererListDesc::new(RenderQueueRange::TRANSPARENT).with_layer_mask(0b011),
        ),
    ]
    .into_iter()
    .enumerate()
    .map(|(index, (name, list))| DemoPass {
        name,
        index: index as u32,
        descriptor: MeshPassDescriptor::from_renderer_list(&list),
        processor: MeshPassProcessor::new(Arc::clone(&scheduler), &settings),
    })
    .collect::<Vec<_>>();

    for frame in 0..FRAME_COUNT {
        scene.set_elements(build_elements(&mut rng));
        let visible: Vec<u32> = (0..ELEMENT_COUNT as u32)
            .filter(|_| rng.gen_bool(0.7))
            .collect();
        let culling = CullingData::new(
            visible,
            ViewFlags::MESH_BATCHING | ViewFlags::SCENE_VIEW,
            Vec3::new(0.0, 10.0, 0.0),
        );

        let mut registry = TaskRegistry::new();
        for pass in &mut passes {
            pass.processor
                .dispatch_setup(&scene, &culling, &pass.descriptor, &mut registry);
        }
        let ready = registry.wait_all();

        let mut recorder = CommandList::new();
        for pass in &mut passes {
            let mut ctx = PassContext {
                recorder: &mut recorder,
                resources: &mut pool,
                assets: &assets,
                scene: &scene,
            };
            if let Some(summary) = pass.processor.dispatch_draw(&mut ctx, pass.index, &ready) {
                log::info!(
                    "frame {} {:>12}: {} instances in {} draw calls",
                    frame,
                    pass.name,
                    summary.instances,
                    summary.draw_calls
                );
            }
        }
        pool.end_frame();
    }

    let stats = pool.stats();
    log::info!(
        "Staging buffers: {} acquired, {} released, {} allocated",
        stats.acquired,
        stats.released,
        stats.allocated
    );
    Ok(())
}

fn main() {
    mesh_pass::init_logging();

    if let Err(err) = run() {
        log::error!("Application error: {}", err);
    }
}
