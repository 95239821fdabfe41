use std::cmp::Ordering;

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use rayon::prelude::*;

use super::descriptor::{MeshPassDescriptor, SortPolicy};
use crate::scene::{MeshBatchKey, MeshElement};

/// A filtered element as seen by one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassMeshSection {
    /// Position of the element in the scene table.
    pub element_index: u32,
    pub batch_key: MeshBatchKey,
    /// Squared view distance as ordered `f32` bits; zero when the pass does
    /// not sort by depth.
    pub depth_key: u32,
}

/// One instanced draw covering `count` batch indices starting at `offset`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct MeshDrawCommand {
    pub mesh_index: u32,
    pub section_index: u32,
    pub material_index: u32,
    pub count: u32,
    pub offset: u32,
}

impl MeshDrawCommand {
    fn first_of_run(key: MeshBatchKey, offset: u32) -> Self {
        Self {
            mesh_index: key.mesh,
            section_index: key.section,
            material_index: key.material,
            count: 1,
            offset,
        }
    }

    pub fn batch_key(&self) -> MeshBatchKey {
        MeshBatchKey {
            mesh: self.mesh_index,
            section: self.section_index,
            material: self.material_index,
        }
    }

    pub fn instance_range(&self) -> std::ops::Range<u32> {
        self.offset..self.offset + self.count
    }
}

/// Appends every visible element accepted by `descriptor` to `out`, in
/// visible-list order. Indices that fall outside the element table are
/// dropped.
pub fn filter_sections(
    elements: &[MeshElement],
    visible: &[u32],
    descriptor: &MeshPassDescriptor,
    view_origin: Vec3,
    parallel_threshold: usize,
    out: &mut Vec<PassMeshSection>,
) {
    let queue_range = descriptor.queue_range();
    let uses_depth = descriptor.sort_policy.uses_depth();

    let select = |&element_index: &u32| -> Option<PassMeshSection> {
        let element = elements.get(element_index as usize)?;

        if !queue_range.contains(element.render_queue)
            || !descriptor.accepts_layer(element.layer_mask)
            || (descriptor.exclude_motion_vector_objects && element.has_motion_vectors())
        {
            return None;
        }

        let depth_key = if uses_depth {
            view_depth_key(element.bounds_center, view_origin)
        } else {
            0
        };

        Some(PassMeshSection {
            element_index,
            batch_key: element.batch_key(),
            depth_key,
        })
    };

    if visible.len() >= parallel_threshold {
        out.par_extend(visible.par_iter().filter_map(select));
    } else {
        out.extend(visible.iter().filter_map(select));
    }
}

/// Groups sections with identical mesh, section and material, applying the
/// policy's depth order inside each group. The sort is stable.
pub fn sort_sections(sections: &mut [PassMeshSection], policy: SortPolicy, parallel_threshold: usize) {
    let compare = move |a: &PassMeshSection, b: &PassMeshSection| {
        a.batch_key
            .cmp(&b.batch_key)
            .then_with(|| match policy {
                SortPolicy::Batching => Ordering::Equal,
                SortPolicy::FrontToBack => a.depth_key.cmp(&b.depth_key),
                SortPolicy::BackToFront => b.depth_key.cmp(&a.depth_key),
            })
    };

    if sections.len() >= parallel_threshold {
        sections.par_sort_by(compare);
    } else {
        sections.sort_by(compare);
    }
}

/// Writes one batch index per section and coalesces runs of equal batch keys
/// into draw commands. Both outputs are cleared first.
pub fn build_commands(
    sections: &[PassMeshSection],
    batch_indices: &mut Vec<u32>,
    commands: &mut Vec<MeshDrawCommand>,
) {
    batch_indices.clear();
    commands.clear();

    for section in sections {
        let offset = batch_indices.len() as u32;
        batch_indices.push(section.element_index);

        match commands.last_mut() {
            Some(command) if command.batch_key() == section.batch_key => command.count += 1,
            _ => commands.push(MeshDrawCommand::first_of_run(section.batch_key, offset)),
        }
    }
}

fn view_depth_key(position: Vec3, view_origin: Vec3) -> u32 {
    // Non-negative floats order the same as their bit patterns.
    (position - view_origin).length_squared().to_bits()
}
