use std::sync::Arc;

use super::MeshElement;

/// Scene-wide element table plus the GPU buffer holding per-instance data.
///
/// The table is `None` until the scene has been populated for the frame.
/// Passes share it read-only; `B` is the backend's buffer type.
pub struct GpuScene<B> {
    elements: Option<Arc<[MeshElement]>>,
    instance_buffer: B,
}

impl<B> GpuScene<B> {
    pub fn new(instance_buffer: B) -> Self {
        Self {
            elements: None,
            instance_buffer,
        }
    }

    pub fn with_elements(instance_buffer: B, elements: impl Into<Arc<[MeshElement]>>) -> Self {
        Self {
            elements: Some(elements.into()),
            instance_buffer,
        }
    }

    pub fn set_elements(&mut self, elements: impl Into<Arc<[MeshElement]>>) {
        self.elements = Some(elements.into());
    }

    pub fn clear_elements(&mut self) {
        self.elements = None;
    }

    pub fn is_created(&self) -> bool {
        self.elements.is_some()
    }

    pub fn elements(&self) -> Option<&Arc<[MeshElement]>> {
        self.elements.as_ref()
    }

    pub fn instance_buffer(&self) -> &B {
        &self.instance_buffer
    }
}
