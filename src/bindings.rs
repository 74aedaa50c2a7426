//! Argument tables: name-based resource binding
//!
//! Kernels are parameterized by name, not by slot number. An
//! [`ArgumentTable`] is created from a kernel's reflected layout, filled by
//! variable name, and checked for completeness at dispatch time.

use std::sync::Arc;

use crate::buffer::StorageBuffer;
use crate::error::GpuError;
use crate::shader::BindingLayout;
use crate::uniform::ConstantBuffer;

/// A set of resource assignments for one kernel's binding layout.
///
/// Binding is existence-checked only: a name either exists in the layout or
/// it does not. Kind mismatches (a storage buffer bound where the kernel
/// declared a uniform) surface as device validation errors at dispatch.
/// Tables are reusable across dispatches and rebindable between them.
pub struct ArgumentTable {
    layout: Arc<BindingLayout>,
    bound: Vec<Option<Arc<wgpu::Buffer>>>,
}

impl ArgumentTable {
    pub(crate) fn new(layout: Arc<BindingLayout>) -> Self {
        let bound = vec![None; layout.len()];
        Self { layout, bound }
    }

    pub fn layout(&self) -> &BindingLayout {
        &self.layout
    }

    /// Assigns a storage buffer to the slot named `name`.
    pub fn bind_storage(&mut self, name: &str, buffer: &StorageBuffer) -> Result<(), GpuError> {
        self.bind_raw(name, Arc::clone(buffer.raw()))
    }

    /// Assigns a constant buffer to the slot named `name`.
    pub fn bind_uniform<T: bytemuck::Pod>(
        &mut self,
        name: &str,
        buffer: &ConstantBuffer<T>,
    ) -> Result<(), GpuError> {
        self.bind_raw(name, Arc::clone(buffer.raw()))
    }

    fn bind_raw(&mut self, name: &str, buffer: Arc<wgpu::Buffer>) -> Result<(), GpuError> {
        let index = self
            .layout
            .index_of(name)
            .ok_or_else(|| GpuError::UnknownBinding {
                name: name.to_string(),
            })?;
        self.bound[index] = Some(buffer);
        Ok(())
    }

    /// True when every slot in the layout has an assignment.
    pub fn is_complete(&self) -> bool {
        self.bound.iter().all(Option::is_some)
    }

    /// Builds the bind group for a dispatch. Fails on the first unbound
    /// slot, naming it.
    pub(crate) fn build_bind_group(
        &self,
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        label: &str,
    ) -> Result<wgpu::BindGroup, GpuError> {
        let mut entries = Vec::with_capacity(self.bound.len());
        for (slot, buffer) in self.layout.slots().iter().zip(&self.bound) {
            let buffer = buffer.as_ref().ok_or_else(|| GpuError::UnboundSlot {
                name: slot.name.clone(),
            })?;
            entries.push(wgpu::BindGroupEntry {
                binding: slot.slot,
                resource: buffer.as_entire_binding(),
            });
        }

        Ok(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout,
            entries: &entries,
        }))
    }
}
