//! Binding-layout reflection
//!
//! The binding layout of a kernel is never declared by hand: it is derived
//! from the compiled module's own resource declarations. Every uniform and
//! storage global becomes one slot; the name→slot map built here is what
//! argument tables consult at bind time.

use std::collections::HashMap;
use std::path::Path;

use naga::{AddressSpace, ShaderStage, StorageAccess};

use crate::error::GpuError;

/// Resource kind a kernel declared for one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    /// Uniform (constant) buffer.
    Constant,
    /// Read-only structured buffer.
    StorageRead,
    /// Read-write structured buffer.
    StorageReadWrite,
}

/// One reflected resource binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingSlot {
    pub name: String,
    /// Slot index within the single binding group.
    pub slot: u32,
    pub kind: BindingKind,
}

/// The derived layout: ordered slots plus the name→slot map.
#[derive(Debug, Clone, Default)]
pub struct BindingLayout {
    slots: Vec<BindingSlot>,
    by_name: HashMap<String, usize>,
}

impl BindingLayout {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slots ordered by slot index.
    pub fn slots(&self) -> &[BindingSlot] {
        &self.slots
    }

    /// Fallible lookup by declared variable name.
    pub fn slot_of(&self, name: &str) -> Option<&BindingSlot> {
        self.by_name.get(name).map(|&i| &self.slots[i])
    }

    pub(crate) fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }
}

#[derive(Debug)]
pub(crate) struct KernelReflection {
    pub layout: BindingLayout,
    pub entry_point: String,
    pub workgroup_size: [u32; 3],
}

/// Enumerates the module's resource bindings and entry point.
///
/// All bindings must live in group 0, carry a name, and be a buffer kind
/// this layer supports; textures and samplers are outside the compute
/// contract. Slot indices come from the module's own binding decorations,
/// so identical source always reflects to an identical layout.
pub(crate) fn reflect(module: &naga::Module, path: &Path) -> Result<KernelReflection, GpuError> {
    let entry = module
        .entry_points
        .iter()
        .find(|ep| ep.stage == ShaderStage::Compute)
        .ok_or_else(|| GpuError::NoComputeEntryPoint {
            path: path.to_path_buf(),
        })?;

    let mut slots: Vec<BindingSlot> = Vec::new();
    for (_, var) in module.global_variables.iter() {
        // Private / workgroup variables carry no binding and are not resources.
        let Some(resource) = &var.binding else {
            continue;
        };

        let kind = match var.space {
            AddressSpace::Uniform => BindingKind::Constant,
            AddressSpace::Storage { access } => {
                if access.contains(StorageAccess::STORE) {
                    BindingKind::StorageReadWrite
                } else {
                    BindingKind::StorageRead
                }
            }
            _ => {
                return Err(GpuError::UnsupportedBinding {
                    name: var.name.clone().unwrap_or_else(|| {
                        format!("<group {} binding {}>", resource.group, resource.binding)
                    }),
                });
            }
        };

        let name = var
            .name
            .clone()
            .ok_or(GpuError::UnnamedBinding {
                slot: resource.binding,
            })?;

        if resource.group != 0 {
            return Err(GpuError::NonZeroGroup {
                name,
                group: resource.group,
            });
        }

        slots.push(BindingSlot {
            name,
            slot: resource.binding,
            kind,
        });
    }

    slots.sort_by_key(|slot| slot.slot);
    for pair in slots.windows(2) {
        if pair[0].slot == pair[1].slot {
            return Err(GpuError::DuplicateSlot {
                first: pair[0].name.clone(),
                second: pair[1].name.clone(),
                slot: pair[0].slot,
            });
        }
    }

    let mut by_name = HashMap::with_capacity(slots.len());
    for (index, slot) in slots.iter().enumerate() {
        by_name.insert(slot.name.clone(), index);
    }

    Ok(KernelReflection {
        layout: BindingLayout { slots, by_name },
        entry_point: entry.name.clone(),
        workgroup_size: entry.workgroup_size,
    })
}
