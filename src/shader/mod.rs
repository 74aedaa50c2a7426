//! Kernel compilation, caching, and dispatch
//!
//! The pipeline from source file to runnable kernel:
//!
//! 1. read and preprocess the WGSL source (expanding `#include`s),
//! 2. hash the expanded text,
//! 3. probe the on-disk cache for an artifact under that hash,
//! 4. on a miss, parse, validate, and emit SPIR-V, then publish it,
//! 5. reflect the binding layout and entry point out of the module,
//! 6. create the pipeline objects on the device.
//!
//! Steps 1-5 are pure CPU work in [`KernelBinary::compile`]; step 6 is
//! [`Kernel::new`]. The cache key is the content hash, so editing a kernel
//! or any file it includes compiles fresh while untouched kernels keep
//! loading their cached artifacts.

mod cache;
mod preprocessor;
mod reflect;

pub use preprocessor::Preprocessor;
pub use reflect::{BindingKind, BindingLayout, BindingSlot};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use naga::back::spv;
use naga::valid::{Capabilities, ValidationFlags, Validator};

use crate::bindings::ArgumentTable;
use crate::device::DeviceContext;
use crate::error::GpuError;

/// Compilation flavor. Debug artifacts embed the expanded source for GPU
/// debuggers and are cached under a distinct name, so the two flavors of
/// one kernel coexist on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileMode {
    Release,
    Debug,
}

/// A compiled kernel artifact plus everything reflected out of it.
///
/// Device-independent: one binary can create pipelines on any number of
/// [`DeviceContext`]s via [`Kernel::new`].
#[derive(Debug)]
pub struct KernelBinary {
    path: PathBuf,
    artifact: Vec<u8>,
    layout: Arc<BindingLayout>,
    entry_point: String,
    workgroup_size: [u32; 3],
    hash: u32,
    from_cache: bool,
}

impl KernelBinary {
    /// Compiles a kernel from a WGSL source file, going through the on-disk
    /// cache.
    ///
    /// `include_dirs` supplements the source file's own directory for
    /// `#include` resolution. A corrupt cached artifact is treated as a
    /// miss and recompiled over.
    pub fn compile(
        path: &Path,
        include_dirs: &[PathBuf],
        mode: CompileMode,
    ) -> Result<Self, GpuError> {
        let mut pp = Preprocessor::new();
        for dir in include_dirs {
            pp.add_include_dir(dir);
        }
        let expanded = pp.process_file(path)?;

        let hash = crc32fast::hash(expanded.as_bytes());
        let artifact_path = cache::artifact_path(path, hash, mode);

        if let Some(bytes) = cache::load(&artifact_path) {
            match naga::front::spv::parse_u8_slice(&bytes, &naga::front::spv::Options::default()) {
                Ok(module) => {
                    let reflection = reflect::reflect(&module, path)?;
                    log::info!(
                        "[KernelBinary::compile] {} loaded from cache ({:08x})",
                        path.display(),
                        hash
                    );
                    return Ok(Self {
                        path: path.to_path_buf(),
                        artifact: bytes,
                        layout: Arc::new(reflection.layout),
                        entry_point: reflection.entry_point,
                        workgroup_size: reflection.workgroup_size,
                        hash,
                        from_cache: true,
                    });
                }
                Err(e) => {
                    log::warn!(
                        "[KernelBinary::compile] discarding corrupt artifact {}: {e}",
                        artifact_path.display()
                    );
                }
            }
        }

        let module = naga::front::wgsl::parse_str(&expanded).map_err(|e| GpuError::Compile {
            path: path.to_path_buf(),
            message: e.emit_to_string(&expanded),
        })?;

        let info = Validator::new(ValidationFlags::all(), Capabilities::all())
            .validate(&module)
            .map_err(|e| GpuError::Compile {
                path: path.to_path_buf(),
                message: e.emit_to_string(&expanded),
            })?;

        let reflection = reflect::reflect(&module, path)?;

        let mut options = spv::Options::default();
        // Debug names must survive into the artifact: cache hits reflect the
        // binding layout back out of the SPIR-V.
        options.flags.insert(spv::WriterFlags::DEBUG);
        if mode == CompileMode::Debug {
            options.debug_info = Some(spv::DebugInfo {
                source_code: &expanded,
                file_name: path,
            });
        }
        let words = spv::write_vec(&module, &info, &options, None).map_err(|e| GpuError::Compile {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let artifact: Vec<u8> = bytemuck::cast_slice(&words).to_vec();

        cache::publish(&artifact_path, &artifact);
        log::info!(
            "[KernelBinary::compile] {} compiled ({:08x}, {} bindings)",
            path.display(),
            hash,
            reflection.layout.len()
        );

        Ok(Self {
            path: path.to_path_buf(),
            artifact,
            layout: Arc::new(reflection.layout),
            entry_point: reflection.entry_point,
            workgroup_size: reflection.workgroup_size,
            hash,
            from_cache: false,
        })
    }

    pub fn layout(&self) -> &BindingLayout {
        &self.layout
    }

    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    /// Workgroup size declared on the entry point.
    pub fn workgroup_size(&self) -> [u32; 3] {
        self.workgroup_size
    }

    /// Content hash of the expanded source.
    pub fn hash(&self) -> u32 {
        self.hash
    }

    /// True when this binary was loaded from the on-disk cache rather than
    /// compiled in this call.
    pub fn from_cache(&self) -> bool {
        self.from_cache
    }

    pub fn spirv(&self) -> &[u8] {
        &self.artifact
    }
}

/// A kernel instantiated on a device and ready to dispatch.
pub struct Kernel {
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    layout: Arc<BindingLayout>,
    workgroup_size: [u32; 3],
    label: String,
}

impl Kernel {
    /// Creates the device-side pipeline objects for a compiled binary.
    ///
    /// The bind group layout is generated from the reflected slots, one
    /// entry per declared resource.
    pub fn new(ctx: &DeviceContext, binary: &KernelBinary) -> Self {
        let label = binary
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "kernel".to_string());

        // make_spirv realigns the byte artifact when the allocation is not
        // word aligned.
        let module = ctx
            .device()
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&label),
                source: wgpu::util::make_spirv(&binary.artifact),
            });

        let entries: Vec<wgpu::BindGroupLayoutEntry> = binary
            .layout
            .slots()
            .iter()
            .map(|slot| wgpu::BindGroupLayoutEntry {
                binding: slot.slot,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: match slot.kind {
                        BindingKind::Constant => wgpu::BufferBindingType::Uniform,
                        BindingKind::StorageRead => {
                            wgpu::BufferBindingType::Storage { read_only: true }
                        }
                        BindingKind::StorageReadWrite => {
                            wgpu::BufferBindingType::Storage { read_only: false }
                        }
                    },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            })
            .collect();

        let bind_group_layout =
            ctx.device()
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some(&label),
                    entries: &entries,
                });

        let pipeline_layout = ctx
            .device()
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(&label),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });

        let pipeline = ctx
            .device()
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(&label),
                layout: Some(&pipeline_layout),
                module: &module,
                entry_point: &binary.entry_point,
            });

        Self {
            pipeline,
            bind_group_layout,
            layout: Arc::clone(&binary.layout),
            workgroup_size: binary.workgroup_size,
            label,
        }
    }

    /// Compiles and instantiates in one step.
    pub fn load(
        ctx: &DeviceContext,
        path: &Path,
        include_dirs: &[PathBuf],
        mode: CompileMode,
    ) -> Result<Self, GpuError> {
        let binary = KernelBinary::compile(path, include_dirs, mode)?;
        Ok(Self::new(ctx, &binary))
    }

    pub fn layout(&self) -> &BindingLayout {
        &self.layout
    }

    pub fn workgroup_size(&self) -> [u32; 3] {
        self.workgroup_size
    }

    /// A fresh, empty argument table matching this kernel's layout.
    pub fn create_argument_table(&self) -> ArgumentTable {
        ArgumentTable::new(Arc::clone(&self.layout))
    }

    /// Records and submits one dispatch of `groups` workgroups.
    ///
    /// Fails before anything is recorded when `args` leaves a slot unbound.
    /// Non-blocking; wait on a sync point from `ctx` to observe the results.
    pub fn dispatch(
        &self,
        ctx: &DeviceContext,
        args: &ArgumentTable,
        groups: [u32; 3],
    ) -> Result<(), GpuError> {
        let bind_group = args.build_bind_group(ctx.device(), &self.bind_group_layout, &self.label)?;

        ctx.execute(|encoder| {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(&self.label),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(groups[0], groups[1], groups[2]);
        });
        Ok(())
    }
}
