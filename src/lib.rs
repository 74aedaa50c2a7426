//! ezgpu: a thin compute-only GPU execution layer
//!
//! The crate covers the minimum loop a compute workload needs: pick a
//! device, move data across the host/device boundary, compile a kernel
//! (through an on-disk artifact cache), bind its arguments by name, and
//! dispatch it behind explicit sync points.
//!
//! ```no_run
//! use ezgpu::{CompileMode, DeviceContext, Kernel, StorageBuffer, dispatch_size};
//!
//! # fn main() -> anyhow::Result<()> {
//! let adapter = ezgpu::pick_adapter(ezgpu::enumerate_adapters())
//!     .ok_or(ezgpu::GpuError::NoAdapter)?;
//! let ctx = DeviceContext::new(&adapter)?;
//!
//! let kernel = Kernel::load(&ctx, "shaders/bias_add.wgsl".as_ref(), &[], CompileMode::Release)?;
//!
//! let n = 1024u64;
//! let src = StorageBuffer::new(&ctx, n * 4, 4, Some("src"));
//! let mut args = kernel.create_argument_table();
//! args.bind_storage("src", &src)?;
//! // ... bind the remaining slots ...
//! kernel.dispatch(&ctx, &args, [dispatch_size(n, 64), 1, 1])?;
//! ctx.sync_point().wait();
//! # Ok(())
//! # }
//! ```

pub mod bindings;
pub mod buffer;
pub mod device;
pub mod error;
pub mod shader;
pub mod sync;
pub mod uniform;

pub use bindings::ArgumentTable;
pub use buffer::{MappedData, PendingUpload, Readback, StorageBuffer, TypedView};
pub use device::{
    enumerate_adapters, has_dedicated_memory, pick_adapter, DeviceCapabilities, DeviceContext,
};
pub use error::GpuError;
pub use shader::{
    BindingKind, BindingLayout, BindingSlot, CompileMode, Kernel, KernelBinary, Preprocessor,
};
pub use sync::SyncPoint;
pub use uniform::{constant_buffer_size, ConstantBuffer, CONSTANT_BUFFER_ALIGN};

/// Number of workgroups needed to cover `n` items at `group` items per
/// workgroup. Rounds up, so the kernel must guard its tail.
///
/// `group` must be nonzero.
pub fn dispatch_size(n: u64, group: u64) -> u32 {
    debug_assert!(group > 0, "workgroup item count must be nonzero");
    ((n + group - 1) / group) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_size_rounds_up() {
        assert_eq!(dispatch_size(0, 64), 0);
        assert_eq!(dispatch_size(1, 64), 1);
        assert_eq!(dispatch_size(64, 64), 1);
        assert_eq!(dispatch_size(65, 64), 2);
        assert_eq!(dispatch_size(1 << 20, 64), 16384);
    }

    #[test]
    #[should_panic(expected = "workgroup item count must be nonzero")]
    fn dispatch_size_rejects_zero_group() {
        dispatch_size(1, 0);
    }
}
