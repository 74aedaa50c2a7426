//! Error taxonomy for the compute layer
//!
//! Platform failures, compile failures, and caller contract violations all
//! surface as [`GpuError`] values. Cache races are not errors: the losing
//! writer discards its temp file and both sides load an equivalent artifact.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GpuError {
    #[error("no suitable GPU adapter available")]
    NoAdapter,

    #[error("adapter '{name}' does not support compute shaders")]
    ComputeUnsupported { name: String },

    #[error("device request failed: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),

    #[error("failed to read kernel source {}: {source}", path.display())]
    SourceIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("include file not found: {path}")]
    IncludeNotFound { path: String },

    #[error("kernel compilation failed for {}:\n{message}", path.display())]
    Compile { path: PathBuf, message: String },

    #[error("kernel {} declares no compute entry point", path.display())]
    NoComputeEntryPoint { path: PathBuf },

    #[error("binding '{name}' uses a resource kind the compute layer does not support")]
    UnsupportedBinding { name: String },

    #[error("binding '{name}' is declared in group {group}; all bindings must live in group 0")]
    NonZeroGroup { name: String, group: u32 },

    #[error("bindings '{first}' and '{second}' both claim slot {slot}")]
    DuplicateSlot {
        first: String,
        second: String,
        slot: u32,
    },

    #[error("resource binding at slot {slot} has no name to bind by")]
    UnnamedBinding { slot: u32 },

    #[error("kernel declares no binding named '{name}'")]
    UnknownBinding { name: String },

    #[error("argument table slot '{name}' was never bound")]
    UnboundSlot { name: String },

    #[error("buffer holds {capacity} bytes, caller supplied {actual} bytes")]
    SizeMismatch { capacity: u64, actual: u64 },

    #[error("partial upload of {len} bytes must be a multiple of {align} bytes")]
    UnalignedUpload { len: u64, align: u64 },

    #[error("buffer mapping failed: {0}")]
    MapFailed(String),
}
