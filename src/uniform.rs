//! Constant buffers
//!
//! A [`ConstantBuffer`] holds exactly one plain-old-data record in a
//! uniform allocation aligned to the 256-byte constant-buffer quantum. The
//! direct-write lifecycle is used: updates go through the queue's
//! host-visible upload path, with no copy command or barrier management.

use std::marker::PhantomData;
use std::sync::Arc;

use bytemuck::Pod;

use crate::device::DeviceContext;

/// Constant-buffer alignment quantum.
pub const CONSTANT_BUFFER_ALIGN: u64 = 256;

/// Rounds a byte count up to the constant-buffer alignment quantum.
///
/// ```text
/// 0   -> 0
/// 1   -> 256
/// 255 -> 256
/// 256 -> 256
/// 257 -> 512
/// ```
pub fn constant_buffer_size(bytes: u64) -> u64 {
    (bytes + CONSTANT_BUFFER_ALIGN - 1) & !(CONSTANT_BUFFER_ALIGN - 1)
}

/// A fixed-layout, host-writable, GPU-readable buffer holding one `T`.
pub struct ConstantBuffer<T: Pod> {
    buffer: Arc<wgpu::Buffer>,
    bytes: u64,
    _marker: PhantomData<T>,
}

impl<T: Pod> ConstantBuffer<T> {
    /// Allocates `constant_buffer_size(size_of::<T>())` bytes, never less
    /// than one quantum.
    pub fn new(ctx: &DeviceContext, label: Option<&str>) -> Self {
        let bytes = constant_buffer_size((std::mem::size_of::<T>() as u64).max(1));
        let buffer = ctx.device().create_buffer(&wgpu::BufferDescriptor {
            label,
            size: bytes,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self {
            buffer: Arc::new(buffer),
            bytes,
            _marker: PhantomData,
        }
    }

    /// Writes a new value. Effective for dispatches submitted after this
    /// call; the host never reads the GPU-side memory back.
    pub fn write(&self, ctx: &DeviceContext, value: &T) {
        ctx.queue()
            .write_buffer(&self.buffer, 0, bytemuck::bytes_of(value));
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub(crate) fn raw(&self) -> &Arc<wgpu::Buffer> {
        &self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantum_rounding() {
        assert_eq!(constant_buffer_size(0), 0);
        assert_eq!(constant_buffer_size(1), 256);
        assert_eq!(constant_buffer_size(255), 256);
        assert_eq!(constant_buffer_size(256), 256);
        assert_eq!(constant_buffer_size(257), 512);
        assert_eq!(constant_buffer_size(258), 512);
    }

    #[test]
    fn never_allocates_less_than_record() {
        #[repr(C)]
        #[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
        struct Big {
            data: [f32; 80],
        }

        let bytes = constant_buffer_size(std::mem::size_of::<Big>() as u64);
        assert!(bytes >= std::mem::size_of::<Big>() as u64);
        assert_eq!(bytes % CONSTANT_BUFFER_ALIGN, 0);
    }
}
