//! GPU storage buffers and the host↔device staging protocol
//!
//! [`StorageBuffer`] is the device-local allocation kernels read and write.
//! Host data moves across the boundary through transient staging buffers
//! that stay attached to the transfer until its fence has been waited on:
//! an upload hands back a [`PendingUpload`] owning the staging memory, a
//! download hands back a [`Readback`] that maps the staging memory only
//! after the GPU copy is known to be complete.

use std::marker::PhantomData;
use std::ops::{Index, Range};
use std::sync::Arc;
use std::sync::mpsc;

use bytemuck::Pod;

use crate::device::DeviceContext;
use crate::error::GpuError;
use crate::sync::SyncPoint;

// Staging allocations and copy sizes must respect wgpu's copy alignment.
fn pad_to_copy_alignment(bytes: u64) -> u64 {
    let align = wgpu::COPY_BUFFER_ALIGNMENT;
    (bytes + align - 1) & !(align - 1)
}

/// A device-local read/write structured buffer.
///
/// Carries no access-state tracking: the caller is responsible for fencing
/// writes against prior reads. Survives across any number of dispatches.
pub struct StorageBuffer {
    buffer: Arc<wgpu::Buffer>,
    bytes: u64,
    stride: u64,
}

impl StorageBuffer {
    /// Allocates `max(bytes, 1)` bytes of device-local storage with element
    /// stride `stride`.
    ///
    /// The physical allocation is padded to copy alignment so transfers of
    /// any logical size stay valid; `bytes()` reports the requested size.
    ///
    /// `stride` must be nonzero.
    pub fn new(ctx: &DeviceContext, bytes: u64, stride: u64, label: Option<&str>) -> Self {
        debug_assert!(stride > 0, "element stride must be nonzero");
        let bytes = bytes.max(1);
        let buffer = ctx.device().create_buffer(&wgpu::BufferDescriptor {
            label,
            size: pad_to_copy_alignment(bytes),
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self {
            buffer: Arc::new(buffer),
            bytes,
            stride,
        }
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn stride(&self) -> u64 {
        self.stride
    }

    /// Whole elements the buffer holds at its stride.
    pub fn item_count(&self) -> u64 {
        debug_assert!(self.stride > 0, "element stride must be nonzero");
        self.bytes / self.stride
    }

    pub(crate) fn raw(&self) -> &Arc<wgpu::Buffer> {
        &self.buffer
    }

    /// Uploads `data` into the buffer through a transient staging allocation.
    ///
    /// The staging buffer is filled while host-mapped, unmapped, and a
    /// staging→buffer copy is submitted. The returned [`PendingUpload`] owns
    /// the staging memory; call [`PendingUpload::wait`] before reusing the
    /// destination in a way that assumes the data has arrived.
    ///
    /// A partial upload (shorter than the buffer) must be a multiple of
    /// `wgpu::COPY_BUFFER_ALIGNMENT` bytes; an unaligned partial copy would
    /// have to round up into live destination bytes.
    pub fn upload(&self, ctx: &DeviceContext, data: &[u8]) -> Result<PendingUpload, GpuError> {
        let len = data.len() as u64;
        if len > self.bytes {
            return Err(GpuError::SizeMismatch {
                capacity: self.bytes,
                actual: len,
            });
        }
        if len < self.bytes && len % wgpu::COPY_BUFFER_ALIGNMENT != 0 {
            return Err(GpuError::UnalignedUpload {
                len,
                align: wgpu::COPY_BUFFER_ALIGNMENT,
            });
        }

        // Copies must be 4-byte aligned. A whole-buffer upload may round up
        // here; the zero-filled tail lands in the destination's physical
        // padding, never in logical bytes.
        let copy_bytes = pad_to_copy_alignment(len.max(1));
        let staging = ctx.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some("ezgpu upload staging"),
            size: copy_bytes,
            usage: wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: true,
        });
        {
            let mut mapped = staging.slice(..).get_mapped_range_mut();
            mapped[..data.len()].copy_from_slice(data);
        }
        staging.unmap();
        ctx.execute(|encoder| {
            encoder.copy_buffer_to_buffer(&staging, 0, &self.buffer, 0, copy_bytes);
        });

        Ok(PendingUpload {
            _staging: staging,
            sync: ctx.sync_point(),
        })
    }

    /// Starts a read-back of the whole buffer.
    pub fn begin_download(&self, ctx: &DeviceContext) -> Readback {
        self.begin_download_range(ctx, 0..self.bytes)
    }

    /// Starts a read-back of a byte range. Records a buffer→staging copy and
    /// submits it; the staging allocation stays attached to the returned
    /// [`Readback`] until the data has been consumed.
    ///
    /// `range.start` must be 4-byte aligned. The copy length is padded to
    /// copy alignment; the mapped view is truncated back to the requested
    /// length.
    pub fn begin_download_range(&self, ctx: &DeviceContext, range: Range<u64>) -> Readback {
        let bytes = range.end.saturating_sub(range.start);
        let copy_bytes = pad_to_copy_alignment(bytes.max(1));
        let staging = ctx.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some("ezgpu download staging"),
            size: copy_bytes,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        ctx.execute(|encoder| {
            encoder.copy_buffer_to_buffer(&self.buffer, range.start, &staging, 0, copy_bytes);
        });

        Readback {
            staging,
            bytes,
            device: Arc::clone(ctx.device()),
            sync: ctx.sync_point(),
        }
    }
}

/// An in-flight host→device transfer.
///
/// Owns the staging buffer for exactly the lifetime of the copy; the host
/// cannot touch it again, and `wait` releases it once the GPU is done.
#[derive(Debug)]
pub struct PendingUpload {
    _staging: wgpu::Buffer,
    sync: SyncPoint,
}

impl PendingUpload {
    /// Blocks until the copy has completed, then releases the staging buffer.
    pub fn wait(self) {
        self.sync.wait();
    }
}

/// An in-flight device→host transfer.
pub struct Readback {
    staging: wgpu::Buffer,
    bytes: u64,
    device: Arc<wgpu::Device>,
    sync: SyncPoint,
}

impl Readback {
    /// Blocks until the GPU copy has completed, then maps the staging range
    /// for reading.
    pub fn wait(self) -> Result<MappedData, GpuError> {
        self.sync.wait();

        let slice = self.staging.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);

        rx.recv()
            .map_err(|_| GpuError::MapFailed("mapping callback was dropped".into()))?
            .map_err(|e| GpuError::MapFailed(format!("{e:?}")))?;

        Ok(MappedData {
            staging: self.staging,
            bytes: self.bytes,
        })
    }
}

/// Host-mapped read-back data. Unmaps and releases the staging allocation
/// on drop.
pub struct MappedData {
    staging: wgpu::Buffer,
    bytes: u64,
}

impl MappedData {
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Read-only reinterpretation of the mapped bytes as `[T]`, with
    /// `count = bytes / size_of::<T>()`.
    ///
    /// At most one view may be live at a time: each view holds the whole
    /// mapped range, and overlapping mapped ranges panic inside wgpu. Drop
    /// a view before taking the next.
    pub fn view<T: Pod>(&self) -> TypedView<'_, T> {
        TypedView {
            view: self.staging.slice(..).get_mapped_range(),
            len_bytes: self.bytes as usize,
            _marker: PhantomData,
        }
    }
}

impl Drop for MappedData {
    fn drop(&mut self) {
        self.staging.unmap();
    }
}

/// A typed, read-only window over mapped staging memory.
pub struct TypedView<'a, T: Pod> {
    view: wgpu::BufferView<'a>,
    len_bytes: usize,
    _marker: PhantomData<&'a [T]>,
}

impl<'a, T: Pod> TypedView<'a, T> {
    pub fn count(&self) -> usize {
        self.len_bytes / std::mem::size_of::<T>()
    }

    pub fn as_slice(&self) -> &[T] {
        let bytes = self.count() * std::mem::size_of::<T>();
        bytemuck::cast_slice(&self.view[..bytes])
    }
}

impl<'a, T: Pod> Index<usize> for TypedView<'a, T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        &self.as_slice()[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_alignment_padding() {
        assert_eq!(pad_to_copy_alignment(0), 0);
        assert_eq!(pad_to_copy_alignment(1), 4);
        assert_eq!(pad_to_copy_alignment(4), 4);
        assert_eq!(pad_to_copy_alignment(1023), 1024);
    }
}
