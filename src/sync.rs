//! CPU/GPU synchronization points
//!
//! A [`SyncPoint`] is the fence of this layer: it captures the queue state at
//! creation time and lets the host block until everything submitted up to
//! that point has finished executing on the GPU.

use std::sync::Arc;

/// A single-use fence armed against the device queue.
///
/// Created through [`DeviceContext::sync_point`](crate::DeviceContext::sync_point).
/// `wait` consumes the value, so a sync point cannot be re-armed or waited on
/// twice; create a fresh one after each submission of interest.
#[derive(Debug)]
pub struct SyncPoint {
    device: Arc<wgpu::Device>,
    index: Option<wgpu::SubmissionIndex>,
}

impl SyncPoint {
    pub(crate) fn new(device: Arc<wgpu::Device>, index: Option<wgpu::SubmissionIndex>) -> Self {
        Self { device, index }
    }

    /// Blocks the calling thread until all work submitted before this sync
    /// point was created has completed on the GPU.
    ///
    /// There is no timeout and no cancellation: a hung kernel hangs the
    /// caller. That is a deliberate policy in favor of long-running compute
    /// dispatches.
    pub fn wait(self) {
        match self.index {
            Some(index) => {
                self.device
                    .poll(wgpu::Maintain::WaitForSubmissionIndex(index));
            }
            // Nothing was ever submitted; drain whatever the queue holds.
            None => {
                self.device.poll(wgpu::Maintain::Wait);
            }
        }
    }
}
