//! Device context: adapter selection, queue ownership, command submission
//!
//! One [`DeviceContext`] owns one logical GPU: the device handle, its single
//! command queue, and the capability metadata queried at creation time. All
//! command recording flows through [`DeviceContext::execute`], which keeps
//! recording order equal to submission order on the one in-order queue.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::GpuError;
use crate::sync::SyncPoint;

/// Capability metadata recorded when the device is created.
///
/// The compute analog of the original shader-model / wave-lane report:
/// workgroup limits and binding limits are what kernel authors size against.
#[derive(Debug, Clone)]
pub struct DeviceCapabilities {
    pub name: String,
    pub backend: wgpu::Backend,
    pub device_type: wgpu::DeviceType,
    pub max_workgroup_size: [u32; 3],
    pub max_invocations_per_workgroup: u32,
    pub max_storage_buffer_binding_size: u32,
    pub max_bindings_per_group: u32,
}

/// Lists every candidate adapter on the primary native backends.
///
/// Adapter choice policy (which one to use, whether to retry another on
/// failure) belongs to the caller; see [`pick_adapter`] for the default.
pub fn enumerate_adapters() -> Vec<wgpu::Adapter> {
    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
        backends: wgpu::Backends::PRIMARY,
        ..Default::default()
    });
    instance.enumerate_adapters(wgpu::Backends::PRIMARY)
}

/// True when the adapter has dedicated device memory (a discrete GPU).
pub fn has_dedicated_memory(info: &wgpu::AdapterInfo) -> bool {
    info.device_type == wgpu::DeviceType::DiscreteGpu
}

/// Picks the most capable adapter: dedicated memory first, software
/// rasterizers last.
pub fn pick_adapter(adapters: Vec<wgpu::Adapter>) -> Option<wgpu::Adapter> {
    adapters.into_iter().min_by_key(|adapter| {
        match adapter.get_info().device_type {
            wgpu::DeviceType::DiscreteGpu => 0,
            wgpu::DeviceType::IntegratedGpu => 1,
            wgpu::DeviceType::VirtualGpu => 2,
            wgpu::DeviceType::Cpu => 4,
            _ => 3,
        }
    })
}

/// Owns one GPU: device handle, command queue, capability metadata.
pub struct DeviceContext {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    capabilities: DeviceCapabilities,
    // Queue state as of the most recent submission; sync points arm against it.
    last_submission: Mutex<Option<wgpu::SubmissionIndex>>,
}

impl DeviceContext {
    /// Creates a context on the given adapter.
    ///
    /// Requests the device at the adapter's full limits and records the
    /// capability summary. Fails when the adapter cannot run compute
    /// shaders or refuses the device request.
    pub fn new(adapter: &wgpu::Adapter) -> Result<Self, GpuError> {
        let info = adapter.get_info();

        let downlevel = adapter.get_downlevel_capabilities();
        if !downlevel
            .flags
            .contains(wgpu::DownlevelFlags::COMPUTE_SHADERS)
        {
            return Err(GpuError::ComputeUnsupported { name: info.name });
        }

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("ezgpu device"),
                required_features: wgpu::Features::empty(),
                required_limits: adapter.limits(),
            },
            None,
        ))?;

        // Validation failures from infallible create_* calls land here.
        device.on_uncaptured_error(Box::new(|error| {
            log::error!("[DeviceContext] uncaptured device error: {error}");
        }));

        let limits = device.limits();
        let capabilities = DeviceCapabilities {
            name: info.name,
            backend: info.backend,
            device_type: info.device_type,
            max_workgroup_size: [
                limits.max_compute_workgroup_size_x,
                limits.max_compute_workgroup_size_y,
                limits.max_compute_workgroup_size_z,
            ],
            max_invocations_per_workgroup: limits.max_compute_invocations_per_workgroup,
            max_storage_buffer_binding_size: limits.max_storage_buffer_binding_size,
            max_bindings_per_group: limits.max_bindings_per_bind_group,
        };

        log::info!(
            "[DeviceContext::new] {} ({:?}, {:?})",
            capabilities.name,
            capabilities.backend,
            capabilities.device_type
        );
        log::debug!(
            "[DeviceContext::new] workgroup limits {:?}, {} invocations, {} bindings/group",
            capabilities.max_workgroup_size,
            capabilities.max_invocations_per_workgroup,
            capabilities.max_bindings_per_group
        );

        Ok(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
            capabilities,
            last_submission: Mutex::new(None),
        })
    }

    /// Records `record` into a fresh command batch, closes it, and submits
    /// it to the queue.
    ///
    /// Non-blocking: the GPU executes asynchronously. Callers that need the
    /// results must create a [`SyncPoint`] afterwards and wait on it.
    /// Commands execute in recorded order; batches execute in submission
    /// order on the single queue.
    pub fn execute<F>(&self, record: F)
    where
        F: FnOnce(&mut wgpu::CommandEncoder),
    {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("ezgpu command batch"),
            });
        record(&mut encoder);
        let index = self.queue.submit(std::iter::once(encoder.finish()));
        *self.last_submission.lock() = Some(index);
    }

    /// Returns a fence armed against the queue state at this moment.
    pub fn sync_point(&self) -> SyncPoint {
        SyncPoint::new(Arc::clone(&self.device), self.last_submission.lock().clone())
    }

    /// Diagnostic device name.
    pub fn name(&self) -> &str {
        &self.capabilities.name
    }

    pub fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    pub fn device(&self) -> &Arc<wgpu::Device> {
        &self.device
    }

    pub fn queue(&self) -> &Arc<wgpu::Queue> {
        &self.queue
    }
}
