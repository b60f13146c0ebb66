//! GPU device management

use std::sync::Arc;

use splatcrate_core::{Error, Result};
use tracing::{debug, info};
use winit::window::Window;

/// Size of the per-draw push constant block (model and normal matrix)
pub const PUSH_CONSTANT_SIZE: u32 = 128;

/// GPU context shared by the surface, the render systems and uploads
pub struct GpuContext {
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl GpuContext {
    /// Create a context without a presentation surface
    pub async fn new() -> Result<Self> {
        let instance = create_instance();
        Self::request(instance, None).await
    }

    /// Create a context whose adapter can present to `window`
    pub async fn for_window(window: Arc<Window>) -> Result<(Self, wgpu::Surface<'static>)> {
        let instance = create_instance();
        let surface = instance
            .create_surface(window)
            .map_err(|e| Error::Surface(format!("Failed to create surface: {}", e)))?;
        let context = Self::request(instance, Some(&surface)).await?;
        Ok((context, surface))
    }

    async fn request(instance: wgpu::Instance, compatible_surface: Option<&wgpu::Surface<'_>>) -> Result<Self> {
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| Error::Gpu("Failed to find suitable adapter".to_string()))?;

        if !adapter.features().contains(wgpu::Features::PUSH_CONSTANTS) {
            return Err(Error::Gpu(format!(
                "Adapter {} does not support push constants",
                adapter.get_info().name
            )));
        }

        let adapter_limits = adapter.limits();
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("splatcrate device"),
                    required_features: wgpu::Features::PUSH_CONSTANTS,
                    required_limits: wgpu::Limits {
                        max_push_constant_size: PUSH_CONSTANT_SIZE,
                        max_buffer_size: adapter_limits.max_buffer_size,
                        max_storage_buffer_binding_size: adapter_limits.max_storage_buffer_binding_size,
                        ..wgpu::Limits::default()
                    },
                },
                None,
            )
            .await
            .map_err(|e| Error::Gpu(format!("Failed to create device: {}", e)))?;

        let info = adapter.get_info();
        info!("using adapter {} ({:?})", info.name, info.backend);
        debug!(
            "max buffer size {} bytes, max storage binding {} bytes",
            adapter_limits.max_buffer_size, adapter_limits.max_storage_buffer_binding_size
        );

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
        })
    }

    /// Block until all submitted work has finished
    pub fn wait_idle(&self) {
        self.device.poll(wgpu::Maintain::Wait);
    }

    /// Block until `submission` has finished
    pub fn wait_for(&self, submission: wgpu::SubmissionIndex) {
        self.device
            .poll(wgpu::Maintain::WaitForSubmissionIndex(submission));
    }
}

fn create_instance() -> wgpu::Instance {
    wgpu::Instance::new(wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        flags: wgpu::InstanceFlags::default(),
        ..Default::default()
    })
}

/// Pop an error scope pushed before a resource creation call.
///
/// wgpu reports creation failures asynchronously; this turns them into a
/// synchronous [`Error::Gpu`].
pub(crate) fn check_error_scope(device: &wgpu::Device, what: &str) -> Result<()> {
    match pollster::block_on(device.pop_error_scope()) {
        Some(e) => Err(Error::Gpu(format!("Failed to {}: {}", what, e))),
        None => Ok(()),
    }
}

/// Run a resource creation call inside validation and out-of-memory scopes.
///
/// Oversized or otherwise invalid requests come back as [`Error::Gpu`]
/// instead of reaching the device's uncaptured error handler.
pub(crate) fn create_scoped<T>(device: &wgpu::Device, what: &str, create: impl FnOnce() -> T) -> Result<T> {
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let resource = create();
    let validation = check_error_scope(device, what);
    let memory = check_error_scope(device, what);
    validation.and(memory)?;
    Ok(resource)
}
