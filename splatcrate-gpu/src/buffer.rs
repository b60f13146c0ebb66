//! Device memory and buffer uploads

use std::marker::PhantomData;

use bytemuck::Pod;
use splatcrate_core::{Error, Result};
use tracing::trace;
use wgpu::util::DeviceExt;

use crate::descriptors::BufferInfo;
use crate::device::{create_scoped, GpuContext};

/// Buffer allocation and transfer on a device.
///
/// Geometry uploads go through this trait so they can be exercised without a
/// GPU.
pub trait DeviceMemory {
    type Buffer;

    /// Largest buffer the device accepts, in bytes
    fn max_buffer_size(&self) -> u64;

    /// Host-visible buffer initialised with `contents`, usable as a copy source
    fn create_staging_buffer(&self, label: &str, contents: &[u8]) -> Result<Self::Buffer>;

    /// Device-local buffer of `size` bytes
    fn create_device_buffer(&self, label: &str, size: u64, usage: wgpu::BufferUsages) -> Result<Self::Buffer>;

    /// Copy `size` bytes from `src` to `dst` and wait for the copy to finish
    fn copy_buffer(&self, src: &Self::Buffer, dst: &Self::Buffer, size: u64) -> Result<()>;
}

/// How a geometry buffer is drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawCall {
    Indexed { count: u32 },
    NonIndexed { count: u32 },
}

impl DrawCall {
    /// Record the draw into `pass`
    pub fn record(self, pass: &mut wgpu::RenderPass<'_>) {
        match self {
            DrawCall::Indexed { count } => pass.draw_indexed(0..count, 0, 0..1),
            DrawCall::NonIndexed { count } => pass.draw(0..count, 0..1),
        }
    }
}

/// Upload `bytes` into a new device-local buffer through a staging copy.
///
/// The staging buffer is dropped once the copy has completed. `usage` gets
/// `COPY_DST` added.
///
/// Uploads larger than [`DeviceMemory::max_buffer_size`] fail with
/// `Error::Gpu` before anything is allocated.
///
/// # Panics
///
/// Panics if `bytes` is empty or not a multiple of
/// [`wgpu::COPY_BUFFER_ALIGNMENT`].
pub fn upload_device_local<M: DeviceMemory>(
    memory: &M,
    label: &str,
    bytes: &[u8],
    usage: wgpu::BufferUsages,
) -> Result<M::Buffer> {
    let size = bytes.len() as u64;
    assert!(size > 0, "Cannot upload an empty buffer ({})", label);
    assert!(
        size % wgpu::COPY_BUFFER_ALIGNMENT == 0,
        "Upload of {} bytes for {} is not {}-byte aligned",
        size,
        label,
        wgpu::COPY_BUFFER_ALIGNMENT
    );

    let limit = memory.max_buffer_size();
    if size > limit {
        return Err(Error::Gpu(format!(
            "{} needs {} bytes, but the device allows at most {} per buffer",
            label, size, limit
        )));
    }

    let staging = memory.create_staging_buffer(&format!("{} staging", label), bytes)?;
    let buffer = memory.create_device_buffer(label, size, usage | wgpu::BufferUsages::COPY_DST)?;
    memory.copy_buffer(&staging, &buffer, size)?;

    trace!("uploaded {} bytes to {}", size, label);
    Ok(buffer)
}

impl DeviceMemory for GpuContext {
    type Buffer = wgpu::Buffer;

    fn max_buffer_size(&self) -> u64 {
        self.device.limits().max_buffer_size
    }

    fn create_staging_buffer(&self, label: &str, contents: &[u8]) -> Result<wgpu::Buffer> {
        create_scoped(&self.device, "create staging buffer", || {
            self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents,
                usage: wgpu::BufferUsages::COPY_SRC,
            })
        })
    }

    fn create_device_buffer(&self, label: &str, size: u64, usage: wgpu::BufferUsages) -> Result<wgpu::Buffer> {
        create_scoped(&self.device, "create device buffer", || {
            self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage,
                mapped_at_creation: false,
            })
        })
    }

    fn copy_buffer(&self, src: &wgpu::Buffer, dst: &wgpu::Buffer, size: u64) -> Result<()> {
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("buffer copy encoder"),
        });
        encoder.copy_buffer_to_buffer(src, 0, dst, 0, size);

        let submission = self.queue.submit(std::iter::once(encoder.finish()));
        self.wait_for(submission);
        Ok(())
    }
}

/// Uniform buffer holding a single `T`, rewritten from the host
pub struct UniformBuffer<T: Pod> {
    buffer: wgpu::Buffer,
    _marker: PhantomData<T>,
}

impl<T: Pod> UniformBuffer<T> {
    pub fn new(device: &wgpu::Device, label: &str) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: std::mem::size_of::<T>() as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self {
            buffer,
            _marker: PhantomData,
        }
    }

    /// Queue a write of `value`; it lands before the next submission
    pub fn write(&self, queue: &wgpu::Queue, value: &T) {
        queue.write_buffer(&self.buffer, 0, bytemuck::bytes_of(value));
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    pub fn binding(&self) -> BufferInfo<'_, wgpu::Buffer> {
        BufferInfo::whole(&self.buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockMemory;

    #[test]
    fn test_upload_goes_through_staging() {
        let memory = MockMemory::default();
        let bytes: Vec<u8> = (0u8..16).collect();

        let buffer = upload_device_local(&memory, "test", &bytes, wgpu::BufferUsages::VERTEX).unwrap();

        assert!(!buffer.host_visible);
        assert!(buffer.usage.contains(wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST));
        assert_eq!(buffer.size, 16);
        assert_eq!(memory.contents(&buffer), bytes);

        let copies = memory.copies();
        assert_eq!(copies.len(), 1);
        assert_eq!(copies[0].1, buffer.id);
        assert_eq!(copies[0].2, 16);
    }

    #[test]
    fn test_oversized_upload_is_an_error() {
        let memory = MockMemory::with_max_buffer_size(16);
        let bytes = vec![0u8; 32];

        let result = upload_device_local(&memory, "splats", &bytes, wgpu::BufferUsages::VERTEX);
        assert!(matches!(result, Err(Error::Gpu(ref message)) if message.contains("splats")));
        assert_eq!(memory.buffer_count(), 0);

        assert!(upload_device_local(&memory, "fits", &bytes[..16], wgpu::BufferUsages::VERTEX).is_ok());
    }

    #[test]
    #[should_panic(expected = "aligned")]
    fn test_unaligned_upload_panics() {
        let memory = MockMemory::default();
        let _ = upload_device_local(&memory, "odd", &[1, 2, 3], wgpu::BufferUsages::INDEX);
    }

    #[test]
    fn test_draw_call_variants() {
        assert_ne!(DrawCall::Indexed { count: 3 }, DrawCall::NonIndexed { count: 3 });
    }
}
