//! Gaussian splat geometry on the GPU

use std::mem::offset_of;

use splatcrate_core::{GaussianRecord, Result};
use tracing::debug;

use crate::buffer::{upload_device_local, DeviceMemory, DrawCall};
use crate::descriptors::BufferInfo;

const GAUSSIAN_ATTRIBUTES: [wgpu::VertexAttribute; 5] = [
    // Position
    wgpu::VertexAttribute {
        offset: offset_of!(GaussianRecord, position) as wgpu::BufferAddress,
        shader_location: 0,
        format: wgpu::VertexFormat::Float32x3,
    },
    // Normal
    wgpu::VertexAttribute {
        offset: offset_of!(GaussianRecord, normal) as wgpu::BufferAddress,
        shader_location: 1,
        format: wgpu::VertexFormat::Float32x3,
    },
    // Opacity
    wgpu::VertexAttribute {
        offset: offset_of!(GaussianRecord, opacity) as wgpu::BufferAddress,
        shader_location: 2,
        format: wgpu::VertexFormat::Float32,
    },
    // Scale
    wgpu::VertexAttribute {
        offset: offset_of!(GaussianRecord, scale) as wgpu::BufferAddress,
        shader_location: 3,
        format: wgpu::VertexFormat::Float32x3,
    },
    // Rotation
    wgpu::VertexAttribute {
        offset: offset_of!(GaussianRecord, rotation) as wgpu::BufferAddress,
        shader_location: 4,
        format: wgpu::VertexFormat::Float32x4,
    },
];

/// Vertex buffer layout for splats drawn straight from the record buffer.
///
/// SH coefficients are not vertex attributes; the preprocessing pass reads
/// them through the storage binding instead.
pub fn gaussian_vertex_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: GaussianRecord::SIZE as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &GAUSSIAN_ATTRIBUTES,
    }
}

/// Device-local copy of a loaded splat cloud.
///
/// The record buffer doubles as a vertex buffer and a storage buffer.
pub struct GaussianGeometryBuffer<B = wgpu::Buffer> {
    record_buffer: B,
    vertex_count: u32,
    index_buffer: Option<B>,
    index_count: u32,
}

impl<B> GaussianGeometryBuffer<B> {
    /// Upload `records` for non-indexed drawing.
    ///
    /// # Panics
    ///
    /// Panics if fewer than 3 records are given.
    pub fn from_records<M>(memory: &M, records: &[GaussianRecord]) -> Result<Self>
    where
        M: DeviceMemory<Buffer = B>,
    {
        Self::from_records_indexed(memory, records, &[])
    }

    /// Upload `records` and, when `indices` is non-empty, an index buffer
    pub fn from_records_indexed<M>(memory: &M, records: &[GaussianRecord], indices: &[u32]) -> Result<Self>
    where
        M: DeviceMemory<Buffer = B>,
    {
        assert!(
            records.len() >= 3,
            "Gaussian geometry needs at least 3 records, got {}",
            records.len()
        );

        let record_buffer = upload_device_local(
            memory,
            "gaussian records",
            bytemuck::cast_slice(records),
            wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::STORAGE,
        )?;

        let index_buffer = if indices.is_empty() {
            None
        } else {
            Some(upload_device_local(
                memory,
                "gaussian indices",
                bytemuck::cast_slice(indices),
                wgpu::BufferUsages::INDEX,
            )?)
        };

        debug!(
            "uploaded {} gaussians ({} indices)",
            records.len(),
            indices.len()
        );

        Ok(Self {
            record_buffer,
            vertex_count: records.len() as u32,
            index_buffer,
            index_count: indices.len() as u32,
        })
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    pub fn has_index_buffer(&self) -> bool {
        self.index_buffer.is_some()
    }

    pub fn draw_call(&self) -> DrawCall {
        if self.has_index_buffer() {
            DrawCall::Indexed {
                count: self.index_count,
            }
        } else {
            DrawCall::NonIndexed {
                count: self.vertex_count,
            }
        }
    }

    /// Record buffer as seen by the preprocessing pass
    pub fn storage_binding(&self) -> BufferInfo<'_, B> {
        BufferInfo::whole(&self.record_buffer)
    }
}

impl GaussianGeometryBuffer<wgpu::Buffer> {
    /// Bind the record buffer (and index buffer, if any) to `pass`
    pub fn bind<'a>(&'a self, pass: &mut wgpu::RenderPass<'a>) {
        pass.set_vertex_buffer(0, self.record_buffer.slice(..));
        if let Some(index_buffer) = &self.index_buffer {
            pass.set_index_buffer(index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        }
    }

    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>) {
        self.draw_call().record(pass);
    }
}
