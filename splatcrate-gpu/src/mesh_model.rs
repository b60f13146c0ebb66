//! Triangle mesh geometry on the GPU

use bytemuck::{Pod, Zeroable};
use splatcrate_core::Result;
use splatcrate_io::ObjMesh;
use tracing::debug;

use crate::buffer::{upload_device_local, DeviceMemory, DrawCall};

/// Vertex data for mesh rendering
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub color: [f32; 3],
    pub normal: [f32; 3],
}

impl MeshVertex {
    pub fn new(position: [f32; 3], color: [f32; 3], normal: [f32; 3]) -> Self {
        Self {
            position,
            color,
            normal,
        }
    }

    /// Vertex buffer layout descriptor
    pub fn desc<'a>() -> wgpu::VertexBufferLayout<'a> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<MeshVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                // Position
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                // Color
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x3,
                },
                // Normal
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 6]>() as wgpu::BufferAddress,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32x3,
                },
            ],
        }
    }
}

/// Host-side mesh ready for upload
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    /// Convert a loaded OBJ mesh, painting every vertex with `color`
    pub fn from_obj(mesh: &ObjMesh, color: [f32; 3]) -> Self {
        let vertices = mesh
            .positions
            .iter()
            .zip(&mesh.normals)
            .map(|(position, normal)| MeshVertex::new(*position, color, *normal))
            .collect();
        Self {
            vertices,
            indices: mesh.indices.clone(),
        }
    }

    /// Unit cube centred on the origin, one color per face
    pub fn cube() -> Self {
        let faces: [([f32; 3], [f32; 3], [f32; 3], [f32; 3]); 6] = [
            // normal, axis u, axis v, color
            ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.8, 0.2, 0.2]),
            ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.2, 0.8, 0.2]),
            ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.2, 0.2, 0.8]),
            ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.8, 0.8, 0.2]),
            ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0], [0.8, 0.2, 0.8]),
            ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0], [0.2, 0.8, 0.8]),
        ];

        let mut data = MeshData::default();
        for (normal, u, v, color) in faces {
            let base = data.vertices.len() as u32;
            for (su, sv) in [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)] {
                let position = [
                    normal[0] * 0.5 + u[0] * su + v[0] * sv,
                    normal[1] * 0.5 + u[1] * su + v[1] * sv,
                    normal[2] * 0.5 + u[2] * su + v[2] * sv,
                ];
                data.vertices.push(MeshVertex::new(position, color, normal));
            }
            data.indices
                .extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
        }
        data
    }
}

/// Device-local vertex and optional index buffer for one mesh
pub struct MeshGeometryBuffer<B = wgpu::Buffer> {
    vertex_buffer: B,
    vertex_count: u32,
    index_buffer: Option<B>,
    index_count: u32,
}

impl<B> MeshGeometryBuffer<B> {
    /// Upload `data` through staging buffers.
    ///
    /// # Panics
    ///
    /// Panics if the mesh has fewer than 3 vertices.
    pub fn new<M>(memory: &M, data: &MeshData) -> Result<Self>
    where
        M: DeviceMemory<Buffer = B>,
    {
        assert!(
            data.vertices.len() >= 3,
            "Mesh needs at least 3 vertices, got {}",
            data.vertices.len()
        );

        let vertex_buffer = upload_device_local(
            memory,
            "mesh vertices",
            bytemuck::cast_slice(&data.vertices),
            wgpu::BufferUsages::VERTEX,
        )?;
        let index_buffer = if data.indices.is_empty() {
            None
        } else {
            Some(upload_device_local(
                memory,
                "mesh indices",
                bytemuck::cast_slice(&data.indices),
                wgpu::BufferUsages::INDEX,
            )?)
        };

        debug!(
            "uploaded mesh with {} vertices and {} indices",
            data.vertices.len(),
            data.indices.len()
        );

        Ok(Self {
            vertex_buffer,
            vertex_count: data.vertices.len() as u32,
            index_buffer,
            index_count: data.indices.len() as u32,
        })
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub fn has_index_buffer(&self) -> bool {
        self.index_buffer.is_some()
    }

    pub fn draw_call(&self) -> DrawCall {
        match self.index_buffer {
            Some(_) => DrawCall::Indexed {
                count: self.index_count,
            },
            None => DrawCall::NonIndexed {
                count: self.vertex_count,
            },
        }
    }
}

impl MeshGeometryBuffer<wgpu::Buffer> {
    pub fn bind<'a>(&'a self, pass: &mut wgpu::RenderPass<'a>) {
        pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        if let Some(index_buffer) = &self.index_buffer {
            pass.set_index_buffer(index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        }
    }

    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>) {
        self.draw_call().record(pass);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockMemory;

    #[test]
    fn test_cube_is_closed() {
        let cube = MeshData::cube();
        assert_eq!(cube.vertices.len(), 24);
        assert_eq!(cube.indices.len(), 36);
        for v in &cube.vertices {
            assert!(v.position.iter().all(|c| c.abs() <= 0.5 + f32::EPSILON));
        }
    }

    #[test]
    fn test_from_obj_keeps_indices() {
        let obj = ObjMesh {
            positions: vec![[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            normals: vec![[0.0, 0.0, 1.0]; 3],
            indices: vec![0, 1, 2],
        };
        let data = MeshData::from_obj(&obj, [1.0, 0.5, 0.0]);
        assert_eq!(data.indices, vec![0, 1, 2]);
        assert_eq!(data.vertices[1].position, [1.0, 0.0, 0.0]);
        assert_eq!(data.vertices[2].color, [1.0, 0.5, 0.0]);
    }

    #[test]
    fn test_upload_indexed_mesh() {
        let memory = MockMemory::default();
        let mesh = MeshGeometryBuffer::new(&memory, &MeshData::cube()).unwrap();
        assert!(mesh.has_index_buffer());
        assert_eq!(mesh.vertex_count(), 24);
        assert_eq!(mesh.draw_call(), DrawCall::Indexed { count: 36 });
    }

    #[test]
    fn test_vertex_stride() {
        assert_eq!(MeshVertex::desc().array_stride, 36);
    }
}
