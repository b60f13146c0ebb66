//! # splatcrate GPU
//!
//! Frame scheduling, descriptor management and render systems for drawing
//! triangle meshes and Gaussian splat clouds with wgpu.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use splatcrate_gpu::{GaussianGeometryBuffer, GpuContext};
//!
//! async fn example() -> splatcrate_core::Result<()> {
//!     let gpu = GpuContext::new().await?;
//!     let records = splatcrate_io::load_gaussians("scene.ply")?;
//!     let splats = GaussianGeometryBuffer::from_records(&gpu, &records)?;
//!     assert_eq!(splats.vertex_count() as usize, records.len());
//!     Ok(())
//! }
//! ```

pub mod buffer;
pub mod descriptors;
pub mod device;
pub mod frame_info;
pub mod gaussian_model;
pub mod mesh_model;
pub mod pipeline;
pub mod scheduler;
pub mod shaders;
pub mod surface;
pub mod systems;

#[cfg(test)]
mod testing;

pub use buffer::{upload_device_local, DeviceMemory, DrawCall, UniformBuffer};
pub use descriptors::{
    BufferInfo, DescriptorBackend, DescriptorKind, DescriptorPool, DescriptorPoolConfig, DescriptorSet,
    DescriptorSetLayout, DescriptorSetLayoutBuilder, DescriptorWriter, LayoutBinding,
};
pub use device::GpuContext;
pub use frame_info::{FrameInfo, GlobalUbo, PushConstantData};
pub use gaussian_model::{gaussian_vertex_layout, GaussianGeometryBuffer};
pub use mesh_model::{MeshData, MeshGeometryBuffer, MeshVertex};
pub use scheduler::{FrameContext, FrameScheduler, FrameStatus, PresentationSurface, RecorderKind, SurfaceFailure};
pub use shaders::ShaderBlob;
pub use surface::{SwapchainImage, WindowSurface};
pub use systems::{GaussianRenderSystem, SimpleRenderSystem};

/// Render object as drawn by the render systems
pub type SceneObject = splatcrate_core::RenderObject<MeshGeometryBuffer, GaussianGeometryBuffer>;
