use splatcrate_core::Result;

use crate::descriptors::DescriptorSetLayout;
use crate::frame_info::{FrameInfo, PushConstantData};
use crate::mesh_model::MeshVertex;
use crate::pipeline::{create_pipeline_layout, create_render_pipeline, PipelineConfig};
use crate::shaders::ShaderBlob;
use crate::SceneObject;

const PUSH_STAGES: wgpu::ShaderStages = wgpu::ShaderStages::VERTEX_FRAGMENT;

/// Draws every object that carries a mesh
pub struct SimpleRenderSystem {
    pipeline: wgpu::RenderPipeline,
}

impl SimpleRenderSystem {
    pub fn new(
        device: &wgpu::Device,
        color_format: wgpu::TextureFormat,
        global_layout: &DescriptorSetLayout<wgpu::Device>,
        shader: &ShaderBlob,
    ) -> Result<Self> {
        let module = shader.load(device, "mesh shader")?;
        let layout = create_pipeline_layout(device, "mesh pipeline layout", &[global_layout.raw()], PUSH_STAGES);
        let config = PipelineConfig::new(color_format);
        let pipeline = create_render_pipeline(device, "mesh pipeline", &layout, &module, &[MeshVertex::desc()], &config)?;

        Ok(Self { pipeline })
    }

    pub fn render<'a>(&'a self, pass: &mut wgpu::RenderPass<'a>, frame: &FrameInfo<'a>, objects: &'a [SceneObject]) {
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, frame.global_set, &[]);

        for object in objects {
            let Some(mesh) = object.geometry.mesh() else {
                continue;
            };

            let push = PushConstantData::from_transform(&object.transform);
            pass.set_push_constants(PUSH_STAGES, 0, bytemuck::bytes_of(&push));
            mesh.bind(pass);
            mesh.draw(pass);
        }
    }
}
