//! Render and compute pipeline construction

use splatcrate_core::Result;

use crate::device::{check_error_scope, PUSH_CONSTANT_SIZE};
use crate::surface::DEPTH_FORMAT;

/// Fixed-function state for a render pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub color_format: wgpu::TextureFormat,
    pub topology: wgpu::PrimitiveTopology,
    pub cull_mode: Option<wgpu::Face>,
    pub blend: wgpu::BlendState,
    pub depth_write: bool,
}

impl PipelineConfig {
    /// Opaque triangles with depth testing and no culling
    pub fn new(color_format: wgpu::TextureFormat) -> Self {
        Self {
            color_format,
            topology: wgpu::PrimitiveTopology::TriangleList,
            cull_mode: None,
            blend: wgpu::BlendState::REPLACE,
            depth_write: true,
        }
    }
}

/// Pipeline layout with the given set layouts and one push constant range
/// covering [`PUSH_CONSTANT_SIZE`] bytes.
pub fn create_pipeline_layout(
    device: &wgpu::Device,
    label: &str,
    set_layouts: &[&wgpu::BindGroupLayout],
    push_constant_stages: wgpu::ShaderStages,
) -> wgpu::PipelineLayout {
    device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: set_layouts,
        push_constant_ranges: &[wgpu::PushConstantRange {
            stages: push_constant_stages,
            range: 0..PUSH_CONSTANT_SIZE,
        }],
    })
}

/// Render pipeline with `vs_main`/`fs_main` entry points
pub fn create_render_pipeline(
    device: &wgpu::Device,
    label: &str,
    layout: &wgpu::PipelineLayout,
    shader: &wgpu::ShaderModule,
    vertex_buffers: &[wgpu::VertexBufferLayout<'_>],
    config: &PipelineConfig,
) -> Result<wgpu::RenderPipeline> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: "vs_main",
            buffers: vertex_buffers,
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: "fs_main",
            targets: &[Some(wgpu::ColorTargetState {
                format: config.color_format,
                blend: Some(config.blend),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: config.topology,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: config.cull_mode,
            unclipped_depth: false,
            polygon_mode: wgpu::PolygonMode::Fill,
            conservative: false,
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: config.depth_write,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview: None,
    });
    check_error_scope(device, &format!("create render pipeline {}", label))?;
    Ok(pipeline)
}

/// Compute pipeline with a `main` entry point
pub fn create_compute_pipeline(
    device: &wgpu::Device,
    label: &str,
    layout: &wgpu::PipelineLayout,
    shader: &wgpu::ShaderModule,
) -> Result<wgpu::ComputePipeline> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        module: shader,
        entry_point: "main",
        compilation_options: wgpu::PipelineCompilationOptions::default(),
    });
    check_error_scope(device, &format!("create compute pipeline {}", label))?;
    Ok(pipeline)
}
