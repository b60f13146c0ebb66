//! wgpu presentation surface

use std::rc::Rc;
use std::sync::Arc;

use splatcrate_core::{Error, Result};
use tracing::{debug, info, warn};
use winit::window::Window;

use crate::device::GpuContext;
use crate::scheduler::{FrameContext, PresentationSurface, RecorderKind, SurfaceFailure};

/// Format of the depth attachment used by every render pass
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Surface texture acquired for one frame
pub struct SwapchainImage {
    pub texture: wgpu::SurfaceTexture,
    pub view: wgpu::TextureView,
}

struct DepthTexture {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl DepthTexture {
    fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Depth Texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            _texture: texture,
            view,
        }
    }
}

/// Window surface with its depth attachment and per-slot submission tracking
pub struct WindowSurface {
    context: Rc<GpuContext>,
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    depth: DepthTexture,
    submissions: Vec<Option<wgpu::SubmissionIndex>>,
    configured: bool,
}

impl WindowSurface {
    pub fn new(
        context: Rc<GpuContext>,
        surface: wgpu::Surface<'static>,
        window: Arc<Window>,
        frames_in_flight: usize,
    ) -> Result<Self> {
        let caps = surface.get_capabilities(&context.adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .ok_or_else(|| Error::Surface("Surface reports no supported formats".to_string()))?;
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let size = window.inner_size();
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: frames_in_flight as u32,
        };
        let depth = DepthTexture::new(&context.device, config.width, config.height);

        let mut window_surface = Self {
            context,
            window,
            surface,
            config,
            depth,
            submissions: (0..frames_in_flight).map(|_| None).collect(),
            configured: false,
        };
        window_surface.rebuild()?;
        info!("surface format {:?}", format);
        Ok(window_surface)
    }

    pub fn context(&self) -> &Rc<GpuContext> {
        &self.context
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    pub fn extent(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.config.width as f32 / self.config.height as f32
    }

    pub fn depth_view(&self) -> &wgpu::TextureView {
        &self.depth.view
    }
}

impl PresentationSurface for WindowSurface {
    type Image = SwapchainImage;
    type Recorder = wgpu::CommandEncoder;

    fn frames_in_flight(&self) -> usize {
        self.submissions.len()
    }

    fn acquire(&mut self, slot: usize) -> std::result::Result<SwapchainImage, SurfaceFailure> {
        if let Some(submission) = self.submissions[slot].take() {
            self.context.wait_for(submission);
        }
        if !self.configured {
            return Err(SurfaceFailure::Stale);
        }

        match self.surface.get_current_texture() {
            Ok(texture) => {
                let view = texture
                    .texture
                    .create_view(&wgpu::TextureViewDescriptor::default());
                Ok(SwapchainImage { texture, view })
            }
            Err(wgpu::SurfaceError::Outdated) | Err(wgpu::SurfaceError::Lost) => Err(SurfaceFailure::Stale),
            Err(wgpu::SurfaceError::Timeout) => {
                warn!("timed out acquiring surface texture");
                Err(SurfaceFailure::Stale)
            }
            Err(e) => Err(SurfaceFailure::Fatal(Error::Surface(format!(
                "Failed to acquire swap chain image: {}",
                e
            )))),
        }
    }

    fn begin_recorder(&mut self, slot: usize, kind: RecorderKind) -> wgpu::CommandEncoder {
        let label = match kind {
            RecorderKind::Graphics => format!("graphics encoder {}", slot),
            RecorderKind::Compute => format!("compute encoder {}", slot),
        };
        self.context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(&label) })
    }

    fn submit(&mut self, slot: usize, compute: wgpu::CommandEncoder, graphics: wgpu::CommandEncoder) -> Result<()> {
        let submission = self.context.queue.submit([compute.finish(), graphics.finish()]);
        self.submissions[slot] = Some(submission);
        Ok(())
    }

    fn present(&mut self, image: SwapchainImage) -> std::result::Result<(), SurfaceFailure> {
        let suboptimal = image.texture.suboptimal;
        drop(image.view);
        image.texture.present();
        if suboptimal {
            Err(SurfaceFailure::Stale)
        } else {
            Ok(())
        }
    }

    fn rebuild(&mut self) -> Result<()> {
        self.context.wait_idle();
        for submission in &mut self.submissions {
            *submission = None;
        }

        let size = self.window.inner_size();
        if size.width == 0 || size.height == 0 {
            debug!("window has zero size, surface left unconfigured");
            self.configured = false;
            return Ok(());
        }

        self.config.width = size.width;
        self.config.height = size.height;

        let device = &self.context.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        self.surface.configure(device, &self.config);
        if let Some(e) = pollster::block_on(device.pop_error_scope()) {
            return Err(Error::Surface(format!("Failed to configure surface: {}", e)));
        }

        self.depth = DepthTexture::new(device, size.width, size.height);
        self.configured = true;
        info!("surface configured at {}x{}", size.width, size.height);
        Ok(())
    }
}

impl FrameContext<'_, WindowSurface> {
    /// Open a compute pass on this frame's compute recorder
    pub fn begin_compute_pass(&mut self) -> wgpu::ComputePass<'_> {
        self.compute.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("preprocess pass"),
            timestamp_writes: None,
        })
    }

    /// Open the render pass that clears and draws into the swap chain image
    pub fn begin_swapchain_pass(&mut self, clear: wgpu::Color) -> wgpu::RenderPass<'_> {
        self.graphics.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("swap chain pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &self.image.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(clear),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: self.surface.depth_view(),
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        })
    }
}
