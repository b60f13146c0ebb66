//! Window, scene setup and the frame loop

use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, bail, Context, Result};
use nalgebra::Vector3;
use splatcrate_core::{ObjectIdAllocator, TransformComponent};
use splatcrate_gpu::shaders::MESH_SHADER;
use splatcrate_gpu::{
    DescriptorKind, DescriptorPool, DescriptorPoolConfig, DescriptorSet, DescriptorSetLayout,
    DescriptorSetLayoutBuilder, DescriptorWriter, FrameInfo, FrameScheduler, FrameStatus, GaussianGeometryBuffer,
    GaussianRenderSystem, GlobalUbo, GpuContext, MeshData, MeshGeometryBuffer, SceneObject, ShaderBlob,
    SimpleRenderSystem, UniformBuffer, WindowSurface,
};
use tracing::{debug, error, info};
use winit::{
    dpi::LogicalSize,
    event::{ElementState, Event, WindowEvent},
    event_loop::{ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowBuilder},
};

use crate::camera::Camera;
use crate::config::ViewerConfig;
use crate::controller::KeyboardMovementController;

const FIELD_OF_VIEW_DEGREES: f32 = 50.0;
const NEAR_PLANE: f32 = 0.1;
const FAR_PLANE: f32 = 10.0;
const MESH_COLOR: [f32; 3] = [0.8, 0.8, 0.8];
const CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 0.01,
    g: 0.01,
    b: 0.01,
    a: 1.0,
};

/// Interactive viewer for one mesh and an optional splat cloud
pub struct SplatViewer {
    config: ViewerConfig,
}

impl SplatViewer {
    pub fn new(config: ViewerConfig) -> Self {
        Self { config }
    }

    /// Open the window and run until it is closed or a fatal error occurs
    pub fn run(self) -> Result<()> {
        let event_loop = EventLoop::new().context("Failed to create event loop")?;
        let window = Arc::new(
            WindowBuilder::new()
                .with_title("splatcrate viewer")
                .with_inner_size(LogicalSize::new(self.config.width as f64, self.config.height as f64))
                .build(&event_loop)
                .context("Failed to create window")?,
        );

        let mut scene = Scene::new(&self.config, window.clone())?;
        let mut fatal: Option<anyhow::Error> = None;

        info!("viewer initialized with {} objects", scene.objects.len());

        event_loop.run(|event, target| {
            target.set_control_flow(ControlFlow::Poll);

            match event {
                Event::WindowEvent { event, .. } => match event {
                    WindowEvent::CloseRequested => {
                        target.exit();
                    }
                    WindowEvent::Resized(new_size) => {
                        debug!("window resized to {}x{}", new_size.width, new_size.height);
                        scene.scheduler.mark_resized();
                    }
                    WindowEvent::Focused(false) => {
                        scene.controller.release_all();
                    }
                    WindowEvent::KeyboardInput { event, .. } => {
                        if let PhysicalKey::Code(code) = event.physical_key {
                            if code == KeyCode::Escape && event.state == ElementState::Pressed {
                                target.exit();
                            }
                            scene.controller.handle_key(code, event.state);
                        }
                    }
                    WindowEvent::RedrawRequested => {
                        if let Err(e) = scene.render_frame() {
                            error!("frame failed: {:#}", e);
                            fatal = Some(e);
                            target.exit();
                        }
                    }
                    _ => {}
                },
                Event::AboutToWait => {
                    window.request_redraw();
                }
                _ => {}
            }
        })?;

        scene.scheduler.surface().context().wait_idle();

        match fatal {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Everything the frame loop touches
struct Scene {
    gpu: Rc<GpuContext>,
    scheduler: FrameScheduler<WindowSurface>,
    _global_layout: DescriptorSetLayout<wgpu::Device>,
    global_pool: DescriptorPool<wgpu::Device>,
    global_sets: Vec<DescriptorSet>,
    ubo_buffers: Vec<UniformBuffer<GlobalUbo>>,
    simple_system: SimpleRenderSystem,
    gaussian_system: GaussianRenderSystem,
    objects: Vec<SceneObject>,
    camera: Camera,
    controller: KeyboardMovementController,
    viewer: TransformComponent,
    last_frame: Instant,
}

impl Scene {
    fn new(config: &ViewerConfig, window: Arc<Window>) -> Result<Self> {
        let frames_in_flight = config.frames_in_flight as usize;
        let (gpu, surface) = pollster::block_on(GpuContext::for_window(window.clone()))?;
        let gpu = Rc::new(gpu);
        let surface = WindowSurface::new(gpu.clone(), surface, window, frames_in_flight)?;
        let color_format = surface.format();
        let scheduler = FrameScheduler::new(surface);

        let global_layout = DescriptorSetLayoutBuilder::new()
            .with_label("global set")
            .add_binding(
                0,
                DescriptorKind::UniformBuffer,
                wgpu::ShaderStages::VERTEX_FRAGMENT | wgpu::ShaderStages::COMPUTE,
            )
            .build(&gpu.device)?;
        let mut global_pool = DescriptorPool::new(
            DescriptorPoolConfig::new()
                .max_sets(config.frames_in_flight)
                .pool_size(DescriptorKind::UniformBuffer, config.frames_in_flight),
        );

        let ubo_buffers: Vec<UniformBuffer<GlobalUbo>> = (0..frames_in_flight)
            .map(|i| UniformBuffer::new(&gpu.device, &format!("global ubo {}", i)))
            .collect();
        let global_sets = ubo_buffers
            .iter()
            .map(|ubo| {
                DescriptorWriter::new(&global_layout, &mut global_pool)
                    .write_buffer(0, ubo.binding())
                    .build(&gpu.device)
            })
            .collect::<splatcrate_core::Result<Vec<_>>>()?;

        let simple_system = SimpleRenderSystem::new(
            &gpu.device,
            color_format,
            &global_layout,
            &ShaderBlob::Embedded(MESH_SHADER),
        )?;
        let mut gaussian_system = GaussianRenderSystem::new(
            &gpu.device,
            color_format,
            &global_layout,
            &config.splat_shader(),
            &config.preprocess_shader(),
        )?;

        let objects = load_objects(config, &gpu)?;
        for object in objects.iter().filter(|o| o.geometry.splat().is_some()) {
            gaussian_system.register(&gpu.device, object)?;
        }

        Ok(Self {
            gpu,
            scheduler,
            _global_layout: global_layout,
            global_pool,
            global_sets,
            ubo_buffers,
            simple_system,
            gaussian_system,
            objects,
            camera: Camera::new(),
            controller: KeyboardMovementController::new(),
            viewer: TransformComponent::identity(),
            last_frame: Instant::now(),
        })
    }

    fn render_frame(&mut self) -> Result<()> {
        let now = Instant::now();
        let frame_time = (now - self.last_frame).as_secs_f32();
        self.last_frame = now;

        self.controller.move_in_plane_xz(frame_time, &mut self.viewer);
        self.camera.set_view_yxz(self.viewer.translation, self.viewer.rotation);
        let aspect = self.scheduler.surface().aspect_ratio();
        self.camera
            .set_perspective_projection(FIELD_OF_VIEW_DEGREES.to_radians(), aspect, NEAR_PLANE, FAR_PLANE);

        let mut frame = match self.scheduler.begin_frame()? {
            FrameStatus::Ready(frame) => frame,
            FrameStatus::Retry => return Ok(()),
        };
        let frame_index = frame.frame_index;

        let ubo = GlobalUbo::new(self.camera.projection_view(), self.camera.position());
        self.ubo_buffers[frame_index].write(&self.gpu.queue, &ubo);
        let global_set = self
            .global_pool
            .get(self.global_sets[frame_index])
            .ok_or_else(|| anyhow!("Global descriptor set for frame {} is not live", frame_index))?;

        let info = FrameInfo {
            frame_index,
            frame_time,
            global_set,
        };
        {
            let mut pass = frame.begin_compute_pass();
            self.gaussian_system.preprocess(&mut pass, &info, &self.objects);
        }
        {
            let mut pass = frame.begin_swapchain_pass(CLEAR_COLOR);
            self.simple_system.render(&mut pass, &info, &self.objects);
            self.gaussian_system.render(&mut pass, &info, &self.objects);
        }
        drop(frame);

        if self.scheduler.end_frame()?.is_retry() {
            debug!("surface rebuilt after frame {}", frame_index);
        }
        Ok(())
    }
}

fn load_objects(config: &ViewerConfig, gpu: &GpuContext) -> Result<Vec<SceneObject>> {
    let mut ids = ObjectIdAllocator::new();
    let mut objects = Vec::new();

    let mesh_data = load_mesh_data(config.mesh.as_deref())?;
    let mesh = MeshGeometryBuffer::new(gpu, &mesh_data)?;
    let mut mesh_object = SceneObject::with_mesh(&mut ids, Rc::new(mesh));
    mesh_object.transform.translation = Vector3::new(-0.5, -0.5, 2.5);
    mesh_object.transform.scale = Vector3::new(3.0, 1.5, 3.0);
    objects.push(mesh_object);

    if let Some(path) = &config.ply {
        let records = splatcrate_io::load_gaussians(path)
            .with_context(|| format!("Failed to load splat cloud {}", path.display()))?;
        if records.len() < 3 {
            bail!("{} holds {} gaussians, at least 3 are required", path.display(), records.len());
        }
        let splat = GaussianGeometryBuffer::from_records(gpu, &records)?;
        let mut splat_object = SceneObject::with_splat(&mut ids, Rc::new(splat));
        splat_object.transform.translation = Vector3::new(0.0, 0.0, 2.5);
        info!("loaded {} gaussians from {}", records.len(), path.display());
        objects.push(splat_object);
    }

    Ok(objects)
}

/// Mesh from an OBJ file, or the built-in cube when no path is given
fn load_mesh_data(path: Option<&Path>) -> Result<MeshData> {
    let Some(path) = path else {
        return Ok(MeshData::cube());
    };
    let mesh =
        splatcrate_io::read_obj_mesh(path).with_context(|| format!("Failed to load mesh {}", path.display()))?;
    let data = MeshData::from_obj(&mesh, MESH_COLOR);
    if data.vertices.len() < 3 {
        bail!("{} holds {} vertices, at least 3 are required", path.display(), data.vertices.len());
    }
    Ok(data)
}
