use std::collections::HashMap;

use splatcrate_core::{Error, GaussianRecord, ObjectId, Result};
use tracing::{debug, trace};

use crate::descriptors::{
    BufferInfo, DescriptorBackend, DescriptorKind, DescriptorPool, DescriptorPoolConfig, DescriptorSet,
    DescriptorSetLayout, DescriptorSetLayoutBuilder, DescriptorWriter,
};
use crate::device::create_scoped;
use crate::frame_info::{FrameInfo, PushConstantData};
use crate::gaussian_model::gaussian_vertex_layout;
use crate::pipeline::{
    create_compute_pipeline, create_pipeline_layout, create_render_pipeline, PipelineConfig,
};
use crate::shaders::ShaderBlob;
use crate::SceneObject;

/// Workgroups dispatched per splat object
pub const PREPROCESS_WORKGROUPS: u32 = 16;
/// Invocations per preprocessing workgroup
pub const PREPROCESS_WORKGROUP_SIZE: u32 = 256;
/// Splat objects that can be registered at once
pub const MAX_SPLAT_OBJECTS: u32 = 16;

/// Bytes of preprocessed color (RGB plus opacity) per splat
const COLOR_STRIDE: u64 = 16;

const RENDER_PUSH_STAGES: wgpu::ShaderStages = wgpu::ShaderStages::VERTEX_FRAGMENT;

/// Storage buffer bound to a splat set, with its size in bytes
#[derive(Debug)]
pub struct StorageRange<'a, T> {
    pub buffer: &'a T,
    pub size: u64,
}

impl<T> Clone for StorageRange<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for StorageRange<'_, T> {}

/// The two descriptor sets of one splat object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplatSetPair {
    /// Records (read-only) and colors (read-write) for the preprocess pass
    pub compute: DescriptorSet,
    /// Colors (read-only) for the vertex stage
    pub draw: DescriptorSet,
}

/// Layouts and pool for the descriptor sets of up to [`MAX_SPLAT_OBJECTS`]
/// splat objects.
pub struct SplatSets<B: DescriptorBackend> {
    compute_layout: DescriptorSetLayout<B>,
    draw_layout: DescriptorSetLayout<B>,
    pool: DescriptorPool<B>,
    max_binding_size: u64,
}

impl<B: DescriptorBackend> SplatSets<B> {
    /// `max_binding_size` is the largest storage buffer range one binding may cover
    pub fn new(backend: &B, max_binding_size: u64) -> Result<Self> {
        let compute_layout = DescriptorSetLayoutBuilder::new()
            .with_label("splat preprocess set")
            .add_binding(0, DescriptorKind::ReadOnlyStorageBuffer, wgpu::ShaderStages::COMPUTE)
            .add_binding(1, DescriptorKind::StorageBuffer, wgpu::ShaderStages::COMPUTE)
            .build(backend)?;
        let draw_layout = DescriptorSetLayoutBuilder::new()
            .with_label("splat draw set")
            .add_binding(0, DescriptorKind::ReadOnlyStorageBuffer, wgpu::ShaderStages::VERTEX)
            .build(backend)?;

        let pool = DescriptorPool::new(
            DescriptorPoolConfig::new()
                .max_sets(2 * MAX_SPLAT_OBJECTS)
                .pool_size(DescriptorKind::ReadOnlyStorageBuffer, 2 * MAX_SPLAT_OBJECTS)
                .pool_size(DescriptorKind::StorageBuffer, MAX_SPLAT_OBJECTS)
                .free_individual(true),
        );

        Ok(Self {
            compute_layout,
            draw_layout,
            pool,
            max_binding_size,
        })
    }

    pub fn compute_layout(&self) -> &DescriptorSetLayout<B> {
        &self.compute_layout
    }

    pub fn draw_layout(&self) -> &DescriptorSetLayout<B> {
        &self.draw_layout
    }

    /// Allocate and write both sets for one object.
    ///
    /// Fails with `Error::Gpu` when a range exceeds the binding limit and with
    /// `Error::DescriptorPoolExhausted` when the pool is full. Nothing stays
    /// allocated on failure.
    pub fn allocate(
        &mut self,
        backend: &B,
        records: StorageRange<'_, B::Buffer>,
        colors: StorageRange<'_, B::Buffer>,
    ) -> Result<SplatSetPair> {
        self.check_binding_size("splat records", records.size)?;
        self.check_binding_size("splat colors", colors.size)?;

        let compute = DescriptorWriter::new(&self.compute_layout, &mut self.pool)
            .write_buffer(0, BufferInfo::whole(records.buffer))
            .write_buffer(1, BufferInfo::whole(colors.buffer))
            .build(backend)?;
        let draw = DescriptorWriter::new(&self.draw_layout, &mut self.pool)
            .write_buffer(0, BufferInfo::whole(colors.buffer))
            .build(backend);

        match draw {
            Ok(draw) => Ok(SplatSetPair { compute, draw }),
            Err(e) => {
                self.pool.free(&[compute]);
                Err(e)
            }
        }
    }

    /// Return both sets of an object to the pool
    pub fn release(&mut self, pair: SplatSetPair) {
        self.pool.free(&[pair.compute, pair.draw]);
    }

    pub fn get(&self, set: DescriptorSet) -> Option<&B::RawSet> {
        self.pool.get(set)
    }

    /// Objects that can still be given a pair of sets
    pub fn available_objects(&self) -> u32 {
        (self.pool.available_sets() / 2).min(self.pool.available(DescriptorKind::StorageBuffer))
    }

    fn check_binding_size(&self, what: &str, size: u64) -> Result<()> {
        if size > self.max_binding_size {
            return Err(Error::Gpu(format!(
                "{} need {} bytes, but a storage binding may cover at most {}",
                what, size, self.max_binding_size
            )));
        }
        Ok(())
    }
}

struct SplatBindings {
    _colors: wgpu::Buffer,
    sets: SplatSetPair,
}

/// Preprocesses and draws every object that carries a splat cloud.
///
/// Each registered object gets a color buffer written by the compute pass
/// and read by the vertex stage, plus one descriptor set for each side.
pub struct GaussianRenderSystem {
    render_pipeline: wgpu::RenderPipeline,
    compute_pipeline: wgpu::ComputePipeline,
    sets: SplatSets<wgpu::Device>,
    splats: HashMap<ObjectId, SplatBindings>,
}

impl GaussianRenderSystem {
    pub fn new(
        device: &wgpu::Device,
        color_format: wgpu::TextureFormat,
        global_layout: &DescriptorSetLayout<wgpu::Device>,
        render_shader: &ShaderBlob,
        preprocess_shader: &ShaderBlob,
    ) -> Result<Self> {
        let max_binding_size = device.limits().max_storage_buffer_binding_size as u64;
        let sets = SplatSets::new(device, max_binding_size)?;

        let render_module = render_shader.load(device, "gaussian shader")?;
        let render_layout = create_pipeline_layout(
            device,
            "gaussian pipeline layout",
            &[global_layout.raw(), sets.draw_layout().raw()],
            RENDER_PUSH_STAGES,
        );
        let config = PipelineConfig {
            topology: wgpu::PrimitiveTopology::PointList,
            blend: wgpu::BlendState::ALPHA_BLENDING,
            ..PipelineConfig::new(color_format)
        };
        let render_pipeline = create_render_pipeline(
            device,
            "gaussian pipeline",
            &render_layout,
            &render_module,
            &[gaussian_vertex_layout()],
            &config,
        )?;

        let compute_module = preprocess_shader.load(device, "preprocess shader")?;
        let compute_layout_raw = create_pipeline_layout(
            device,
            "preprocess pipeline layout",
            &[global_layout.raw(), sets.compute_layout().raw()],
            wgpu::ShaderStages::COMPUTE,
        );
        let compute_pipeline =
            create_compute_pipeline(device, "preprocess pipeline", &compute_layout_raw, &compute_module)?;

        Ok(Self {
            render_pipeline,
            compute_pipeline,
            sets,
            splats: HashMap::new(),
        })
    }

    /// Allocate the color buffer and descriptor sets for a splat object.
    ///
    /// Pool exhaustion is returned as `Error::DescriptorPoolExhausted`, and
    /// a cloud too large for one storage binding as `Error::Gpu`.
    ///
    /// # Panics
    ///
    /// Panics if `object` has no splat geometry or is already registered.
    pub fn register(&mut self, device: &wgpu::Device, object: &SceneObject) -> Result<()> {
        let splat = object
            .geometry
            .splat()
            .unwrap_or_else(|| panic!("Object {:?} has no splat geometry", object.id()));
        assert!(
            !self.splats.contains_key(&object.id()),
            "Object {:?} is already registered",
            object.id()
        );

        let records_size = splat.vertex_count() as u64 * GaussianRecord::SIZE as u64;
        let colors_size = splat.vertex_count() as u64 * COLOR_STRIDE;
        let colors = create_scoped(device, "create splat color buffer", || {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("splat colors"),
                size: colors_size,
                usage: wgpu::BufferUsages::STORAGE,
                mapped_at_creation: false,
            })
        })?;

        let sets = self.sets.allocate(
            device,
            StorageRange {
                buffer: splat.storage_binding().buffer,
                size: records_size,
            },
            StorageRange {
                buffer: &colors,
                size: colors_size,
            },
        )?;

        debug!(
            "registered splat object {:?} with {} gaussians",
            object.id(),
            splat.vertex_count()
        );
        self.splats.insert(object.id(), SplatBindings { _colors: colors, sets });
        Ok(())
    }

    /// Release the resources of a registered object; returns whether it was registered
    pub fn unregister(&mut self, id: ObjectId) -> bool {
        match self.splats.remove(&id) {
            Some(bindings) => {
                self.sets.release(bindings.sets);
                true
            }
            None => false,
        }
    }

    pub fn registered_count(&self) -> usize {
        self.splats.len()
    }

    /// Record the color preprocessing dispatch for every registered splat object
    pub fn preprocess<'a>(&'a self, pass: &mut wgpu::ComputePass<'a>, frame: &FrameInfo<'a>, objects: &'a [SceneObject]) {
        pass.set_pipeline(&self.compute_pipeline);
        pass.set_bind_group(0, frame.global_set, &[]);

        for object in objects {
            let Some(set) = self.bound_set(object, |b| b.sets.compute) else {
                continue;
            };

            let push = PushConstantData::from_transform(&object.transform);
            pass.set_bind_group(1, set, &[]);
            pass.set_push_constants(0, bytemuck::bytes_of(&push));
            pass.dispatch_workgroups(PREPROCESS_WORKGROUPS, 1, 1);
        }
    }

    /// Draw every registered splat object as points
    pub fn render<'a>(&'a self, pass: &mut wgpu::RenderPass<'a>, frame: &FrameInfo<'a>, objects: &'a [SceneObject]) {
        pass.set_pipeline(&self.render_pipeline);
        pass.set_bind_group(0, frame.global_set, &[]);

        for object in objects {
            let Some(splat) = object.geometry.splat() else {
                continue;
            };
            let Some(set) = self.bound_set(object, |b| b.sets.draw) else {
                continue;
            };

            let push = PushConstantData::from_transform(&object.transform);
            pass.set_bind_group(1, set, &[]);
            pass.set_push_constants(RENDER_PUSH_STAGES, 0, bytemuck::bytes_of(&push));
            splat.bind(pass);
            splat.draw(pass);
        }
    }

    fn bound_set(&self, object: &SceneObject, pick: impl Fn(&SplatBindings) -> DescriptorSet) -> Option<&wgpu::BindGroup> {
        if object.geometry.splat().is_none() {
            return None;
        }
        let Some(bindings) = self.splats.get(&object.id()) else {
            trace!("splat object {:?} is not registered", object.id());
            return None;
        };
        self.sets.get(pick(bindings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    use crate::descriptors::{DescriptorResource, DescriptorWrite, LayoutBinding};

    /// Backend that resolves buffers to their ids and can fail the n-th set write
    #[derive(Default)]
    struct CountingBackend {
        writes: Cell<usize>,
        fail_on: Option<usize>,
    }

    impl DescriptorBackend for CountingBackend {
        type Buffer = u32;
        type ImageView = ();
        type Sampler = ();
        type RawLayout = usize;
        type RawSet = Vec<u32>;

        fn create_layout(&self, _label: Option<&str>, bindings: &[LayoutBinding]) -> Result<usize> {
            Ok(bindings.len())
        }

        fn write_set(
            &self,
            _label: Option<&str>,
            _layout: &usize,
            writes: &[DescriptorWrite<'_, Self>],
        ) -> Result<Vec<u32>> {
            let n = self.writes.get();
            self.writes.set(n + 1);
            if self.fail_on == Some(n) {
                return Err(Error::Gpu("device lost".to_string()));
            }
            Ok(writes
                .iter()
                .filter_map(|w| match &w.resource {
                    DescriptorResource::Buffer(info) => Some(*info.buffer),
                    _ => None,
                })
                .collect())
        }
    }

    const RECORDS: u32 = 1;
    const COLORS: u32 = 2;

    fn allocate(sets: &mut SplatSets<CountingBackend>, backend: &CountingBackend) -> Result<SplatSetPair> {
        sets.allocate(
            backend,
            StorageRange {
                buffer: &RECORDS,
                size: 248,
            },
            StorageRange {
                buffer: &COLORS,
                size: 16,
            },
        )
    }

    #[test]
    fn test_sets_resolve_to_bound_buffers() {
        let backend = CountingBackend::default();
        let mut sets = SplatSets::new(&backend, 1024).unwrap();
        assert_eq!(*sets.compute_layout().raw(), 2);
        assert_eq!(*sets.draw_layout().raw(), 1);

        let pair = allocate(&mut sets, &backend).unwrap();
        assert_eq!(sets.get(pair.compute), Some(&vec![RECORDS, COLORS]));
        assert_eq!(sets.get(pair.draw), Some(&vec![COLORS]));
    }

    #[test]
    fn test_pool_holds_max_splat_objects() {
        let backend = CountingBackend::default();
        let mut sets = SplatSets::new(&backend, 1024).unwrap();
        assert_eq!(sets.available_objects(), MAX_SPLAT_OBJECTS);

        for _ in 0..MAX_SPLAT_OBJECTS {
            allocate(&mut sets, &backend).unwrap();
        }
        assert_eq!(sets.available_objects(), 0);

        let result = allocate(&mut sets, &backend);
        assert!(matches!(result, Err(Error::DescriptorPoolExhausted(_))));
    }

    #[test]
    fn test_release_then_allocate_again() {
        let backend = CountingBackend::default();
        let mut sets = SplatSets::new(&backend, 1024).unwrap();
        let pairs: Vec<SplatSetPair> = (0..MAX_SPLAT_OBJECTS)
            .map(|_| allocate(&mut sets, &backend).unwrap())
            .collect();

        sets.release(pairs[3]);
        assert_eq!(sets.available_objects(), 1);
        assert!(sets.get(pairs[3].compute).is_none());
        assert!(sets.get(pairs[3].draw).is_none());

        let pair = allocate(&mut sets, &backend).unwrap();
        assert_eq!(sets.get(pair.draw), Some(&vec![COLORS]));
        assert_eq!(sets.available_objects(), 0);
    }

    #[test]
    fn test_failed_draw_set_rolls_back_compute_set() {
        let backend = CountingBackend {
            fail_on: Some(1),
            ..Default::default()
        };
        let mut sets = SplatSets::new(&backend, 1024).unwrap();

        let result = allocate(&mut sets, &backend);
        assert!(matches!(result, Err(Error::Gpu(_))));
        assert_eq!(backend.writes.get(), 2);
        assert_eq!(sets.available_objects(), MAX_SPLAT_OBJECTS);

        let pair = allocate(&mut sets, &backend).unwrap();
        assert_eq!(sets.get(pair.compute), Some(&vec![RECORDS, COLORS]));
    }

    #[test]
    fn test_oversized_binding_is_an_error() {
        let backend = CountingBackend::default();
        let mut sets = SplatSets::new(&backend, 128).unwrap();

        let result = allocate(&mut sets, &backend);
        match result {
            Err(Error::Gpu(message)) => assert!(message.contains("splat records"), "{}", message),
            other => panic!("expected a binding size error, got {:?}", other),
        }
        assert_eq!(backend.writes.get(), 0);
        assert_eq!(sets.available_objects(), MAX_SPLAT_OBJECTS);
    }
}
