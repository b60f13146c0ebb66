//! Descriptor set layouts, pools and writers
//!
//! A [`DescriptorSetLayout`] declares which resource kind sits at which
//! binding and which shader stages see it. A [`DescriptorPool`] hands out a
//! bounded number of [`DescriptorSet`] handles, and a [`DescriptorWriter`]
//! fills one of them with concrete resources in a single batched update.
//!
//! The native objects behind layouts and sets come from a
//! [`DescriptorBackend`]. `wgpu::Device` is the production backend; wgpu has
//! no native pool, so capacity accounting lives entirely in
//! [`DescriptorPool`] and the backend only creates layouts and bind groups.

use std::collections::BTreeMap;
use std::num::{NonZeroU32, NonZeroU64};

use splatcrate_core::{PoolExhausted, Result};
use tracing::trace;

use crate::device::check_error_scope;

/// Kind of resource a binding holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DescriptorKind {
    UniformBuffer,
    StorageBuffer,
    ReadOnlyStorageBuffer,
    SampledImage,
    Sampler,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResourceCategory {
    Buffer,
    Image,
    Sampler,
}

impl DescriptorKind {
    fn category(self) -> ResourceCategory {
        match self {
            DescriptorKind::UniformBuffer
            | DescriptorKind::StorageBuffer
            | DescriptorKind::ReadOnlyStorageBuffer => ResourceCategory::Buffer,
            DescriptorKind::SampledImage => ResourceCategory::Image,
            DescriptorKind::Sampler => ResourceCategory::Sampler,
        }
    }

    /// wgpu binding type for this kind
    pub fn binding_type(self) -> wgpu::BindingType {
        let buffer = |ty| wgpu::BindingType::Buffer {
            ty,
            has_dynamic_offset: false,
            min_binding_size: None,
        };
        match self {
            DescriptorKind::UniformBuffer => buffer(wgpu::BufferBindingType::Uniform),
            DescriptorKind::StorageBuffer => {
                buffer(wgpu::BufferBindingType::Storage { read_only: false })
            }
            DescriptorKind::ReadOnlyStorageBuffer => {
                buffer(wgpu::BufferBindingType::Storage { read_only: true })
            }
            DescriptorKind::SampledImage => wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            DescriptorKind::Sampler => {
                wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering)
            }
        }
    }
}

/// One entry of a layout's binding table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutBinding {
    pub binding: u32,
    pub kind: DescriptorKind,
    pub stages: wgpu::ShaderStages,
    pub count: u32,
}

/// A buffer range bound to a descriptor
#[derive(Debug)]
pub struct BufferInfo<'a, T> {
    pub buffer: &'a T,
    pub offset: u64,
    pub size: Option<NonZeroU64>,
}

impl<'a, T> BufferInfo<'a, T> {
    /// Bind the whole buffer
    pub fn whole(buffer: &'a T) -> Self {
        Self {
            buffer,
            offset: 0,
            size: None,
        }
    }
}

impl<T> Clone for BufferInfo<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for BufferInfo<'_, T> {}

/// Resource referenced by a pending write
pub enum DescriptorResource<'a, B: DescriptorBackend> {
    Buffer(BufferInfo<'a, B::Buffer>),
    Image(&'a B::ImageView),
    Sampler(&'a B::Sampler),
}

/// A queued `binding -> resource` write
pub struct DescriptorWrite<'a, B: DescriptorBackend> {
    pub binding: u32,
    pub kind: DescriptorKind,
    pub resource: DescriptorResource<'a, B>,
}

/// Creates the native objects behind layouts and descriptor sets.
pub trait DescriptorBackend {
    type Buffer;
    type ImageView;
    type Sampler;
    type RawLayout;
    type RawSet;

    /// Create a native layout from a binding table sorted by binding index
    fn create_layout(&self, label: Option<&str>, bindings: &[LayoutBinding]) -> Result<Self::RawLayout>;

    /// Create the native set for `layout` with every write applied at once
    fn write_set(
        &self,
        label: Option<&str>,
        layout: &Self::RawLayout,
        writes: &[DescriptorWrite<'_, Self>],
    ) -> Result<Self::RawSet>
    where
        Self: Sized;
}

/// Accumulates bindings for a [`DescriptorSetLayout`]
#[derive(Debug, Default)]
pub struct DescriptorSetLayoutBuilder {
    label: Option<String>,
    bindings: BTreeMap<u32, LayoutBinding>,
}

impl DescriptorSetLayoutBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Add a single-descriptor binding.
    ///
    /// # Panics
    ///
    /// Panics if `binding` is already registered.
    pub fn add_binding(self, binding: u32, kind: DescriptorKind, stages: wgpu::ShaderStages) -> Self {
        self.add_binding_array(binding, kind, stages, 1)
    }

    /// Add a binding holding `count` descriptors.
    ///
    /// # Panics
    ///
    /// Panics if `binding` is already registered or `count` is zero.
    pub fn add_binding_array(
        mut self,
        binding: u32,
        kind: DescriptorKind,
        stages: wgpu::ShaderStages,
        count: u32,
    ) -> Self {
        assert!(
            !self.bindings.contains_key(&binding),
            "Binding {} already in use",
            binding
        );
        assert!(count > 0, "Binding {} declares zero descriptors", binding);
        self.bindings.insert(
            binding,
            LayoutBinding {
                binding,
                kind,
                stages,
                count,
            },
        );
        self
    }

    /// Freeze the binding table and create the native layout
    pub fn build<B: DescriptorBackend>(self, backend: &B) -> Result<DescriptorSetLayout<B>> {
        let table: Vec<LayoutBinding> = self.bindings.values().copied().collect();
        let raw = backend.create_layout(self.label.as_deref(), &table)?;

        let mut counts: BTreeMap<DescriptorKind, u32> = BTreeMap::new();
        for binding in &table {
            *counts.entry(binding.kind).or_default() += binding.count;
        }

        Ok(DescriptorSetLayout {
            label: self.label,
            bindings: self.bindings,
            counts: counts.into_iter().collect(),
            raw,
        })
    }
}

/// Immutable binding table plus its native layout
pub struct DescriptorSetLayout<B: DescriptorBackend> {
    label: Option<String>,
    bindings: BTreeMap<u32, LayoutBinding>,
    counts: Vec<(DescriptorKind, u32)>,
    raw: B::RawLayout,
}

impl<B: DescriptorBackend> DescriptorSetLayout<B> {
    /// Native layout, for pipeline layout creation
    pub fn raw(&self) -> &B::RawLayout {
        &self.raw
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    pub(crate) fn binding(&self, binding: u32) -> Option<&LayoutBinding> {
        self.bindings.get(&binding)
    }

    /// Descriptors of each kind one set of this layout consumes
    pub(crate) fn descriptor_counts(&self) -> &[(DescriptorKind, u32)] {
        &self.counts
    }
}

/// Capacity of a [`DescriptorPool`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorPoolConfig {
    max_sets: u32,
    pool_sizes: BTreeMap<DescriptorKind, u32>,
    free_individual: bool,
}

impl Default for DescriptorPoolConfig {
    fn default() -> Self {
        Self {
            max_sets: 1000,
            pool_sizes: BTreeMap::new(),
            free_individual: false,
        }
    }
}

impl DescriptorPoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maximum number of sets allocated at once
    pub fn max_sets(mut self, count: u32) -> Self {
        self.max_sets = count;
        self
    }

    /// Add capacity for `count` descriptors of `kind`
    pub fn pool_size(mut self, kind: DescriptorKind, count: u32) -> Self {
        *self.pool_sizes.entry(kind).or_default() += count;
        self
    }

    /// Allow [`DescriptorPool::free`]
    pub fn free_individual(mut self, enabled: bool) -> Self {
        self.free_individual = enabled;
        self
    }
}

/// Handle to a set allocated from a [`DescriptorPool`].
///
/// Handles are tagged with the pool epoch; after [`DescriptorPool::reset`]
/// they no longer resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorSet {
    index: u32,
    epoch: u32,
}

struct SetEntry<S> {
    counts: Vec<(DescriptorKind, u32)>,
    raw: Option<S>,
}

/// Fixed-capacity descriptor set allocator
pub struct DescriptorPool<B: DescriptorBackend> {
    config: DescriptorPoolConfig,
    epoch: u32,
    entries: Vec<Option<SetEntry<B::RawSet>>>,
    vacant: Vec<u32>,
    live_sets: u32,
    available: BTreeMap<DescriptorKind, u32>,
}

impl<B: DescriptorBackend> DescriptorPool<B> {
    pub fn new(config: DescriptorPoolConfig) -> Self {
        let available = config.pool_sizes.clone();
        Self {
            config,
            epoch: 0,
            entries: Vec::new(),
            vacant: Vec::new(),
            live_sets: 0,
            available,
        }
    }

    pub fn config(&self) -> &DescriptorPoolConfig {
        &self.config
    }

    /// Reserve a set for `layout`.
    ///
    /// Fails without side effects when the set limit or any per-kind limit
    /// would be exceeded. The pool never grows.
    pub fn allocate(&mut self, layout: &DescriptorSetLayout<B>) -> std::result::Result<DescriptorSet, PoolExhausted> {
        if self.live_sets >= self.config.max_sets {
            return Err(PoolExhausted::new(format!(
                "all {} sets are in use",
                self.config.max_sets
            )));
        }

        for &(kind, needed) in layout.descriptor_counts() {
            let available = self.available(kind);
            if available < needed {
                return Err(PoolExhausted::new(format!(
                    "{:?}: {} needed, {} available",
                    kind, needed, available
                )));
            }
        }

        for &(kind, needed) in layout.descriptor_counts() {
            if let Some(available) = self.available.get_mut(&kind) {
                *available -= needed;
            }
        }

        let entry = SetEntry {
            counts: layout.descriptor_counts().to_vec(),
            raw: None,
        };
        let index = match self.vacant.pop() {
            Some(index) => {
                self.entries[index as usize] = Some(entry);
                index
            }
            None => {
                self.entries.push(Some(entry));
                (self.entries.len() - 1) as u32
            }
        };
        self.live_sets += 1;

        trace!("allocated descriptor set {} (epoch {})", index, self.epoch);
        Ok(DescriptorSet {
            index,
            epoch: self.epoch,
        })
    }

    /// Release specific sets and return their capacity.
    ///
    /// # Panics
    ///
    /// Panics if the pool was not created with `free_individual`, or if a
    /// handle is stale or already freed.
    pub fn free(&mut self, sets: &[DescriptorSet]) {
        assert!(
            self.config.free_individual,
            "free() requires a pool created with free_individual"
        );
        for &set in sets {
            assert!(self.is_live(set), "freeing a stale or already freed descriptor set");
            self.release(set);
        }
    }

    /// Invalidate every set allocated so far and restore full capacity
    pub fn reset(&mut self) {
        self.epoch = self.epoch.wrapping_add(1);
        self.entries.clear();
        self.vacant.clear();
        self.live_sets = 0;
        self.available = self.config.pool_sizes.clone();
        trace!("descriptor pool reset (epoch {})", self.epoch);
    }

    /// Native set behind `set`, if it is live and has been written
    pub fn get(&self, set: DescriptorSet) -> Option<&B::RawSet> {
        self.entry(set).and_then(|entry| entry.raw.as_ref())
    }

    /// Whether `set` was allocated in the current epoch and not freed
    pub fn is_live(&self, set: DescriptorSet) -> bool {
        self.entry(set).is_some()
    }

    /// Sets that can still be allocated
    pub fn available_sets(&self) -> u32 {
        self.config.max_sets - self.live_sets
    }

    /// Descriptors of `kind` that can still be allocated
    pub fn available(&self, kind: DescriptorKind) -> u32 {
        self.available.get(&kind).copied().unwrap_or(0)
    }

    fn entry(&self, set: DescriptorSet) -> Option<&SetEntry<B::RawSet>> {
        if set.epoch != self.epoch {
            return None;
        }
        self.entries.get(set.index as usize).and_then(Option::as_ref)
    }

    fn release(&mut self, set: DescriptorSet) {
        if let Some(entry) = self.entries[set.index as usize].take() {
            for (kind, count) in entry.counts {
                *self.available.entry(kind).or_default() += count;
            }
            self.vacant.push(set.index);
            self.live_sets -= 1;
        }
    }

    pub(crate) fn store(&mut self, set: DescriptorSet, raw: B::RawSet) {
        assert!(self.is_live(set), "writing to a stale descriptor set");
        if let Some(Some(entry)) = self.entries.get_mut(set.index as usize) {
            entry.raw = Some(raw);
        }
    }

    /// Undo an allocation whose first write failed
    pub(crate) fn discard_unwritten(&mut self, set: DescriptorSet) {
        if self.entry(set).is_some_and(|entry| entry.raw.is_none()) {
            self.release(set);
        }
    }
}

/// Queues writes against one layout and commits them into one set.
///
/// Queued writes are kept after a commit, so building twice writes the same
/// bindings into a second set. Use one writer per set.
pub struct DescriptorWriter<'a, B: DescriptorBackend> {
    layout: &'a DescriptorSetLayout<B>,
    pool: &'a mut DescriptorPool<B>,
    writes: Vec<DescriptorWrite<'a, B>>,
}

impl<'a, B: DescriptorBackend> DescriptorWriter<'a, B> {
    pub fn new(layout: &'a DescriptorSetLayout<B>, pool: &'a mut DescriptorPool<B>) -> Self {
        Self {
            layout,
            pool,
            writes: Vec::new(),
        }
    }

    /// Queue a buffer write.
    ///
    /// # Panics
    ///
    /// Panics if `binding` is not in the layout, is an array binding, or does
    /// not hold a buffer.
    pub fn write_buffer(mut self, binding: u32, info: BufferInfo<'a, B::Buffer>) -> Self {
        self.queue(binding, ResourceCategory::Buffer, DescriptorResource::Buffer(info));
        self
    }

    /// Queue a sampled image write. Panics like [`Self::write_buffer`].
    pub fn write_image(mut self, binding: u32, view: &'a B::ImageView) -> Self {
        self.queue(binding, ResourceCategory::Image, DescriptorResource::Image(view));
        self
    }

    /// Queue a sampler write. Panics like [`Self::write_buffer`].
    pub fn write_sampler(mut self, binding: u32, sampler: &'a B::Sampler) -> Self {
        self.queue(binding, ResourceCategory::Sampler, DescriptorResource::Sampler(sampler));
        self
    }

    fn queue(&mut self, binding: u32, category: ResourceCategory, resource: DescriptorResource<'a, B>) {
        let description = self
            .layout
            .binding(binding)
            .unwrap_or_else(|| panic!("Layout does not contain binding {}", binding));
        assert!(
            description.count == 1,
            "Binding {} expects {} descriptors, but a single descriptor was written",
            binding,
            description.count
        );
        assert!(
            description.kind.category() == category,
            "Binding {} holds {:?}, which does not match the written resource",
            binding,
            description.kind
        );

        self.writes.push(DescriptorWrite {
            binding,
            kind: description.kind,
            resource,
        });
    }

    /// Allocate a fresh set and commit every queued write into it.
    ///
    /// Pool exhaustion comes back as `Error::DescriptorPoolExhausted`.
    pub fn build(&mut self, backend: &B) -> Result<DescriptorSet> {
        let set = self.pool.allocate(self.layout)?;
        if let Err(e) = self.overwrite(backend, set) {
            self.pool.discard_unwritten(set);
            return Err(e);
        }
        Ok(set)
    }

    /// Commit the queued writes into an already allocated set
    pub fn overwrite(&mut self, backend: &B, set: DescriptorSet) -> Result<()> {
        assert!(self.pool.is_live(set), "overwriting a stale descriptor set");
        let raw = backend.write_set(self.layout.label(), self.layout.raw(), &self.writes)?;
        self.pool.store(set, raw);
        Ok(())
    }
}

impl DescriptorBackend for wgpu::Device {
    type Buffer = wgpu::Buffer;
    type ImageView = wgpu::TextureView;
    type Sampler = wgpu::Sampler;
    type RawLayout = wgpu::BindGroupLayout;
    type RawSet = wgpu::BindGroup;

    fn create_layout(&self, label: Option<&str>, bindings: &[LayoutBinding]) -> Result<wgpu::BindGroupLayout> {
        let entries: Vec<wgpu::BindGroupLayoutEntry> = bindings
            .iter()
            .map(|b| wgpu::BindGroupLayoutEntry {
                binding: b.binding,
                visibility: b.stages,
                ty: b.kind.binding_type(),
                count: if b.count > 1 { NonZeroU32::new(b.count) } else { None },
            })
            .collect();

        self.push_error_scope(wgpu::ErrorFilter::Validation);
        let layout = self.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label,
            entries: &entries,
        });
        check_error_scope(self, "create descriptor set layout")?;
        Ok(layout)
    }

    fn write_set(
        &self,
        label: Option<&str>,
        layout: &wgpu::BindGroupLayout,
        writes: &[DescriptorWrite<'_, Self>],
    ) -> Result<wgpu::BindGroup> {
        let entries: Vec<wgpu::BindGroupEntry> = writes
            .iter()
            .map(|write| wgpu::BindGroupEntry {
                binding: write.binding,
                resource: match &write.resource {
                    DescriptorResource::Buffer(info) => {
                        wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                            buffer: info.buffer,
                            offset: info.offset,
                            size: info.size,
                        })
                    }
                    DescriptorResource::Image(view) => wgpu::BindingResource::TextureView(view),
                    DescriptorResource::Sampler(sampler) => wgpu::BindingResource::Sampler(sampler),
                },
            })
            .collect();

        self.push_error_scope(wgpu::ErrorFilter::Validation);
        let set = self.create_bind_group(&wgpu::BindGroupDescriptor {
            label,
            layout,
            entries: &entries,
        });
        check_error_scope(self, "write descriptor set")?;
        Ok(set)
    }
}
