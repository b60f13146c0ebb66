//! Per-geometry-kind draw orchestration

pub mod gaussian_render;
pub mod simple_render;

pub use gaussian_render::{
    GaussianRenderSystem, SplatSetPair, SplatSets, StorageRange, MAX_SPLAT_OBJECTS, PREPROCESS_WORKGROUPS,
    PREPROCESS_WORKGROUP_SIZE,
};
pub use simple_render::SimpleRenderSystem;
