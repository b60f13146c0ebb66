//! Command line configuration

use std::path::PathBuf;

use clap::Parser;
use splatcrate_gpu::shaders::{GAUSSIAN_SHADER, PREPROCESS_SHADER};
use splatcrate_gpu::ShaderBlob;

#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "splatcrate-viewer")]
#[command(about = "Render triangle meshes and Gaussian splat clouds")]
pub struct ViewerConfig {
    /// Gaussian splat cloud to load (binary PLY)
    #[arg(long)]
    pub ply: Option<PathBuf>,

    /// Wavefront OBJ mesh to load instead of the built-in cube
    #[arg(long)]
    pub mesh: Option<PathBuf>,

    /// Initial window width
    #[arg(long, default_value_t = 1280)]
    pub width: u32,

    /// Initial window height
    #[arg(long, default_value_t = 720)]
    pub height: u32,

    /// Frames the CPU may record ahead of the GPU
    #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(u32).range(1..))]
    pub frames_in_flight: u32,

    /// Splat render shader (WGSL, or SPIR-V when the file ends in .spv)
    #[arg(long)]
    pub splat_shader: Option<PathBuf>,

    /// Splat preprocessing compute shader
    #[arg(long)]
    pub preprocess_shader: Option<PathBuf>,
}

impl ViewerConfig {
    pub fn splat_shader(&self) -> ShaderBlob {
        ShaderBlob::from_override(self.splat_shader.clone(), GAUSSIAN_SHADER)
    }

    pub fn preprocess_shader(&self) -> ShaderBlob {
        ShaderBlob::from_override(self.preprocess_shader.clone(), PREPROCESS_SHADER)
    }
}
