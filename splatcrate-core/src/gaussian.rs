//! Gaussian splat record layout

use bytemuck::{Pod, Zeroable};

/// Number of spherical-harmonic floats per record (16 coefficients x RGB).
pub const SH_FLOAT_COUNT: usize = 48;

/// Number of `f32` values in one record.
pub const RECORD_FLOAT_COUNT: usize = 3 + 3 + SH_FLOAT_COUNT + 1 + 3 + 4;

/// One Gaussian splat as stored on disk and on the GPU.
///
/// The layout is `#[repr(C)]` with only `f32` fields, so it has no padding and
/// matches the binary body of the PLY files this crate reads byte for byte.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct GaussianRecord {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub sh: [f32; SH_FLOAT_COUNT],
    pub opacity: f32,
    pub scale: [f32; 3],
    pub rotation: [f32; 4],
}

impl GaussianRecord {
    /// Size of one record in bytes.
    pub const SIZE: usize = std::mem::size_of::<GaussianRecord>();

    /// Create a record with zeroed SH coefficients and an identity rotation
    pub fn new(position: [f32; 3], scale: [f32; 3], opacity: f32) -> Self {
        Self {
            position,
            normal: [0.0; 3],
            sh: [0.0; SH_FLOAT_COUNT],
            opacity,
            scale,
            rotation: [1.0, 0.0, 0.0, 0.0],
        }
    }

    /// DC (degree zero) color term for each channel
    pub fn sh_dc(&self) -> [f32; 3] {
        [self.sh[0], self.sh[1], self.sh[2]]
    }
}

impl Default for GaussianRecord {
    fn default() -> Self {
        Self::new([0.0; 3], [1.0; 3], 1.0)
    }
}

// Equality ignores SH coefficients.
impl PartialEq for GaussianRecord {
    fn eq(&self, other: &Self) -> bool {
        self.position == other.position
            && self.scale == other.scale
            && self.normal == other.normal
            && self.rotation == other.rotation
            && self.opacity == other.opacity
    }
}
