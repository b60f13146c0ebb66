//! Per-frame and per-draw shader data

use bytemuck::{Pod, Zeroable};
use nalgebra::{Matrix4, Vector3};
use splatcrate_core::TransformComponent;

/// Uniform block shared by every draw in a frame, one buffer per frame slot
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct GlobalUbo {
    pub projection_view: [[f32; 4]; 4],
    pub light_direction: [f32; 4],
    pub camera_position: [f32; 4],
}

impl GlobalUbo {
    pub fn new(projection_view: Matrix4<f32>, camera_position: Vector3<f32>) -> Self {
        let light = Vector3::new(1.0f32, -3.0, -1.0).normalize();
        Self {
            projection_view: projection_view.into(),
            light_direction: [light.x, light.y, light.z, 0.0],
            camera_position: [camera_position.x, camera_position.y, camera_position.z, 1.0],
        }
    }
}

impl Default for GlobalUbo {
    fn default() -> Self {
        Self::new(Matrix4::identity(), Vector3::zeros())
    }
}

/// Push constant block for one draw: model and normal matrix
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct PushConstantData {
    pub model: [[f32; 4]; 4],
    pub normal: [[f32; 4]; 4],
}

impl PushConstantData {
    pub fn from_transform(transform: &TransformComponent) -> Self {
        Self {
            model: transform.mat4().into(),
            normal: transform.normal_matrix().to_homogeneous().into(),
        }
    }
}

/// What the render systems see of the frame being recorded
pub struct FrameInfo<'a> {
    pub frame_index: usize,
    pub frame_time: f32,
    pub global_set: &'a wgpu::BindGroup,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::PUSH_CONSTANT_SIZE;
    use approx::assert_relative_eq;

    #[test]
    fn test_push_constant_block_size() {
        assert_eq!(std::mem::size_of::<PushConstantData>() as u32, PUSH_CONSTANT_SIZE);
    }

    #[test]
    fn test_ubo_is_16_byte_aligned() {
        assert_eq!(std::mem::size_of::<GlobalUbo>() % 16, 0);
    }

    #[test]
    fn test_push_constants_from_transform() {
        let mut transform = TransformComponent::identity();
        transform.translation = Vector3::new(1.0, 2.0, 3.0);
        let push = PushConstantData::from_transform(&transform);

        // Column-major: translation lives in the last column
        assert_relative_eq!(push.model[3][0], 1.0);
        assert_relative_eq!(push.model[3][1], 2.0);
        assert_relative_eq!(push.model[3][2], 3.0);
        assert_relative_eq!(push.normal[3][3], 1.0);
    }

    #[test]
    fn test_light_direction_is_normalized() {
        let ubo = GlobalUbo::default();
        let [x, y, z, w] = ubo.light_direction;
        assert_relative_eq!((x * x + y * y + z * z).sqrt(), 1.0, epsilon = 1e-6);
        assert_eq!(w, 0.0);
    }
}
