//! Camera utilities for 3D visualization
//!
//! The camera uses a left-handed view space: +X right, +Y up, +Z forward.
//! Projections map depth to the 0..1 range wgpu expects.

use nalgebra::{Matrix4, Vector3};

/// View and projection matrices
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    view: Matrix4<f32>,
    inverse_view: Matrix4<f32>,
    projection: Matrix4<f32>,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            view: Matrix4::identity(),
            inverse_view: Matrix4::identity(),
            projection: Matrix4::identity(),
        }
    }
}

impl Camera {
    pub fn new() -> Self {
        Self::default()
    }

    /// Perspective projection with a vertical field of view in radians
    pub fn set_perspective_projection(&mut self, fovy: f32, aspect: f32, near: f32, far: f32) {
        assert!(aspect.abs() > f32::EPSILON, "Aspect ratio must be non-zero");
        let tan_half_fovy = (fovy / 2.0).tan();

        self.projection = Matrix4::new(
            1.0 / (aspect * tan_half_fovy), 0.0, 0.0, 0.0,
            0.0, 1.0 / tan_half_fovy, 0.0, 0.0,
            0.0, 0.0, far / (far - near), -(far * near) / (far - near),
            0.0, 0.0, 1.0, 0.0,
        );
    }

    /// Orthographic projection of the given box
    pub fn set_orthographic_projection(&mut self, left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) {
        self.projection = Matrix4::new(
            2.0 / (right - left), 0.0, 0.0, -(right + left) / (right - left),
            0.0, 2.0 / (top - bottom), 0.0, -(top + bottom) / (top - bottom),
            0.0, 0.0, 1.0 / (far - near), -near / (far - near),
            0.0, 0.0, 0.0, 1.0,
        );
    }

    /// Look from `position` towards `target`
    pub fn set_view_target(&mut self, position: Vector3<f32>, target: Vector3<f32>, up: Vector3<f32>) {
        self.set_view_direction(position, target - position, up);
    }

    /// Look from `position` along `direction`
    pub fn set_view_direction(&mut self, position: Vector3<f32>, direction: Vector3<f32>, up: Vector3<f32>) {
        let w = direction.normalize();
        let u = up.cross(&w).normalize();
        let v = w.cross(&u);
        self.set_basis(position, u, v, w);
    }

    /// View from `position` with Tait-Bryan `rotation` applied in Y, X, Z order
    pub fn set_view_yxz(&mut self, position: Vector3<f32>, rotation: Vector3<f32>) {
        let (s1, c1) = rotation.y.sin_cos();
        let (s2, c2) = rotation.x.sin_cos();
        let (s3, c3) = rotation.z.sin_cos();

        let u = Vector3::new(c1 * c3 + s1 * s2 * s3, c2 * s3, c1 * s2 * s3 - c3 * s1);
        let v = Vector3::new(c3 * s1 * s2 - c1 * s3, c2 * c3, c1 * c3 * s2 + s1 * s3);
        let w = Vector3::new(c2 * s1, -s2, c1 * c2);
        self.set_basis(position, u, v, w);
    }

    fn set_basis(&mut self, position: Vector3<f32>, u: Vector3<f32>, v: Vector3<f32>, w: Vector3<f32>) {
        self.view = Matrix4::new(
            u.x, u.y, u.z, -u.dot(&position),
            v.x, v.y, v.z, -v.dot(&position),
            w.x, w.y, w.z, -w.dot(&position),
            0.0, 0.0, 0.0, 1.0,
        );
        self.inverse_view = Matrix4::new(
            u.x, v.x, w.x, position.x,
            u.y, v.y, w.y, position.y,
            u.z, v.z, w.z, position.z,
            0.0, 0.0, 0.0, 1.0,
        );
    }

    pub fn view(&self) -> &Matrix4<f32> {
        &self.view
    }

    pub fn inverse_view(&self) -> &Matrix4<f32> {
        &self.inverse_view
    }

    pub fn projection(&self) -> &Matrix4<f32> {
        &self.projection
    }

    pub fn projection_view(&self) -> Matrix4<f32> {
        self.projection * self.view
    }

    /// Camera position in world space
    pub fn position(&self) -> Vector3<f32> {
        self.inverse_view.fixed_view::<3, 1>(0, 3).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector4;

    #[test]
    fn test_perspective_depth_range() {
        let mut camera = Camera::new();
        camera.set_perspective_projection(50f32.to_radians(), 1.5, 0.1, 10.0);

        let near = camera.projection() * Vector4::new(0.0, 0.0, 0.1, 1.0);
        let far = camera.projection() * Vector4::new(0.0, 0.0, 10.0, 1.0);
        assert_relative_eq!(near.z / near.w, 0.0, epsilon = 1e-6);
        assert_relative_eq!(far.z / far.w, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_view_yxz_identity_rotation_translates() {
        let mut camera = Camera::new();
        let position = Vector3::new(1.0, -2.0, 3.0);
        camera.set_view_yxz(position, Vector3::zeros());

        let p = camera.view() * Vector4::new(1.0, -2.0, 4.0, 1.0);
        assert_relative_eq!(p, Vector4::new(0.0, 0.0, 1.0, 1.0), epsilon = 1e-6);
        assert_relative_eq!(camera.position(), position, epsilon = 1e-6);
    }

    #[test]
    fn test_view_and_inverse_agree() {
        let mut camera = Camera::new();
        camera.set_view_yxz(Vector3::new(0.5, 1.0, -2.0), Vector3::new(0.3, 1.1, -0.2));
        assert_relative_eq!(
            camera.view() * camera.inverse_view(),
            Matrix4::identity(),
            epsilon = 1e-5
        );
    }

    #[test]
    fn test_view_target_looks_forward() {
        let mut camera = Camera::new();
        camera.set_view_target(Vector3::zeros(), Vector3::new(0.0, 0.0, 5.0), Vector3::new(0.0, 1.0, 0.0));
        let p = camera.view() * Vector4::new(0.0, 0.0, 5.0, 1.0);
        assert_relative_eq!(p.z, 5.0, epsilon = 1e-6);
        assert_relative_eq!(p.x, 0.0, epsilon = 1e-6);
    }
}
