//! Object transforms

use nalgebra::{Matrix3, Matrix4, Rotation3, Vector3};
use serde::{Deserialize, Serialize};

/// Translation, scale and Euler rotation of a render object.
///
/// Rotation is in radians and applied as Tait-Bryan angles in Y, X, Z order,
/// so `rotation.y` is yaw, `rotation.x` is pitch and `rotation.z` is roll.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransformComponent {
    pub translation: Vector3<f32>,
    pub scale: Vector3<f32>,
    pub rotation: Vector3<f32>,
}

impl TransformComponent {
    /// Create an identity transform
    pub fn identity() -> Self {
        Self {
            translation: Vector3::zeros(),
            scale: Vector3::new(1.0, 1.0, 1.0),
            rotation: Vector3::zeros(),
        }
    }

    /// Rotation part only
    pub fn rotation_matrix(&self) -> Matrix3<f32> {
        let yaw = Rotation3::from_axis_angle(&Vector3::y_axis(), self.rotation.y);
        let pitch = Rotation3::from_axis_angle(&Vector3::x_axis(), self.rotation.x);
        let roll = Rotation3::from_axis_angle(&Vector3::z_axis(), self.rotation.z);
        (yaw * pitch * roll).into_inner()
    }

    /// Model matrix: translate * rotate(Y, X, Z) * scale
    pub fn mat4(&self) -> Matrix4<f32> {
        let mut linear = self.rotation_matrix();
        for (mut column, s) in linear.column_iter_mut().zip(self.scale.iter()) {
            column *= *s;
        }
        let mut m = linear.to_homogeneous();
        m.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.translation);
        m
    }

    /// Matrix for transforming normals: rotate * scale^-1
    pub fn normal_matrix(&self) -> Matrix3<f32> {
        let mut linear = self.rotation_matrix();
        for (mut column, s) in linear.column_iter_mut().zip(self.scale.iter()) {
            column /= *s;
        }
        linear
    }
}

impl Default for TransformComponent {
    fn default() -> Self {
        Self::identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Point3;

    #[test]
    fn test_identity_is_identity() {
        let t = TransformComponent::identity();
        assert_relative_eq!(t.mat4(), Matrix4::identity());
        assert_relative_eq!(t.normal_matrix(), Matrix3::identity());
    }

    #[test]
    fn test_mat4_matches_trs_composition() {
        let t = TransformComponent {
            translation: Vector3::new(-0.5, 0.5, 2.5),
            scale: Vector3::new(3.0, 1.5, 3.0),
            rotation: Vector3::new(0.3, -1.2, 0.7),
        };

        let expected = Matrix4::new_translation(&t.translation)
            * Rotation3::from_axis_angle(&Vector3::y_axis(), -1.2).to_homogeneous()
            * Rotation3::from_axis_angle(&Vector3::x_axis(), 0.3).to_homogeneous()
            * Rotation3::from_axis_angle(&Vector3::z_axis(), 0.7).to_homogeneous()
            * Matrix4::new_nonuniform_scaling(&t.scale);

        assert_relative_eq!(t.mat4(), expected, epsilon = 1e-5);

        let p = t.mat4().transform_point(&Point3::new(0.0, 0.0, 0.0));
        assert_relative_eq!(p.coords, t.translation, epsilon = 1e-6);
    }

    #[test]
    fn test_normal_matrix_is_inverse_transpose() {
        let t = TransformComponent {
            translation: Vector3::new(1.0, 2.0, 3.0),
            scale: Vector3::new(2.0, 0.5, 4.0),
            rotation: Vector3::new(0.1, 0.2, 0.3),
        };

        let upper = t.mat4().fixed_view::<3, 3>(0, 0).into_owned();
        let expected = upper.try_inverse().unwrap().transpose();
        assert_relative_eq!(t.normal_matrix(), expected, epsilon = 1e-5);
    }
}
