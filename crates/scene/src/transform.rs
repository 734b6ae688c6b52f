//! Object placement in world space.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Quat, Vec3};

/// Translation, rotation and scale of a drawable.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    /// Spin around the world Y axis by `radians`.
    pub fn rotate_y(&mut self, radians: f32) {
        self.rotation = (Quat::from_rotation_y(radians) * self.rotation).normalize();
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    /// Inverse transpose of [`Transform::matrix`].
    ///
    /// Falls back to identity for degenerate (zero scale) transforms.
    pub fn normal_matrix(&self) -> Mat4 {
        let model = self.matrix();
        if model.determinant().abs() < 1e-6 {
            Mat4::IDENTITY
        } else {
            model.inverse().transpose()
        }
    }

    pub fn push_constants(&self) -> ModelPushConstants {
        ModelPushConstants {
            model: self.matrix(),
            normal: self.normal_matrix(),
        }
    }
}

/// Per-draw push constant block: model and normal matrices (128 bytes).
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct ModelPushConstants {
    pub model: Mat4,
    pub normal: Mat4,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_identity() {
        let t = Transform::default();
        assert_eq!(t.matrix(), Mat4::IDENTITY);
        assert_eq!(t.normal_matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn test_matrix_applies_scale_then_translation() {
        let t = Transform::new()
            .with_position(Vec3::new(10.0, 0.0, 0.0))
            .with_scale(Vec3::splat(2.0));
        let p = t.matrix().transform_point3(Vec3::X);
        assert!(p.abs_diff_eq(Vec3::new(12.0, 0.0, 0.0), 1e-5));
    }

    #[test]
    fn test_normal_matrix_with_non_uniform_scale() {
        let t = Transform::new().with_scale(Vec3::new(1.0, 2.0, 1.0));
        assert_eq!(t.normal_matrix(), t.matrix().inverse().transpose());
    }

    #[test]
    fn test_zero_scale_falls_back_to_identity() {
        let t = Transform::new().with_scale(Vec3::ZERO);
        assert_eq!(t.normal_matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn test_rotate_y() {
        let mut t = Transform::new();
        t.rotate_y(std::f32::consts::FRAC_PI_2);
        let p = t.matrix().transform_point3(Vec3::X);
        assert!(p.abs_diff_eq(Vec3::new(0.0, 0.0, -1.0), 1e-5));
    }

    #[test]
    fn test_push_constant_size() {
        assert_eq!(size_of::<ModelPushConstants>(), 128);
    }
}
