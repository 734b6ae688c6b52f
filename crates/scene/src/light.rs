//! Directional shadow light and lamp instances.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

use crate::camera::flip_clip_y;

/// A directional light casting an orthographic shadow.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DirectionalLight {
    pub position: Vec3,
    pub target: Vec3,
    pub color: Vec4,
    /// Half width and half height of the orthographic volume.
    pub half_extent: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            position: Vec3::splat(25.0),
            target: Vec3::ZERO,
            color: Vec4::ONE,
            half_extent: 80.0,
            near: 0.03,
            far: 500.0,
        }
    }
}

impl DirectionalLight {
    /// Unit vector pointing from the light towards its target.
    pub fn direction(&self) -> Vec3 {
        (self.target - self.position).normalize_or(Vec3::NEG_Y)
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, Vec3::Y)
    }

    /// Y-flipped orthographic projection with a [0, 1] depth range.
    pub fn projection_matrix(&self) -> Mat4 {
        let h = self.half_extent;
        flip_clip_y(Mat4::orthographic_rh(-h, h, -h, h, self.near, self.far))
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    pub fn uniform(&self) -> LightUniform {
        LightUniform {
            view_projection: self.view_projection(),
            direction: self.direction().extend(0.0),
            color: self.color,
        }
    }
}

/// GPU layout of the light uniform (std140).
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct LightUniform {
    pub view_projection: Mat4,
    pub direction: Vec4,
    pub color: Vec4,
}

/// One lamp in the instance storage buffer (std430).
///
/// The color is stored as a `vec4` so the Rust and GLSL strides agree.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct LampInstance {
    pub model: Mat4,
    pub color: Vec4,
}

impl LampInstance {
    pub fn new(model: Mat4, color: Vec3) -> Self {
        Self {
            model,
            color: color.extend(1.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_light_projection_is_flipped() {
        let light = DirectionalLight::default();
        let unflipped = Mat4::orthographic_rh(-80.0, 80.0, -80.0, 80.0, 0.03, 500.0);
        assert_eq!(light.projection_matrix().y_axis.y, -unflipped.y_axis.y);
    }

    #[test]
    fn test_origin_lands_inside_light_volume() {
        let light = DirectionalLight::default();
        let clip = light.view_projection() * Vec4::new(0.0, 0.0, 0.0, 1.0);
        let ndc = clip.truncate() / clip.w;
        assert!(ndc.x.abs() < 1e-4 && ndc.y.abs() < 1e-4);
        assert!((0.0..=1.0).contains(&ndc.z));
    }

    #[test]
    fn test_direction_points_at_target() {
        let light = DirectionalLight::default();
        let expected = Vec3::splat(-1.0).normalize();
        assert!(light.direction().abs_diff_eq(expected, 1e-6));
    }

    #[test]
    fn test_gpu_layouts() {
        assert_eq!(size_of::<LampInstance>(), 80);
        assert_eq!(size_of::<LightUniform>(), 96);
        let lamp = LampInstance::new(Mat4::IDENTITY, Vec3::new(0.9, 0.9, 0.9));
        assert_eq!(lamp.color.w, 1.0);
    }
}
