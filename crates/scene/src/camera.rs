//! Cameras driven by the per-frame input snapshot.
//!
//! Two variants share the [`Camera`] trait:
//!
//! - [`FpsCamera`] keeps absolute pitch/yaw in degrees and clamps pitch to
//!   ±[`MAX_PITCH_DEG`] on every rotation.
//! - [`FreeCamera`] accumulates a unit quaternion and never clamps.
//!
//! Both scale raw cursor deltas by the configured sensitivity and return a
//! projection with the clip-space Y axis negated for Vulkan.

use glam::{Mat4, Quat, Vec3};

use vkdemo_core::CameraConfig;
use vkdemo_platform::{CommandMask, FrameInput, InputMode};

/// Pitch limit of the FPS camera, in degrees.
pub const MAX_PITCH_DEG: f32 = 89.0;

/// Negate the clip-space Y scale of a projection matrix.
///
/// Vulkan's framebuffer Y axis points down; without this the image is
/// vertically flipped.
#[inline]
pub fn flip_clip_y(mut projection: Mat4) -> Mat4 {
    projection.y_axis.y *= -1.0;
    projection
}

/// Perspective projection parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Projection {
    pub fov_y_deg: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Projection {
    pub fn from_config(config: &CameraConfig) -> Self {
        Self {
            fov_y_deg: config.fov_deg,
            aspect: 16.0 / 9.0,
            near: config.near,
            far: config.far,
        }
    }

    /// Y-flipped perspective matrix with a [0, 1] depth range.
    pub fn matrix(&self) -> Mat4 {
        flip_clip_y(Mat4::perspective_rh(
            self.fov_y_deg.to_radians(),
            self.aspect,
            self.near,
            self.far,
        ))
    }
}

/// Common camera capabilities.
pub trait Camera {
    /// World-space translation requested by the movement bits of `commands`.
    fn process_input(&self, commands: CommandMask) -> Vec3;

    fn move_by(&mut self, delta: Vec3);

    /// Apply a raw rotation delta: `x` is pitch, `y` is yaw.
    fn rotate(&mut self, delta: Vec3);

    fn view_matrix(&self) -> Mat4;

    fn projection(&self) -> &Projection;

    fn projection_mut(&mut self) -> &mut Projection;

    fn position(&self) -> Vec3;

    fn forward(&self) -> Vec3;

    fn up(&self) -> Vec3;

    fn right(&self) -> Vec3;

    /// Y-flipped perspective matrix.
    fn projection_matrix(&self) -> Mat4 {
        self.projection().matrix()
    }

    fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    fn set_aspect(&mut self, aspect: f32) {
        if aspect.is_finite() && aspect > 0.0 {
            self.projection_mut().aspect = aspect;
        }
    }

    /// Move and rotate from one frame of input. Does nothing in edit mode.
    fn apply_frame_input(&mut self, input: &FrameInput) {
        if input.mode != InputMode::Play {
            return;
        }
        let delta = self.process_input(input.commands);
        self.move_by(delta);
        let (dx, dy) = input.cursor_delta;
        if dx != 0.0 || dy != 0.0 {
            self.rotate(Vec3::new(-dy, dx, 0.0));
        }
    }
}

fn translation(commands: CommandMask, forward: Vec3, right: Vec3, speed: f32) -> Vec3 {
    let mut delta = Vec3::ZERO;
    if commands.contains(CommandMask::FORWARD) {
        delta += forward * speed;
    }
    if commands.contains(CommandMask::BACKWARD) {
        delta -= forward * speed;
    }
    if commands.contains(CommandMask::LEFT) {
        delta -= right * speed;
    }
    if commands.contains(CommandMask::RIGHT) {
        delta += right * speed;
    }
    delta
}

/// Euler-angle camera with clamped pitch.
#[derive(Clone, Debug)]
pub struct FpsCamera {
    position: Vec3,
    pitch_deg: f32,
    yaw_deg: f32,
    forward: Vec3,
    right: Vec3,
    up: Vec3,
    /// Invert pitch input.
    pub flip_y: bool,
    pub sensitivity: f32,
    pub move_speed: f32,
    projection: Projection,
}

impl Default for FpsCamera {
    fn default() -> Self {
        Self::from_config(&CameraConfig::default())
    }
}

impl FpsCamera {
    pub fn from_config(config: &CameraConfig) -> Self {
        let mut camera = Self {
            position: Vec3::new(0.0, 0.0, -20.0),
            pitch_deg: 0.0,
            yaw_deg: 0.0,
            forward: Vec3::Z,
            right: Vec3::X,
            up: Vec3::Y,
            flip_y: false,
            sensitivity: config.cursor_sensitivity,
            move_speed: config.move_speed,
            projection: Projection::from_config(config),
        };
        camera.update_basis();
        camera
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    #[inline]
    pub fn pitch_deg(&self) -> f32 {
        self.pitch_deg
    }

    #[inline]
    pub fn yaw_deg(&self) -> f32 {
        self.yaw_deg
    }

    fn update_basis(&mut self) {
        let (pitch, yaw) = (self.pitch_deg.to_radians(), self.yaw_deg.to_radians());
        self.forward = Vec3::new(yaw.sin() * pitch.cos(), pitch.sin(), yaw.cos() * pitch.cos())
            .normalize();
        self.right = self.forward.cross(Vec3::Y).normalize();
        self.up = self.right.cross(self.forward).normalize();
    }
}

impl Camera for FpsCamera {
    fn process_input(&self, commands: CommandMask) -> Vec3 {
        translation(commands, self.forward, self.right, self.move_speed)
    }

    fn move_by(&mut self, delta: Vec3) {
        self.position += delta;
    }

    fn rotate(&mut self, delta: Vec3) {
        let mut delta = delta * self.sensitivity;
        if self.flip_y {
            delta.x = -delta.x;
        }
        self.pitch_deg = (self.pitch_deg + delta.x).clamp(-MAX_PITCH_DEG, MAX_PITCH_DEG);
        self.yaw_deg += delta.y;
        self.update_basis();
    }

    fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.forward, self.up)
    }

    fn projection(&self) -> &Projection {
        &self.projection
    }

    fn projection_mut(&mut self) -> &mut Projection {
        &mut self.projection
    }

    fn position(&self) -> Vec3 {
        self.position
    }

    fn forward(&self) -> Vec3 {
        self.forward
    }

    fn up(&self) -> Vec3 {
        self.up
    }

    fn right(&self) -> Vec3 {
        self.right
    }
}

/// Quaternion camera without pitch limits.
#[derive(Clone, Debug)]
pub struct FreeCamera {
    position: Vec3,
    rotation: Quat,
    pub flip_y: bool,
    pub sensitivity: f32,
    pub move_speed: f32,
    projection: Projection,
}

impl Default for FreeCamera {
    fn default() -> Self {
        Self::from_config(&CameraConfig::default())
    }
}

impl FreeCamera {
    pub fn from_config(config: &CameraConfig) -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            flip_y: true,
            sensitivity: config.cursor_sensitivity,
            move_speed: config.move_speed,
            projection: Projection::from_config(config),
        }
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    #[inline]
    pub fn rotation(&self) -> Quat {
        self.rotation
    }
}

impl Camera for FreeCamera {
    fn process_input(&self, commands: CommandMask) -> Vec3 {
        translation(commands, self.forward(), self.right(), self.move_speed)
    }

    fn move_by(&mut self, delta: Vec3) {
        self.position += delta;
    }

    fn rotate(&mut self, delta: Vec3) {
        let mut delta = delta * self.sensitivity;
        if self.flip_y {
            delta.x = -delta.x;
        }
        let pitch = Quat::from_axis_angle(Vec3::X, delta.x.to_radians());
        let yaw = Quat::from_axis_angle(Vec3::Y, delta.y.to_radians());
        // Renormalize so drift never accumulates into scale.
        self.rotation = (self.rotation * pitch * yaw).normalize();
    }

    fn view_matrix(&self) -> Mat4 {
        let forward = self.forward();
        Mat4::look_at_rh(self.position, self.position + forward, self.up())
    }

    fn projection(&self) -> &Projection {
        &self.projection
    }

    fn projection_mut(&mut self) -> &mut Projection {
        &mut self.projection
    }

    fn position(&self) -> Vec3 {
        self.position
    }

    fn forward(&self) -> Vec3 {
        self.rotation * Vec3::Z
    }

    fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    fn right(&self) -> Vec3 {
        self.rotation * Vec3::X
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-5;

    fn config() -> CameraConfig {
        CameraConfig {
            cursor_sensitivity: 1.0,
            ..CameraConfig::default()
        }
    }

    #[test]
    fn test_fps_pitch_stays_clamped() {
        let mut camera = FpsCamera::from_config(&config());
        // Deterministic pseudo-random walk with large steps in both directions.
        let mut seed = 0x2545_f491_u32;
        for _ in 0..2000 {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            let step = (seed % 721) as f32 - 360.0;
            camera.rotate(Vec3::new(step, step * 0.5, 0.0));
            assert!(
                (-MAX_PITCH_DEG..=MAX_PITCH_DEG).contains(&camera.pitch_deg()),
                "pitch escaped: {}",
                camera.pitch_deg()
            );
        }
    }

    #[test]
    fn test_fps_pitch_saturates_at_limits() {
        let mut camera = FpsCamera::from_config(&config());
        camera.rotate(Vec3::new(500.0, 0.0, 0.0));
        assert_eq!(camera.pitch_deg(), MAX_PITCH_DEG);
        camera.rotate(Vec3::new(-1000.0, 0.0, 0.0));
        assert_eq!(camera.pitch_deg(), -MAX_PITCH_DEG);
        assert!(camera.forward().y < 0.0);
    }

    #[test]
    fn test_fps_yaw_is_unbounded() {
        let mut camera = FpsCamera::from_config(&config());
        camera.rotate(Vec3::new(0.0, 450.0, 0.0));
        assert_eq!(camera.yaw_deg(), 450.0);
        assert!(camera.forward().abs_diff_eq(Vec3::X, EPS));
    }

    #[test]
    fn test_fps_sensitivity_scales_delta() {
        let mut camera = FpsCamera::default();
        camera.rotate(Vec3::new(10.0, 20.0, 0.0));
        assert_eq!(camera.pitch_deg(), 5.0);
        assert_eq!(camera.yaw_deg(), 10.0);

        camera.flip_y = true;
        camera.rotate(Vec3::new(10.0, 0.0, 0.0));
        assert_eq!(camera.pitch_deg(), 0.0);
    }

    #[test]
    fn test_fps_basis_is_orthonormal() {
        let mut camera = FpsCamera::from_config(&config());
        camera.rotate(Vec3::new(30.0, -70.0, 0.0));
        let (f, r, u) = (camera.forward(), camera.right(), camera.up());
        assert!((f.length() - 1.0).abs() < EPS);
        assert!(f.dot(r).abs() < EPS);
        assert!(f.dot(u).abs() < EPS);
        assert!(r.dot(u).abs() < EPS);
    }

    #[test]
    fn test_movement_commands() {
        let camera = FpsCamera::from_config(&config());
        let speed = camera.move_speed;
        let forward = camera.process_input(CommandMask::FORWARD);
        assert!(forward.abs_diff_eq(Vec3::Z * speed, EPS));
        let cancel = camera.process_input(CommandMask::FORWARD | CommandMask::BACKWARD);
        assert!(cancel.abs_diff_eq(Vec3::ZERO, EPS));
        let right = camera.process_input(CommandMask::RIGHT);
        assert!(right.abs_diff_eq(camera.right() * speed, EPS));
        assert!(camera.process_input(CommandMask::FOCUS).abs_diff_eq(Vec3::ZERO, EPS));
    }

    #[test]
    fn test_projection_flips_clip_y() {
        let fps = FpsCamera::default();
        let free = FreeCamera::default();
        let unflipped = Mat4::perspective_rh(45f32.to_radians(), 16.0 / 9.0, 0.03, 500.0);
        for projection in [fps.projection_matrix(), free.projection_matrix()] {
            assert!(projection.y_axis.y < 0.0);
            assert!((projection.y_axis.y + unflipped.y_axis.y).abs() < EPS);
            assert_eq!(projection.x_axis.x, unflipped.x_axis.x);
        }
    }

    #[test]
    fn test_set_aspect_rejects_degenerate_values() {
        let mut camera = FreeCamera::default();
        camera.set_aspect(2.0);
        assert_eq!(camera.projection().aspect, 2.0);
        camera.set_aspect(0.0);
        camera.set_aspect(f32::NAN);
        assert_eq!(camera.projection().aspect, 2.0);
    }

    #[test]
    fn test_free_camera_composes_rotation() {
        let mut camera = FreeCamera::from_config(&config());
        camera.flip_y = false;
        camera.rotate(Vec3::new(0.0, 90.0, 0.0));
        assert!(camera.forward().abs_diff_eq(Vec3::X, EPS));

        // Pitch past the vertical is allowed.
        let mut camera = FreeCamera::from_config(&config());
        camera.flip_y = false;
        camera.rotate(Vec3::new(120.0, 0.0, 0.0));
        let expected = Quat::from_axis_angle(Vec3::X, 120f32.to_radians());
        assert!(camera.rotation().abs_diff_eq(expected, EPS));
        assert!(camera.up().y < 0.0);
    }

    #[test]
    fn test_free_camera_stays_unit_length() {
        let mut camera = FreeCamera::from_config(&config());
        for i in 0..500 {
            camera.rotate(Vec3::new(7.3, -(i as f32) * 0.37, 0.0));
        }
        assert!((camera.rotation().length() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_edit_mode_ignores_input() {
        let mut camera = FpsCamera::from_config(&config());
        let before = camera.position();
        camera.apply_frame_input(&FrameInput {
            commands: CommandMask::FORWARD,
            cursor_delta: (30.0, 10.0),
            mode: InputMode::Edit,
        });
        assert_eq!(camera.position(), before);
        assert_eq!(camera.yaw_deg(), 0.0);

        camera.apply_frame_input(&FrameInput {
            commands: CommandMask::FORWARD,
            cursor_delta: (30.0, 10.0),
            mode: InputMode::Play,
        });
        assert_ne!(camera.position(), before);
        assert_eq!(camera.yaw_deg(), 30.0);
        assert_eq!(camera.pitch_deg(), -10.0);
    }
}
