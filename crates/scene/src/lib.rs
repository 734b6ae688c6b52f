//! Scene-side math: cameras, lights and object transforms.
//!
//! - FPS (Euler, clamped pitch) and free (quaternion) cameras
//! - Directional shadow light and lamp instance data
//! - Object transforms and per-draw push constants

pub mod camera;
pub mod light;
pub mod transform;

pub use camera::{flip_clip_y, Camera, FpsCamera, FreeCamera, Projection, MAX_PITCH_DEG};
pub use light::{DirectionalLight, LampInstance, LightUniform};
pub use transform::{ModelPushConstants, Transform};
