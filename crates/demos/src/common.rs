//! Pieces shared by the demos.

use std::path::Path;
use std::sync::Arc;

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};
use tracing::{info, warn};

use vkdemo_resources::{MeshData, TextureData};
use vkdemo_rhi::RhiResult;
use vkdemo_rhi::buffer::{Buffer, BufferUsage};
use vkdemo_rhi::command::{CommandBuffer, CommandPool};
use vkdemo_rhi::device::Device;
use vkdemo_rhi::shader::{Shader, ShaderStage, spirv_file_name};
use vkdemo_scene::Camera;

/// Per-frame camera data, one dynamic uniform slot per frame in flight.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct CameraUniform {
    pub view: Mat4,
    pub projection: Mat4,
    pub view_projection: Mat4,
    /// World-space eye position; `w` is unused.
    pub position: Vec4,
}

impl CameraUniform {
    pub fn from_camera(camera: &dyn Camera) -> Self {
        let view = camera.view_matrix();
        let projection = camera.projection_matrix();
        Self {
            view,
            projection,
            view_projection: projection * view,
            position: camera.position().extend(1.0),
        }
    }
}

/// Device-local vertex and index buffers of one mesh.
pub struct GpuMesh {
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    index_count: u32,
}

impl GpuMesh {
    pub fn upload(device: &Arc<Device>, pool: &CommandPool, mesh: &MeshData) -> RhiResult<Self> {
        let vertex_buffer = Buffer::new_device_local(
            device.clone(),
            pool,
            BufferUsage::Vertex,
            mesh.vertex_bytes(),
        )?;
        let index_buffer =
            Buffer::new_device_local(device.clone(), pool, BufferUsage::Index, mesh.index_bytes())?;
        Ok(Self {
            vertex_buffer,
            index_buffer,
            index_count: mesh.index_count(),
        })
    }

    #[inline]
    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    pub fn draw(&self, cmd: &CommandBuffer, instances: u32) {
        cmd.bind_vertex_buffer(0, self.vertex_buffer.handle());
        cmd.bind_index_buffer(self.index_buffer.handle(), vk::IndexType::UINT32);
        cmd.draw_indexed(self.index_count, instances);
    }
}

/// Load one compiled stage from the shader directory.
pub fn load_shader(
    device: &Arc<Device>,
    dir: &Path,
    name: &str,
    stage: ShaderStage,
) -> RhiResult<Shader> {
    Shader::from_spirv_file(device.clone(), &dir.join(spirv_file_name(name, stage)), stage)
}

/// Load `<dir>/<name>.vert.spv` and `<dir>/<name>.frag.spv`.
pub fn load_shader_pair(
    device: &Arc<Device>,
    dir: &Path,
    name: &str,
) -> RhiResult<(Shader, Shader)> {
    let vertex = load_shader(device, dir, name, ShaderStage::Vertex)?;
    let fragment = load_shader(device, dir, name, ShaderStage::Fragment)?;
    Ok((vertex, fragment))
}

/// The configured OBJ model, or `fallback` when none is configured.
///
/// A configured model that fails to load is an error.
pub fn load_mesh_or(path: Option<&Path>, fallback: impl FnOnce() -> MeshData) -> RhiResult<MeshData> {
    match path {
        Some(path) => Ok(MeshData::load_obj(path)?),
        None => {
            info!("No model configured, using a procedural mesh");
            Ok(fallback())
        }
    }
}

/// The configured texture, or a checkerboard when none is configured.
pub fn load_texture_or_checkerboard(path: Option<&Path>) -> RhiResult<TextureData> {
    match path {
        Some(path) => Ok(TextureData::load(path)?),
        None => {
            warn!("No texture configured, using a checkerboard");
            Ok(TextureData::checkerboard(
                256,
                8,
                [235, 235, 235, 255],
                [60, 60, 70, 255],
            ))
        }
    }
}

/// Width over height, or `None` for an empty extent.
pub fn aspect_ratio(extent: vk::Extent2D) -> Option<f32> {
    (extent.width > 0 && extent.height > 0).then(|| extent.width as f32 / extent.height as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::mem::size_of;

    use glam::Vec3;
    use vkdemo_core::CameraConfig;
    use vkdemo_scene::FpsCamera;

    #[test]
    fn test_camera_uniform_layout() {
        assert_eq!(size_of::<CameraUniform>(), 208);
    }

    #[test]
    fn test_camera_uniform_composes_view_projection() {
        let camera = FpsCamera::from_config(&CameraConfig::default())
            .with_position(Vec3::new(1.0, 2.0, 3.0));
        let uniform = CameraUniform::from_camera(&camera);
        assert!(
            uniform
                .view_projection
                .abs_diff_eq(camera.view_projection(), 1e-5)
        );
        assert_eq!(uniform.position, Vec4::new(1.0, 2.0, 3.0, 1.0));
    }

    #[test]
    fn test_fallbacks_when_unconfigured() {
        let mesh = load_mesh_or(None, || MeshData::cube(1.0)).unwrap();
        assert_eq!(mesh.index_count(), 36);
        let texture = load_texture_or_checkerboard(None).unwrap();
        assert_eq!((texture.width, texture.height), (256, 256));
    }

    #[test]
    fn test_configured_model_must_exist() {
        let err = load_mesh_or(Some(Path::new("missing/model.obj")), || MeshData::cube(1.0))
            .unwrap_err();
        assert!(matches!(err, vkdemo_rhi::RhiError::AssetLoad { .. }));
    }

    #[test]
    fn test_aspect_ratio() {
        let extent = vk::Extent2D {
            width: 1280,
            height: 720,
        };
        assert_eq!(aspect_ratio(extent), Some(1280.0 / 720.0));
        assert_eq!(aspect_ratio(vk::Extent2D::default()), None);
    }
}
