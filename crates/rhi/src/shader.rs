//! SPIR-V shader modules.

use std::ffi::CStr;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

const ENTRY_POINT: &CStr = c"main";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub fn to_vk_stage(self) -> vk::ShaderStageFlags {
        match self {
            Self::Vertex => vk::ShaderStageFlags::VERTEX,
            Self::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }

    /// File extension of the GLSL source for this stage.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Vertex => "vert",
            Self::Fragment => "frag",
        }
    }
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Vertex => "vertex",
            Self::Fragment => "fragment",
        })
    }
}

/// SPIR-V file the build writes for the `<name>.<stage>` GLSL source, e.g.
/// `scene.vert.spv`.
pub fn spirv_file_name(name: &str, stage: ShaderStage) -> String {
    format!("{name}.{}.spv", stage.extension())
}

/// A compiled shader module with entry point `main`.
pub struct Shader {
    device: Arc<Device>,
    module: vk::ShaderModule,
    stage: ShaderStage,
}

impl Shader {
    /// Load a `.spv` file. A missing or malformed file is an
    /// [`RhiError::AssetLoad`].
    pub fn from_spirv_file(device: Arc<Device>, path: &Path, stage: ShaderStage) -> RhiResult<Self> {
        let bytes = std::fs::read(path).map_err(|e| RhiError::AssetLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let code = decode_spirv(&bytes).map_err(|reason| RhiError::AssetLoad {
            path: path.to_path_buf(),
            reason,
        })?;
        debug!("Loaded {stage} shader from {}", path.display());
        Self::from_words(device, &code, stage)
    }

    fn from_words(device: Arc<Device>, code: &[u32], stage: ShaderStage) -> RhiResult<Self> {
        let create_info = vk::ShaderModuleCreateInfo::default().code(code);
        let module = unsafe {
            device
                .handle()
                .create_shader_module(&create_info, None)
                .map_err(RhiError::creation("shader module"))?
        };
        Ok(Self {
            device,
            module,
            stage,
        })
    }

    #[inline]
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    pub fn stage_create_info(&self) -> vk::PipelineShaderStageCreateInfo<'_> {
        vk::PipelineShaderStageCreateInfo::default()
            .stage(self.stage.to_vk_stage())
            .module(self.module)
            .name(ENTRY_POINT)
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_shader_module(self.module, None)
        };
    }
}

/// Decode SPIR-V bytes into words, checking size and magic number.
fn decode_spirv(bytes: &[u8]) -> Result<Vec<u32>, String> {
    ash::util::read_spv(&mut Cursor::new(bytes)).map_err(|e| format!("invalid SPIR-V: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spirv_names_follow_glsl_sources() {
        assert_eq!(spirv_file_name("scene", ShaderStage::Vertex), "scene.vert.spv");
        assert_eq!(spirv_file_name("ui", ShaderStage::Fragment), "ui.frag.spv");
    }

    #[test]
    fn test_stage_flags() {
        assert_eq!(ShaderStage::Vertex.to_vk_stage(), vk::ShaderStageFlags::VERTEX);
        assert_eq!(
            ShaderStage::Fragment.to_vk_stage(),
            vk::ShaderStageFlags::FRAGMENT
        );
        assert_eq!(ShaderStage::Fragment.to_string(), "fragment");
    }

    #[test]
    fn test_rejects_unaligned_spirv() {
        assert!(decode_spirv(&[0x03, 0x02, 0x23]).is_err());
    }

    #[test]
    fn test_decodes_spirv_words() {
        // Magic number followed by one word.
        let bytes = [0x03, 0x02, 0x23, 0x07, 0x00, 0x00, 0x01, 0x00];
        let words = decode_spirv(&bytes).unwrap();
        assert_eq!(words, vec![0x0723_0203, 0x0001_0000]);
    }
}
