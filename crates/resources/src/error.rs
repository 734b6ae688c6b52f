//! Error types for asset loading.

use std::path::{Path, PathBuf};

use thiserror::Error;
use vkdemo_rhi::RhiError;

/// Error type for mesh and texture loading.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// The file does not exist.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// The OBJ file could not be parsed.
    #[error("Failed to parse OBJ '{path}': {source}")]
    Obj {
        path: PathBuf,
        #[source]
        source: tobj::LoadError,
    },

    /// The OBJ file parsed but contains no triangles.
    #[error("Mesh '{0}' contains no triangles")]
    EmptyMesh(PathBuf),

    /// The image could not be decoded.
    #[error("Failed to decode image '{path}': {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

impl ResourceError {
    /// The asset the error refers to.
    pub fn path(&self) -> &Path {
        match self {
            Self::FileNotFound(path) | Self::EmptyMesh(path) => path,
            Self::Obj { path, .. } | Self::Image { path, .. } => path,
        }
    }
}

impl From<ResourceError> for RhiError {
    fn from(err: ResourceError) -> Self {
        RhiError::AssetLoad {
            path: err.path().to_path_buf(),
            reason: err.to_string(),
        }
    }
}

/// Result type alias for resource operations.
pub type ResourceResult<T> = Result<T, ResourceError>;
