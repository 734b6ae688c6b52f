//! CPU-side asset data.
//!
//! - Mesh data from OBJ files (`tobj`) or procedural primitives
//! - RGBA8 texture pixels from image files (`image`) or a checkerboard
//!
//! Uploading to the GPU is left to `vkdemo_rhi`.

mod error;
pub mod mesh;
pub mod texture;

pub use error::{ResourceError, ResourceResult};
pub use mesh::MeshData;
pub use texture::TextureData;
