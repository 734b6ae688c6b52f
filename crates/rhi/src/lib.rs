//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! Safe RAII wrappers over `ash`:
//! - Instance, physical device selection and logical device
//! - Swapchain management
//! - Command pools, one-shot submissions and recording
//! - Buffers, images, textures and samplers (memory via `gpu-allocator`)
//! - Descriptors, shaders and pipelines
//! - Fences, semaphores and the upload layout-transition table

mod error;

pub mod barrier;
pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod image;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod rendering;
pub mod sampler;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod texture;
pub mod vertex;

pub use error::{RhiError, RhiResult};

pub use ash::vk;
