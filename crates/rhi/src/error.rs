//! RHI error taxonomy.

use std::path::PathBuf;

use ash::vk;
use thiserror::Error;

/// Errors raised by GPU resource management and the frame loop.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Creating a buffer, image, pipeline, sampler or descriptor object failed.
    #[error("Failed to create {what}: {source}")]
    ResourceCreation {
        what: &'static str,
        #[source]
        source: vk::Result,
    },

    /// The surface changed under the swapchain; it must be recreated.
    #[error("Swapchain is out of date")]
    SwapchainOutOfDate,

    /// A mesh, texture or shader file is missing or unparseable.
    #[error("Failed to load asset '{path}': {reason}")]
    AssetLoad { path: PathBuf, reason: String },

    /// The image-barrier policy table has no entry for this layout pair.
    #[error("Unsupported layout transition: {old:?} -> {new:?}")]
    UnsupportedLayoutTransition {
        old: vk::ImageLayout,
        new: vk::ImageLayout,
    },

    /// A fence wait or image acquisition exceeded its timeout.
    #[error("Timed out after {timeout_ns} ns waiting for {what}")]
    FrameTimeout { what: &'static str, timeout_ns: u64 },

    /// The logical device was lost.
    #[error("Device lost")]
    DeviceLost,

    /// The surface cannot back a usable swapchain.
    #[error("Surface incompatible: {0}")]
    SurfaceIncompatible(String),

    /// Any other Vulkan API error
    #[error("Vulkan error: {0}")]
    Vulkan(vk::Result),

    /// Failed to load the Vulkan library
    #[error("Failed to load Vulkan: {0}")]
    Loading(#[from] ash::LoadingError),

    /// GPU allocator error
    #[error("Allocator error: {0}")]
    Allocator(#[from] gpu_allocator::AllocationError),

    /// No suitable GPU found
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// Shader module could not be built from the supplied bytes
    #[error("Shader error: {0}")]
    Shader(String),

    /// A frame slot was driven out of its Idle -> Recording -> Submitted order.
    #[error("Frame slot {slot} is {actual}, expected {expected}")]
    InvalidFrameState {
        slot: usize,
        expected: &'static str,
        actual: &'static str,
    },

    /// Bounds-checked slot access failed.
    #[error("Slot {index} out of range (slot count {count})")]
    SlotOutOfRange { index: usize, count: usize },

    /// A host write does not fit into a buffer.
    #[error("Write of {size} bytes at offset {offset} exceeds buffer size {capacity}")]
    OutOfBounds {
        offset: u64,
        size: u64,
        capacity: u64,
    },

    /// A pass reads a resource written by an earlier pass without a declared edge.
    #[error("Pass '{consumer}' reads '{resource}' written by '{producer}' without a declared dependency")]
    MissingPassDependency {
        producer: String,
        consumer: String,
        resource: String,
    },

    /// A declared edge does not match how the passes use the resource.
    #[error("Invalid pass dependency: {0}")]
    InvalidPassDependency(String),

    /// The declared ordering edges contain a cycle.
    #[error("Render pass graph contains a cycle through '{0}'")]
    CyclicPassGraph(String),
}

impl RhiError {
    /// Only an out-of-date swapchain is recovered from; everything else is fatal.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::SwapchainOutOfDate)
    }

    /// Wrap a creation failure, keeping device loss distinguishable.
    pub fn creation(what: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |source| match source {
            vk::Result::ERROR_DEVICE_LOST => Self::DeviceLost,
            source => Self::ResourceCreation { what, source },
        }
    }
}

impl From<vk::Result> for RhiError {
    fn from(result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_DEVICE_LOST => Self::DeviceLost,
            vk::Result::ERROR_OUT_OF_DATE_KHR => Self::SwapchainOutOfDate,
            other => Self::Vulkan(other),
        }
    }
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;
