//! Frame orchestration for the demos.
//!
//! This crate drives the per-frame GPU lifecycle:
//! - Frames-in-flight synchronization
//! - Dynamic uniform slots aligned for the device
//! - The render pass graph and its barriers
//! - Demo controller and UI overlay seams, with an imgui overlay

pub mod demo;
pub mod frame_sync;
pub mod graph;
pub mod imgui_overlay;
pub mod overlay;
pub mod recorder;
pub mod render_manager;
pub mod uniform;

pub use demo::{Demo, DemoContext, DemoController, FrameContext, FrameListener, FrameTargets};
pub use frame_sync::{FrameBackend, FrameSynchronizer, SlotState, VulkanFrameBackend};
pub use graph::{
    Access, CompiledPass, Dependency, GraphBuilder, ImageBarrier, PassDesc, PassId, PassRecorder,
    RenderGraph, ResourceId, ResourceKind,
};
pub use imgui_overlay::{ImguiOverlay, UiPanel};
pub use overlay::{TitleOverlay, UiFrame, UiOverlay, Widget};
pub use recorder::{AttachmentBindings, VulkanPassRecorder};
pub use render_manager::{FrameStatus, RenderManager};
pub use uniform::{
    AlignedArray, DynamicUniformBuffer, UniformMemory, compute_packed_stride, compute_stride,
    compute_stride_next_power_of_two,
};
