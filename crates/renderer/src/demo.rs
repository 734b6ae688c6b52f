//! Demo controller seams.
//!
//! A demo is two independent capabilities: [`Demo`] owns GPU resources and
//! draws its passes, [`FrameListener`] receives the frame's input before any
//! drawing. The render manager drives both through [`DemoController`].

use std::sync::Arc;

use ash::vk;

use vkdemo_core::Config;
use vkdemo_platform::FrameInput;
use vkdemo_rhi::RhiResult;
use vkdemo_rhi::command::{CommandBuffer, CommandPool};
use vkdemo_rhi::device::Device;

use crate::graph::{CompiledPass, GraphBuilder, PassId, ResourceId};
use crate::overlay::UiFrame;
use crate::recorder::AttachmentBindings;

/// Everything a demo may use while creating its resources.
pub struct DemoContext<'a> {
    pub device: &'a Arc<Device>,
    /// Transient pool on the graphics queue for staged uploads.
    pub upload_pool: &'a CommandPool,
    pub color_format: vk::Format,
    pub depth_format: vk::Format,
    pub extent: vk::Extent2D,
    pub frames_in_flight: usize,
    pub config: &'a Config,
}

/// Attachments the render manager provides to every demo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTargets {
    /// The acquired swapchain image.
    pub color: ResourceId,
    /// Scene depth buffer sized to the swapchain.
    pub depth: ResourceId,
}

/// Per-frame values passed to [`Demo::draw_pass`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameContext {
    /// Frame slot; selects the dynamic uniform region.
    pub slot: usize,
    pub image_index: u32,
    /// Render area of the pass being drawn.
    pub extent: vk::Extent2D,
}

/// A demo's GPU resources and draw calls.
pub trait Demo {
    /// Create every resource the demo draws with.
    ///
    /// Nothing may be created lazily by a later draw call.
    fn init(ctx: &DemoContext<'_>) -> RhiResult<Self>
    where
        Self: Sized;

    fn name(&self) -> &'static str;

    /// Add the demo's passes to the frame graph.
    ///
    /// Returns the pass the UI overlay must follow.
    fn declare_passes(&mut self, graph: &mut GraphBuilder, targets: FrameTargets) -> PassId;

    /// Bind the images of resources the demo declared.
    fn bind_attachments(&self, bindings: &mut AttachmentBindings);

    /// Advance animation by `dt` seconds.
    fn update(&mut self, dt: f32) -> RhiResult<()>;

    /// Record the draw calls of one of the demo's passes.
    fn draw_pass(
        &self,
        pass: &CompiledPass,
        cmd: &CommandBuffer,
        frame: &FrameContext,
    ) -> RhiResult<()>;

    /// Push the demo's widgets for this frame.
    fn draw_ui(&mut self, ui: &mut UiFrame);

    /// React to a new swapchain extent.
    fn on_resize(&mut self, extent: vk::Extent2D) -> RhiResult<()>;

    /// Release every resource created by [`init`](Demo::init).
    ///
    /// The caller guarantees the device is idle.
    fn dispose(self: Box<Self>);
}

/// Receives the frame's input once per host frame, before drawing.
pub trait FrameListener {
    /// Update camera state from `input` and upload the uniforms of `slot`.
    ///
    /// Must not block.
    fn on_frame_input(&mut self, input: &FrameInput, slot: usize) -> RhiResult<()>;
}

/// A demo that also listens to frame input.
pub trait DemoController: Demo + FrameListener {}

impl<T: Demo + FrameListener> DemoController for T {}
