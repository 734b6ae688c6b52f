//! Frame loop orchestration.
//!
//! The [`RenderManager`] owns the frame synchronizer, the compiled pass
//! graph, the scene depth buffer and the active demo. Each call to
//! [`render_frame`](RenderManager::render_frame) runs one host frame:
//!
//! ```text
//! begin_frame ─▶ on_frame_input ─▶ update ─▶ draw_ui
//!     ─▶ record graph (shadow ─▶ scene ─▶ ui) ─▶ submit ─▶ present ─▶ advance
//! ```
//!
//! An out-of-date swapchain, a suboptimal present or a window resize
//! triggers recreation: device idle, new swapchain and semaphores, new depth
//! buffer, rebound attachments, then `on_resize` on the demo.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use vkdemo_core::{Config, FrameTimer, OverlayKind};
use vkdemo_platform::FrameInput;
use vkdemo_rhi::command::CommandPool;
use vkdemo_rhi::device::Device;
use vkdemo_rhi::image::{DEPTH_FORMAT, Image};
use vkdemo_rhi::swapchain::Swapchain;
use vkdemo_rhi::{RhiError, RhiResult};

use crate::demo::{DemoContext, DemoController, FrameContext, FrameTargets};
use crate::frame_sync::{FrameSynchronizer, VulkanFrameBackend};
use crate::graph::{Access, GraphBuilder, PassDesc, PassId, RenderGraph, ResourceKind};
use crate::imgui_overlay::ImguiOverlay;
use crate::overlay::{TitleOverlay, UiOverlay};
use crate::recorder::{AttachmentBindings, VulkanPassRecorder};

/// What [`RenderManager::render_frame`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    Presented,
    /// The window has no area; nothing was recorded.
    Skipped,
    /// Acquisition found the swapchain out of date; it was rebuilt instead.
    Recreated,
}

pub struct RenderManager {
    device: Arc<Device>,
    sync: FrameSynchronizer<VulkanFrameBackend>,
    depth: Image,
    graph: RenderGraph,
    bindings: AttachmentBindings,
    targets: FrameTargets,
    ui_pass: PassId,
    demo: Option<Box<dyn DemoController>>,
    overlay: Box<dyn UiOverlay>,
    timer: FrameTimer,
    clear_color: [f32; 4],
    requested_extent: vk::Extent2D,
    needs_recreate: bool,
}

impl RenderManager {
    /// Takes ownership of `swapchain`, creates the demo with `create_demo`
    /// and compiles the frame graph.
    pub fn new<F>(
        device: Arc<Device>,
        swapchain: Swapchain,
        config: &Config,
        create_demo: F,
    ) -> RhiResult<Self>
    where
        F: FnOnce(&DemoContext<'_>) -> RhiResult<Box<dyn DemoController>>,
    {
        let frames_in_flight = config.render.frames_in_flight();
        let extent = swapchain.extent();
        let color_format = swapchain.format();

        let family = device
            .queue_families()
            .graphics_family
            .ok_or(RhiError::NoSuitableGpu)?;
        let upload_pool = CommandPool::new_transient(device.clone(), family)?;
        let mut demo = create_demo(&DemoContext {
            device: &device,
            upload_pool: &upload_pool,
            color_format,
            depth_format: DEPTH_FORMAT,
            extent,
            frames_in_flight,
            config,
        })?;
        info!("Demo '{}' initialized", demo.name());
        let overlay = create_overlay(&device, &upload_pool, color_format, config);

        let mut builder = GraphBuilder::new();
        let targets = FrameTargets {
            color: builder.resource("swapchain", ResourceKind::Color),
            depth: builder.resource("scene_depth", ResourceKind::Depth),
        };
        let last = demo.declare_passes(&mut builder, targets);
        let ui_pass =
            builder.add_pass(PassDesc::new("ui").access(targets.color, Access::ColorAttachmentLoad));
        builder.add_dependency(last, ui_pass);
        builder.export(targets.color, Access::Present);
        let graph = builder.compile()?;
        info!("Render graph: {graph}");

        let depth = Image::depth(device.clone(), extent, DEPTH_FORMAT)?;
        let backend = VulkanFrameBackend::new(device.clone(), swapchain, frames_in_flight)?;
        let sync =
            FrameSynchronizer::new(backend, frames_in_flight, config.render.frame_timeout_ns());

        let mut manager = Self {
            device,
            sync,
            depth,
            graph,
            bindings: AttachmentBindings::new(),
            targets,
            ui_pass,
            demo: Some(demo),
            overlay,
            timer: FrameTimer::new(),
            clear_color: config.render.clear_color,
            requested_extent: extent,
            needs_recreate: false,
        };
        manager.rebind_attachments();
        Ok(manager)
    }

    /// Record a new window size; the swapchain is rebuilt before the next frame.
    pub fn resize(&mut self, extent: vk::Extent2D) {
        if extent != self.requested_extent {
            debug!(
                "Resize requested: {}x{} -> {}x{}",
                self.requested_extent.width,
                self.requested_extent.height,
                extent.width,
                extent.height
            );
            self.requested_extent = extent;
            self.needs_recreate = true;
        }
    }

    /// Run one host frame.
    pub fn render_frame(&mut self, input: &FrameInput) -> RhiResult<FrameStatus> {
        if self.requested_extent.width == 0 || self.requested_extent.height == 0 {
            return Ok(FrameStatus::Skipped);
        }
        if self.needs_recreate {
            self.recreate()?;
        }

        let (dt, fps) = self.timer.tick();
        if let Some(fps) = fps {
            debug!("FPS: {fps:.1}");
        }

        let image_index = match self.sync.begin_frame() {
            Ok(index) => index,
            Err(e) if e.is_recoverable() => {
                warn!("Swapchain out of date on acquire, recreating");
                self.recreate()?;
                return Ok(FrameStatus::Recreated);
            }
            Err(e) => return Err(e),
        };
        let slot = self.sync.current_slot();

        let Some(demo) = self.demo.as_mut() else {
            return Err(RhiError::InvalidFrameState {
                slot,
                expected: "demo loaded",
                actual: "disposed",
            });
        };
        demo.on_frame_input(input, slot)?;
        demo.update(dt.as_secs_f32())?;

        let ui = self.overlay.begin_frame();
        ui.value("fps", format_args!("{:.0}", self.timer.fps()));
        demo.draw_ui(ui);

        let cmd = self
            .sync
            .backend()
            .command_buffer(slot)
            .ok_or(RhiError::SlotOutOfRange {
                index: slot,
                count: self.sync.frames_in_flight(),
            })?;
        cmd.reset()?;
        cmd.begin()?;
        {
            let mut recorder =
                VulkanPassRecorder::new(cmd, &self.bindings, image_index, self.clear_color);
            let ui_pass = self.ui_pass;
            let overlay = &mut *self.overlay;
            let demo = &**demo;
            self.graph.record(&mut recorder, |pass, rec| {
                let frame = FrameContext {
                    slot,
                    image_index,
                    extent: rec.extent(),
                };
                if pass.id() == ui_pass {
                    overlay.render(rec.command_buffer(), &frame)
                } else {
                    demo.draw_pass(pass, rec.command_buffer(), &frame)
                }
            })?;
        }
        cmd.end()?;

        self.sync.submit()?;
        let presented = self.sync.present();
        self.sync.advance();
        match presented {
            Ok(false) => {}
            Ok(true) => {
                debug!("Swapchain suboptimal on present");
                self.needs_recreate = true;
            }
            Err(e) if e.is_recoverable() => {
                warn!("Swapchain out of date on present");
                self.needs_recreate = true;
            }
            Err(e) => return Err(e),
        }
        Ok(FrameStatus::Presented)
    }

    /// The overlay's latest window title, if it changed.
    pub fn take_title(&mut self) -> Option<String> {
        self.overlay.take_title()
    }

    pub fn graph(&self) -> &RenderGraph {
        &self.graph
    }

    pub fn swapchain(&self) -> &Swapchain {
        self.sync.backend().swapchain()
    }

    /// Wait for the GPU and release the demo's resources.
    pub fn shutdown(&mut self) -> RhiResult<()> {
        self.device.wait_idle()?;
        if let Some(demo) = self.demo.take() {
            let name = demo.name();
            demo.dispose();
            info!("Demo '{name}' disposed");
        }
        Ok(())
    }

    fn recreate(&mut self) -> RhiResult<()> {
        let extent = self.requested_extent;
        self.device.wait_idle()?;
        self.sync.backend_mut().recreate_swapchain(extent)?;
        let actual = self.sync.backend().swapchain().extent();
        self.depth = Image::depth(self.device.clone(), actual, DEPTH_FORMAT)?;
        self.rebind_attachments();
        if let Some(demo) = self.demo.as_mut() {
            demo.on_resize(actual)?;
        }
        self.needs_recreate = false;
        info!("Swapchain recreated at {}x{}", actual.width, actual.height);
        Ok(())
    }

    fn rebind_attachments(&mut self) {
        self.bindings.clear();
        self.bindings
            .bind_swapchain(self.targets.color, self.sync.backend().swapchain());
        self.bindings.bind_image(self.targets.depth, &self.depth);
        if let Some(demo) = self.demo.as_ref() {
            demo.bind_attachments(&mut self.bindings);
        }
    }
}

/// The configured overlay. A GPU overlay that cannot start falls back to the
/// window title.
fn create_overlay(
    device: &Arc<Device>,
    upload_pool: &CommandPool,
    color_format: vk::Format,
    config: &Config,
) -> Box<dyn UiOverlay> {
    let title = || -> Box<dyn UiOverlay> {
        Box::new(TitleOverlay::new(config.window.title.clone()))
    };
    match config.ui.overlay {
        OverlayKind::Title => title(),
        OverlayKind::Imgui => match ImguiOverlay::new(
            device,
            upload_pool,
            color_format,
            config.render.frames_in_flight(),
            &config.demo.shader_dir(),
            &config.window.title,
        ) {
            Ok(overlay) => Box::new(overlay),
            Err(e) => {
                warn!("ImGui overlay unavailable, using the window title: {e}");
                title()
            }
        },
    }
}

impl Drop for RenderManager {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("Render manager shutdown failed: {e}");
        }
    }
}
