//! Window and Vulkan surface.

use std::sync::Arc;

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle};
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::{CursorGrabMode, Window as WinitWindow, WindowAttributes};

use vkdemo_core::{Error, Result, WindowConfig};

use crate::input::InputMode;

/// A Vulkan surface, destroyed on drop.
///
/// Must be dropped before the instance it was created from.
pub struct Surface {
    handle: vk::SurfaceKHR,
    loader: ash::khr::surface::Instance,
}

impl Surface {
    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    #[inline]
    pub fn loader(&self) -> &ash::khr::surface::Instance {
        &self.loader
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        // SAFETY: created by ash_window::create_surface from the same instance
        // as `loader`, destroyed only here.
        unsafe { self.loader.destroy_surface(self.handle, None) };
        tracing::debug!("Vulkan surface destroyed");
    }
}

pub struct Window {
    window: Arc<WinitWindow>,
}

impl Window {
    pub fn new(event_loop: &ActiveEventLoop, config: &WindowConfig) -> Result<Self> {
        let attrs = WindowAttributes::default()
            .with_title(config.title.clone())
            .with_inner_size(PhysicalSize::new(config.width, config.height))
            .with_resizable(true);
        let window = event_loop
            .create_window(attrs)
            .map_err(|e| Error::Window(e.to_string()))?;
        tracing::info!("Window created: {}x{}", config.width, config.height);
        Ok(Self {
            window: Arc::new(window),
        })
    }

    /// Framebuffer size in pixels; zero while minimized.
    pub fn extent(&self) -> vk::Extent2D {
        let size = self.window.inner_size();
        vk::Extent2D {
            width: size.width,
            height: size.height,
        }
    }

    pub fn is_minimized(&self) -> bool {
        let extent = self.extent();
        extent.width == 0 || extent.height == 0
    }

    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }

    pub fn set_title(&self, title: &str) {
        self.window.set_title(title);
    }

    /// Grab and hide the cursor in play mode, release it in edit mode.
    pub fn apply_input_mode(&self, mode: InputMode) {
        match mode {
            InputMode::Play => {
                let grabbed = self
                    .window
                    .set_cursor_grab(CursorGrabMode::Locked)
                    .or_else(|_| self.window.set_cursor_grab(CursorGrabMode::Confined));
                if let Err(e) = grabbed {
                    tracing::warn!("Cursor grab unavailable: {e}");
                }
                self.window.set_cursor_visible(false);
            }
            InputMode::Edit => {
                if let Err(e) = self.window.set_cursor_grab(CursorGrabMode::None) {
                    tracing::warn!("Cursor release failed: {e}");
                }
                self.window.set_cursor_visible(true);
            }
        }
    }

    pub fn raw_display_handle(&self) -> Result<RawDisplayHandle> {
        self.window
            .display_handle()
            .map(|handle| handle.as_raw())
            .map_err(|e| Error::Window(format!("no display handle: {e}")))
    }

    /// Create a Vulkan surface for this window.
    pub fn create_surface(&self, entry: &ash::Entry, instance: &ash::Instance) -> Result<Surface> {
        let display = self.raw_display_handle()?;
        let window = self
            .window
            .window_handle()
            .map_err(|e| Error::Window(format!("no window handle: {e}")))?
            .as_raw();

        // SAFETY: both handles come from a live winit window that outlives
        // the returned Surface.
        let handle = unsafe {
            ash_window::create_surface(entry, instance, display, window, None)
                .map_err(|e| Error::Surface(e.to_string()))?
        };
        tracing::info!("Vulkan surface created");
        Ok(Surface {
            handle,
            loader: ash::khr::surface::Instance::new(entry, instance),
        })
    }
}
