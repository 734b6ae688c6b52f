//! vkdemo - Vulkan demo framework entry point.
//!
//! Loads `vkdemo.toml`, opens the window, brings up the Vulkan device and
//! hands the frame loop to the render manager.

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use winit::application::ApplicationHandler;
use winit::event::{DeviceEvent, DeviceId, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::PhysicalKey;
use winit::window::WindowId;

use vkdemo_core::{CONFIG_FILE_NAME, Config, PresentModePreference};
use vkdemo_platform::{InputEvent, InputQueue, InputState, Surface, Window};
use vkdemo_renderer::{FrameStatus, RenderManager};
use vkdemo_rhi::device::Device;
use vkdemo_rhi::instance::Instance;
use vkdemo_rhi::physical_device::select_physical_device;
use vkdemo_rhi::swapchain::Swapchain;
use vkdemo_rhi::vk;

/// Everything bound to the Vulkan instance, declared in teardown order.
struct Gpu {
    manager: RenderManager,
    _surface: Surface,
    _instance: Instance,
}

impl Gpu {
    fn new(window: &Window, config: &Config) -> Result<Self> {
        let instance = Instance::new(window.raw_display_handle()?, config.render.validation)
            .context("creating Vulkan instance")?;
        let surface = window.create_surface(instance.entry(), instance.handle())?;
        let physical = select_physical_device(instance.handle(), surface.handle(), surface.loader())
            .context("selecting a GPU")?;
        let device = Device::new(&instance, &physical).context("creating logical device")?;
        let swapchain = Swapchain::new(
            &instance,
            device.clone(),
            surface.handle(),
            window.extent(),
            present_mode(config.render.present_mode),
        )
        .context("creating swapchain")?;

        let kind = config.demo.kind;
        let manager = RenderManager::new(device, swapchain, config, |ctx| {
            vkdemo_demos::create_demo(kind, ctx)
        })
        .context("starting render manager")?;

        Ok(Self {
            manager,
            _surface: surface,
            _instance: instance,
        })
    }
}

fn present_mode(preference: PresentModePreference) -> vk::PresentModeKHR {
    match preference {
        PresentModePreference::Fifo => vk::PresentModeKHR::FIFO,
        PresentModePreference::Mailbox => vk::PresentModeKHR::MAILBOX,
    }
}

struct App {
    config: Config,
    // Dropped before the window the surface was created for.
    gpu: Option<Gpu>,
    window: Option<Window>,
    queue: InputQueue,
    input: InputState,
    failure: Option<anyhow::Error>,
}

impl App {
    fn new(config: Config) -> Self {
        Self {
            config,
            gpu: None,
            window: None,
            queue: InputQueue::new(),
            input: InputState::new(),
            failure: None,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        self.failure = Some(err);
        event_loop.exit();
    }

    fn redraw(&mut self) -> Result<()> {
        let (Some(window), Some(gpu)) = (&self.window, &mut self.gpu) else {
            return Ok(());
        };
        if window.is_minimized() {
            if let Some(mode) = self.input.skip_frame(&mut self.queue) {
                window.apply_input_mode(mode);
            }
            return Ok(());
        }

        if let Some(mode) = self.input.process(&mut self.queue) {
            window.apply_input_mode(mode);
        }
        let frame = self.input.take_frame_input();

        if gpu.manager.render_frame(&frame)? == FrameStatus::Skipped {
            return Ok(());
        }
        if let Some(title) = gpu.manager.take_title() {
            window.set_title(&title);
        }
        Ok(())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let window = match Window::new(event_loop, &self.config.window) {
            Ok(window) => window,
            Err(e) => return self.fail(event_loop, e.into()),
        };
        window.apply_input_mode(self.input.mode());
        match Gpu::new(&window, &self.config) {
            Ok(gpu) => {
                info!("Initialization complete, entering main loop");
                self.gpu = Some(gpu);
                self.window = Some(window);
            }
            Err(e) => self.fail(event_loop, e),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                if let Some(mut gpu) = self.gpu.take()
                    && let Err(e) = gpu.manager.shutdown()
                {
                    warn!("Shutdown failed: {e}");
                }
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(gpu) = &mut self.gpu {
                    gpu.manager.resize(vk::Extent2D {
                        width: size.width,
                        height: size.height,
                    });
                }
            }
            WindowEvent::Focused(false) => self.queue.push(InputEvent::FocusLost),
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(code) = event.physical_key
                    && !event.repeat
                {
                    self.queue.push(InputEvent::Key {
                        code,
                        pressed: event.state.is_pressed(),
                    });
                }
            }
            WindowEvent::MouseInput { state, button, .. } => {
                self.queue.push(InputEvent::MouseButton {
                    button: button.into(),
                    pressed: state.is_pressed(),
                });
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.redraw() {
                    self.fail(event_loop, e);
                }
            }
            _ => {}
        }
    }

    fn device_event(&mut self, _event_loop: &ActiveEventLoop, _id: DeviceId, event: DeviceEvent) {
        if let DeviceEvent::MouseMotion { delta: (dx, dy) } = event {
            self.queue.push(InputEvent::MouseMotion { dx, dy });
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

/// Why the program stopped, and whether the logger was there to see it.
#[derive(Debug)]
enum Failure {
    /// Before logging was initialized.
    Startup(anyhow::Error),
    Runtime(anyhow::Error),
}

impl Failure {
    fn report(&self) {
        match self {
            Failure::Startup(e) => eprintln!("vkdemo: {e:#}"),
            Failure::Runtime(e) => error!("{e:#}"),
        }
    }
}

fn run() -> Result<(), Failure> {
    let config = Config::load_or_default(Path::new(CONFIG_FILE_NAME))
        .context("loading configuration")
        .map_err(Failure::Startup)?;
    vkdemo_core::init_logging(&config.log.filter);
    info!("Starting vkdemo ({:?} demo)", config.demo.kind);

    let event_loop = EventLoop::new()
        .context("creating event loop")
        .map_err(Failure::Runtime)?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop
        .run_app(&mut app)
        .context("running event loop")
        .map_err(Failure::Runtime)?;
    match app.failure.take() {
        Some(err) => Err(Failure::Runtime(err)),
        None => Ok(()),
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(failure) => {
            failure.report();
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_config_is_a_startup_failure() {
        let dir = std::env::temp_dir().join(format!("vkdemo-app-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[render]\nframes_in_flight = \"three\"\n").unwrap();

        let err = Config::load_or_default(&path)
            .context("loading configuration")
            .map_err(Failure::Startup)
            .unwrap_err();
        assert!(matches!(err, Failure::Startup(_)));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_runtime_failure_keeps_context_chain() {
        let failure = Failure::Runtime(anyhow::anyhow!("device lost").context("rendering frame"));
        let Failure::Runtime(err) = failure else {
            panic!("expected a runtime failure");
        };
        assert_eq!(format!("{err:#}"), "rendering frame: device lost");
    }
}
