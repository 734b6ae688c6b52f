//! Platform layer: winit window, Vulkan surface and input.
//!
//! - Window creation and cursor handling via winit
//! - Vulkan surface creation from raw window handles
//! - Input event queue, command mask, cursor delta and edit/play mode

mod input;
mod window;

pub use input::{
    CommandMask, FrameInput, InputEvent, InputMode, InputQueue, InputState, KeyCode, MouseButton,
};
pub use window::{Surface, Window};

pub use winit::event::{DeviceEvent, ElementState, WindowEvent};
pub use winit::event_loop::{ActiveEventLoop, EventLoop};
