//! Core utilities shared by every vkdemo crate.
//!
//! - Error root type and result alias
//! - Logging bootstrap
//! - Frame timing
//! - TOML configuration

mod config;
mod error;
mod logging;
mod timer;

pub use config::{
    CameraConfig, Config, DemoConfig, DemoKind, LogConfig, OverlayKind, PresentModePreference,
    RenderConfig, UiConfig, WindowConfig, CONFIG_FILE_NAME,
};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use timer::FrameTimer;
