//! Runtime configuration loaded from `vkdemo.toml`.
//!
//! Every field has a default so an absent file, or a file that only sets a
//! few keys, still produces a complete [`Config`].

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// File looked up in the working directory at startup.
pub const CONFIG_FILE_NAME: &str = "vkdemo.toml";

/// Complete application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub render: RenderConfig,
    pub camera: CameraConfig,
    pub demo: DemoConfig,
    pub ui: UiConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            title: "vkdemo".to_string(),
        }
    }
}

/// Presentation pacing requested by the user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentModePreference {
    #[default]
    Fifo,
    Mailbox,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Requested frames in flight; clamped by [`RenderConfig::frames_in_flight`].
    pub frames_in_flight: usize,
    pub present_mode: PresentModePreference,
    pub validation: bool,
    /// Upper bound for fence waits and image acquisition.
    pub frame_timeout_ms: u64,
    pub clear_color: [f32; 4],
}

impl RenderConfig {
    pub const MIN_FRAMES_IN_FLIGHT: usize = 2;
    pub const MAX_FRAMES_IN_FLIGHT: usize = 3;

    /// Frames in flight, clamped to the supported range.
    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
            .clamp(Self::MIN_FRAMES_IN_FLIGHT, Self::MAX_FRAMES_IN_FLIGHT)
    }

    /// Timeout in nanoseconds, the unit Vulkan waits take.
    pub fn frame_timeout_ns(&self) -> u64 {
        self.frame_timeout_ms.saturating_mul(1_000_000)
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 3,
            present_mode: PresentModePreference::Fifo,
            validation: cfg!(debug_assertions),
            frame_timeout_ms: 1000,
            clear_color: [0.1, 0.1, 0.12, 1.0],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub cursor_sensitivity: f32,
    pub move_speed: f32,
    pub fov_deg: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            cursor_sensitivity: 0.5,
            move_speed: 0.1,
            fov_deg: 45.0,
            near: 0.03,
            far: 500.0,
        }
    }
}

/// Which demo controller the application runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DemoKind {
    #[default]
    Shadow,
    Mesh,
    Pbr,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    pub kind: DemoKind,
    pub asset_root: PathBuf,
    /// OBJ model relative to `asset_root`; a procedural mesh is used when unset.
    pub model: Option<PathBuf>,
    /// Texture relative to `asset_root`; a checkerboard is used when unset.
    pub texture: Option<PathBuf>,
}

impl DemoConfig {
    pub fn shader_dir(&self) -> PathBuf {
        self.asset_root.join("shaders")
    }

    pub fn model_path(&self) -> Option<PathBuf> {
        self.model.as_ref().map(|p| self.asset_root.join(p))
    }

    pub fn texture_path(&self) -> Option<PathBuf> {
        self.texture.as_ref().map(|p| self.asset_root.join(p))
    }
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            kind: DemoKind::Shadow,
            asset_root: PathBuf::from("assets"),
            model: None,
            texture: None,
        }
    }
}

/// Where the demo's UI widgets end up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayKind {
    /// Drawn on the GPU in the UI pass.
    #[default]
    Imgui,
    /// Written into the window title.
    Title,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub overlay: OverlayKind,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info,vkdemo=debug".to_string(),
        }
    }
}

impl Config {
    /// Parse configuration from TOML text.
    pub fn from_toml_str(text: &str, origin: &Path) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Load `path`, falling back to defaults when the file does not exist.
    ///
    /// A file that exists but fails to parse is an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(text) => {
                let config = Self::from_toml_str(&text, path)?;
                info!("Loaded configuration from {}", path.display());
                Ok(config)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No {} found, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(Error::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.window.width, 1280);
        assert_eq!(config.render.frames_in_flight(), 3);
        assert_eq!(config.render.present_mode, PresentModePreference::Fifo);
        assert_eq!(config.camera.cursor_sensitivity, 0.5);
        assert_eq!(config.demo.kind, DemoKind::Shadow);
        assert!(config.demo.model_path().is_none());
        assert_eq!(config.ui.overlay, OverlayKind::Imgui);
    }

    #[test]
    fn test_pbr_demo_with_title_overlay() {
        let text = r#"
            [demo]
            kind = "pbr"

            [ui]
            overlay = "title"
        "#;
        let config = Config::from_toml_str(text, Path::new("test.toml")).unwrap();
        assert_eq!(config.demo.kind, DemoKind::Pbr);
        assert_eq!(config.ui.overlay, OverlayKind::Title);
        assert!(Config::from_toml_str("[ui]\noverlay = \"html\"\n", Path::new("bad.toml")).is_err());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let text = r#"
            [render]
            frames_in_flight = 2
            present_mode = "mailbox"

            [demo]
            kind = "mesh"
            model = "models/bunny.obj"
        "#;
        let config = Config::from_toml_str(text, Path::new("test.toml")).unwrap();
        assert_eq!(config.render.frames_in_flight(), 2);
        assert_eq!(config.render.present_mode, PresentModePreference::Mailbox);
        assert_eq!(config.render.frame_timeout_ms, 1000);
        assert_eq!(config.demo.kind, DemoKind::Mesh);
        assert_eq!(
            config.demo.model_path(),
            Some(PathBuf::from("assets/models/bunny.obj"))
        );
        assert_eq!(config.window.title, "vkdemo");
    }

    #[test]
    fn test_frames_in_flight_clamped() {
        let mut render = RenderConfig::default();
        render.frames_in_flight = 0;
        assert_eq!(render.frames_in_flight(), 2);
        render.frames_in_flight = 8;
        assert_eq!(render.frames_in_flight(), 3);
    }

    #[test]
    fn test_malformed_file_is_error() {
        let err = Config::from_toml_str("[render\nframes = ", Path::new("bad.toml")).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = Config::load_or_default(Path::new("definitely/not/here.toml")).unwrap();
        assert_eq!(config.window.height, 720);
    }
}
