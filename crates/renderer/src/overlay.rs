//! UI overlay seam.
//!
//! Demos push widgets into a [`UiFrame`] from `draw_ui`; an [`UiOverlay`]
//! turns them into output inside the graph's UI pass. The GPU overlay lives
//! in [`crate::imgui_overlay`]; [`TitleOverlay`] publishes the widgets as the
//! window title instead.

use std::fmt::{self, Display};
use std::time::{Duration, Instant};

use vkdemo_rhi::RhiResult;
use vkdemo_rhi::command::CommandBuffer;

use crate::demo::FrameContext;

/// How often [`TitleOverlay`] republishes the title.
pub const TITLE_REFRESH: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, PartialEq)]
pub enum Widget {
    Text(String),
    Value { label: String, value: String },
}

impl Display for Widget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Value { label, value } => write!(f, "{label}: {value}"),
        }
    }
}

/// Widgets collected for one frame.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct UiFrame {
    widgets: Vec<Widget>,
}

impl UiFrame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&mut self, text: impl Into<String>) {
        self.widgets.push(Widget::Text(text.into()));
    }

    pub fn value(&mut self, label: impl Into<String>, value: impl Display) {
        self.widgets.push(Widget::Value {
            label: label.into(),
            value: value.to_string(),
        });
    }

    pub fn widgets(&self) -> &[Widget] {
        &self.widgets
    }

    pub fn is_empty(&self) -> bool {
        self.widgets.is_empty()
    }

    pub fn clear(&mut self) {
        self.widgets.clear();
    }
}

pub trait UiOverlay {
    /// Start a new frame; returns the cleared widget list.
    fn begin_frame(&mut self) -> &mut UiFrame;

    /// Emit the frame's widgets. Called inside the UI pass, while the
    /// frame's slot is recording.
    fn render(&mut self, cmd: &CommandBuffer, frame: &FrameContext) -> RhiResult<()>;

    /// A new window title, for overlays that publish one.
    fn take_title(&mut self) -> Option<String> {
        None
    }
}

/// Overlay that writes its widgets into the window title.
///
/// The title is rebuilt at most once per [`TITLE_REFRESH`]; the owner of the
/// window collects it with [`take_title`](Self::take_title).
#[derive(Debug)]
pub struct TitleOverlay {
    base: String,
    frame: UiFrame,
    refresh: Duration,
    last_published: Option<Instant>,
    pending: Option<String>,
}

impl TitleOverlay {
    pub fn new(base: impl Into<String>) -> Self {
        Self::with_refresh(base, TITLE_REFRESH)
    }

    pub fn with_refresh(base: impl Into<String>, refresh: Duration) -> Self {
        Self {
            base: base.into(),
            frame: UiFrame::new(),
            refresh,
            last_published: None,
            pending: None,
        }
    }

    pub fn compose(&self) -> String {
        let mut title = self.base.clone();
        for widget in self.frame.widgets() {
            title.push_str(" | ");
            title.push_str(&widget.to_string());
        }
        title
    }

    fn publish_at(&mut self, now: Instant) {
        let due = self
            .last_published
            .is_none_or(|last| now.saturating_duration_since(last) >= self.refresh);
        if due {
            self.pending = Some(self.compose());
            self.last_published = Some(now);
        }
    }
}

impl UiOverlay for TitleOverlay {
    fn begin_frame(&mut self) -> &mut UiFrame {
        self.frame.clear();
        &mut self.frame
    }

    fn render(&mut self, _cmd: &CommandBuffer, _frame: &FrameContext) -> RhiResult<()> {
        self.publish_at(Instant::now());
        Ok(())
    }

    /// The latest title not yet handed out.
    fn take_title(&mut self) -> Option<String> {
        self.pending.take()
    }
}
