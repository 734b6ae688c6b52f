//! Dynamic rendering scopes (Vulkan 1.3).
//!
//! A [`RenderingScope`] owns the attachment infos a `VkRenderingInfo` points
//! at, so the info can be borrowed for `cmd_begin_rendering` without
//! lifetime juggling at the call site.

use ash::vk;

/// What happens to an attachment's previous contents.
#[derive(Clone, Copy)]
pub enum LoadOp {
    Clear(vk::ClearValue),
    Load,
}

impl std::fmt::Debug for LoadOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Clear(_) => f.write_str("Clear"),
            Self::Load => f.write_str("Load"),
        }
    }
}

impl LoadOp {
    pub fn clear_color(rgba: [f32; 4]) -> Self {
        Self::Clear(vk::ClearValue {
            color: vk::ClearColorValue { float32: rgba },
        })
    }

    pub fn clear_depth(depth: f32) -> Self {
        Self::Clear(vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue { depth, stencil: 0 },
        })
    }
}

/// One color or depth attachment of a rendering scope.
#[derive(Debug, Clone, Copy)]
pub struct Attachment {
    pub view: vk::ImageView,
    pub layout: vk::ImageLayout,
    pub load: LoadOp,
    pub store: bool,
}

impl Attachment {
    fn to_info(self) -> vk::RenderingAttachmentInfo<'static> {
        let (load_op, clear_value) = match self.load {
            LoadOp::Clear(value) => (vk::AttachmentLoadOp::CLEAR, value),
            LoadOp::Load => (vk::AttachmentLoadOp::LOAD, vk::ClearValue::default()),
        };
        let store_op = if self.store {
            vk::AttachmentStoreOp::STORE
        } else {
            vk::AttachmentStoreOp::DONT_CARE
        };
        vk::RenderingAttachmentInfo::default()
            .image_view(self.view)
            .image_layout(self.layout)
            .load_op(load_op)
            .store_op(store_op)
            .clear_value(clear_value)
    }
}

/// Attachments and render area for one `begin_rendering`/`end_rendering` pair.
pub struct RenderingScope {
    render_area: vk::Rect2D,
    colors: Vec<vk::RenderingAttachmentInfo<'static>>,
    depth: Option<vk::RenderingAttachmentInfo<'static>>,
}

impl RenderingScope {
    pub fn new(extent: vk::Extent2D) -> Self {
        Self {
            render_area: vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            },
            colors: Vec::new(),
            depth: None,
        }
    }

    pub fn color(mut self, attachment: Attachment) -> Self {
        self.colors.push(attachment.to_info());
        self
    }

    pub fn depth(mut self, attachment: Attachment) -> Self {
        self.depth = Some(attachment.to_info());
        self
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.render_area.extent
    }

    pub fn info(&self) -> vk::RenderingInfo<'_> {
        let info = vk::RenderingInfo::default()
            .render_area(self.render_area)
            .layer_count(1)
            .color_attachments(&self.colors);
        match &self.depth {
            Some(depth) => info.depth_attachment(depth),
            None => info,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_attachment_info() {
        let attachment = Attachment {
            view: vk::ImageView::null(),
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            load: LoadOp::clear_color([0.1, 0.2, 0.3, 1.0]),
            store: true,
        };
        let info = attachment.to_info();
        assert_eq!(info.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(info.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(unsafe { info.clear_value.color.float32 }, [0.1, 0.2, 0.3, 1.0]);
    }

    #[test]
    fn test_load_attachment_info() {
        let attachment = Attachment {
            view: vk::ImageView::null(),
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            load: LoadOp::Load,
            store: true,
        };
        assert_eq!(attachment.to_info().load_op, vk::AttachmentLoadOp::LOAD);
    }

    #[test]
    fn test_scope_info() {
        let depth = Attachment {
            view: vk::ImageView::null(),
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            load: LoadOp::clear_depth(1.0),
            store: false,
        };
        let scope = RenderingScope::new(vk::Extent2D {
            width: 2048,
            height: 2048,
        })
        .depth(depth);
        let info = scope.info();
        assert_eq!(info.color_attachment_count, 0);
        assert!(!info.p_depth_attachment.is_null());
        assert_eq!(info.render_area.extent.width, 2048);
    }
}
