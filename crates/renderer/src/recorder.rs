//! Records a compiled [`RenderGraph`](crate::graph::RenderGraph) into a
//! Vulkan command buffer.

use std::collections::HashMap;

use ash::vk;

use vkdemo_rhi::barrier::full_range;
use vkdemo_rhi::command::CommandBuffer;
use vkdemo_rhi::image::Image;
use vkdemo_rhi::rendering::{Attachment, LoadOp, RenderingScope};
use vkdemo_rhi::swapchain::Swapchain;
use vkdemo_rhi::{RhiError, RhiResult};

use crate::graph::{Access, CompiledPass, ImageBarrier, PassRecorder, ResourceId, ResourceKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundImage {
    pub image: vk::Image,
    pub view: vk::ImageView,
}

/// The image(s) backing a graph resource. Swapchain resources have one image
/// per swapchain image; everything else has exactly one.
#[derive(Debug, Clone)]
pub struct AttachmentBinding {
    images: Vec<BoundImage>,
    extent: vk::Extent2D,
    aspect: vk::ImageAspectFlags,
}

impl AttachmentBinding {
    pub fn image(&self, image_index: u32) -> Option<BoundImage> {
        if self.images.is_empty() {
            return None;
        }
        self.images
            .get(image_index as usize % self.images.len())
            .copied()
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

/// Maps graph resources to the images recorded against them.
#[derive(Debug, Default)]
pub struct AttachmentBindings {
    bindings: HashMap<ResourceId, AttachmentBinding>,
}

impl AttachmentBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind_image(&mut self, resource: ResourceId, image: &Image) {
        self.bindings.insert(
            resource,
            AttachmentBinding {
                images: vec![BoundImage {
                    image: image.handle(),
                    view: image.view(),
                }],
                extent: image.extent(),
                aspect: image.aspect(),
            },
        );
    }

    pub fn bind_swapchain(&mut self, resource: ResourceId, swapchain: &Swapchain) {
        let images = swapchain
            .images()
            .iter()
            .zip(swapchain.image_views())
            .map(|(&image, &view)| BoundImage { image, view })
            .collect();
        self.bindings.insert(
            resource,
            AttachmentBinding {
                images,
                extent: swapchain.extent(),
                aspect: vk::ImageAspectFlags::COLOR,
            },
        );
    }

    pub fn get(&self, resource: ResourceId) -> RhiResult<&AttachmentBinding> {
        self.bindings.get(&resource).ok_or_else(|| {
            RhiError::InvalidPassDependency(format!("no image bound to {resource:?}"))
        })
    }

    pub fn clear(&mut self) {
        self.bindings.clear();
    }
}

/// [`PassRecorder`] that writes barriers and dynamic rendering scopes.
pub struct VulkanPassRecorder<'a> {
    cmd: &'a CommandBuffer,
    bindings: &'a AttachmentBindings,
    image_index: u32,
    clear_color: [f32; 4],
    extent: vk::Extent2D,
}

impl<'a> VulkanPassRecorder<'a> {
    pub fn new(
        cmd: &'a CommandBuffer,
        bindings: &'a AttachmentBindings,
        image_index: u32,
        clear_color: [f32; 4],
    ) -> Self {
        Self {
            cmd,
            bindings,
            image_index,
            clear_color,
            extent: vk::Extent2D::default(),
        }
    }

    #[inline]
    pub fn command_buffer(&self) -> &'a CommandBuffer {
        self.cmd
    }

    /// Render area of the pass being recorded.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    fn bound(&self, resource: ResourceId) -> RhiResult<(BoundImage, &AttachmentBinding)> {
        let binding = self.bindings.get(resource)?;
        let image = binding.image(self.image_index).ok_or_else(|| {
            RhiError::InvalidPassDependency(format!("{resource:?} has no images"))
        })?;
        Ok((image, binding))
    }
}

impl PassRecorder for VulkanPassRecorder<'_> {
    fn barriers(&mut self, barriers: &[ImageBarrier]) -> RhiResult<()> {
        let vk_barriers = barriers
            .iter()
            .map(|barrier| {
                let (image, binding) = self.bound(barrier.resource)?;
                Ok(barrier.to_vk(image.image, full_range(binding.aspect)))
            })
            .collect::<RhiResult<Vec<_>>>()?;
        self.cmd.pipeline_barrier2(&vk_barriers);
        Ok(())
    }

    fn begin_pass(&mut self, pass: &CompiledPass) -> RhiResult<()> {
        let Some(first) = pass.attachments().first() else {
            // Passes without attachments record outside a rendering scope.
            return Ok(());
        };
        self.extent = self.bindings.get(first.resource)?.extent();
        let mut scope = RenderingScope::new(self.extent);
        for attachment in pass.attachments() {
            let (image, _) = self.bound(attachment.resource)?;
            let load = match (attachment.access, attachment.kind) {
                (Access::ColorAttachmentLoad, _) => LoadOp::Load,
                (_, ResourceKind::Depth) => LoadOp::clear_depth(1.0),
                (_, ResourceKind::Color) => LoadOp::clear_color(self.clear_color),
            };
            let info = Attachment {
                view: image.view,
                layout: attachment.access.layout(attachment.kind),
                load,
                store: attachment.store,
            };
            scope = match attachment.kind {
                ResourceKind::Color => scope.color(info),
                ResourceKind::Depth => scope.depth(info),
            };
        }
        self.cmd.begin_rendering(&scope.info());
        self.cmd.set_viewport_and_scissor(self.extent);
        Ok(())
    }

    fn end_pass(&mut self, pass: &CompiledPass) -> RhiResult<()> {
        if !pass.attachments().is_empty() {
            self.cmd.end_rendering();
        }
        Ok(())
    }
}
