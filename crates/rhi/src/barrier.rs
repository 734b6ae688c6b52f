//! Image layout transition policy for one-shot uploads.
//!
//! Frame-loop barriers are derived by the render pass graph; this table only
//! covers the transitions recorded outside it. A pair missing from the table
//! is a programming error and surfaces as
//! [`RhiError::UnsupportedLayoutTransition`].

use ash::vk;

use crate::error::{RhiError, RhiResult};

/// Stage and access scopes on either side of a layout transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutTransition {
    pub src_stage: vk::PipelineStageFlags2,
    pub src_access: vk::AccessFlags2,
    pub dst_stage: vk::PipelineStageFlags2,
    pub dst_access: vk::AccessFlags2,
}

/// Look up the synchronization scopes for `old -> new`.
pub fn layout_transition(
    old: vk::ImageLayout,
    new: vk::ImageLayout,
) -> RhiResult<LayoutTransition> {
    use vk::ImageLayout as L;
    match (old, new) {
        (L::UNDEFINED, L::TRANSFER_DST_OPTIMAL) => Ok(LayoutTransition {
            src_stage: vk::PipelineStageFlags2::NONE,
            src_access: vk::AccessFlags2::NONE,
            dst_stage: vk::PipelineStageFlags2::TRANSFER,
            dst_access: vk::AccessFlags2::TRANSFER_WRITE,
        }),
        (L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => Ok(LayoutTransition {
            src_stage: vk::PipelineStageFlags2::TRANSFER,
            src_access: vk::AccessFlags2::TRANSFER_WRITE,
            dst_stage: vk::PipelineStageFlags2::FRAGMENT_SHADER,
            dst_access: vk::AccessFlags2::SHADER_READ,
        }),
        (old, new) => Err(RhiError::UnsupportedLayoutTransition { old, new }),
    }
}

/// Build a whole-image barrier for `old -> new` using the table above.
pub fn transition_barrier(
    image: vk::Image,
    aspect: vk::ImageAspectFlags,
    old: vk::ImageLayout,
    new: vk::ImageLayout,
) -> RhiResult<vk::ImageMemoryBarrier2<'static>> {
    let scopes = layout_transition(old, new)?;
    Ok(vk::ImageMemoryBarrier2::default()
        .src_stage_mask(scopes.src_stage)
        .src_access_mask(scopes.src_access)
        .dst_stage_mask(scopes.dst_stage)
        .dst_access_mask(scopes.dst_access)
        .old_layout(old)
        .new_layout(new)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(full_range(aspect)))
}

/// Every mip level and layer of an image.
pub fn full_range(aspect: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::default()
        .aspect_mask(aspect)
        .level_count(vk::REMAINING_MIP_LEVELS)
        .layer_count(vk::REMAINING_ARRAY_LAYERS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_transition() {
        let t = layout_transition(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )
        .unwrap();
        assert_eq!(t.src_access, vk::AccessFlags2::NONE);
        assert_eq!(t.dst_stage, vk::PipelineStageFlags2::TRANSFER);
        assert_eq!(t.dst_access, vk::AccessFlags2::TRANSFER_WRITE);
    }

    #[test]
    fn test_sample_after_upload_transition() {
        let t = layout_transition(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .unwrap();
        assert_eq!(t.src_access, vk::AccessFlags2::TRANSFER_WRITE);
        assert_eq!(t.dst_stage, vk::PipelineStageFlags2::FRAGMENT_SHADER);
        assert_eq!(t.dst_access, vk::AccessFlags2::SHADER_READ);
    }

    #[test]
    fn test_unknown_transition_names_both_layouts() {
        let err = layout_transition(
            vk::ImageLayout::PRESENT_SRC_KHR,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            RhiError::UnsupportedLayoutTransition {
                old: vk::ImageLayout::PRESENT_SRC_KHR,
                new: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            }
        ));
        let message = err.to_string();
        assert!(message.contains("PRESENT_SRC_KHR"));
        assert!(message.contains("TRANSFER_DST_OPTIMAL"));
    }

    #[test]
    fn test_barrier_carries_layouts() {
        let barrier = transition_barrier(
            vk::Image::null(),
            vk::ImageAspectFlags::COLOR,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )
        .unwrap();
        assert_eq!(barrier.old_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(barrier.new_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        assert_eq!(
            barrier.subresource_range.aspect_mask,
            vk::ImageAspectFlags::COLOR
        );
    }
}
