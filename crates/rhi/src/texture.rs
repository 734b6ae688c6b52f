//! Sampled 2D textures uploaded from RGBA8 pixels.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::barrier::transition_barrier;
use crate::buffer::{Buffer, BufferUsage};
use crate::command::CommandPool;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::image::{Image, ImageDesc};

/// An sRGB texture in SHADER_READ_ONLY_OPTIMAL layout, immutable after upload.
pub struct Texture2D {
    image: Image,
}

impl Texture2D {
    /// Upload tightly packed RGBA8 `pixels` of `width x height`.
    ///
    /// The image goes UNDEFINED -> TRANSFER_DST_OPTIMAL, receives the staging
    /// copy, then TRANSFER_DST_OPTIMAL -> SHADER_READ_ONLY_OPTIMAL.
    pub fn from_rgba8(
        device: Arc<Device>,
        pool: &CommandPool,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> RhiResult<Self> {
        let expected = u64::from(width) * u64::from(height) * 4;
        if pixels.len() as u64 != expected {
            return Err(RhiError::OutOfBounds {
                offset: 0,
                size: pixels.len() as u64,
                capacity: expected,
            });
        }

        let extent = vk::Extent2D { width, height };
        let image = Image::new(
            device.clone(),
            ImageDesc {
                name: "texture",
                extent,
                format: vk::Format::R8G8B8A8_SRGB,
                usage: vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
                aspect: vk::ImageAspectFlags::COLOR,
            },
        )?;
        let staging = Buffer::new_with_data(device, BufferUsage::Staging, pixels)?;

        let to_transfer = transition_barrier(
            image.handle(),
            vk::ImageAspectFlags::COLOR,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )?;
        let to_sampled = transition_barrier(
            image.handle(),
            vk::ImageAspectFlags::COLOR,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )?;

        pool.submit_one_time(|cmd| {
            cmd.pipeline_barrier2(&[to_transfer]);
            cmd.copy_buffer_to_image(staging.handle(), image.handle(), extent);
            cmd.pipeline_barrier2(&[to_sampled]);
        })?;

        debug!(width, height, "Texture uploaded");
        Ok(Self { image })
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.image.view()
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.image.extent()
    }
}
