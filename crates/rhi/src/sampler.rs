//! Texture samplers.

use std::sync::Arc;

use ash::vk;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Upper bound on requested anisotropy.
pub const MAX_ANISOTROPY: f32 = 16.0;

pub struct Sampler {
    device: Arc<Device>,
    sampler: vk::Sampler,
}

impl Sampler {
    /// Linear filtering, repeat addressing, anisotropy up to the device limit.
    pub fn linear_repeat(device: Arc<Device>) -> RhiResult<Self> {
        let anisotropy = clamp_anisotropy(device.limits().max_sampler_anisotropy);
        let info = vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .anisotropy_enable(anisotropy > 1.0)
            .max_anisotropy(anisotropy)
            .max_lod(vk::LOD_CLAMP_NONE);
        Self::create(device, &info)
    }

    /// Shadow-map sampler: anything outside the map reads as fully lit.
    pub fn shadow(device: Arc<Device>) -> RhiResult<Self> {
        let info = vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .mipmap_mode(vk::SamplerMipmapMode::NEAREST)
            .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_BORDER)
            .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_BORDER)
            .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_BORDER)
            .border_color(vk::BorderColor::FLOAT_OPAQUE_WHITE)
            .max_lod(1.0);
        Self::create(device, &info)
    }

    fn create(device: Arc<Device>, info: &vk::SamplerCreateInfo<'_>) -> RhiResult<Self> {
        let sampler = unsafe {
            device
                .handle()
                .create_sampler(info, None)
                .map_err(RhiError::creation("sampler"))?
        };
        Ok(Self { device, sampler })
    }

    #[inline]
    pub fn handle(&self) -> vk::Sampler {
        self.sampler
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe { self.device.handle().destroy_sampler(self.sampler, None) };
    }
}

fn clamp_anisotropy(device_limit: f32) -> f32 {
    device_limit.clamp(1.0, MAX_ANISOTROPY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anisotropy_respects_device_limit() {
        assert_eq!(clamp_anisotropy(8.0), 8.0);
        assert_eq!(clamp_anisotropy(64.0), MAX_ANISOTROPY);
        assert_eq!(clamp_anisotropy(0.0), 1.0);
    }
}
