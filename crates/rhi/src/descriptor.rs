//! Descriptor set layouts, pools and write helpers.
//!
//! The demos bind per-frame uniforms as `UNIFORM_BUFFER_DYNAMIC`, so one
//! descriptor set covers every frame slot and the slot is chosen by the
//! dynamic offset at bind time.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

pub struct DescriptorSetLayout {
    device: Arc<Device>,
    layout: vk::DescriptorSetLayout,
}

impl DescriptorSetLayout {
    pub fn new(
        device: Arc<Device>,
        bindings: &[vk::DescriptorSetLayoutBinding<'_>],
    ) -> RhiResult<Self> {
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(bindings);
        let layout = unsafe {
            device
                .handle()
                .create_descriptor_set_layout(&create_info, None)
                .map_err(RhiError::creation("descriptor set layout"))?
        };
        debug!("Created descriptor set layout with {} binding(s)", bindings.len());
        Ok(Self { device, layout })
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_set_layout(self.layout, None)
        };
    }
}

/// Descriptor pool. Sets allocated from it are released when it is reset or
/// dropped.
pub struct DescriptorPool {
    device: Arc<Device>,
    pool: vk::DescriptorPool,
}

impl DescriptorPool {
    pub fn new(
        device: Arc<Device>,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> RhiResult<Self> {
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(pool_sizes);
        let pool = unsafe {
            device
                .handle()
                .create_descriptor_pool(&create_info, None)
                .map_err(RhiError::creation("descriptor pool"))?
        };
        Ok(Self { device, pool })
    }

    pub fn allocate(
        &self,
        layouts: &[vk::DescriptorSetLayout],
    ) -> RhiResult<Vec<vk::DescriptorSet>> {
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(layouts);
        unsafe {
            self.device
                .handle()
                .allocate_descriptor_sets(&alloc_info)
                .map_err(RhiError::creation("descriptor sets"))
        }
    }

    /// Return every set to the pool.
    pub fn reset(&self) -> RhiResult<()> {
        unsafe {
            self.device
                .handle()
                .reset_descriptor_pool(self.pool, vk::DescriptorPoolResetFlags::empty())?
        };
        Ok(())
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_pool(self.pool, None)
        };
    }
}

/// A resource to write into one binding of a descriptor set.
#[derive(Debug, Clone, Copy)]
pub enum DescriptorWrite {
    /// A `UNIFORM_BUFFER_DYNAMIC` window of `range` bytes; the slot is picked
    /// by the dynamic offset at bind time.
    Uniform { buffer: vk::Buffer, range: vk::DeviceSize },
    DynamicUniform { buffer: vk::Buffer, range: vk::DeviceSize },
    Storage { buffer: vk::Buffer },
    SampledImage {
        sampler: vk::Sampler,
        view: vk::ImageView,
        layout: vk::ImageLayout,
    },
}

/// Apply `writes` to `set`, one `(binding, resource)` pair each.
pub fn write_descriptor_set(
    device: &Device,
    set: vk::DescriptorSet,
    writes: &[(u32, DescriptorWrite)],
) {
    let buffer_infos: Vec<[vk::DescriptorBufferInfo; 1]> = writes
        .iter()
        .map(|(_, write)| match *write {
            DescriptorWrite::Uniform { buffer, range }
            | DescriptorWrite::DynamicUniform { buffer, range } => [vk::DescriptorBufferInfo {
                buffer,
                offset: 0,
                range,
            }],
            DescriptorWrite::Storage { buffer } => [vk::DescriptorBufferInfo {
                buffer,
                offset: 0,
                range: vk::WHOLE_SIZE,
            }],
            DescriptorWrite::SampledImage { .. } => [vk::DescriptorBufferInfo::default()],
        })
        .collect();
    let image_infos: Vec<[vk::DescriptorImageInfo; 1]> = writes
        .iter()
        .map(|(_, write)| match *write {
            DescriptorWrite::SampledImage {
                sampler,
                view,
                layout,
            } => [vk::DescriptorImageInfo {
                sampler,
                image_view: view,
                image_layout: layout,
            }],
            _ => [vk::DescriptorImageInfo::default()],
        })
        .collect();

    let vk_writes: Vec<vk::WriteDescriptorSet<'_>> = writes
        .iter()
        .enumerate()
        .map(|(i, &(binding, write))| {
            let base = vk::WriteDescriptorSet::default()
                .dst_set(set)
                .dst_binding(binding);
            match write {
                DescriptorWrite::Uniform { .. } => base
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(&buffer_infos[i]),
                DescriptorWrite::DynamicUniform { .. } => base
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC)
                    .buffer_info(&buffer_infos[i]),
                DescriptorWrite::Storage { .. } => base
                    .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                    .buffer_info(&buffer_infos[i]),
                DescriptorWrite::SampledImage { .. } => base
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .image_info(&image_infos[i]),
            }
        })
        .collect();

    unsafe { device.handle().update_descriptor_sets(&vk_writes, &[]) };
}

/// Layout binding shorthands.
pub struct DescriptorBinding;

impl DescriptorBinding {
    pub fn uniform_buffer(
        binding: u32,
        stages: vk::ShaderStageFlags,
    ) -> vk::DescriptorSetLayoutBinding<'static> {
        Self::single(binding, vk::DescriptorType::UNIFORM_BUFFER, stages)
    }

    pub fn dynamic_uniform(
        binding: u32,
        stages: vk::ShaderStageFlags,
    ) -> vk::DescriptorSetLayoutBinding<'static> {
        Self::single(binding, vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, stages)
    }

    pub fn storage_buffer(
        binding: u32,
        stages: vk::ShaderStageFlags,
    ) -> vk::DescriptorSetLayoutBinding<'static> {
        Self::single(binding, vk::DescriptorType::STORAGE_BUFFER, stages)
    }

    pub fn combined_image_sampler(
        binding: u32,
        stages: vk::ShaderStageFlags,
    ) -> vk::DescriptorSetLayoutBinding<'static> {
        Self::single(binding, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, stages)
    }

    fn single(
        binding: u32,
        ty: vk::DescriptorType,
        stages: vk::ShaderStageFlags,
    ) -> vk::DescriptorSetLayoutBinding<'static> {
        vk::DescriptorSetLayoutBinding::default()
            .binding(binding)
            .descriptor_type(ty)
            .descriptor_count(1)
            .stage_flags(stages)
    }
}

/// Pool sizes able to hold `sets` copies of `bindings`.
pub fn pool_sizes_for(
    bindings: &[vk::DescriptorSetLayoutBinding<'_>],
    sets: u32,
) -> Vec<vk::DescriptorPoolSize> {
    let mut sizes: Vec<vk::DescriptorPoolSize> = Vec::new();
    for binding in bindings {
        let count = binding.descriptor_count * sets;
        match sizes.iter_mut().find(|s| s.ty == binding.descriptor_type) {
            Some(size) => size.descriptor_count += count,
            None => sizes.push(vk::DescriptorPoolSize {
                ty: binding.descriptor_type,
                descriptor_count: count,
            }),
        }
    }
    sizes
}
