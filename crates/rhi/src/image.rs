//! Device-local 2D images with a single view.

use std::sync::{Arc, PoisonError};

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, error};

use crate::barrier::full_range;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Depth format for scene depth buffers and shadow maps.
pub const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

#[derive(Debug, Clone, Copy)]
pub struct ImageDesc {
    pub name: &'static str,
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
    pub aspect: vk::ImageAspectFlags,
}

/// GPU-only image, its allocation and a 2D view over it.
pub struct Image {
    device: Arc<Device>,
    image: vk::Image,
    view: vk::ImageView,
    allocation: Option<Allocation>,
    desc: ImageDesc,
}

impl Image {
    pub fn new(device: Arc<Device>, desc: ImageDesc) -> RhiResult<Self> {
        if desc.extent.width == 0 || desc.extent.height == 0 {
            return Err(RhiError::ResourceCreation {
                what: desc.name,
                source: vk::Result::ERROR_INITIALIZATION_FAILED,
            });
        }

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(desc.format)
            .extent(vk::Extent3D {
                width: desc.extent.width,
                height: desc.extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        let image = unsafe {
            device
                .handle()
                .create_image(&image_info, None)
                .map_err(RhiError::creation(desc.name))?
        };

        // From here on `created` owns the handles, so early returns clean up.
        let mut created = Self {
            device,
            image,
            view: vk::ImageView::null(),
            allocation: None,
            desc,
        };

        let requirements = unsafe {
            created
                .device
                .handle()
                .get_image_memory_requirements(image)
        };
        let allocation = created
            .device
            .allocator()
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .allocate(&AllocationCreateDesc {
                name: desc.name,
                requirements,
                location: MemoryLocation::GpuOnly,
                linear: false,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })?;
        let (memory, offset) = unsafe { (allocation.memory(), allocation.offset()) };
        created.allocation = Some(allocation);
        unsafe {
            created
                .device
                .handle()
                .bind_image_memory(image, memory, offset)
                .map_err(RhiError::creation(desc.name))?
        };

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(desc.format)
            .subresource_range(full_range(desc.aspect));
        created.view = unsafe {
            created
                .device
                .handle()
                .create_image_view(&view_info, None)
                .map_err(RhiError::creation("image view"))?
        };

        debug!(
            name = desc.name,
            width = desc.extent.width,
            height = desc.extent.height,
            format = ?desc.format,
            "Image created"
        );
        Ok(created)
    }

    /// D32 depth image usable both as an attachment and as a sampled image,
    /// so it can serve as a shadow map.
    pub fn depth(device: Arc<Device>, extent: vk::Extent2D, format: vk::Format) -> RhiResult<Self> {
        Self::new(
            device,
            ImageDesc {
                name: "depth image",
                extent,
                format,
                usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT
                    | vk::ImageUsageFlags::SAMPLED,
                aspect: vk::ImageAspectFlags::DEPTH,
            },
        )
    }

    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.desc.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.desc.extent
    }

    #[inline]
    pub fn aspect(&self) -> vk::ImageAspectFlags {
        self.desc.aspect
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            if self.view != vk::ImageView::null() {
                self.device.handle().destroy_image_view(self.view, None);
            }
        }
        if let Some(allocation) = self.allocation.take() {
            let mut allocator = self
                .device
                .allocator()
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if let Err(e) = allocator.free(allocation) {
                error!("Failed to free {} allocation: {e:?}", self.desc.name);
            }
        }
        unsafe { self.device.handle().destroy_image(self.image, None) };
    }
}
