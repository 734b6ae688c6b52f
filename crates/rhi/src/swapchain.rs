//! Swapchain creation, recreation, image acquisition and presentation.
//!
//! The selection rules (format, present mode, extent, image count) are plain
//! functions over surface query results so they can be tested without a GPU.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;

/// Smallest image count the frame pipeline can work with.
pub const MIN_SWAPCHAIN_IMAGES: u32 = 2;

/// Surface support details queried from a physical device.
#[derive(Debug, Clone)]
pub struct SwapchainSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupport {
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        loader: &ash::khr::surface::Instance,
    ) -> RhiResult<Self> {
        let capabilities = unsafe {
            loader.get_physical_device_surface_capabilities(physical_device, surface)?
        };
        let formats =
            unsafe { loader.get_physical_device_surface_formats(physical_device, surface)? };
        let present_modes = unsafe {
            loader.get_physical_device_surface_present_modes(physical_device, surface)?
        };
        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// Resolve every swapchain parameter, or explain why the surface cannot
    /// be used.
    pub fn resolve(
        &self,
        requested: vk::Extent2D,
        preferred_mode: vk::PresentModeKHR,
    ) -> RhiResult<SwapchainParams> {
        if self.formats.is_empty() {
            return Err(RhiError::SurfaceIncompatible(
                "surface reports no formats".to_string(),
            ));
        }
        Ok(SwapchainParams {
            surface_format: choose_surface_format(&self.formats),
            present_mode: choose_present_mode(&self.present_modes, preferred_mode),
            extent: choose_extent(&self.capabilities, requested),
            image_count: determine_image_count(&self.capabilities)?,
            pre_transform: self.capabilities.current_transform,
        })
    }
}

/// The parameters a swapchain is (re)created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainParams {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

/// Swapchain plus one color view per image.
///
/// Images belong to the swapchain and are released with it; only the views
/// are destroyed explicitly.
pub struct Swapchain {
    device: Arc<Device>,
    loader: ash::khr::swapchain::Device,
    surface_loader: ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    params: SwapchainParams,
    preferred_mode: vk::PresentModeKHR,
}

impl Swapchain {
    /// Create a swapchain for `surface` at roughly `requested` pixels.
    ///
    /// `preferred_mode` is honored when the surface supports it, FIFO otherwise.
    pub fn new(
        instance: &Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        requested: vk::Extent2D,
        preferred_mode: vk::PresentModeKHR,
    ) -> RhiResult<Self> {
        let loader = ash::khr::swapchain::Device::new(instance.handle(), device.handle());
        let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());

        let mut swapchain = Self {
            device,
            loader,
            surface_loader,
            surface,
            swapchain: vk::SwapchainKHR::null(),
            images: Vec::new(),
            image_views: Vec::new(),
            params: SwapchainParams {
                surface_format: vk::SurfaceFormatKHR::default(),
                present_mode: vk::PresentModeKHR::FIFO,
                extent: requested,
                image_count: 0,
                pre_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            },
            preferred_mode,
        };
        swapchain.build(requested)?;
        Ok(swapchain)
    }

    /// Rebuild the swapchain for a new window size.
    ///
    /// The device is idled first, so no in-flight work can still reference the
    /// old images. The old handle is passed to the driver and retired after the
    /// new one exists.
    pub fn recreate(&mut self, requested: vk::Extent2D) -> RhiResult<()> {
        self.device.wait_idle()?;
        info!(
            "Recreating swapchain: {}x{}",
            requested.width, requested.height
        );
        self.build(requested)
    }

    fn build(&mut self, requested: vk::Extent2D) -> RhiResult<()> {
        let support = SwapchainSupport::query(
            self.device.physical_device(),
            self.surface,
            &self.surface_loader,
        )?;
        let params = support.resolve(requested, self.preferred_mode)?;

        let families = self.device.queue_families();
        let (Some(graphics), Some(present)) = (families.graphics_family, families.present_family)
        else {
            return Err(RhiError::NoSuitableGpu);
        };
        let family_indices = [graphics, present];
        let (sharing_mode, shared_families) = if graphics != present {
            (vk::SharingMode::CONCURRENT, &family_indices[..])
        } else {
            (vk::SharingMode::EXCLUSIVE, &[][..])
        };

        let old_swapchain = self.swapchain;
        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface)
            .min_image_count(params.image_count)
            .image_format(params.surface_format.format)
            .image_color_space(params.surface_format.color_space)
            .image_extent(params.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(shared_families)
            .pre_transform(params.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(params.present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let swapchain = unsafe {
            self.loader
                .create_swapchain(&create_info, None)
                .map_err(RhiError::creation("swapchain"))?
        };

        self.destroy_image_views();
        if old_swapchain != vk::SwapchainKHR::null() {
            unsafe { self.loader.destroy_swapchain(old_swapchain, None) };
        }
        self.swapchain = swapchain;
        self.params = params;

        self.images = unsafe { self.loader.get_swapchain_images(swapchain)? };
        self.image_views = self
            .images
            .iter()
            .map(|&image| create_color_view(&self.device, image, params.surface_format.format))
            .collect::<RhiResult<Vec<_>>>()?;

        info!(
            extent = ?params.extent,
            format = ?params.surface_format.format,
            present_mode = ?params.present_mode,
            images = self.images.len(),
            "Swapchain ready"
        );
        Ok(())
    }

    /// Acquire the next presentable image, signalling `semaphore` when it is
    /// ready.
    ///
    /// Returns `(image_index, suboptimal)`. An out-of-date swapchain is
    /// reported as [`RhiError::SwapchainOutOfDate`], a timeout as
    /// [`RhiError::FrameTimeout`].
    pub fn acquire_next_image(
        &self,
        semaphore: vk::Semaphore,
        timeout_ns: u64,
    ) -> RhiResult<(u32, bool)> {
        let result = unsafe {
            self.loader
                .acquire_next_image(self.swapchain, timeout_ns, semaphore, vk::Fence::null())
        };
        match result {
            Ok(acquired) => Ok(acquired),
            Err(vk::Result::TIMEOUT | vk::Result::NOT_READY) => Err(RhiError::FrameTimeout {
                what: "swapchain image",
                timeout_ns,
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Queue `image_index` for presentation once `wait_semaphore` signals.
    ///
    /// Returns whether the swapchain is suboptimal.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> RhiResult<bool> {
        let swapchains = [self.swapchain];
        let indices = [image_index];
        let waits = [wait_semaphore];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&waits)
            .swapchains(&swapchains)
            .image_indices(&indices);
        unsafe { Ok(self.loader.queue_present(queue, &present_info)?) }
    }

    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.params.surface_format.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.params.extent
    }

    #[inline]
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.params.present_mode
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    #[inline]
    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    #[inline]
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    fn destroy_image_views(&mut self) {
        for view in self.image_views.drain(..) {
            unsafe { self.device.handle().destroy_image_view(view, None) };
        }
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.destroy_image_views();
        if self.swapchain != vk::SwapchainKHR::null() {
            unsafe { self.loader.destroy_swapchain(self.swapchain, None) };
            debug!("Swapchain destroyed");
        }
    }
}

/// Pick B8G8R8A8_SRGB / SRGB_NONLINEAR when offered, otherwise the first
/// entry. `formats` must not be empty.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    let preferred = formats.iter().find(|f| {
        f.format == vk::Format::B8G8R8A8_SRGB && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
    });
    match preferred {
        Some(&format) => format,
        None => {
            warn!(
                "B8G8R8A8_SRGB unavailable, using {:?} / {:?}",
                formats[0].format, formats[0].color_space
            );
            formats[0]
        }
    }
}

/// Use `preferred` when supported; FIFO is always available.
pub fn choose_present_mode(
    present_modes: &[vk::PresentModeKHR],
    preferred: vk::PresentModeKHR,
) -> vk::PresentModeKHR {
    if present_modes.contains(&preferred) {
        preferred
    } else {
        debug!("{preferred:?} unsupported, falling back to FIFO");
        vk::PresentModeKHR::FIFO
    }
}

/// The surface's current extent, unless the surface lets the application
/// decide (width `u32::MAX`), in which case `requested` is clamped to limits.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    requested: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }
    let min = capabilities.min_image_extent;
    let max = capabilities.max_image_extent;
    vk::Extent2D {
        width: requested.width.clamp(min.width, max.width),
        height: requested.height.clamp(min.height, max.height),
    }
}

/// One image more than the minimum, capped by the maximum (0 means no cap).
pub fn determine_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> RhiResult<u32> {
    let max = capabilities.max_image_count;
    if max != 0 && max < MIN_SWAPCHAIN_IMAGES {
        return Err(RhiError::SurfaceIncompatible(format!(
            "surface allows at most {max} image(s), need {MIN_SWAPCHAIN_IMAGES}"
        )));
    }
    let preferred = (capabilities.min_image_count + 1).max(MIN_SWAPCHAIN_IMAGES);
    Ok(if max > 0 { preferred.min(max) } else { preferred })
}

fn create_color_view(
    device: &Device,
    image: vk::Image,
    format: vk::Format,
) -> RhiResult<vk::ImageView> {
    let create_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(vk::ImageAspectFlags::COLOR)
                .level_count(1)
                .layer_count(1),
        );
    unsafe {
        device
            .handle()
            .create_image_view(&create_info, None)
            .map_err(RhiError::creation("swapchain image view"))
    }
}
