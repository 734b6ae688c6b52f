//! GPU selection.
//!
//! A device qualifies when it speaks Vulkan 1.3, supports sampler
//! anisotropy, and has a graphics queue family plus a family that can
//! present to the window surface. Among qualifying devices discrete GPUs
//! win, then the one with more device-local memory.

use ash::vk;
use tracing::{debug, info};

use crate::error::{RhiError, RhiResult};

/// Graphics and present queue family indices.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics_family: Option<u32>,
    pub present_family: Option<u32>,
}

impl QueueFamilyIndices {
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.graphics_family.is_some() && self.present_family.is_some()
    }

    /// Distinct families, graphics first; one queue is created per entry.
    pub fn unique_families(&self) -> Vec<u32> {
        let mut families = Vec::with_capacity(2);
        families.extend(self.graphics_family);
        if let Some(present) = self.present_family
            && !families.contains(&present)
        {
            families.push(present);
        }
        families
    }

    /// Pick indices from per-family (supports graphics, supports present) flags.
    ///
    /// A family that does both is preferred so swapchain images can stay in
    /// exclusive sharing mode.
    pub fn from_capabilities(families: &[(bool, bool)]) -> Self {
        if let Some(both) = families.iter().position(|&(g, p)| g && p) {
            let index = both as u32;
            return Self {
                graphics_family: Some(index),
                present_family: Some(index),
            };
        }
        Self {
            graphics_family: families.iter().position(|&(g, _)| g).map(|i| i as u32),
            present_family: families.iter().position(|&(_, p)| p).map(|i| i as u32),
        }
    }
}

/// Everything about the selected GPU that later stages need.
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    pub device: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub queue_families: QueueFamilyIndices,
}

impl PhysicalDeviceInfo {
    pub fn device_name(&self) -> &str {
        self.properties
            .device_name_as_c_str()
            .ok()
            .and_then(|name| name.to_str().ok())
            .unwrap_or("Unknown Device")
    }

    /// Dynamic uniform offsets must be multiples of this (a power of two).
    pub fn min_uniform_buffer_offset_alignment(&self) -> u64 {
        self.properties.limits.min_uniform_buffer_offset_alignment
    }

    pub fn non_coherent_atom_size(&self) -> u64 {
        self.properties.limits.non_coherent_atom_size
    }

    pub fn max_sampler_anisotropy(&self) -> f32 {
        self.properties.limits.max_sampler_anisotropy
    }

    pub fn device_local_memory(&self) -> u64 {
        self.memory_properties
            .memory_heaps
            .iter()
            .take(self.memory_properties.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size)
            .sum()
    }
}

impl std::fmt::Debug for PhysicalDeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.device_name())
            .field("type", &self.properties.device_type)
            .field("queue_families", &self.queue_families)
            .finish()
    }
}

/// Select the best GPU able to render to and present on `surface`.
pub fn select_physical_device(
    instance: &ash::Instance,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> RhiResult<PhysicalDeviceInfo> {
    let devices = unsafe { instance.enumerate_physical_devices()? };
    info!("Found {} GPU(s)", devices.len());

    let selected = devices
        .into_iter()
        .filter_map(|device| check_device(instance, device, surface, surface_loader))
        .max_by_key(|info| {
            device_score(info.properties.device_type, info.device_local_memory())
        })
        .ok_or(RhiError::NoSuitableGpu)?;

    info!(
        "Selected GPU '{}' ({:?}), minUniformBufferOffsetAlignment={}",
        selected.device_name(),
        selected.properties.device_type,
        selected.min_uniform_buffer_offset_alignment()
    );
    Ok(selected)
}

fn check_device(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Option<PhysicalDeviceInfo> {
    let properties = unsafe { instance.get_physical_device_properties(device) };
    let features = unsafe { instance.get_physical_device_features(device) };
    let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };
    let name = properties
        .device_name_as_c_str()
        .unwrap_or(c"Unknown")
        .to_string_lossy()
        .into_owned();

    if !supports_vulkan_1_3(properties.api_version) {
        debug!("GPU '{name}' skipped: Vulkan 1.3 not supported");
        return None;
    }
    if features.sampler_anisotropy == vk::FALSE {
        debug!("GPU '{name}' skipped: sampler anisotropy not supported");
        return None;
    }

    let families = unsafe { instance.get_physical_device_queue_family_properties(device) };
    let capabilities: Vec<(bool, bool)> = families
        .iter()
        .enumerate()
        .map(|(i, family)| {
            let graphics = family.queue_count > 0
                && family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
            let present = unsafe {
                surface_loader
                    .get_physical_device_surface_support(device, i as u32, surface)
                    .unwrap_or(false)
            };
            (graphics, present)
        })
        .collect();
    let queue_families = QueueFamilyIndices::from_capabilities(&capabilities);
    if !queue_families.is_complete() {
        debug!("GPU '{name}' skipped: no graphics/present queue family");
        return None;
    }

    Some(PhysicalDeviceInfo {
        device,
        properties,
        memory_properties,
        queue_families,
    })
}

fn supports_vulkan_1_3(api_version: u32) -> bool {
    (vk::api_version_major(api_version), vk::api_version_minor(api_version)) >= (1, 3)
}

fn device_score(device_type: vk::PhysicalDeviceType, device_local_bytes: u64) -> u64 {
    let type_score = match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 4,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 3,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
        vk::PhysicalDeviceType::CPU => 1,
        _ => 0,
    };
    // Memory only breaks ties within a device type.
    (type_score << 48) | (device_local_bytes >> 20).min((1 << 48) - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefers_family_with_graphics_and_present() {
        let indices = QueueFamilyIndices::from_capabilities(&[
            (true, false),
            (false, true),
            (true, true),
        ]);
        assert_eq!(indices.graphics_family, Some(2));
        assert_eq!(indices.present_family, Some(2));
        assert_eq!(indices.unique_families(), vec![2]);
    }

    #[test]
    fn test_split_families() {
        let indices = QueueFamilyIndices::from_capabilities(&[(true, false), (false, true)]);
        assert!(indices.is_complete());
        assert_eq!(indices.unique_families(), vec![0, 1]);
    }

    #[test]
    fn test_incomplete_without_present() {
        let indices = QueueFamilyIndices::from_capabilities(&[(true, false)]);
        assert!(!indices.is_complete());
    }

    #[test]
    fn test_version_gate() {
        assert!(supports_vulkan_1_3(vk::make_api_version(0, 1, 3, 0)));
        assert!(supports_vulkan_1_3(vk::make_api_version(0, 1, 4, 0)));
        assert!(!supports_vulkan_1_3(vk::make_api_version(0, 1, 2, 198)));
    }

    #[test]
    fn test_discrete_beats_integrated_regardless_of_memory() {
        let discrete = device_score(vk::PhysicalDeviceType::DISCRETE_GPU, 2 << 30);
        let integrated = device_score(vk::PhysicalDeviceType::INTEGRATED_GPU, 64 << 30);
        assert!(discrete > integrated);
        let bigger = device_score(vk::PhysicalDeviceType::DISCRETE_GPU, 8 << 30);
        assert!(bigger > discrete);
    }
}
