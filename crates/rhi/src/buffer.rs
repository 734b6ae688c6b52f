//! GPU buffers backed by `gpu-allocator`.
//!
//! - Host-visible buffers ([`Buffer::new`]) stay persistently mapped and are
//!   written in place: uniforms, per-frame storage, staging.
//! - Device-local buffers ([`Buffer::new_device_local`]) are filled once through a
//!   staging copy: vertex and index data.

use std::sync::{Arc, PoisonError};

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, error};

use crate::command::CommandPool;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// What a buffer is bound as.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    Vertex,
    Index,
    Uniform,
    Storage,
    Staging,
}

impl BufferUsage {
    pub fn to_vk_usage(self) -> vk::BufferUsageFlags {
        match self {
            Self::Vertex => vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
            Self::Index => vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
            Self::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
            Self::Storage => {
                vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            Self::Staging => vk::BufferUsageFlags::TRANSFER_SRC,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Vertex => "vertex buffer",
            Self::Index => "index buffer",
            Self::Uniform => "uniform buffer",
            Self::Storage => "storage buffer",
            Self::Staging => "staging buffer",
        }
    }
}

/// A `VkBuffer` and the allocation bound to it.
pub struct Buffer {
    device: Arc<Device>,
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    size: vk::DeviceSize,
    usage: BufferUsage,
}

impl Buffer {
    /// Create a persistently mapped, host-visible buffer.
    pub fn new(device: Arc<Device>, usage: BufferUsage, size: vk::DeviceSize) -> RhiResult<Self> {
        Self::allocate(device, usage, size, MemoryLocation::CpuToGpu)
    }

    /// Create a host-visible buffer holding `data`.
    pub fn new_with_data(device: Arc<Device>, usage: BufferUsage, data: &[u8]) -> RhiResult<Self> {
        let mut buffer = Self::new(device, usage, data.len() as vk::DeviceSize)?;
        buffer.write(0, data)?;
        Ok(buffer)
    }

    /// Create a device-local buffer and fill it from a temporary staging
    /// buffer. Blocks until the copy has completed.
    pub fn new_device_local(
        device: Arc<Device>,
        pool: &CommandPool,
        usage: BufferUsage,
        data: &[u8],
    ) -> RhiResult<Self> {
        let size = data.len() as vk::DeviceSize;
        let staging = Self::new_with_data(device.clone(), BufferUsage::Staging, data)?;
        let buffer = Self::allocate(device, usage, size, MemoryLocation::GpuOnly)?;

        pool.submit_one_time(|cmd| cmd.copy_buffer(staging.handle(), buffer.handle(), size))?;
        debug!(usage = usage.name(), size, "Staged upload complete");
        Ok(buffer)
    }

    fn allocate(
        device: Arc<Device>,
        usage: BufferUsage,
        size: vk::DeviceSize,
        location: MemoryLocation,
    ) -> RhiResult<Self> {
        if size == 0 {
            return Err(RhiError::ResourceCreation {
                what: usage.name(),
                source: vk::Result::ERROR_INITIALIZATION_FAILED,
            });
        }

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage.to_vk_usage())
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = unsafe {
            device
                .handle()
                .create_buffer(&buffer_info, None)
                .map_err(RhiError::creation(usage.name()))?
        };
        let requirements = unsafe { device.handle().get_buffer_memory_requirements(buffer) };

        let allocation = device
            .allocator()
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .allocate(&AllocationCreateDesc {
                name: usage.name(),
                requirements,
                location,
                linear: true,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.handle().destroy_buffer(buffer, None) };
                return Err(e.into());
            }
        };

        let bound = unsafe {
            device
                .handle()
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
        };
        let created = Self {
            device,
            buffer,
            allocation: Some(allocation),
            size,
            usage,
        };
        bound?;
        debug!(usage = usage.name(), size, ?location, "Buffer created");
        Ok(created)
    }

    fn mapped_allocation(&self) -> RhiResult<&Allocation> {
        self.allocation
            .as_ref()
            .filter(|allocation| allocation.mapped_ptr().is_some())
            .ok_or(RhiError::ResourceCreation {
                what: "host mapping",
                source: vk::Result::ERROR_MEMORY_MAP_FAILED,
            })
    }

    fn check_range(&self, offset: vk::DeviceSize, size: vk::DeviceSize) -> RhiResult<()> {
        match offset.checked_add(size) {
            Some(end) if end <= self.size => Ok(()),
            _ => Err(RhiError::OutOfBounds {
                offset,
                size,
                capacity: self.size,
            }),
        }
    }

    /// Copy `data` into the mapping at `offset`.
    pub fn write(&mut self, offset: vk::DeviceSize, data: &[u8]) -> RhiResult<()> {
        self.check_range(offset, data.len() as vk::DeviceSize)?;
        let Some(mapped) = self
            .allocation
            .as_mut()
            .and_then(|allocation| allocation.mapped_slice_mut())
        else {
            return Err(RhiError::ResourceCreation {
                what: "host mapping",
                source: vk::Result::ERROR_MEMORY_MAP_FAILED,
            });
        };
        let start = offset as usize;
        mapped[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Borrow `size` mapped bytes starting at `offset`.
    pub fn read(&self, offset: vk::DeviceSize, size: vk::DeviceSize) -> RhiResult<&[u8]> {
        self.check_range(offset, size)?;
        let Some(mapped) = self.mapped_allocation()?.mapped_slice() else {
            return Err(RhiError::ResourceCreation {
                what: "host mapping",
                source: vk::Result::ERROR_MEMORY_MAP_FAILED,
            });
        };
        let start = offset as usize;
        Ok(&mapped[start..start + size as usize])
    }

    /// Whether host writes become visible to the device without a flush.
    pub fn is_coherent(&self) -> bool {
        self.allocation.as_ref().is_some_and(|allocation| {
            allocation
                .memory_properties()
                .contains(vk::MemoryPropertyFlags::HOST_COHERENT)
        })
    }

    /// Flush host writes in `[offset, offset + size)` to the device.
    ///
    /// The range is widened to `nonCoherentAtomSize` boundaries as Vulkan
    /// requires; a no-op on coherent memory.
    pub fn flush(&self, offset: vk::DeviceSize, size: vk::DeviceSize) -> RhiResult<()> {
        self.check_range(offset, size)?;
        if self.is_coherent() {
            return Ok(());
        }
        let allocation = self.mapped_allocation()?;
        let atom = self.device.limits().non_coherent_atom_size.max(1);
        let (start, len) = atom_aligned_range(
            allocation.offset() + offset,
            size,
            atom,
            allocation.offset() + allocation.size(),
        );
        let range = vk::MappedMemoryRange::default()
            .memory(unsafe { allocation.memory() })
            .offset(start)
            .size(len);
        unsafe { self.device.handle().flush_mapped_memory_ranges(&[range])? };
        Ok(())
    }

    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    #[inline]
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            let mut allocator = self
                .device
                .allocator()
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if let Err(e) = allocator.free(allocation) {
                error!("Failed to free {} allocation: {e:?}", self.usage.name());
            }
        }
        unsafe { self.device.handle().destroy_buffer(self.buffer, None) };
    }
}

/// Widen `[offset, offset + size)` to multiples of `atom`. Returns
/// `(offset, size)`.
///
/// When the widened end passes `limit` the size becomes `vk::WHOLE_SIZE`:
/// a clipped size would not be a multiple of the atom, and only the whole
/// remainder of the memory object is exempt from that rule.
fn atom_aligned_range(
    offset: vk::DeviceSize,
    size: vk::DeviceSize,
    atom: vk::DeviceSize,
    limit: vk::DeviceSize,
) -> (vk::DeviceSize, vk::DeviceSize) {
    let start = offset / atom * atom;
    let end = (offset + size).div_ceil(atom) * atom;
    if end > limit {
        (start, vk::WHOLE_SIZE)
    } else {
        (start, end - start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_flags() {
        assert!(BufferUsage::Vertex
            .to_vk_usage()
            .contains(vk::BufferUsageFlags::TRANSFER_DST));
        assert!(BufferUsage::Uniform
            .to_vk_usage()
            .contains(vk::BufferUsageFlags::UNIFORM_BUFFER));
        assert_eq!(
            BufferUsage::Staging.to_vk_usage(),
            vk::BufferUsageFlags::TRANSFER_SRC
        );
    }

    #[test]
    fn test_atom_range_already_aligned() {
        assert_eq!(atom_aligned_range(256, 64, 64, 1024), (256, 64));
    }

    #[test]
    fn test_atom_range_widens_both_ends() {
        assert_eq!(atom_aligned_range(260, 64, 64, 1024), (256, 128));
    }

    #[test]
    fn test_atom_range_past_limit_flushes_to_end() {
        assert_eq!(atom_aligned_range(960, 40, 256, 1000), (768, vk::WHOLE_SIZE));
    }

    #[test]
    fn test_atom_range_within_limit_stays_atom_multiple() {
        for (offset, size) in [(0, 1), (100, 300), (700, 68), (960, 40)] {
            let (start, len) = atom_aligned_range(offset, size, 256, 1024);
            assert_eq!(start % 256, 0);
            assert_eq!(len % 256, 0);
            assert!(start <= offset && start + len >= offset + size);
        }
    }
}
