//! Dynamic uniform buffers: one aligned slot per frame in flight.
//!
//! Two stride policies live here:
//!
//! - [`compute_stride`] rounds up to the device's
//!   `minUniformBufferOffsetAlignment`. Dynamic offsets must be multiples of
//!   it, so every descriptor offset goes through this policy last.
//! - [`compute_stride_next_power_of_two`] rounds up to a power of two. On its
//!   own it is a host-side packing convention; [`compute_packed_stride`]
//!   aligns it afterwards so the packed slots can back dynamic offsets.

use std::marker::PhantomData;
use std::mem::size_of;
use std::sync::Arc;

use ash::vk;
use bytemuck::Pod;
use tracing::debug;

use vkdemo_rhi::buffer::{Buffer, BufferUsage};
use vkdemo_rhi::device::Device;
use vkdemo_rhi::{RhiError, RhiResult};

/// Smallest multiple of `min_alignment` that is at least `struct_size`.
///
/// `min_alignment` must be a power of two, which Vulkan guarantees for
/// `minUniformBufferOffsetAlignment`. Zero means no alignment requirement.
#[inline]
pub fn compute_stride(struct_size: u64, min_alignment: u64) -> u64 {
    if min_alignment == 0 {
        return struct_size;
    }
    debug_assert!(min_alignment.is_power_of_two());
    (struct_size + min_alignment - 1) & !(min_alignment - 1)
}

/// Smallest power of two that is at least `size`; `0` maps to `1`.
#[inline]
pub fn compute_stride_next_power_of_two(size: usize) -> usize {
    size.max(1).next_power_of_two()
}

/// Power-of-two packing of `struct_size`, then aligned to `min_alignment`.
///
/// Both inputs are powers of two, so the result is simply the larger of the
/// two and stays a power of two.
#[inline]
pub fn compute_packed_stride(struct_size: u64, min_alignment: u64) -> u64 {
    let packed = compute_stride_next_power_of_two(struct_size as usize) as u64;
    compute_stride(packed, min_alignment)
}

/// `count` elements of `T`, each starting `stride` bytes after the previous.
///
/// Slot access is bounds-checked and goes through `bytemuck`; the backing
/// storage never has to be aligned for `T`.
#[derive(Debug, Clone)]
pub struct AlignedArray<T> {
    bytes: Vec<u8>,
    count: usize,
    stride: usize,
    _marker: PhantomData<T>,
}

impl<T: Pod> AlignedArray<T> {
    /// Zero-initialized array. `stride` must hold one `T`.
    pub fn new(count: usize, stride: usize) -> RhiResult<Self> {
        if stride < size_of::<T>() {
            return Err(RhiError::OutOfBounds {
                offset: 0,
                size: size_of::<T>() as u64,
                capacity: stride as u64,
            });
        }
        Ok(Self {
            bytes: vec![0; count * stride],
            count,
            stride,
            _marker: PhantomData,
        })
    }

    /// Byte offset of `index`.
    pub fn offset(&self, index: usize) -> RhiResult<usize> {
        if index >= self.count {
            return Err(RhiError::SlotOutOfRange {
                index,
                count: self.count,
            });
        }
        Ok(index * self.stride)
    }

    pub fn get(&self, index: usize) -> RhiResult<T> {
        Ok(bytemuck::pod_read_unaligned(self.slot_bytes(index)?))
    }

    pub fn set(&mut self, index: usize, value: &T) -> RhiResult<()> {
        let offset = self.offset(index)?;
        self.bytes[offset..offset + size_of::<T>()].copy_from_slice(bytemuck::bytes_of(value));
        Ok(())
    }

    /// The `size_of::<T>()` bytes of one slot; padding is excluded.
    pub fn slot_bytes(&self, index: usize) -> RhiResult<&[u8]> {
        let offset = self.offset(index)?;
        Ok(&self.bytes[offset..offset + size_of::<T>()])
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }
}

/// Host-mapped memory a [`DynamicUniformBuffer`] writes through.
pub trait UniformMemory {
    fn size(&self) -> u64;

    fn write(&mut self, offset: u64, bytes: &[u8]) -> RhiResult<()>;

    fn read(&self, offset: u64, size: u64) -> RhiResult<&[u8]>;

    /// Whether host writes become visible to the device without a flush.
    fn is_coherent(&self) -> bool;

    /// Make host writes to `[offset, offset + size)` visible to the device.
    fn flush(&self, offset: u64, size: u64) -> RhiResult<()>;
}

impl UniformMemory for Buffer {
    fn size(&self) -> u64 {
        Buffer::size(self)
    }

    fn write(&mut self, offset: u64, bytes: &[u8]) -> RhiResult<()> {
        Buffer::write(self, offset, bytes)
    }

    fn read(&self, offset: u64, size: u64) -> RhiResult<&[u8]> {
        Buffer::read(self, offset, size)
    }

    fn is_coherent(&self) -> bool {
        Buffer::is_coherent(self)
    }

    fn flush(&self, offset: u64, size: u64) -> RhiResult<()> {
        Buffer::flush(self, offset, size)
    }
}

/// A uniform buffer partitioned into `count` slots of `stride` bytes.
///
/// Slot `i` belongs to frame slot `i`: it is only written while that frame
/// slot is recording, so no slot the GPU may still read is overwritten.
/// Uploads to non-coherent memory are flushed here; callers cannot forget.
pub struct DynamicUniformBuffer<T, M = Buffer> {
    memory: M,
    host: AlignedArray<T>,
    stride: u64,
}

impl<T: Pod> DynamicUniformBuffer<T, Buffer> {
    /// Allocates a host-visible buffer with one slot per frame in flight,
    /// aligned to the device's minimum uniform offset alignment.
    pub fn new(device: Arc<Device>, count: usize) -> RhiResult<Self> {
        let stride = compute_stride(size_of::<T>() as u64, device.min_uniform_alignment());
        let memory = Buffer::new(device, BufferUsage::Uniform, stride * count as u64)?;
        Self::with_memory(memory, count, stride)
    }

    /// Like [`new`](Self::new), with slots packed at a power-of-two stride.
    pub fn new_packed(device: Arc<Device>, count: usize) -> RhiResult<Self> {
        let stride = compute_packed_stride(size_of::<T>() as u64, device.min_uniform_alignment());
        let memory = Buffer::new(device, BufferUsage::Uniform, stride * count as u64)?;
        Self::with_memory(memory, count, stride)
    }

    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.memory.handle()
    }
}

impl<T: Pod, M: UniformMemory> DynamicUniformBuffer<T, M> {
    /// Wraps existing memory. `stride` must already satisfy the device
    /// alignment; see [`compute_stride`].
    pub fn with_memory(memory: M, count: usize, stride: u64) -> RhiResult<Self> {
        let required = stride * count as u64;
        if memory.size() < required {
            return Err(RhiError::OutOfBounds {
                offset: 0,
                size: required,
                capacity: memory.size(),
            });
        }
        let host = AlignedArray::new(count, stride as usize)?;
        debug!(
            count,
            stride,
            size = size_of::<T>(),
            coherent = memory.is_coherent(),
            "Dynamic uniform buffer created"
        );
        Ok(Self {
            memory,
            host,
            stride,
        })
    }

    /// Copies `value` into slot `slot`, flushing exactly
    /// `[slot * stride, slot * stride + size_of::<T>())` on non-coherent memory.
    pub fn upload(&mut self, slot: usize, value: &T) -> RhiResult<()> {
        self.host.set(slot, value)?;
        let offset = self.offset(slot)?;
        let size = size_of::<T>() as u64;
        self.memory.write(offset, bytemuck::bytes_of(value))?;
        if !self.memory.is_coherent() {
            self.memory.flush(offset, size)?;
        }
        Ok(())
    }

    /// Reads slot `slot` back from the mapped memory.
    pub fn read_back(&self, slot: usize) -> RhiResult<T> {
        let offset = self.offset(slot)?;
        let bytes = self.memory.read(offset, size_of::<T>() as u64)?;
        Ok(bytemuck::pod_read_unaligned(bytes))
    }

    /// The last value uploaded to `slot`, from the host mirror.
    pub fn last_uploaded(&self, slot: usize) -> RhiResult<T> {
        self.host.get(slot)
    }

    /// Byte offset of `slot`.
    pub fn offset(&self, slot: usize) -> RhiResult<u64> {
        Ok(self.host.offset(slot)? as u64)
    }

    /// Offset to pass to `vkCmdBindDescriptorSets` for `slot`.
    pub fn dynamic_offset(&self, slot: usize) -> RhiResult<u32> {
        Ok(self.offset(slot)? as u32)
    }

    /// Descriptor range of one slot.
    #[inline]
    pub fn range(&self) -> u64 {
        size_of::<T>() as u64
    }

    #[inline]
    pub fn stride(&self) -> u64 {
        self.stride
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.host.len()
    }

    #[inline]
    pub fn memory(&self) -> &M {
        &self.memory
    }
}
