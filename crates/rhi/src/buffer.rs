//! GPU buffer management.
//!
//! - [`BufferUsage`] picks Vulkan usage flags and a gpu-allocator memory location
//! - [`Buffer`] owns one `VkBuffer` and its allocation
//! - [`BufferMapping`] is scoped host access to a host-visible buffer
//!
//! Host-visible allocations from gpu-allocator stay persistently mapped, so
//! `map`/`unmap` are about scoping access rather than driver calls.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use umbra_rhi::device::Device;
//! use umbra_rhi::buffer::{Buffer, BufferUsage};
//!
//! # fn example(device: Arc<Device>) -> Result<(), umbra_rhi::RhiError> {
//! let vertices: [f32; 6] = [0.0, 0.5, -0.5, -0.5, 0.5, -0.5];
//! let vertex_buffer = Buffer::new_with_data(
//!     device,
//!     BufferUsage::Vertex,
//!     bytemuck::cast_slice(&vertices),
//! )?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, trace};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Buffer usage type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    Vertex,
    Index,
    Uniform,
    /// CPU-writable source for buffer-to-image copies
    Staging,
}

impl BufferUsage {
    pub fn to_vk_usage(self) -> vk::BufferUsageFlags {
        match self {
            BufferUsage::Vertex => vk::BufferUsageFlags::VERTEX_BUFFER,
            BufferUsage::Index => vk::BufferUsageFlags::INDEX_BUFFER,
            BufferUsage::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
            BufferUsage::Staging => vk::BufferUsageFlags::TRANSFER_SRC,
        }
    }

    /// Every usage here is written from the host, so all of them live in
    /// host-visible memory.
    pub fn memory_location(self) -> MemoryLocation {
        MemoryLocation::CpuToGpu
    }

    pub fn name(self) -> &'static str {
        match self {
            BufferUsage::Vertex => "vertex",
            BufferUsage::Index => "index",
            BufferUsage::Uniform => "uniform",
            BufferUsage::Staging => "staging",
        }
    }
}

/// Checks that `[offset, offset + len)` lies inside a buffer of `size` bytes.
pub fn check_range(offset: u64, len: u64, size: u64) -> RhiResult<()> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(RhiError::OutOfBounds { offset, len, size }),
    }
}

/// GPU buffer wrapper with managed memory.
pub struct Buffer {
    device: Arc<Device>,
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    size: vk::DeviceSize,
    usage: BufferUsage,
}

impl Buffer {
    /// Creates a buffer of `size` bytes.
    ///
    /// # Errors
    ///
    /// Fails for a zero size, or if buffer creation or allocation fails.
    pub fn new(device: Arc<Device>, usage: BufferUsage, size: vk::DeviceSize) -> RhiResult<Self> {
        if size == 0 {
            return Err(RhiError::InvalidHandle(
                "Buffer size must be greater than 0".to_string(),
            ));
        }

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage.to_vk_usage())
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.handle().create_buffer(&buffer_info, None)? };
        let requirements = unsafe { device.handle().get_buffer_memory_requirements(buffer) };

        let allocation = device.allocator().allocate(&AllocationCreateDesc {
            name: usage.name(),
            requirements,
            location: usage.memory_location(),
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

        unsafe {
            device
                .handle()
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())?;
        }

        debug!("Created {} buffer: {} bytes", usage.name(), size);

        Ok(Self {
            device,
            buffer,
            allocation: Some(allocation),
            size,
            usage,
        })
    }

    /// Creates a buffer sized to `data` and fills it.
    ///
    /// # Errors
    ///
    /// Fails for empty `data`, or as [`new`](Self::new) and
    /// [`write_data`](Self::write_data) do.
    pub fn new_with_data(device: Arc<Device>, usage: BufferUsage, data: &[u8]) -> RhiResult<Self> {
        let mut buffer = Self::new(device, usage, data.len() as vk::DeviceSize)?;
        buffer.write_data(0, data)?;
        Ok(buffer)
    }

    /// Begins scoped host access. The mapping ends when the guard drops.
    ///
    /// # Errors
    ///
    /// Fails if the allocation is not host visible.
    pub fn map(&mut self) -> RhiResult<BufferMapping<'_>> {
        let size = self.size as usize;
        let allocation = self.allocation.as_mut().ok_or_else(|| {
            RhiError::InvalidHandle("Buffer allocation is not available".to_string())
        })?;
        let ptr = allocation
            .mapped_ptr()
            .ok_or_else(|| {
                RhiError::InvalidHandle("Buffer memory is not host visible".to_string())
            })?;

        // SAFETY: gpu-allocator guarantees the mapping covers the whole
        // allocation, which is at least `size` bytes, for the allocation's
        // lifetime. `&mut self` makes this the only host view.
        let bytes = unsafe { std::slice::from_raw_parts_mut(ptr.as_ptr().cast::<u8>(), size) };
        trace!("Mapped {} buffer", self.usage.name());
        Ok(BufferMapping {
            bytes,
            usage: self.usage,
        })
    }

    /// Ends host access started by [`map`](Self::map).
    ///
    /// Equivalent to dropping the guard; provided for call sites that want
    /// the unmap to be visible.
    pub fn unmap(mapping: BufferMapping<'_>) {
        drop(mapping);
    }

    /// Copies raw bytes into the buffer at `offset`.
    ///
    /// # Errors
    ///
    /// Fails if the range runs past the end of the buffer or the memory
    /// cannot be mapped.
    pub fn write_data(&mut self, offset: vk::DeviceSize, data: &[u8]) -> RhiResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        self.map()?.write(offset, data)
    }

    /// Reads `len` bytes back from host-visible memory.
    pub fn read_data(&mut self, offset: vk::DeviceSize, len: usize) -> RhiResult<Vec<u8>> {
        Ok(self.map()?.read(offset, len)?.to_vec())
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
        if let Some(allocation) = self.allocation.take()
            && let Err(e) = self.device.allocator().free(allocation)
        {
            tracing::error!("Failed to free buffer allocation: {:?}", e);
        }

        unsafe {
            self.device.handle().destroy_buffer(self.buffer, None);
        }

        debug!("Destroyed {} buffer", self.usage.name());
    }
}

/// Scoped host view of a mapped buffer.
pub struct BufferMapping<'a> {
    bytes: &'a mut [u8],
    usage: BufferUsage,
}

impl BufferMapping<'_> {
    /// Copies `data` to `offset`, failing if it would run past the end.
    pub fn write(&mut self, offset: vk::DeviceSize, data: &[u8]) -> RhiResult<()> {
        check_range(offset, data.len() as u64, self.bytes.len() as u64)?;
        let start = offset as usize;
        self.bytes[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    pub fn read(&self, offset: vk::DeviceSize, len: usize) -> RhiResult<&[u8]> {
        check_range(offset, len as u64, self.bytes.len() as u64)?;
        let start = offset as usize;
        Ok(&self.bytes[start..start + len])
    }
}

impl Drop for BufferMapping<'_> {
    fn drop(&mut self) {
        trace!("Unmapped {} buffer", self.usage.name());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_usage_to_vk_usage() {
        assert!(
            BufferUsage::Vertex
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::VERTEX_BUFFER)
        );
        assert!(
            BufferUsage::Uniform
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::UNIFORM_BUFFER)
        );
        assert!(
            BufferUsage::Staging
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::TRANSFER_SRC)
        );
    }

    #[test]
    fn test_all_usages_are_host_visible() {
        for usage in [
            BufferUsage::Vertex,
            BufferUsage::Index,
            BufferUsage::Uniform,
            BufferUsage::Staging,
        ] {
            assert_eq!(usage.memory_location(), MemoryLocation::CpuToGpu);
        }
    }

    #[test]
    fn test_check_range() {
        assert!(check_range(0, 16, 16).is_ok());
        assert!(check_range(8, 8, 16).is_ok());
        assert!(matches!(
            check_range(8, 9, 16),
            Err(RhiError::OutOfBounds { offset: 8, len: 9, size: 16 })
        ));
        assert!(check_range(u64::MAX, 2, 16).is_err());
    }
}
