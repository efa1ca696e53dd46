//! Typed per-frame uniform buffers.
//!
//! A [`UniformBuffer<T>`] holds one copy of `T` per frame slot, each in its
//! own region aligned to `minUniformBufferOffsetAlignment`. Slot `i` is only
//! written after slot `i`'s fence has signaled, so the CPU never overwrites
//! data the GPU is still reading.

use std::marker::PhantomData;
use std::sync::Arc;

use ash::vk;
use bytemuck::Pod;

use crate::MAX_FRAMES_IN_FLIGHT;
use crate::buffer::{Buffer, BufferUsage, check_range};
use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Byte-addressable host-visible storage behind a uniform buffer.
pub trait HostMemory {
    fn write_bytes(&mut self, offset: u64, data: &[u8]) -> RhiResult<()>;
    fn read_bytes(&mut self, offset: u64, len: usize) -> RhiResult<Vec<u8>>;
}

impl HostMemory for Buffer {
    fn write_bytes(&mut self, offset: u64, data: &[u8]) -> RhiResult<()> {
        self.write_data(offset, data)
    }

    fn read_bytes(&mut self, offset: u64, len: usize) -> RhiResult<Vec<u8>> {
        self.read_data(offset, len)
    }
}

/// Plain host memory, for code paths that never reach the GPU.
impl HostMemory for Vec<u8> {
    fn write_bytes(&mut self, offset: u64, data: &[u8]) -> RhiResult<()> {
        check_range(offset, data.len() as u64, self.len() as u64)?;
        let start = offset as usize;
        self[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn read_bytes(&mut self, offset: u64, len: usize) -> RhiResult<Vec<u8>> {
        check_range(offset, len as u64, self.len() as u64)?;
        let start = offset as usize;
        Ok(self[start..start + len].to_vec())
    }
}

/// Rounds `size` up to a multiple of `alignment` (a power of two, or 0/1
/// for none).
pub fn aligned_stride(size: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        return size;
    }
    size.div_ceil(alignment) * alignment
}

/// One `T` per frame slot.
pub struct UniformBuffer<T: Pod, M: HostMemory = Buffer> {
    memory: M,
    stride: u64,
    slots: usize,
    _marker: PhantomData<T>,
}

impl<T: Pod> UniformBuffer<T, Buffer> {
    /// Allocates [`MAX_FRAMES_IN_FLIGHT`] aligned regions, zero-initialised.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let alignment = device.capabilities().min_uniform_buffer_offset_alignment();
        let stride = aligned_stride(size_of::<T>() as u64, alignment);
        let mut buffer = Buffer::new(
            device,
            BufferUsage::Uniform,
            stride * MAX_FRAMES_IN_FLIGHT as u64,
        )?;
        let size = buffer.size() as usize;
        buffer.write_data(0, &vec![0u8; size])?;
        Ok(Self::with_memory(buffer, stride, MAX_FRAMES_IN_FLIGHT))
    }

    /// Descriptor contents covering exactly slot `slot`'s region.
    pub fn descriptor_info(&self, slot: usize) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo::default()
            .buffer(self.memory.handle())
            .offset(self.slot_offset(slot))
            .range(size_of::<T>() as u64)
    }

    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.memory.handle()
    }
}

impl<T: Pod> UniformBuffer<T, Vec<u8>> {
    /// Host-only uniform storage with the given alignment.
    pub fn host_only(alignment: u64, slots: usize) -> Self {
        let stride = aligned_stride(size_of::<T>() as u64, alignment);
        Self::with_memory(vec![0u8; (stride as usize) * slots], stride, slots)
    }
}

impl<T: Pod, M: HostMemory> UniformBuffer<T, M> {
    fn with_memory(memory: M, stride: u64, slots: usize) -> Self {
        Self {
            memory,
            stride,
            slots,
            _marker: PhantomData,
        }
    }

    /// Copies `value` into slot `slot`'s region.
    pub fn write(&mut self, slot: usize, value: &T) -> RhiResult<()> {
        let offset = self.checked_offset(slot)?;
        self.memory.write_bytes(offset, bytemuck::bytes_of(value))
    }

    /// Reads slot `slot`'s current contents back.
    pub fn read(&mut self, slot: usize) -> RhiResult<T> {
        let offset = self.checked_offset(slot)?;
        let bytes = self.memory.read_bytes(offset, size_of::<T>())?;
        Ok(bytemuck::pod_read_unaligned(&bytes))
    }

    #[inline]
    pub fn slot_offset(&self, slot: usize) -> u64 {
        self.stride * slot as u64
    }

    #[inline]
    pub fn stride(&self) -> u64 {
        self.stride
    }

    #[inline]
    pub fn slot_count(&self) -> usize {
        self.slots
    }

    fn checked_offset(&self, slot: usize) -> RhiResult<u64> {
        if slot >= self.slots {
            return Err(RhiError::OutOfBounds {
                offset: self.slot_offset(slot),
                len: size_of::<T>() as u64,
                size: self.stride * self.slots as u64,
            });
        }
        Ok(self.slot_offset(slot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytemuck::Zeroable;

    #[repr(C)]
    #[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
    struct Params {
        view_proj: [[f32; 4]; 4],
        exposure: f32,
        gamma: f32,
        _pad: [f32; 2],
    }

    fn params(seed: f32) -> Params {
        let mut view_proj = [[0.0; 4]; 4];
        for (i, row) in view_proj.iter_mut().enumerate() {
            for (j, v) in row.iter_mut().enumerate() {
                *v = seed + (i * 4 + j) as f32 * 0.25;
            }
        }
        Params {
            view_proj,
            exposure: seed * 2.0,
            gamma: 2.2,
            _pad: [0.0; 2],
        }
    }

    #[test]
    fn test_aligned_stride() {
        assert_eq!(aligned_stride(80, 256), 256);
        assert_eq!(aligned_stride(256, 256), 256);
        assert_eq!(aligned_stride(257, 64), 320);
        assert_eq!(aligned_stride(80, 1), 80);
        assert_eq!(aligned_stride(80, 0), 80);
    }

    #[test]
    fn test_write_then_read_is_byte_identical() {
        let mut ubo = UniformBuffer::<Params, Vec<u8>>::host_only(256, 2);
        let value = params(1.5);
        ubo.write(1, &value).unwrap();
        let back = ubo.read(1).unwrap();
        assert_eq!(bytemuck::bytes_of(&back), bytemuck::bytes_of(&value));
    }

    #[test]
    fn test_slots_do_not_alias() {
        let mut ubo = UniformBuffer::<Params, Vec<u8>>::host_only(64, 2);
        ubo.write(0, &params(1.0)).unwrap();
        ubo.write(1, &params(7.0)).unwrap();
        assert_eq!(ubo.read(0).unwrap(), params(1.0));
        assert_eq!(ubo.read(1).unwrap(), params(7.0));
        assert!(ubo.slot_offset(1) >= size_of::<Params>() as u64);
        assert_eq!(ubo.slot_offset(1) % 64, 0);
    }

    #[test]
    fn test_out_of_range_slot_is_error() {
        let mut ubo = UniformBuffer::<Params, Vec<u8>>::host_only(64, 2);
        assert!(matches!(
            ubo.write(2, &params(0.0)),
            Err(RhiError::OutOfBounds { .. })
        ));
        assert!(ubo.read(5).is_err());
    }
}
