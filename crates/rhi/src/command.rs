//! Command pool and command buffer management.
//!
//! - [`CommandPool`] owns a `VkCommandPool` for the graphics family
//! - [`CommandBuffer`] wraps a `VkCommandBuffer` with recording helpers
//! - [`submit_one_time`] records and synchronously executes upload work
//!
//! Dynamic rendering and debug labels go through the device's
//! [`Capabilities`](crate::Capabilities), so callers never care whether the
//! driver exposes them as core or extension entry points.

use std::ffi::CString;
use std::sync::Arc;

use ash::vk;
use bytemuck::Pod;
use tracing::{debug, trace};

use crate::device::Device;
use crate::error::RhiResult;
use crate::rendering::RenderingInfoBundle;
use crate::sync::Fence;

/// Vulkan command pool wrapper.
///
/// Created with `RESET_COMMAND_BUFFER` so each frame's buffer can be reset
/// on its own.
pub struct CommandPool {
    device: Arc<Device>,
    pool: vk::CommandPool,
}

impl CommandPool {
    /// Creates a pool on the graphics queue family.
    ///
    /// # Errors
    ///
    /// Returns an error if pool creation fails.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        Self::with_flags(device, vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
    }

    /// Pool for short-lived buffers that are recorded once.
    pub fn new_transient(device: Arc<Device>) -> RhiResult<Self> {
        Self::with_flags(
            device,
            vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER
                | vk::CommandPoolCreateFlags::TRANSIENT,
        )
    }

    fn with_flags(device: Arc<Device>, flags: vk::CommandPoolCreateFlags) -> RhiResult<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(device.graphics_family())
            .flags(flags);
        let pool = unsafe { device.handle().create_command_pool(&create_info, None)? };
        debug!("Command pool created ({:?})", flags);
        Ok(Self { device, pool })
    }

    /// Allocates `count` primary command buffers.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot allocate them.
    pub fn allocate(&self, count: u32) -> RhiResult<Vec<CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);
        let buffers = unsafe { self.device.handle().allocate_command_buffers(&alloc_info)? };
        Ok(buffers
            .into_iter()
            .map(|buffer| CommandBuffer::from_handle(self.device.clone(), buffer))
            .collect())
    }

    #[inline]
    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_command_pool(self.pool, None);
        }
        debug!("Command pool destroyed");
    }
}

/// Vulkan command buffer wrapper.
///
/// Does not own the handle; it is freed with the [`CommandPool`] it came from.
pub struct CommandBuffer {
    device: Arc<Device>,
    buffer: vk::CommandBuffer,
}

impl CommandBuffer {
    #[inline]
    pub fn from_handle(device: Arc<Device>, buffer: vk::CommandBuffer) -> Self {
        Self { device, buffer }
    }

    #[inline]
    pub fn handle(&self) -> vk::CommandBuffer {
        self.buffer
    }

    // =========================================================================
    // Recording Control
    // =========================================================================

    /// Begins one-time-submit recording.
    pub fn begin(&self) -> RhiResult<()> {
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            self.device
                .handle()
                .begin_command_buffer(self.buffer, &begin_info)?;
        }
        Ok(())
    }

    pub fn end(&self) -> RhiResult<()> {
        unsafe {
            self.device.handle().end_command_buffer(self.buffer)?;
        }
        Ok(())
    }

    pub fn reset(&self) -> RhiResult<()> {
        unsafe {
            self.device
                .handle()
                .reset_command_buffer(self.buffer, vk::CommandBufferResetFlags::empty())?;
        }
        Ok(())
    }

    // =========================================================================
    // Dynamic Rendering
    // =========================================================================

    pub fn begin_rendering(&self, rendering: &RenderingInfoBundle) {
        unsafe {
            self.device
                .capabilities()
                .cmd_begin_rendering(self.buffer, &rendering.info());
        }
    }

    pub fn end_rendering(&self) {
        unsafe {
            self.device.capabilities().cmd_end_rendering(self.buffer);
        }
    }

    // =========================================================================
    // Debug Labels
    // =========================================================================

    /// Opens a named region visible in GPU debuggers. No-op without
    /// debug utils.
    pub fn begin_label(&self, name: &str) {
        let caps = self.device.capabilities();
        if !caps.has_debug_labels() {
            return;
        }
        if let Ok(name) = CString::new(name) {
            unsafe { caps.cmd_begin_label(self.buffer, &name) };
        }
    }

    pub fn end_label(&self) {
        unsafe { self.device.capabilities().cmd_end_label(self.buffer) };
    }

    // =========================================================================
    // Binding
    // =========================================================================

    pub fn bind_pipeline(&self, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
        unsafe {
            self.device
                .handle()
                .cmd_bind_pipeline(self.buffer, bind_point, pipeline);
        }
    }

    pub fn bind_vertex_buffer(&self, buffer: vk::Buffer) {
        unsafe {
            self.device
                .handle()
                .cmd_bind_vertex_buffers(self.buffer, 0, &[buffer], &[0]);
        }
    }

    pub fn bind_index_buffer(&self, buffer: vk::Buffer) {
        unsafe {
            self.device
                .handle()
                .cmd_bind_index_buffer(self.buffer, buffer, 0, vk::IndexType::UINT32);
        }
    }

    pub fn bind_descriptor_set(
        &self,
        layout: vk::PipelineLayout,
        set_index: u32,
        set: vk::DescriptorSet,
    ) {
        unsafe {
            self.device.handle().cmd_bind_descriptor_sets(
                self.buffer,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                set_index,
                &[set],
                &[],
            );
        }
    }

    // =========================================================================
    // Dynamic State
    // =========================================================================

    /// Full-extent viewport and scissor.
    pub fn set_viewport_scissor(&self, extent: vk::Extent2D) {
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        unsafe {
            self.device.handle().cmd_set_viewport(self.buffer, 0, &[viewport]);
            self.device.handle().cmd_set_scissor(self.buffer, 0, &[scissor]);
        }
    }

    // =========================================================================
    // Drawing
    // =========================================================================

    pub fn draw(&self, vertex_count: u32, instance_count: u32) {
        trace!("draw {} vertices", vertex_count);
        unsafe {
            self.device
                .handle()
                .cmd_draw(self.buffer, vertex_count, instance_count, 0, 0);
        }
    }

    pub fn draw_indexed(&self, index_count: u32) {
        trace!("draw_indexed {} indices", index_count);
        unsafe {
            self.device
                .handle()
                .cmd_draw_indexed(self.buffer, index_count, 1, 0, 0, 0);
        }
    }

    /// One triangle covering the viewport. The vertex shader derives
    /// positions and UVs from `gl_VertexIndex`, so nothing is bound.
    pub fn draw_fullscreen_triangle(&self) {
        self.draw(3, 1);
    }

    // =========================================================================
    // Push Constants
    // =========================================================================

    pub fn push_constants<T: Pod>(
        &self,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        data: &T,
    ) {
        unsafe {
            self.device.handle().cmd_push_constants(
                self.buffer,
                layout,
                stages,
                0,
                bytemuck::bytes_of(data),
            );
        }
    }

    // =========================================================================
    // Synchronization and Transfer
    // =========================================================================

    /// Records image barriers. Prefer
    /// [`Image::transition_layout`](crate::image::Image::transition_layout),
    /// which keeps the tracked layout in sync.
    pub fn pipeline_barrier(
        &self,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        image_barriers: &[vk::ImageMemoryBarrier<'_>],
    ) {
        unsafe {
            self.device.handle().cmd_pipeline_barrier(
                self.buffer,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                image_barriers,
            );
        }
    }

    pub fn copy_buffer_to_image(
        &self,
        src: vk::Buffer,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::BufferImageCopy],
    ) {
        unsafe {
            self.device.handle().cmd_copy_buffer_to_image(
                self.buffer,
                src,
                dst,
                dst_layout,
                regions,
            );
        }
    }
}

/// Records `record` into a fresh command buffer, submits it to the graphics
/// queue and blocks until it completes. Only for load-time uploads.
///
/// # Errors
///
/// Returns an error if the transient pool, recording, the submit or the
/// wait for the fence fails.
pub fn submit_one_time<F>(device: &Arc<Device>, record: F) -> RhiResult<()>
where
    F: FnOnce(&CommandBuffer),
{
    let pool = CommandPool::new_transient(device.clone())?;
    let mut buffers = pool.allocate(1)?;
    let cmd = buffers.remove(0);

    cmd.begin()?;
    record(&cmd);
    cmd.end()?;

    let fence = Fence::new(device.clone(), false)?;
    let command_buffers = [cmd.handle()];
    let submit = vk::SubmitInfo::default().command_buffers(&command_buffers);
    unsafe { device.submit_graphics(&[submit], fence.handle())? };
    fence.wait(u64::MAX)?;

    Ok(())
}
