//! Tone mapping into the swapchain.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use umbra_core::PostConfig;
use umbra_rhi::MAX_FRAMES_IN_FLIGHT;
use umbra_rhi::RhiResult;
use umbra_rhi::descriptor::{DescriptorPool, DescriptorSet, DescriptorSetLayout, WriteTarget};
use umbra_rhi::device::Device;
use umbra_rhi::image::Image;
use umbra_rhi::pipeline::{Pipeline, PipelineInfo};
use umbra_rhi::rendering::{ColorAttachment, DepthAttachment, RenderingConfig};
use umbra_rhi::sampler::Sampler;
use umbra_rhi::uniform::UniformBuffer;

use super::{FrameInputs, VolumetricPass, pass_set_layout, sample_inputs, slot_pool};
use crate::error::RendererResult;
use crate::graph::{Attachment, PassId, PassIo};
use crate::ubo::PostUniform;

const HDR_BINDING: u32 = 1;

/// Exposure, Reinhard tone mapping and gamma from the HDR colour into the
/// acquired swapchain image, which is left ready to present.
pub struct BlitPass {
    pub post: PostConfig,
    device: Arc<Device>,
    shader_dir: PathBuf,
    uniform: UniformBuffer<PostUniform>,
    hdr_sampler: Sampler,
    set: DescriptorSet,
    pipeline: Pipeline,
    _pool: DescriptorPool,
    layout: DescriptorSetLayout,
    target_format: vk::Format,
}

impl BlitPass {
    pub fn new(
        device: Arc<Device>,
        shader_dir: &Path,
        target_format: vk::Format,
        post: PostConfig,
        volumetric: &VolumetricPass,
    ) -> RhiResult<Self> {
        let layout = pass_set_layout(&device, vk::ShaderStageFlags::FRAGMENT, HDR_BINDING)?;
        let pool = slot_pool(&device, &layout)?;
        let uniform = UniformBuffer::new(device.clone())?;
        let hdr_sampler = Sampler::linear_clamp(device.clone())?;

        let mut set = DescriptorSet::new(device.clone(), &layout, &pool)?;
        for slot in 0..MAX_FRAMES_IN_FLIGHT {
            set.add_buffer_write(WriteTarget::Slot(slot), 0, uniform.descriptor_info(slot))?;
        }

        let pipeline = Self::build_pipeline(&device, shader_dir, &layout, target_format)?;

        let mut pass = Self {
            post,
            device,
            shader_dir: shader_dir.to_path_buf(),
            uniform,
            hdr_sampler,
            set,
            pipeline,
            _pool: pool,
            layout,
            target_format,
        };
        pass.write_inputs(volumetric)?;
        Ok(pass)
    }

    /// The swapchain's per-image depth buffer is attached so the pipeline
    /// matches the target's full attachment set, but nothing tests it.
    fn build_pipeline(
        device: &Arc<Device>,
        shader_dir: &Path,
        layout: &DescriptorSetLayout,
        target_format: vk::Format,
    ) -> RhiResult<Pipeline> {
        let info = PipelineInfo {
            set_layouts: vec![layout.handle()],
            depth_format: Some(device.capabilities().depth_format()),
            ..PipelineInfo::fullscreen(target_format)
        };
        Pipeline::load(device.clone(), shader_dir, "fullscreen.vert", "blit.frag", &info)
    }

    fn write_inputs(&mut self, volumetric: &VolumetricPass) -> RhiResult<()> {
        let fallback = self.hdr_sampler.handle();
        for slot in 0..MAX_FRAMES_IN_FLIGHT {
            self.set.add_image_write(
                WriteTarget::Slot(slot),
                HDR_BINDING,
                volumetric.hdr(slot).descriptor_info(fallback),
            )?;
        }
        self.set.update_all()
    }

    /// `target` and `target_depth` are the acquired swapchain image and its
    /// depth buffer.
    pub fn record(
        &mut self,
        frame: &FrameInputs<'_>,
        hdr: &mut Image,
        target: &mut Image,
        target_depth: &mut Image,
    ) -> RendererResult<u32> {
        let cmd = frame.cmd;
        self.uniform.write(frame.slot, &PostUniform::new(&self.post))?;

        sample_inputs(cmd, &mut [hdr]);
        target.transition_to(cmd, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        target_depth.transition_to(cmd, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);

        let extent = target.extent();
        let rendering = RenderingConfig::from_extent(extent)
            .with_color_attachment(ColorAttachment::from_image(target).dont_care())
            .with_depth_attachment(DepthAttachment::transient(target_depth.view()))
            .build();

        cmd.begin_label(PassId::Blit.label());
        cmd.begin_rendering(&rendering);
        cmd.set_viewport_scissor(extent);
        self.pipeline.bind(cmd);
        self.set.bind(cmd, self.pipeline.layout(), 0, frame.slot);
        cmd.draw_fullscreen_triangle();
        cmd.end_rendering();
        cmd.end_label();

        target.transition_to(cmd, vk::ImageLayout::PRESENT_SRC_KHR);

        Ok(1)
    }

    /// Rebinds the resized HDR targets, and recompiles the pipeline if the
    /// recreated swapchain picked a different format. The device must be
    /// idle.
    pub fn resize(
        &mut self,
        extent: vk::Extent2D,
        target_format: vk::Format,
        volumetric: &VolumetricPass,
    ) -> RhiResult<()> {
        if target_format != self.target_format {
            info!(
                "Swapchain format changed from {:?} to {:?}, rebuilding blit pipeline",
                self.target_format, target_format
            );
            self.pipeline =
                Self::build_pipeline(&self.device, &self.shader_dir, &self.layout, target_format)?;
            self.target_format = target_format;
        }
        self.write_inputs(volumetric)?;
        debug!("Blit inputs rebound at {}x{}", extent.width, extent.height);
        Ok(())
    }
}

impl PassIo for BlitPass {
    fn id(&self) -> PassId {
        PassId::Blit
    }

    fn reads(&self) -> &'static [Attachment] {
        &[Attachment::HdrColor]
    }

    fn writes(&self) -> &'static [Attachment] {
        &[Attachment::Swapchain]
    }
}
