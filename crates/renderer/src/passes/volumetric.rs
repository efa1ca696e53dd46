//! Ray-marched light scattering through a uniform participating medium.

use std::path::Path;
use std::sync::Arc;

use ash::vk;
use tracing::debug;

use umbra_core::VolumetricConfig;
use umbra_rhi::MAX_FRAMES_IN_FLIGHT;
use umbra_rhi::RhiResult;
use umbra_rhi::descriptor::{DescriptorPool, DescriptorSet, DescriptorSetLayout, WriteTarget};
use umbra_rhi::device::Device;
use umbra_rhi::image::Image;
use umbra_rhi::pipeline::{Pipeline, PipelineInfo};
use umbra_rhi::rendering::{ColorAttachment, RenderingConfig};
use umbra_rhi::sampler::Sampler;
use umbra_rhi::uniform::UniformBuffer;

use super::{
    DepthPrepass, FrameInputs, HDR_FORMAT, LightingPass, ShadowPass, color_targets,
    pass_set_layout, publish_outputs, sample_inputs, slot_pool,
};
use crate::error::RendererResult;
use crate::graph::{Attachment, PassId, PassIo};
use crate::ubo::VolumetricUniform;

const LIT_BINDING: u32 = 1;
const DEPTH_BINDING: u32 = 2;
const SHADOW_BINDING: u32 = 3;

/// Marches from the camera to each pixel's depth, accumulating in-scattered
/// light wherever the shadow map says the sample is lit, and adds the result
/// to the lit colour.
///
/// With scattering disabled the pass still runs and copies the lit colour,
/// so the forward pass always finds its target here.
pub struct VolumetricPass {
    pub config: VolumetricConfig,
    device: Arc<Device>,
    hdr: Vec<Image>,
    uniform: UniformBuffer<VolumetricUniform>,
    input_sampler: Sampler,
    set: DescriptorSet,
    pipeline: Pipeline,
    _pool: DescriptorPool,
    _layout: DescriptorSetLayout,
    extent: vk::Extent2D,
}

impl VolumetricPass {
    pub fn new(
        device: Arc<Device>,
        shader_dir: &Path,
        extent: vk::Extent2D,
        config: VolumetricConfig,
        inputs: (&DepthPrepass, &LightingPass, &ShadowPass),
    ) -> RhiResult<Self> {
        let layout = pass_set_layout(&device, vk::ShaderStageFlags::FRAGMENT, SHADOW_BINDING)?;
        let pool = slot_pool(&device, &layout)?;
        let uniform = UniformBuffer::new(device.clone())?;
        let input_sampler = Sampler::nearest_clamp(device.clone())?;

        let mut set = DescriptorSet::new(device.clone(), &layout, &pool)?;
        for slot in 0..MAX_FRAMES_IN_FLIGHT {
            set.add_buffer_write(WriteTarget::Slot(slot), 0, uniform.descriptor_info(slot))?;
        }

        let info = PipelineInfo {
            set_layouts: vec![layout.handle()],
            ..PipelineInfo::fullscreen(HDR_FORMAT)
        };
        let pipeline = Pipeline::load(
            device.clone(),
            shader_dir,
            "fullscreen.vert",
            "volumetric.frag",
            &info,
        )?;

        let hdr = color_targets(&device, "hdr colour", extent, HDR_FORMAT)?;

        let mut pass = Self {
            config,
            device,
            hdr,
            uniform,
            input_sampler,
            set,
            pipeline,
            _pool: pool,
            _layout: layout,
            extent,
        };
        pass.write_inputs(inputs)?;
        Ok(pass)
    }

    fn write_inputs(
        &mut self,
        (prepass, lighting, shadow): (&DepthPrepass, &LightingPass, &ShadowPass),
    ) -> RhiResult<()> {
        let fallback = self.input_sampler.handle();
        for slot in 0..MAX_FRAMES_IN_FLIGHT {
            let target = WriteTarget::Slot(slot);
            self.set.add_image_write(
                target,
                LIT_BINDING,
                lighting.lit(slot).descriptor_info(fallback),
            )?;
            self.set.add_image_write(
                target,
                DEPTH_BINDING,
                prepass.depth(slot).descriptor_info(fallback),
            )?;
            self.set.add_image_write(
                target,
                SHADOW_BINDING,
                shadow.map(slot).descriptor_info(fallback),
            )?;
        }
        self.set.update_all()
    }

    pub fn record(
        &mut self,
        frame: &FrameInputs<'_>,
        lit: &mut Image,
        depth: &mut Image,
        shadow_map: &mut Image,
    ) -> RendererResult<u32> {
        let cmd = frame.cmd;
        let uniform =
            VolumetricUniform::new(frame.camera, frame.scene.light().uniform(), &self.config);
        self.uniform.write(frame.slot, &uniform)?;

        sample_inputs(cmd, &mut [lit, depth, shadow_map]);

        let hdr = &mut self.hdr[frame.slot];
        hdr.transition_to(cmd, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);

        // Every pixel is overwritten.
        let rendering = RenderingConfig::from_extent(self.extent)
            .with_color_attachment(ColorAttachment::from_image(hdr).dont_care())
            .build();

        cmd.begin_label(PassId::Volumetric.label());
        cmd.begin_rendering(&rendering);
        cmd.set_viewport_scissor(self.extent);
        self.pipeline.bind(cmd);
        self.set.bind(cmd, self.pipeline.layout(), 0, frame.slot);
        cmd.draw_fullscreen_triangle();
        cmd.end_rendering();
        cmd.end_label();

        publish_outputs(cmd, &mut [hdr]);

        Ok(1)
    }

    /// Reallocates the HDR targets and rebinds the resized inputs. The
    /// device must be idle.
    pub fn resize(
        &mut self,
        extent: vk::Extent2D,
        inputs: (&DepthPrepass, &LightingPass, &ShadowPass),
    ) -> RhiResult<()> {
        self.hdr = color_targets(&self.device, "hdr colour", extent, HDR_FORMAT)?;
        self.extent = extent;
        self.write_inputs(inputs)?;
        debug!("Volumetric targets resized to {}x{}", extent.width, extent.height);
        Ok(())
    }

    pub fn hdr(&self, slot: usize) -> &Image {
        &self.hdr[slot]
    }

    pub fn hdr_mut(&mut self, slot: usize) -> &mut Image {
        &mut self.hdr[slot]
    }
}

impl PassIo for VolumetricPass {
    fn id(&self) -> PassId {
        PassId::Volumetric
    }

    fn reads(&self) -> &'static [Attachment] {
        &[
            Attachment::LitColor,
            Attachment::SceneDepth,
            Attachment::ShadowMap,
        ]
    }

    fn writes(&self) -> &'static [Attachment] {
        &[Attachment::HdrColor]
    }
}
