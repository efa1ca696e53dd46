//! Deferred lighting resolve.

use std::path::Path;
use std::sync::Arc;

use ash::vk;
use tracing::debug;

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
    FrameInputs, GBuffer, GeometryPass, HDR_FORMAT, ShadowPass, color_targets, pass_set_layout,
    publish_outputs, sample_inputs, slot_pool,
};
use crate::error::RendererResult;
use crate::graph::{Attachment, PassId, PassIo};
use crate::ubo::LightingUniform;

/// G-buffer bindings start here; the shadow map follows them.
const GBUFFER_BINDING: u32 = 1;
const SHADOW_BINDING: u32 = 5;

/// Shades every G-buffer pixel with the directional light and its shadow
/// map into an HDR target.
///
/// Background pixels are discarded by the shader and keep the clear colour.
pub struct LightingPass {
    device: Arc<Device>,
    lit: Vec<Image>,
    uniform: UniformBuffer<LightingUniform>,
    gbuffer_sampler: Sampler,
    set: DescriptorSet,
    pipeline: Pipeline,
    _pool: DescriptorPool,
    _layout: DescriptorSetLayout,
    clear_color: [f32; 4],
    extent: vk::Extent2D,
}

impl LightingPass {
    pub fn new(
        device: Arc<Device>,
        shader_dir: &Path,
        extent: vk::Extent2D,
        clear_color: [f32; 4],
        geometry: &GeometryPass,
        shadow: &ShadowPass,
    ) -> RhiResult<Self> {
        let layout = pass_set_layout(&device, vk::ShaderStageFlags::FRAGMENT, SHADOW_BINDING)?;
        let pool = slot_pool(&device, &layout)?;
        let uniform = UniformBuffer::new(device.clone())?;
        let gbuffer_sampler = Sampler::nearest_clamp(device.clone())?;

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
            "lighting.frag",
            &info,
        )?;

        let lit = color_targets(&device, "lit colour", extent, HDR_FORMAT)?;

        let mut pass = Self {
            device,
            lit,
            uniform,
            gbuffer_sampler,
            set,
            pipeline,
            _pool: pool,
            _layout: layout,
            clear_color,
            extent,
        };
        pass.write_inputs(geometry, shadow)?;
        Ok(pass)
    }

    /// Points every slot's set at that slot's G-buffer and shadow map.
    fn write_inputs(&mut self, geometry: &GeometryPass, shadow: &ShadowPass) -> RhiResult<()> {
        let fallback = self.gbuffer_sampler.handle();
        for slot in 0..MAX_FRAMES_IN_FLIGHT {
            let target = WriteTarget::Slot(slot);
            for (binding, image) in (GBUFFER_BINDING..).zip(geometry.gbuffer(slot).images()) {
                self.set
                    .add_image_write(target, binding, image.descriptor_info(fallback))?;
            }
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
        gbuffer: &mut GBuffer,
        shadow_map: &mut Image,
    ) -> RendererResult<u32> {
        let cmd = frame.cmd;
        let uniform = LightingUniform::new(
            frame.camera,
            frame.scene.light().uniform(),
            shadow_map.extent().width,
        );
        self.uniform.write(frame.slot, &uniform)?;

        let [albedo, normal, specular, position] = gbuffer.images_mut();
        sample_inputs(cmd, &mut [albedo, normal, specular, position, shadow_map]);

        let lit = &mut self.lit[frame.slot];
        lit.transition_to(cmd, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);

        let rendering = RenderingConfig::from_extent(self.extent)
            .with_color_attachment(
                ColorAttachment::from_image(lit).with_clear_color(self.clear_color),
            )
            .build();

        cmd.begin_label(PassId::Lighting.label());
        cmd.begin_rendering(&rendering);
        cmd.set_viewport_scissor(self.extent);
        self.pipeline.bind(cmd);
        self.set.bind(cmd, self.pipeline.layout(), 0, frame.slot);
        cmd.draw_fullscreen_triangle();
        cmd.end_rendering();
        cmd.end_label();

        publish_outputs(cmd, &mut [lit]);

        Ok(1)
    }

    /// Reallocates the lit targets and rebinds the resized G-buffer. The
    /// device must be idle.
    pub fn resize(
        &mut self,
        extent: vk::Extent2D,
        geometry: &GeometryPass,
        shadow: &ShadowPass,
    ) -> RhiResult<()> {
        self.lit = color_targets(&self.device, "lit colour", extent, HDR_FORMAT)?;
        self.extent = extent;
        self.write_inputs(geometry, shadow)?;
        debug!("Lighting targets resized to {}x{}", extent.width, extent.height);
        Ok(())
    }

    pub fn lit(&self, slot: usize) -> &Image {
        &self.lit[slot]
    }

    pub fn lit_mut(&mut self, slot: usize) -> &mut Image {
        &mut self.lit[slot]
    }
}

impl PassIo for LightingPass {
    fn id(&self) -> PassId {
        PassId::Lighting
    }

    fn reads(&self) -> &'static [Attachment] {
        &[
            Attachment::GBufferAlbedo,
            Attachment::GBufferNormal,
            Attachment::GBufferSpecular,
            Attachment::GBufferPosition,
            Attachment::ShadowMap,
        ]
    }

    fn writes(&self) -> &'static [Attachment] {
        &[Attachment::LitColor]
    }
}
