//! Forward-shaded transparent geometry.

use std::path::Path;
use std::sync::Arc;

use ash::vk;

use umbra_rhi::MAX_FRAMES_IN_FLIGHT;
use umbra_rhi::RhiResult;
use umbra_rhi::descriptor::{DescriptorPool, DescriptorSet, DescriptorSetLayout, WriteTarget};
use umbra_rhi::device::Device;
use umbra_rhi::image::Image;
use umbra_rhi::pipeline::{Pipeline, PipelineInfo};
use umbra_rhi::rendering::{ColorAttachment, DepthAttachment, RenderingConfig};
use umbra_rhi::uniform::UniformBuffer;
use umbra_scene::MeshPushConstants;

use super::{FrameInputs, HDR_FORMAT, pass_set_layout, publish_outputs, slot_pool};
use crate::error::RendererResult;
use crate::graph::{Attachment, PassId, PassIo};
use crate::ubo::{CameraUniform, ForwardUniform};

/// Blends transparent meshes, sorted back to front, over the HDR colour in
/// place. Depth is tested against the opaque prepass but not written.
pub struct ForwardPass {
    uniform: UniformBuffer<ForwardUniform>,
    set: DescriptorSet,
    pipeline: Pipeline,
    _pool: DescriptorPool,
    _layout: DescriptorSetLayout,
    extent: vk::Extent2D,
}

impl ForwardPass {
    /// `material_layout` is bound as set 1.
    pub fn new(
        device: Arc<Device>,
        shader_dir: &Path,
        extent: vk::Extent2D,
        material_layout: vk::DescriptorSetLayout,
    ) -> RhiResult<Self> {
        let stages = vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT;
        let layout = pass_set_layout(&device, stages, 0)?;
        let pool = slot_pool(&device, &layout)?;
        let uniform = UniformBuffer::new(device.clone())?;

        let mut set = DescriptorSet::new(device.clone(), &layout, &pool)?;
        for slot in 0..MAX_FRAMES_IN_FLIGHT {
            set.add_buffer_write(WriteTarget::Slot(slot), 0, uniform.descriptor_info(slot))?;
        }
        set.update_all()?;

        let depth_format = device.capabilities().depth_format();
        let info = PipelineInfo {
            set_layouts: vec![layout.handle(), material_layout],
            push_constant_ranges: vec![MeshPushConstants::range()],
            ..PipelineInfo::alpha_blend(HDR_FORMAT, depth_format)
        };
        let pipeline =
            Pipeline::load(device, shader_dir, "forward.vert", "forward.frag", &info)?;

        Ok(Self {
            uniform,
            set,
            pipeline,
            _pool: pool,
            _layout: layout,
            extent,
        })
    }

    /// `hdr` is loaded and blended into; `depth` is the prepass depth.
    pub fn record(
        &mut self,
        frame: &FrameInputs<'_>,
        hdr: &mut Image,
        depth: &mut Image,
    ) -> RendererResult<u32> {
        let cmd = frame.cmd;
        let uniform = ForwardUniform {
            camera: CameraUniform::from_camera(frame.camera),
            light: frame.scene.light().uniform(),
        };
        self.uniform.write(frame.slot, &uniform)?;

        hdr.transition_to(cmd, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        let depth_layout = depth.sampled_layout();
        depth.transition_to(cmd, depth_layout);

        let rendering = RenderingConfig::from_extent(self.extent)
            .with_color_attachment(ColorAttachment::from_image(hdr))
            .with_depth_attachment(DepthAttachment::read_only(depth.view()))
            .build();

        cmd.begin_label(PassId::Forward.label());
        cmd.begin_rendering(&rendering);
        cmd.set_viewport_scissor(self.extent);
        self.pipeline.bind(cmd);
        self.set.bind(cmd, self.pipeline.layout(), 0, frame.slot);
        let draws = frame.scene.draw_transparent(
            cmd,
            self.pipeline.layout(),
            1,
            frame.slot,
            frame.camera.position,
        );
        cmd.end_rendering();
        cmd.end_label();

        publish_outputs(cmd, &mut [hdr]);

        Ok(draws)
    }

    /// Owns no targets; only the render area changes.
    pub fn resize(&mut self, extent: vk::Extent2D) -> RhiResult<()> {
        self.extent = extent;
        Ok(())
    }
}

impl PassIo for ForwardPass {
    fn id(&self) -> PassId {
        PassId::Forward
    }

    fn reads(&self) -> &'static [Attachment] {
        &[Attachment::HdrColor, Attachment::SceneDepth]
    }

    fn writes(&self) -> &'static [Attachment] {
        &[Attachment::HdrColor]
    }
}
