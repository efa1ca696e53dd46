//! Opaque depth, written before any shading.

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
use umbra_rhi::rendering::{DepthAttachment, RenderingConfig};
use umbra_rhi::uniform::UniformBuffer;
use umbra_scene::MeshPushConstants;

use super::{FrameInputs, depth_targets, pass_set_layout, publish_outputs, slot_pool};
use crate::error::RendererResult;
use crate::graph::{Attachment, PassId, PassIo};
use crate::ubo::CameraUniform;

/// Fills the per-slot scene depth with every opaque mesh.
///
/// Later passes test against this depth read-only, so each pixel is shaded
/// once regardless of draw order.
pub struct DepthPrepass {
    device: Arc<Device>,
    depth: Vec<Image>,
    camera: UniformBuffer<CameraUniform>,
    set: DescriptorSet,
    pipeline: Pipeline,
    _pool: DescriptorPool,
    _layout: DescriptorSetLayout,
    extent: vk::Extent2D,
}

impl DepthPrepass {
    pub fn new(device: Arc<Device>, shader_dir: &Path, extent: vk::Extent2D) -> RhiResult<Self> {
        let layout = pass_set_layout(&device, vk::ShaderStageFlags::VERTEX, 0)?;
        let pool = slot_pool(&device, &layout)?;
        let camera = UniformBuffer::new(device.clone())?;

        let mut set = DescriptorSet::new(device.clone(), &layout, &pool)?;
        for slot in 0..MAX_FRAMES_IN_FLIGHT {
            set.add_buffer_write(WriteTarget::Slot(slot), 0, camera.descriptor_info(slot))?;
        }
        set.update_all()?;

        let depth_format = device.capabilities().depth_format();
        let info = PipelineInfo {
            set_layouts: vec![layout.handle()],
            push_constant_ranges: vec![MeshPushConstants::range()],
            ..PipelineInfo::depth_only(depth_format)
        };
        let pipeline =
            Pipeline::load(device.clone(), shader_dir, "depth.vert", "depth.frag", &info)?;

        let depth = depth_targets(&device, "scene depth", extent)?;

        Ok(Self {
            device,
            depth,
            camera,
            set,
            pipeline,
            _pool: pool,
            _layout: layout,
            extent,
        })
    }

    /// Returns the number of draws recorded.
    pub fn record(&mut self, frame: &FrameInputs<'_>) -> RendererResult<u32> {
        let cmd = frame.cmd;
        self.camera
            .write(frame.slot, &CameraUniform::from_camera(frame.camera))?;

        let depth = &mut self.depth[frame.slot];
        depth.transition_to(cmd, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);

        let rendering = RenderingConfig::from_extent(self.extent)
            .with_depth_attachment(DepthAttachment::cleared(depth.view()))
            .build();

        cmd.begin_label(PassId::DepthPrepass.label());
        cmd.begin_rendering(&rendering);
        cmd.set_viewport_scissor(self.extent);
        self.pipeline.bind(cmd);
        self.set.bind(cmd, self.pipeline.layout(), 0, frame.slot);
        let draws = frame.scene.draw_opaque_depth(cmd, self.pipeline.layout());
        cmd.end_rendering();
        cmd.end_label();

        publish_outputs(cmd, &mut [depth]);

        Ok(draws)
    }

    /// Reallocates the depth targets. The device must be idle.
    pub fn resize(&mut self, extent: vk::Extent2D) -> RhiResult<()> {
        self.depth = depth_targets(&self.device, "scene depth", extent)?;
        self.extent = extent;
        debug!("Depth prepass resized to {}x{}", extent.width, extent.height);
        Ok(())
    }

    pub fn depth(&self, slot: usize) -> &Image {
        &self.depth[slot]
    }

    pub fn depth_mut(&mut self, slot: usize) -> &mut Image {
        &mut self.depth[slot]
    }
}

impl PassIo for DepthPrepass {
    fn id(&self) -> PassId {
        PassId::DepthPrepass
    }

    fn reads(&self) -> &'static [Attachment] {
        &[]
    }

    fn writes(&self) -> &'static [Attachment] {
        &[Attachment::SceneDepth]
    }
}
