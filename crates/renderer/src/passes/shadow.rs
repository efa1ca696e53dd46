//! Shadow map rendering from the directional light.

use std::path::Path;
use std::sync::Arc;

use ash::vk;
use tracing::debug;

use umbra_rhi::MAX_FRAMES_IN_FLIGHT;
use umbra_rhi::RhiResult;
use umbra_rhi::descriptor::{DescriptorPool, DescriptorSet, DescriptorSetLayout, WriteTarget};
use umbra_rhi::device::Device;
use umbra_rhi::image::Image;
use umbra_rhi::pipeline::{DepthBias, Pipeline, PipelineInfo};
use umbra_rhi::rendering::{DepthAttachment, RenderingConfig};
use umbra_rhi::sampler::Sampler;
use umbra_rhi::uniform::UniformBuffer;
use umbra_scene::{LightUniform, MeshPushConstants};

use super::{FrameInputs, pass_set_layout, publish_outputs, slot_pool};
use crate::error::RendererResult;
use crate::graph::{Attachment, PassId, PassIo};

/// Slope-scaled bias against acne on surfaces at grazing light angles.
const SHADOW_BIAS: DepthBias = DepthBias {
    constant: 1.25,
    slope: 1.75,
};

/// Renders shadow casters into a square depth map per frame slot, using the
/// light's view-projection as fitted to the scene bounds.
pub struct ShadowPass {
    maps: Vec<Image>,
    size: u32,
    light: UniformBuffer<LightUniform>,
    set: DescriptorSet,
    pipeline: Pipeline,
    _pool: DescriptorPool,
    _layout: DescriptorSetLayout,
}

impl ShadowPass {
    pub fn new(device: Arc<Device>, shader_dir: &Path, size: u32) -> RhiResult<Self> {
        let size = size.max(1);
        let layout = pass_set_layout(&device, vk::ShaderStageFlags::VERTEX, 0)?;
        let pool = slot_pool(&device, &layout)?;
        let light = UniformBuffer::new(device.clone())?;

        let mut set = DescriptorSet::new(device.clone(), &layout, &pool)?;
        for slot in 0..MAX_FRAMES_IN_FLIGHT {
            set.add_buffer_write(WriteTarget::Slot(slot), 0, light.descriptor_info(slot))?;
        }
        set.update_all()?;

        let depth_format = device.capabilities().depth_format();
        // Thin casters such as the glass panes would vanish with culling.
        let info = PipelineInfo {
            set_layouts: vec![layout.handle()],
            push_constant_ranges: vec![MeshPushConstants::range()],
            cull_mode: vk::CullModeFlags::NONE,
            depth_bias: Some(SHADOW_BIAS),
            ..PipelineInfo::depth_only(depth_format)
        };
        let pipeline =
            Pipeline::load(device.clone(), shader_dir, "shadow.vert", "depth.frag", &info)?;

        let extent = vk::Extent2D {
            width: size,
            height: size,
        };
        let maps = (0..MAX_FRAMES_IN_FLIGHT)
            .map(|slot| {
                let mut map =
                    Image::depth_target(device.clone(), &format!("shadow map[{slot}]"), extent)?;
                map.set_sampler(Sampler::shadow_compare(device.clone())?);
                Ok(map)
            })
            .collect::<RhiResult<Vec<_>>>()?;

        debug!("Shadow pass created ({}x{} maps)", size, size);

        Ok(Self {
            maps,
            size,
            light,
            set,
            pipeline,
            _pool: pool,
            _layout: layout,
        })
    }

    pub fn record(&mut self, frame: &FrameInputs<'_>) -> RendererResult<u32> {
        let cmd = frame.cmd;
        self.light.write(frame.slot, &frame.scene.light().uniform())?;

        let map = &mut self.maps[frame.slot];
        map.transition_to(cmd, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
        let extent = map.extent();

        let rendering = RenderingConfig::from_extent(extent)
            .with_depth_attachment(DepthAttachment::cleared(map.view()))
            .build();

        cmd.begin_label(PassId::Shadow.label());
        cmd.begin_rendering(&rendering);
        cmd.set_viewport_scissor(extent);
        self.pipeline.bind(cmd);
        self.set.bind(cmd, self.pipeline.layout(), 0, frame.slot);
        let draws = frame.scene.draw_shadow_casters(cmd, self.pipeline.layout());
        cmd.end_rendering();
        cmd.end_label();

        publish_outputs(cmd, &mut [map]);

        Ok(draws)
    }

    /// The shadow map does not follow the window size.
    pub fn resize(&mut self, _extent: vk::Extent2D) -> RhiResult<()> {
        Ok(())
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn map(&self, slot: usize) -> &Image {
        &self.maps[slot]
    }

    pub fn map_mut(&mut self, slot: usize) -> &mut Image {
        &mut self.maps[slot]
    }
}

impl PassIo for ShadowPass {
    fn id(&self) -> PassId {
        PassId::Shadow
    }

    fn reads(&self) -> &'static [Attachment] {
        &[]
    }

    fn writes(&self) -> &'static [Attachment] {
        &[Attachment::ShadowMap]
    }
}
