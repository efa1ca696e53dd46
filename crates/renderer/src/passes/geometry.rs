//! G-buffer fill.

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
use umbra_rhi::rendering::{ColorAttachment, DepthAttachment, RenderingConfig};
use umbra_rhi::uniform::UniformBuffer;
use umbra_scene::MeshPushConstants;

use super::{FrameInputs, pass_set_layout, publish_outputs, slot_pool};
use crate::error::RendererResult;
use crate::graph::{Attachment, PassId, PassIo};
use crate::ubo::CameraUniform;

/// Albedo, normal, specular and world position, in attachment order.
pub const GBUFFER_FORMATS: [vk::Format; 4] = [
    vk::Format::R8G8B8A8_UNORM,
    vk::Format::R16G16B16A16_SFLOAT,
    vk::Format::R8G8B8A8_UNORM,
    vk::Format::R32G32B32A32_SFLOAT,
];

/// The G-buffer of one frame slot.
///
/// Position `w` is 1 where geometry was drawn and stays 0 on background
/// pixels.
pub struct GBuffer {
    pub albedo: Image,
    pub normal: Image,
    pub specular: Image,
    pub position: Image,
}

impl GBuffer {
    fn new(device: &Arc<Device>, slot: usize, extent: vk::Extent2D) -> RhiResult<Self> {
        let target = |name: &str, format| {
            Image::color_target(device.clone(), &format!("gbuffer {name}[{slot}]"), extent, format)
        };
        Ok(Self {
            albedo: target("albedo", GBUFFER_FORMATS[0])?,
            normal: target("normal", GBUFFER_FORMATS[1])?,
            specular: target("specular", GBUFFER_FORMATS[2])?,
            position: target("position", GBUFFER_FORMATS[3])?,
        })
    }

    pub fn images(&self) -> [&Image; 4] {
        [&self.albedo, &self.normal, &self.specular, &self.position]
    }

    pub fn images_mut(&mut self) -> [&mut Image; 4] {
        [
            &mut self.albedo,
            &mut self.normal,
            &mut self.specular,
            &mut self.position,
        ]
    }
}

/// Writes the surface attributes of opaque meshes.
///
/// Depth is tested `LESS_OR_EQUAL` against the prepass result and never
/// written, so only the front-most surface of each pixel is shaded.
pub struct GeometryPass {
    device: Arc<Device>,
    gbuffers: Vec<GBuffer>,
    camera: UniformBuffer<CameraUniform>,
    set: DescriptorSet,
    pipeline: Pipeline,
    _pool: DescriptorPool,
    _layout: DescriptorSetLayout,
    extent: vk::Extent2D,
}

impl GeometryPass {
    /// `material_layout` is bound as set 1.
    pub fn new(
        device: Arc<Device>,
        shader_dir: &Path,
        extent: vk::Extent2D,
        material_layout: vk::DescriptorSetLayout,
    ) -> RhiResult<Self> {
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
            depth_write: false,
            depth_compare: vk::CompareOp::LESS_OR_EQUAL,
            set_layouts: vec![layout.handle(), material_layout],
            push_constant_ranges: vec![MeshPushConstants::range()],
            ..PipelineInfo::opaque(&GBUFFER_FORMATS, depth_format)
        };
        let pipeline =
            Pipeline::load(device.clone(), shader_dir, "geometry.vert", "geometry.frag", &info)?;

        let gbuffers = Self::allocate(&device, extent)?;

        Ok(Self {
            device,
            gbuffers,
            camera,
            set,
            pipeline,
            _pool: pool,
            _layout: layout,
            extent,
        })
    }

    fn allocate(device: &Arc<Device>, extent: vk::Extent2D) -> RhiResult<Vec<GBuffer>> {
        (0..MAX_FRAMES_IN_FLIGHT)
            .map(|slot| GBuffer::new(device, slot, extent))
            .collect()
    }

    /// `depth` is the prepass depth of the same slot.
    pub fn record(&mut self, frame: &FrameInputs<'_>, depth: &mut Image) -> RendererResult<u32> {
        let cmd = frame.cmd;
        self.camera
            .write(frame.slot, &CameraUniform::from_camera(frame.camera))?;

        let depth_layout = depth.sampled_layout();
        depth.transition_to(cmd, depth_layout);

        let gbuffer = &mut self.gbuffers[frame.slot];
        for image in gbuffer.images_mut() {
            image.transition_to(cmd, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        }

        let colors = gbuffer
            .images()
            .map(|image| ColorAttachment::from_image(image).with_clear_color([0.0; 4]));
        let rendering = RenderingConfig::from_extent(self.extent)
            .with_color_attachments(colors)
            .with_depth_attachment(DepthAttachment::read_only(depth.view()))
            .build();

        cmd.begin_label(PassId::Geometry.label());
        cmd.begin_rendering(&rendering);
        cmd.set_viewport_scissor(self.extent);
        self.pipeline.bind(cmd);
        self.set.bind(cmd, self.pipeline.layout(), 0, frame.slot);
        let draws = frame
            .scene
            .draw_opaque(cmd, self.pipeline.layout(), 1, frame.slot);
        cmd.end_rendering();
        cmd.end_label();

        let [albedo, normal, specular, position] = gbuffer.images_mut();
        publish_outputs(cmd, &mut [albedo, normal, specular, position]);

        Ok(draws)
    }

    /// Reallocates the G-buffers. The device must be idle, and consumers
    /// must rewrite their descriptors afterwards.
    pub fn resize(&mut self, extent: vk::Extent2D) -> RhiResult<()> {
        self.gbuffers = Self::allocate(&self.device, extent)?;
        self.extent = extent;
        debug!("G-buffer resized to {}x{}", extent.width, extent.height);
        Ok(())
    }

    pub fn gbuffer(&self, slot: usize) -> &GBuffer {
        &self.gbuffers[slot]
    }

    pub fn gbuffer_mut(&mut self, slot: usize) -> &mut GBuffer {
        &mut self.gbuffers[slot]
    }
}

impl PassIo for GeometryPass {
    fn id(&self) -> PassId {
        PassId::Geometry
    }

    fn reads(&self) -> &'static [Attachment] {
        &[Attachment::SceneDepth]
    }

    fn writes(&self) -> &'static [Attachment] {
        &[
            Attachment::GBufferAlbedo,
            Attachment::GBufferNormal,
            Attachment::GBufferSpecular,
            Attachment::GBufferPosition,
        ]
    }
}

