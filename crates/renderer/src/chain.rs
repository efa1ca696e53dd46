//! The seven passes wired together in frame order.

use std::path::Path;
use std::sync::Arc;

use ash::vk;
use tracing::info;

use umbra_core::{PostConfig, RendererSettings, VolumetricConfig};
use umbra_rhi::device::Device;
use umbra_rhi::image::Image;

use crate::error::RendererResult;
use crate::graph::{PassGraph, PassId, PassIo};
use crate::passes::{
    BlitPass, DepthPrepass, ForwardPass, FrameInputs, GeometryPass, LightingPass, ShadowPass,
    VolumetricPass,
};

/// Owns every pass and records them in dependency order, handing each pass
/// the images it reads from the pass that produced them.
pub struct PassChain {
    graph: PassGraph,
    depth_prepass: DepthPrepass,
    shadow: ShadowPass,
    geometry: GeometryPass,
    lighting: LightingPass,
    volumetric: VolumetricPass,
    forward: ForwardPass,
    blit: BlitPass,
}

/// Surface-independent inputs for building the chain.
pub struct ChainConfig<'a> {
    pub settings: &'a RendererSettings,
    pub post: PostConfig,
    pub volumetric: VolumetricConfig,
    pub extent: vk::Extent2D,
    pub target_format: vk::Format,
    /// Layout of the per-mesh material set, bound as set 1 by mesh passes.
    pub material_layout: vk::DescriptorSetLayout,
}

impl PassChain {
    pub fn new(device: Arc<Device>, config: ChainConfig<'_>) -> RendererResult<Self> {
        let shader_dir: &Path = &config.settings.shader_dir;
        let extent = config.extent;

        let depth_prepass = DepthPrepass::new(device.clone(), shader_dir, extent)?;
        let shadow = ShadowPass::new(device.clone(), shader_dir, config.settings.shadow_map_size)?;
        let geometry =
            GeometryPass::new(device.clone(), shader_dir, extent, config.material_layout)?;
        let lighting = LightingPass::new(
            device.clone(),
            shader_dir,
            extent,
            config.settings.clear_color,
            &geometry,
            &shadow,
        )?;
        let volumetric = VolumetricPass::new(
            device.clone(),
            shader_dir,
            extent,
            config.volumetric,
            (&depth_prepass, &lighting, &shadow),
        )?;
        let forward = ForwardPass::new(device.clone(), shader_dir, extent, config.material_layout)?;
        let blit = BlitPass::new(
            device,
            shader_dir,
            config.target_format,
            config.post,
            &volumetric,
        )?;

        let mut graph = PassGraph::new();
        let passes: [&dyn PassIo; 7] = [
            &depth_prepass,
            &shadow,
            &geometry,
            &lighting,
            &volumetric,
            &forward,
            &blit,
        ];
        for pass in passes {
            graph.declare_pass(pass)?;
        }
        graph.validate()?;
        info!("Pass chain built: {:?}", graph.order());

        Ok(Self {
            graph,
            depth_prepass,
            shadow,
            geometry,
            lighting,
            volumetric,
            forward,
            blit,
        })
    }

    /// Records every pass for `frame.slot`, ending with `target` in
    /// `PRESENT_SRC_KHR`. Returns the total number of draws.
    pub fn record(
        &mut self,
        frame: &FrameInputs<'_>,
        target: &mut Image,
        target_depth: &mut Image,
    ) -> RendererResult<u32> {
        let slot = frame.slot;
        self.graph.begin_frame();
        let mut draws = 0;

        self.graph.record(PassId::DepthPrepass)?;
        draws += self.depth_prepass.record(frame)?;

        self.graph.record(PassId::Shadow)?;
        draws += self.shadow.record(frame)?;

        self.graph.record(PassId::Geometry)?;
        draws += self
            .geometry
            .record(frame, self.depth_prepass.depth_mut(slot))?;

        self.graph.record(PassId::Lighting)?;
        draws += self.lighting.record(
            frame,
            self.geometry.gbuffer_mut(slot),
            self.shadow.map_mut(slot),
        )?;

        self.graph.record(PassId::Volumetric)?;
        draws += self.volumetric.record(
            frame,
            self.lighting.lit_mut(slot),
            self.depth_prepass.depth_mut(slot),
            self.shadow.map_mut(slot),
        )?;

        self.graph.record(PassId::Forward)?;
        draws += self.forward.record(
            frame,
            self.volumetric.hdr_mut(slot),
            self.depth_prepass.depth_mut(slot),
        )?;

        self.graph.record(PassId::Blit)?;
        draws += self
            .blit
            .record(frame, self.volumetric.hdr_mut(slot), target, target_depth)?;

        Ok(draws)
    }

    /// Resizes producers before their consumers, so every consumer rebinds
    /// the new images. The device must be idle.
    pub fn resize(
        &mut self,
        extent: vk::Extent2D,
        target_format: vk::Format,
    ) -> RendererResult<()> {
        self.depth_prepass.resize(extent)?;
        self.shadow.resize(extent)?;
        self.geometry.resize(extent)?;
        self.lighting.resize(extent, &self.geometry, &self.shadow)?;
        self.volumetric
            .resize(extent, (&self.depth_prepass, &self.lighting, &self.shadow))?;
        self.forward.resize(extent)?;
        self.blit.resize(extent, target_format, &self.volumetric)?;
        Ok(())
    }

    pub fn graph(&self) -> &PassGraph {
        &self.graph
    }

    pub fn post_mut(&mut self) -> &mut PostConfig {
        &mut self.blit.post
    }

    pub fn volumetric_mut(&mut self) -> &mut VolumetricConfig {
        &mut self.volumetric.config
    }
}
