//! Immutable graphics pipelines.
//!
//! - [`PipelineInfo`] is a plain configuration struct: fixed-function state,
//!   attachment formats, vertex layout, descriptor set layouts and push
//!   constants. Presets cover the renderer's four pipeline shapes.
//! - [`Pipeline`] owns the compiled `VkPipeline` and its `VkPipelineLayout`.
//!   Once created it can only be bound.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::path::Path;
//! use ash::vk;
//! use umbra_rhi::device::Device;
//! use umbra_rhi::pipeline::{Pipeline, PipelineInfo};
//!
//! # fn example(
//! #     device: Arc<Device>,
//! #     set_layout: vk::DescriptorSetLayout,
//! # ) -> Result<(), umbra_rhi::RhiError> {
//! let info = PipelineInfo {
//!     set_layouts: vec![set_layout],
//!     ..PipelineInfo::fullscreen(vk::Format::R16G16B16A16_SFLOAT)
//! };
//! let dir = Path::new("shaders/spirv");
//! let pipeline = Pipeline::load(device, dir, "fullscreen.vert", "lighting.frag", &info)?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::command::CommandBuffer;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::shader::Shader;
use crate::vertex::Vertex;

/// Per-attachment colour blending.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ColorBlend {
    /// Overwrite.
    #[default]
    Opaque,
    /// `src * a + dst * (1 - a)`.
    Alpha,
    /// `src + dst`.
    Additive,
}

impl ColorBlend {
    pub fn to_vk(self) -> vk::PipelineColorBlendAttachmentState {
        let state = vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA);
        match self {
            ColorBlend::Opaque => state.blend_enable(false),
            ColorBlend::Alpha => state
                .blend_enable(true)
                .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
                .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
                .color_blend_op(vk::BlendOp::ADD)
                .src_alpha_blend_factor(vk::BlendFactor::ONE)
                .dst_alpha_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
                .alpha_blend_op(vk::BlendOp::ADD),
            ColorBlend::Additive => state
                .blend_enable(true)
                .src_color_blend_factor(vk::BlendFactor::ONE)
                .dst_color_blend_factor(vk::BlendFactor::ONE)
                .color_blend_op(vk::BlendOp::ADD)
                .src_alpha_blend_factor(vk::BlendFactor::ONE)
                .dst_alpha_blend_factor(vk::BlendFactor::ONE)
                .alpha_blend_op(vk::BlendOp::ADD),
        }
    }
}

/// Constant and slope-scaled depth bias, for shadow maps.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DepthBias {
    pub constant: f32,
    pub slope: f32,
}

/// Everything a graphics pipeline is compiled from.
#[derive(Clone, Debug)]
pub struct PipelineInfo {
    pub vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    pub vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    pub topology: vk::PrimitiveTopology,
    pub polygon_mode: vk::PolygonMode,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub depth_bias: Option<DepthBias>,
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_compare: vk::CompareOp,
    /// One entry per colour attachment.
    pub color_blend: Vec<ColorBlend>,
    pub color_formats: Vec<vk::Format>,
    pub depth_format: Option<vk::Format>,
    pub dynamic_states: Vec<vk::DynamicState>,
    pub set_layouts: Vec<vk::DescriptorSetLayout>,
    pub push_constant_ranges: Vec<vk::PushConstantRange>,
}

impl Default for PipelineInfo {
    /// Triangle list, back-face culling, dynamic viewport and scissor, no
    /// attachments.
    fn default() -> Self {
        Self {
            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            depth_bias: None,
            depth_test: false,
            depth_write: false,
            depth_compare: vk::CompareOp::LESS,
            color_blend: Vec::new(),
            color_formats: Vec::new(),
            depth_format: None,
            dynamic_states: vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR],
            set_layouts: Vec::new(),
            push_constant_ranges: Vec::new(),
        }
    }
}

impl PipelineInfo {
    /// Mesh geometry writing colour targets with depth test and write.
    pub fn opaque(color_formats: &[vk::Format], depth_format: vk::Format) -> Self {
        Self {
            vertex_bindings: vec![Vertex::binding_description()],
            vertex_attributes: Vertex::attribute_descriptions().to_vec(),
            depth_test: true,
            depth_write: true,
            color_blend: vec![ColorBlend::Opaque; color_formats.len()],
            color_formats: color_formats.to_vec(),
            depth_format: Some(depth_format),
            ..Self::default()
        }
    }

    /// Positions only, no colour attachments.
    pub fn depth_only(depth_format: vk::Format) -> Self {
        Self {
            vertex_bindings: vec![Vertex::binding_description()],
            vertex_attributes: Vertex::position_attribute().to_vec(),
            depth_test: true,
            depth_write: true,
            depth_format: Some(depth_format),
            ..Self::default()
        }
    }

    /// One full-screen triangle with no vertex input and no depth.
    pub fn fullscreen(color_format: vk::Format) -> Self {
        Self {
            cull_mode: vk::CullModeFlags::NONE,
            color_blend: vec![ColorBlend::Opaque],
            color_formats: vec![color_format],
            ..Self::default()
        }
    }

    /// Transparent meshes: alpha blending, depth tested but not written.
    pub fn alpha_blend(color_format: vk::Format, depth_format: vk::Format) -> Self {
        Self {
            vertex_bindings: vec![Vertex::binding_description()],
            vertex_attributes: Vertex::attribute_descriptions().to_vec(),
            cull_mode: vk::CullModeFlags::NONE,
            depth_test: true,
            depth_write: false,
            color_blend: vec![ColorBlend::Alpha],
            color_formats: vec![color_format],
            depth_format: Some(depth_format),
            ..Self::default()
        }
    }

    /// Checks state that would otherwise only fail inside the driver.
    pub fn validate(&self) -> RhiResult<()> {
        if self.color_formats.is_empty() && self.depth_format.is_none() {
            return Err(RhiError::PipelineError(
                "pipeline has no colour or depth attachment".to_string(),
            ));
        }
        if self.color_blend.len() != self.color_formats.len() {
            return Err(RhiError::PipelineError(format!(
                "{} blend states for {} colour attachments",
                self.color_blend.len(),
                self.color_formats.len()
            )));
        }
        if (self.depth_test || self.depth_write) && self.depth_format.is_none() {
            return Err(RhiError::PipelineError(
                "depth state enabled without a depth attachment".to_string(),
            ));
        }
        Ok(())
    }
}

/// Compiled graphics pipeline plus its layout.
pub struct Pipeline {
    device: Arc<Device>,
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
}

impl Pipeline {
    /// Loads `<dir>/<vert>.spv` and `<dir>/<frag>.spv` and compiles them.
    ///
    /// # Errors
    ///
    /// [`RhiError::ShaderNotFound`] if either file is missing.
    pub fn load(
        device: Arc<Device>,
        dir: &Path,
        vert: &str,
        frag: &str,
        info: &PipelineInfo,
    ) -> RhiResult<Self> {
        let vert = Shader::load(device.clone(), dir, vert)?;
        let frag = Shader::load(device.clone(), dir, frag)?;
        Self::new(device, &vert, &frag, info)
    }

    pub fn new(
        device: Arc<Device>,
        vert: &Shader,
        frag: &Shader,
        info: &PipelineInfo,
    ) -> RhiResult<Self> {
        info.validate()?;

        let layout_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(&info.set_layouts)
            .push_constant_ranges(&info.push_constant_ranges);
        let layout = unsafe { device.handle().create_pipeline_layout(&layout_info, None)? };

        match Self::compile(&device, vert, frag, info, layout) {
            Ok(pipeline) => {
                info!(
                    "Graphics pipeline created ({} colour, depth {:?})",
                    info.color_formats.len(),
                    info.depth_format
                );
                Ok(Self {
                    device,
                    pipeline,
                    layout,
                })
            }
            Err(e) => {
                unsafe { device.handle().destroy_pipeline_layout(layout, None) };
                Err(e)
            }
        }
    }

    fn compile(
        device: &Device,
        vert: &Shader,
        frag: &Shader,
        info: &PipelineInfo,
        layout: vk::PipelineLayout,
    ) -> RhiResult<vk::Pipeline> {
        let stages = [vert.stage_create_info(), frag.stage_create_info()];

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&info.vertex_bindings)
            .vertex_attribute_descriptions(&info.vertex_attributes);

        let input_assembly =
            vk::PipelineInputAssemblyStateCreateInfo::default().topology(info.topology);

        let viewport = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let mut rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(info.polygon_mode)
            .cull_mode(info.cull_mode)
            .front_face(info.front_face)
            .line_width(1.0);
        if let Some(bias) = info.depth_bias {
            rasterization = rasterization
                .depth_bias_enable(true)
                .depth_bias_constant_factor(bias.constant)
                .depth_bias_slope_factor(bias.slope);
        }

        let multisample = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(info.depth_test)
            .depth_write_enable(info.depth_write)
            .depth_compare_op(info.depth_compare);

        let blend_attachments: Vec<_> = info.color_blend.iter().map(|b| b.to_vk()).collect();
        let color_blend =
            vk::PipelineColorBlendStateCreateInfo::default().attachments(&blend_attachments);

        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&info.dynamic_states);

        let mut rendering = vk::PipelineRenderingCreateInfo::default()
            .color_attachment_formats(&info.color_formats)
            .depth_attachment_format(info.depth_format.unwrap_or(vk::Format::UNDEFINED));

        let create_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .push_next(&mut rendering);

        let pipelines = unsafe {
            device
                .handle()
                .create_graphics_pipelines(vk::PipelineCache::null(), &[create_info], None)
                .map_err(|(_, result)| result)?
        };
        pipelines
            .into_iter()
            .next()
            .ok_or_else(|| RhiError::PipelineError("driver returned no pipeline".to_string()))
    }

    /// Records the bind. The only operation after creation.
    pub fn bind(&self, cmd: &CommandBuffer) {
        cmd.bind_pipeline(vk::PipelineBindPoint::GRAPHICS, self.pipeline);
    }

    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    #[inline]
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_pipeline(self.pipeline, None);
            self.device
                .handle()
                .destroy_pipeline_layout(self.layout, None);
        }
        debug!("Graphics pipeline destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEPTH: vk::Format = vk::Format::D32_SFLOAT;
    const HDR: vk::Format = vk::Format::R16G16B16A16_SFLOAT;

    #[test]
    fn test_presets_validate() {
        assert!(PipelineInfo::opaque(&[HDR, HDR, HDR, HDR], DEPTH).validate().is_ok());
        assert!(PipelineInfo::depth_only(DEPTH).validate().is_ok());
        assert!(PipelineInfo::fullscreen(HDR).validate().is_ok());
        assert!(PipelineInfo::alpha_blend(HDR, DEPTH).validate().is_ok());
    }

    #[test]
    fn test_fullscreen_has_no_vertex_input() {
        let info = PipelineInfo::fullscreen(HDR);
        assert!(info.vertex_bindings.is_empty());
        assert!(info.vertex_attributes.is_empty());
        assert!(info.depth_format.is_none());
        assert_eq!(info.cull_mode, vk::CullModeFlags::NONE);
    }

    #[test]
    fn test_alpha_blend_tests_but_does_not_write_depth() {
        let info = PipelineInfo::alpha_blend(HDR, DEPTH);
        assert!(info.depth_test);
        assert!(!info.depth_write);
        assert_eq!(info.color_blend, vec![ColorBlend::Alpha]);
        let state = ColorBlend::Alpha.to_vk();
        assert_eq!(state.blend_enable, vk::TRUE);
        assert_eq!(state.dst_color_blend_factor, vk::BlendFactor::ONE_MINUS_SRC_ALPHA);
    }

    #[test]
    fn test_opaque_blend_per_attachment() {
        let info = PipelineInfo::opaque(&[HDR, HDR], DEPTH);
        assert_eq!(info.color_blend.len(), 2);
        assert_eq!(info.vertex_attributes.len(), 6);
    }

    #[test]
    fn test_validate_rejects_mismatched_blend_count() {
        let info = PipelineInfo {
            color_blend: vec![],
            ..PipelineInfo::fullscreen(HDR)
        };
        assert!(matches!(info.validate(), Err(RhiError::PipelineError(_))));
    }

    #[test]
    fn test_validate_rejects_depth_test_without_attachment() {
        let info = PipelineInfo {
            depth_test: true,
            ..PipelineInfo::fullscreen(HDR)
        };
        assert!(info.validate().is_err());
    }

    #[test]
    fn test_default_uses_dynamic_viewport_scissor() {
        let info = PipelineInfo::default();
        assert_eq!(
            info.dynamic_states,
            vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR]
        );
        assert!(info.validate().is_err());
    }
}
