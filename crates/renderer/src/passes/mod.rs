//! The passes of a frame, in execution order:
//!
//! 1. [`DepthPrepass`]: opaque depth
//! 2. [`ShadowPass`]: depth from the light
//! 3. [`GeometryPass`]: G-buffer, depth tested against the prepass
//! 4. [`LightingPass`]: full-screen deferred resolve with shadows
//! 5. [`VolumetricPass`]: full-screen ray-marched scattering
//! 6. [`ForwardPass`]: transparent meshes blended over the result
//! 7. [`BlitPass`]: tone map into the swapchain image
//!
//! Each pass owns its output images (one per frame slot), its uniform
//! buffer, its descriptor set and its pipeline. A pass leaves its outputs
//! in their sampled layout once it has drawn. Inputs are borrowed from the
//! producing pass at record time, and the consumer re-checks their layout,
//! which is free when the producer already published them.

mod blit;
mod depth_prepass;
mod forward;
mod geometry;
mod lighting;
mod shadow;
mod volumetric;

use std::sync::Arc;

use ash::vk;

use umbra_rhi::MAX_FRAMES_IN_FLIGHT;
use umbra_rhi::RhiResult;
use umbra_rhi::command::CommandBuffer;
use umbra_rhi::descriptor::{DescriptorPool, DescriptorPoolBuilder, DescriptorSetLayout};
use umbra_rhi::device::Device;
use umbra_rhi::image::Image;
use umbra_scene::{Camera, Scene};

pub use blit::BlitPass;
pub use depth_prepass::DepthPrepass;
pub use forward::ForwardPass;
pub use geometry::{GBUFFER_FORMATS, GBuffer, GeometryPass};
pub use lighting::LightingPass;
pub use shadow::ShadowPass;
pub use volumetric::VolumetricPass;

/// Format of the lit and scattered colour targets.
pub const HDR_FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;

/// Everything a pass records against, besides its inputs.
pub struct FrameInputs<'a> {
    pub cmd: &'a CommandBuffer,
    pub slot: usize,
    pub camera: &'a Camera,
    pub scene: &'a Scene,
}

/// One colour target per frame slot.
pub(crate) fn color_targets(
    device: &Arc<Device>,
    name: &str,
    extent: vk::Extent2D,
    format: vk::Format,
) -> RhiResult<Vec<Image>> {
    (0..MAX_FRAMES_IN_FLIGHT)
        .map(|slot| Image::color_target(device.clone(), &format!("{name}[{slot}]"), extent, format))
        .collect()
}

/// One depth target per frame slot.
pub(crate) fn depth_targets(
    device: &Arc<Device>,
    name: &str,
    extent: vk::Extent2D,
) -> RhiResult<Vec<Image>> {
    (0..MAX_FRAMES_IN_FLIGHT)
        .map(|slot| Image::depth_target(device.clone(), &format!("{name}[{slot}]"), extent))
        .collect()
}

/// Set 0 of a pass: a uniform block at binding 0 visible to `ubo_stages`,
/// then `samplers` fragment-stage combined image samplers at 1..=samplers.
pub(crate) fn pass_set_layout(
    device: &Arc<Device>,
    ubo_stages: vk::ShaderStageFlags,
    samplers: u32,
) -> RhiResult<DescriptorSetLayout> {
    let mut builder = DescriptorSetLayout::builder().add_binding(
        0,
        vk::DescriptorType::UNIFORM_BUFFER,
        ubo_stages,
        1,
    );
    for binding in 1..=samplers {
        builder = builder.add_binding(
            binding,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            vk::ShaderStageFlags::FRAGMENT,
            1,
        );
    }
    builder.create(device.clone())
}

/// Pool holding exactly one set of `layout` per frame slot.
pub(crate) fn slot_pool(
    device: &Arc<Device>,
    layout: &DescriptorSetLayout,
) -> RhiResult<DescriptorPool> {
    DescriptorPoolBuilder::new()
        .add_layout(layout.bindings(), MAX_FRAMES_IN_FLIGHT as u32)
        .create(device.clone(), MAX_FRAMES_IN_FLIGHT as u32)
}

/// Moves every input image into the layout it is sampled in. Inputs their
/// producer already published cost nothing.
pub(crate) fn sample_inputs(cmd: &CommandBuffer, inputs: &mut [&mut Image]) {
    for image in inputs.iter_mut() {
        let layout = image.sampled_layout();
        image.transition_to(cmd, layout);
    }
}

/// Hands a pass's finished outputs to the next consumer in their sampled
/// layout.
pub(crate) fn publish_outputs(cmd: &CommandBuffer, outputs: &mut [&mut Image]) {
    sample_inputs(cmd, outputs);
}

#[cfg(test)]
mod tests {
    use umbra_rhi::image::{BarrierInfo, LayoutTracker, sampled_layout};

    use super::*;

    /// What `transition_to` does to an image's tracked layout.
    fn transition(tracker: &mut LayoutTracker, layout: vk::ImageLayout) -> bool {
        let barrier = BarrierInfo::recommended(tracker.current(), layout);
        tracker.transition(layout, barrier).is_some()
    }

    #[test]
    fn test_published_depth_needs_no_consumer_barrier() {
        let read = sampled_layout(vk::ImageAspectFlags::DEPTH);
        let mut depth = LayoutTracker::new(vk::ImageLayout::UNDEFINED);

        // Prepass draws, then publishes.
        assert!(transition(&mut depth, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL));
        assert!(transition(&mut depth, read));
        assert_eq!(depth.current(), vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL);

        // Geometry, volumetric and forward all read it as published.
        for _ in 0..3 {
            assert!(!transition(&mut depth, read));
        }

        // The next frame's prepass writes again.
        assert!(transition(&mut depth, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL));
    }

    #[test]
    fn test_hdr_target_is_republished_after_forward_blend() {
        let read = sampled_layout(vk::ImageAspectFlags::COLOR);
        assert_eq!(read, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        let mut hdr = LayoutTracker::new(vk::ImageLayout::UNDEFINED);

        // Volumetric writes and publishes.
        assert!(transition(&mut hdr, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL));
        assert!(transition(&mut hdr, read));
        // Forward blends on top, then publishes for the blit.
        assert!(transition(&mut hdr, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL));
        assert!(transition(&mut hdr, read));
        // The blit's own input check is free.
        assert!(!transition(&mut hdr, read));
    }
}
