//! GPU images with tracked layouts.
//!
//! Every [`Image`] carries a [`LayoutTracker`] holding the layout the image
//! will be in once all previously recorded commands have executed. The only
//! way to change it is [`Image::transition_layout`], which records the
//! pipeline barrier and updates the tracked layout together, so the barrier's
//! old layout always equals the tracked layout.
//!
//! The caller supplies the barrier's stage and access masks. In debug builds
//! they are checked against the old and new layouts by [`validate_barrier`];
//! a mismatch is a programming error and panics.

use std::ffi::CString;
use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use thiserror::Error;
use tracing::debug;

use crate::command::CommandBuffer;
use crate::device::Device;
use crate::error::RhiResult;
use crate::sampler::Sampler;

/// Stage and access masks for both sides of an image barrier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BarrierInfo {
    pub src_stage: vk::PipelineStageFlags,
    pub src_access: vk::AccessFlags,
    pub dst_stage: vk::PipelineStageFlags,
    pub dst_access: vk::AccessFlags,
}

impl BarrierInfo {
    pub const fn new(
        src_stage: vk::PipelineStageFlags,
        src_access: vk::AccessFlags,
        dst_stage: vk::PipelineStageFlags,
        dst_access: vk::AccessFlags,
    ) -> Self {
        Self {
            src_stage,
            src_access,
            dst_stage,
            dst_access,
        }
    }

    /// Masks for the common case: the previous user of `old` is its usual
    /// writer (or reader), the next user of `new` is its usual consumer, and
    /// shader reads happen in the fragment stage.
    ///
    /// Leaving `UNDEFINED` waits on the destination stage itself, so the
    /// first barrier of a swapchain image chains with the acquire semaphore
    /// that the submit waits on at colour output.
    pub fn recommended(old: vk::ImageLayout, new: vk::ImageLayout) -> Self {
        let (dst_stage, dst_access) = destination_scope(new);
        let (src_stage, src_access) = match old {
            vk::ImageLayout::UNDEFINED => (dst_stage, vk::AccessFlags::empty()),
            _ => source_scope(old),
        };
        Self::new(src_stage, src_access, dst_stage, dst_access)
    }

    /// Like [`recommended`](Self::recommended) but for shader reads that
    /// begin in the vertex stage.
    pub fn recommended_for_vertex_read(old: vk::ImageLayout, new: vk::ImageLayout) -> Self {
        let mut info = Self::recommended(old, new);
        if is_read_only(new) {
            info.dst_stage |= vk::PipelineStageFlags::VERTEX_SHADER;
        }
        info
    }
}

fn source_scope(layout: vk::ImageLayout) -> (vk::PipelineStageFlags, vk::AccessFlags) {
    use vk::{AccessFlags as A, ImageLayout as L, PipelineStageFlags as S};
    match layout {
        // The acquire semaphore is waited on at colour output.
        L::PRESENT_SRC_KHR => (S::COLOR_ATTACHMENT_OUTPUT, A::empty()),
        L::COLOR_ATTACHMENT_OPTIMAL => (S::COLOR_ATTACHMENT_OUTPUT, A::COLOR_ATTACHMENT_WRITE),
        L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL | L::DEPTH_ATTACHMENT_OPTIMAL => (
            S::EARLY_FRAGMENT_TESTS | S::LATE_FRAGMENT_TESTS,
            A::DEPTH_STENCIL_ATTACHMENT_WRITE,
        ),
        // Reads need no availability, only an execution dependency.
        L::SHADER_READ_ONLY_OPTIMAL => (S::FRAGMENT_SHADER, A::empty()),
        L::DEPTH_STENCIL_READ_ONLY_OPTIMAL | L::DEPTH_READ_ONLY_OPTIMAL => (
            S::EARLY_FRAGMENT_TESTS | S::LATE_FRAGMENT_TESTS | S::FRAGMENT_SHADER,
            A::empty(),
        ),
        L::TRANSFER_DST_OPTIMAL => (S::TRANSFER, A::TRANSFER_WRITE),
        L::TRANSFER_SRC_OPTIMAL => (S::TRANSFER, A::empty()),
        _ => (S::ALL_COMMANDS, A::MEMORY_WRITE),
    }
}

fn destination_scope(layout: vk::ImageLayout) -> (vk::PipelineStageFlags, vk::AccessFlags) {
    use vk::{AccessFlags as A, ImageLayout as L, PipelineStageFlags as S};
    match layout {
        L::COLOR_ATTACHMENT_OPTIMAL => (
            S::COLOR_ATTACHMENT_OUTPUT,
            A::COLOR_ATTACHMENT_READ | A::COLOR_ATTACHMENT_WRITE,
        ),
        L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL | L::DEPTH_ATTACHMENT_OPTIMAL => (
            S::EARLY_FRAGMENT_TESTS | S::LATE_FRAGMENT_TESTS,
            A::DEPTH_STENCIL_ATTACHMENT_READ | A::DEPTH_STENCIL_ATTACHMENT_WRITE,
        ),
        L::SHADER_READ_ONLY_OPTIMAL => (S::FRAGMENT_SHADER, A::SHADER_READ),
        L::DEPTH_STENCIL_READ_ONLY_OPTIMAL | L::DEPTH_READ_ONLY_OPTIMAL => (
            S::EARLY_FRAGMENT_TESTS | S::FRAGMENT_SHADER,
            A::DEPTH_STENCIL_ATTACHMENT_READ | A::SHADER_READ,
        ),
        L::PRESENT_SRC_KHR => (S::BOTTOM_OF_PIPE, A::empty()),
        L::TRANSFER_DST_OPTIMAL => (S::TRANSFER, A::TRANSFER_WRITE),
        L::TRANSFER_SRC_OPTIMAL => (S::TRANSFER, A::TRANSFER_READ),
        _ => (S::ALL_COMMANDS, A::MEMORY_READ | A::MEMORY_WRITE),
    }
}

/// Read-only layout for sampling an image with `aspect`. Depth stays
/// usable as a read-only depth attachment.
pub fn sampled_layout(aspect: vk::ImageAspectFlags) -> vk::ImageLayout {
    if aspect.contains(vk::ImageAspectFlags::DEPTH) {
        vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
    } else {
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
    }
}

/// Layouts in which an image can only be read.
pub fn is_read_only(layout: vk::ImageLayout) -> bool {
    matches!(
        layout,
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
            | vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
            | vk::ImageLayout::DEPTH_READ_ONLY_OPTIMAL
            | vk::ImageLayout::TRANSFER_SRC_OPTIMAL
    )
}

/// Which half of a barrier a mismatch was found in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BarrierSide {
    Source,
    Destination,
}

/// A barrier whose masks cannot be right for its layouts.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum BarrierMismatch {
    #[error("{side:?} stage mask is empty")]
    EmptyStage { side: BarrierSide },

    #[error("{side:?} stages {stages:?} never touch an image in {layout:?}")]
    Stage {
        side: BarrierSide,
        layout: vk::ImageLayout,
        stages: vk::PipelineStageFlags,
    },

    #[error("{side:?} access {access:?} is not possible in {layout:?}")]
    Access {
        side: BarrierSide,
        layout: vk::ImageLayout,
        access: vk::AccessFlags,
    },

    #[error("{side:?} access {access:?} given for a stage that performs no accesses")]
    AccessOnNoOpStage {
        side: BarrierSide,
        access: vk::AccessFlags,
    },

    #[error("cannot transition to UNDEFINED")]
    UndefinedTarget,
}

/// Stages and accesses that can legitimately involve an image in `layout`.
/// `None` means the layout is unrestricted.
fn layout_scope(layout: vk::ImageLayout) -> Option<(vk::PipelineStageFlags, vk::AccessFlags)> {
    use vk::{AccessFlags as A, ImageLayout as L, PipelineStageFlags as S};
    let shader_stages = S::VERTEX_SHADER | S::FRAGMENT_SHADER | S::COMPUTE_SHADER;
    let depth_tests = S::EARLY_FRAGMENT_TESTS | S::LATE_FRAGMENT_TESTS;
    match layout {
        L::UNDEFINED | L::PRESENT_SRC_KHR => Some((S::ALL_COMMANDS, A::empty())),
        L::COLOR_ATTACHMENT_OPTIMAL => Some((
            S::COLOR_ATTACHMENT_OUTPUT,
            A::COLOR_ATTACHMENT_READ | A::COLOR_ATTACHMENT_WRITE,
        )),
        L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL | L::DEPTH_ATTACHMENT_OPTIMAL => Some((
            depth_tests,
            A::DEPTH_STENCIL_ATTACHMENT_READ | A::DEPTH_STENCIL_ATTACHMENT_WRITE,
        )),
        L::DEPTH_STENCIL_READ_ONLY_OPTIMAL | L::DEPTH_READ_ONLY_OPTIMAL => Some((
            depth_tests | shader_stages,
            A::DEPTH_STENCIL_ATTACHMENT_READ | A::SHADER_READ | A::INPUT_ATTACHMENT_READ,
        )),
        L::SHADER_READ_ONLY_OPTIMAL => {
            Some((shader_stages, A::SHADER_READ | A::INPUT_ATTACHMENT_READ))
        }
        L::TRANSFER_SRC_OPTIMAL => Some((S::TRANSFER, A::TRANSFER_READ)),
        L::TRANSFER_DST_OPTIMAL => Some((S::TRANSFER, A::TRANSFER_WRITE)),
        _ => None,
    }
}

fn check_side(
    side: BarrierSide,
    layout: vk::ImageLayout,
    stages: vk::PipelineStageFlags,
    access: vk::AccessFlags,
) -> Result<(), BarrierMismatch> {
    use vk::PipelineStageFlags as S;

    if stages.is_empty() {
        return Err(BarrierMismatch::EmptyStage { side });
    }

    let no_op = match side {
        BarrierSide::Source => S::TOP_OF_PIPE,
        BarrierSide::Destination => S::BOTTOM_OF_PIPE,
    };
    if stages == no_op && !access.is_empty() {
        return Err(BarrierMismatch::AccessOnNoOpStage { side, access });
    }

    let Some((allowed_stages, allowed_access)) = layout_scope(layout) else {
        return Ok(());
    };

    let always = S::TOP_OF_PIPE | S::BOTTOM_OF_PIPE | S::ALL_COMMANDS | S::ALL_GRAPHICS;
    if allowed_stages != S::ALL_COMMANDS && !(allowed_stages | always).contains(stages) {
        return Err(BarrierMismatch::Stage {
            side,
            layout,
            stages,
        });
    }
    if !allowed_access.contains(access) {
        return Err(BarrierMismatch::Access {
            side,
            layout,
            access,
        });
    }
    Ok(())
}

/// Checks that `info` is consistent with an `old -> new` transition.
///
/// Catches masks that cannot possibly be right, such as a depth-write access
/// on the consumer side of a transition into a read-only layout.
/// Over-broad but legal masks (`ALL_COMMANDS`) pass.
pub fn validate_barrier(
    old: vk::ImageLayout,
    new: vk::ImageLayout,
    info: &BarrierInfo,
) -> Result<(), BarrierMismatch> {
    if new == vk::ImageLayout::UNDEFINED {
        return Err(BarrierMismatch::UndefinedTarget);
    }
    check_side(BarrierSide::Source, old, info.src_stage, info.src_access)?;
    check_side(BarrierSide::Destination, new, info.dst_stage, info.dst_access)
}

/// A transition the tracker has accepted and that must now be recorded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayoutTransition {
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
    pub barrier: BarrierInfo,
}

impl LayoutTransition {
    /// Builds the `VkImageMemoryBarrier` for this transition.
    pub fn to_vk(
        &self,
        image: vk::Image,
        aspect: vk::ImageAspectFlags,
    ) -> vk::ImageMemoryBarrier<'static> {
        vk::ImageMemoryBarrier::default()
            .old_layout(self.old_layout)
            .new_layout(self.new_layout)
            .src_access_mask(self.barrier.src_access)
            .dst_access_mask(self.barrier.dst_access)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(aspect)
                    .base_mip_level(0)
                    .level_count(vk::REMAINING_MIP_LEVELS)
                    .base_array_layer(0)
                    .layer_count(vk::REMAINING_ARRAY_LAYERS),
            )
    }
}

/// The tracked-layout state of one image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayoutTracker {
    current: vk::ImageLayout,
}

impl LayoutTracker {
    pub fn new(initial: vk::ImageLayout) -> Self {
        Self { current: initial }
    }

    #[inline]
    pub fn current(&self) -> vk::ImageLayout {
        self.current
    }

    /// Accepts a transition to `new_layout` and updates the tracked layout.
    ///
    /// Returns `None` when the image already sits in `new_layout` and that
    /// layout is read-only, since read-after-read needs no barrier.
    ///
    /// # Panics
    ///
    /// In debug builds, if `barrier` fails [`validate_barrier`].
    pub fn transition(
        &mut self,
        new_layout: vk::ImageLayout,
        barrier: BarrierInfo,
    ) -> Option<LayoutTransition> {
        if new_layout == self.current && is_read_only(new_layout) {
            return None;
        }

        if cfg!(debug_assertions)
            && let Err(mismatch) = validate_barrier(self.current, new_layout, &barrier)
        {
            panic!(
                "invalid barrier for {:?} -> {:?}: {}",
                self.current, new_layout, mismatch
            );
        }

        let transition = LayoutTransition {
            old_layout: self.current,
            new_layout,
            barrier,
        };
        self.current = new_layout;
        Some(transition)
    }
}

/// Aspect mask covering every plane of `format`.
pub fn aspect_for_format(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D16_UNORM | vk::Format::D32_SFLOAT | vk::Format::X8_D24_UNORM_PACK32 => {
            vk::ImageAspectFlags::DEPTH
        }
        vk::Format::D16_UNORM_S8_UINT
        | vk::Format::D24_UNORM_S8_UINT
        | vk::Format::D32_SFLOAT_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        _ => vk::ImageAspectFlags::COLOR,
    }
}

/// Creation parameters for an [`Image`].
#[derive(Clone, Copy, Debug)]
pub struct ImageDesc<'a> {
    pub name: &'a str,
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
}

/// A 2D image, its view, its memory and its tracked layout.
pub struct Image {
    device: Arc<Device>,
    image: vk::Image,
    view: vk::ImageView,
    /// `None` for swapchain-owned images.
    allocation: Option<Allocation>,
    format: vk::Format,
    extent: vk::Extent2D,
    aspect: vk::ImageAspectFlags,
    tracker: LayoutTracker,
    sampler: Option<Sampler>,
    name: String,
}

impl Image {
    /// Allocates a device-local image and creates its view. The tracked
    /// layout starts at `UNDEFINED`.
    pub fn new(device: Arc<Device>, desc: &ImageDesc<'_>) -> RhiResult<Self> {
        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(desc.format)
            .extent(vk::Extent3D {
                width: desc.extent.width.max(1),
                height: desc.extent.height.max(1),
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { device.handle().create_image(&image_info, None)? };
        let requirements = unsafe { device.handle().get_image_memory_requirements(image) };

        let allocation = device.allocator().allocate(&AllocationCreateDesc {
            name: desc.name,
            requirements,
            location: MemoryLocation::GpuOnly,
            linear: false,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.handle().destroy_image(image, None) };
                return Err(e.into());
            }
        };

        unsafe {
            device
                .handle()
                .bind_image_memory(image, allocation.memory(), allocation.offset())?;
        }

        let aspect = aspect_for_format(desc.format);
        let view = create_view(&device, image, desc.format, aspect)?;

        if let Ok(label) = CString::new(desc.name) {
            device.capabilities().set_object_name(image, &label);
        }

        debug!(
            "Created image '{}': {}x{} {:?}",
            desc.name, desc.extent.width, desc.extent.height, desc.format
        );

        Ok(Self {
            device,
            image,
            view,
            allocation: Some(allocation),
            format: desc.format,
            extent: desc.extent,
            aspect,
            tracker: LayoutTracker::new(vk::ImageLayout::UNDEFINED),
            sampler: None,
            name: desc.name.to_string(),
        })
    }

    /// A colour render target that later passes sample.
    pub fn color_target(
        device: Arc<Device>,
        name: &str,
        extent: vk::Extent2D,
        format: vk::Format,
    ) -> RhiResult<Self> {
        Self::new(
            device,
            &ImageDesc {
                name,
                extent,
                format,
                usage: vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
            },
        )
    }

    /// A depth target in the device's resolved depth format.
    pub fn depth_target(device: Arc<Device>, name: &str, extent: vk::Extent2D) -> RhiResult<Self> {
        let format = device.capabilities().depth_format();
        Self::new(
            device,
            &ImageDesc {
                name,
                extent,
                format,
                usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT
                    | vk::ImageUsageFlags::SAMPLED,
            },
        )
    }

    /// Wraps an image owned by the swapchain. Only the view is owned.
    pub(crate) fn from_swapchain(
        device: Arc<Device>,
        image: vk::Image,
        format: vk::Format,
        extent: vk::Extent2D,
        index: usize,
    ) -> RhiResult<Self> {
        let aspect = vk::ImageAspectFlags::COLOR;
        let view = create_view(&device, image, format, aspect)?;
        Ok(Self {
            device,
            image,
            view,
            allocation: None,
            format,
            extent,
            aspect,
            tracker: LayoutTracker::new(vk::ImageLayout::UNDEFINED),
            sampler: None,
            name: format!("swapchain[{index}]"),
        })
    }

    /// Records a barrier from the tracked layout to `new_layout` and updates
    /// the tracked layout.
    pub fn transition_layout(
        &mut self,
        cmd: &CommandBuffer,
        new_layout: vk::ImageLayout,
        barrier: BarrierInfo,
    ) {
        if let Some(transition) = self.tracker.transition(new_layout, barrier) {
            let vk_barrier = transition.to_vk(self.image, self.aspect);
            cmd.pipeline_barrier(barrier.src_stage, barrier.dst_stage, &[vk_barrier]);
        }
    }

    /// [`transition_layout`](Self::transition_layout) with
    /// [`BarrierInfo::recommended`] masks.
    pub fn transition_to(&mut self, cmd: &CommandBuffer, new_layout: vk::ImageLayout) {
        let barrier = BarrierInfo::recommended(self.tracker.current(), new_layout);
        self.transition_layout(cmd, new_layout, barrier);
    }

    /// The read-only layout this image is sampled in.
    pub fn sampled_layout(&self) -> vk::ImageLayout {
        sampled_layout(self.aspect)
    }

    /// Descriptor contents for sampling this image in its sampled layout.
    ///
    /// Uses the image's own sampler, or `fallback` if it has none.
    pub fn descriptor_info(&self, fallback: vk::Sampler) -> vk::DescriptorImageInfo {
        vk::DescriptorImageInfo::default()
            .sampler(self.sampler().unwrap_or(fallback))
            .image_view(self.view)
            .image_layout(self.sampled_layout())
    }

    pub fn set_sampler(&mut self, sampler: Sampler) {
        self.sampler = Some(sampler);
    }

    pub fn sampler(&self) -> Option<vk::Sampler> {
        self.sampler.as_ref().map(Sampler::handle)
    }

    #[inline]
    pub fn layout(&self) -> vk::ImageLayout {
        self.tracker.current()
    }

    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn aspect(&self) -> vk::ImageAspectFlags {
        self.aspect
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

fn create_view(
    device: &Device,
    image: vk::Image,
    format: vk::Format,
    aspect: vk::ImageAspectFlags,
) -> RhiResult<vk::ImageView> {
    // Sampling a combined depth/stencil view must select a single aspect.
    let view_aspect = if aspect.contains(vk::ImageAspectFlags::DEPTH) {
        vk::ImageAspectFlags::DEPTH
    } else {
        aspect
    };
    let info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(view_aspect)
                .base_mip_level(0)
                .level_count(1)
                .base_array_layer(0)
                .layer_count(1),
        );
    Ok(unsafe { device.handle().create_image_view(&info, None)? })
}

impl Drop for Image {
    fn drop(&mut self) {
        self.sampler = None;
        unsafe {
            self.device.handle().destroy_image_view(self.view, None);
        }
        if let Some(allocation) = self.allocation.take() {
            unsafe {
                self.device.handle().destroy_image(self.image, None);
            }
            if let Err(e) = self.device.allocator().free(allocation) {
                tracing::error!("Failed to free image '{}': {:?}", self.name, e);
            }
        }
        debug!("Destroyed image '{}'", self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vk::ImageLayout as L;

    #[test]
    fn test_tracked_layout_follows_every_transition() {
        let mut tracker = LayoutTracker::new(L::UNDEFINED);
        let steps = [
            L::COLOR_ATTACHMENT_OPTIMAL,
            L::SHADER_READ_ONLY_OPTIMAL,
            L::COLOR_ATTACHMENT_OPTIMAL,
            L::TRANSFER_SRC_OPTIMAL,
            L::SHADER_READ_ONLY_OPTIMAL,
        ];

        let mut expected_old = L::UNDEFINED;
        for new in steps {
            let barrier = BarrierInfo::recommended(tracker.current(), new);
            let transition = tracker.transition(new, barrier).unwrap();
            assert_eq!(transition.old_layout, expected_old);
            assert_eq!(transition.new_layout, new);
            assert_eq!(tracker.current(), new);
            expected_old = new;
        }
    }

    #[test]
    fn test_depth_sequence_across_passes() {
        // prepass writes, geometry and volumetric read, next frame clears
        let mut tracker = LayoutTracker::new(L::UNDEFINED);
        let sequence = [
            L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            L::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
            L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        ];
        for new in sequence {
            let old = tracker.current();
            let t = tracker.transition(new, BarrierInfo::recommended(old, new)).unwrap();
            assert_eq!(t.old_layout, old);
        }
        assert_eq!(tracker.current(), L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
    }

    #[test]
    fn test_read_to_same_read_layout_is_skipped() {
        let mut tracker = LayoutTracker::new(L::SHADER_READ_ONLY_OPTIMAL);
        let barrier =
            BarrierInfo::recommended(L::SHADER_READ_ONLY_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL);
        assert!(tracker.transition(L::SHADER_READ_ONLY_OPTIMAL, barrier).is_none());
        assert_eq!(tracker.current(), L::SHADER_READ_ONLY_OPTIMAL);
    }

    #[test]
    fn test_write_to_same_write_layout_still_barriers() {
        let mut tracker = LayoutTracker::new(L::COLOR_ATTACHMENT_OPTIMAL);
        let barrier =
            BarrierInfo::recommended(L::COLOR_ATTACHMENT_OPTIMAL, L::COLOR_ATTACHMENT_OPTIMAL);
        let transition = tracker.transition(L::COLOR_ATTACHMENT_OPTIMAL, barrier).unwrap();
        assert_eq!(transition.old_layout, L::COLOR_ATTACHMENT_OPTIMAL);
    }

    #[test]
    fn test_first_colour_barrier_waits_for_colour_output() {
        // The acquire semaphore is waited on at colour output; a fresh
        // swapchain image must not be transitioned before that point.
        let info = BarrierInfo::recommended(L::UNDEFINED, L::COLOR_ATTACHMENT_OPTIMAL);
        assert!(info.src_stage.contains(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT));
        assert!(!info.src_stage.contains(vk::PipelineStageFlags::TOP_OF_PIPE));
        assert!(info.src_access.is_empty());

        let mut tracker = LayoutTracker::new(L::UNDEFINED);
        let transition = tracker.transition(L::COLOR_ATTACHMENT_OPTIMAL, info).unwrap();
        assert_eq!(
            transition.barrier.src_stage,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        );
    }

    #[test]
    fn test_first_depth_barrier_orders_after_earlier_depth_tests() {
        let info = BarrierInfo::recommended(L::UNDEFINED, L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
        assert!(info.src_stage.contains(vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS));
        assert!(info.src_access.is_empty());
        assert_eq!(
            validate_barrier(L::UNDEFINED, L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL, &info),
            Ok(())
        );
    }

    #[test]
    fn test_recommended_masks_always_validate() {
        let layouts = [
            L::UNDEFINED,
            L::COLOR_ATTACHMENT_OPTIMAL,
            L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            L::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
            L::SHADER_READ_ONLY_OPTIMAL,
            L::TRANSFER_SRC_OPTIMAL,
            L::TRANSFER_DST_OPTIMAL,
            L::PRESENT_SRC_KHR,
            L::GENERAL,
        ];
        for old in layouts {
            for new in layouts.iter().copied().filter(|&l| l != L::UNDEFINED) {
                let info = BarrierInfo::recommended(old, new);
                assert_eq!(validate_barrier(old, new, &info), Ok(()), "{old:?} -> {new:?}");
            }
        }
    }

    #[test]
    fn test_depth_write_access_on_read_only_target_is_rejected() {
        // A depth image moved to a sampled layout but declared with the
        // attachment-write access of its producer on the consumer side.
        let info = BarrierInfo::new(
            vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        );
        assert_eq!(
            validate_barrier(
                L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
                L::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
                &info
            ),
            Err(BarrierMismatch::Access {
                side: BarrierSide::Destination,
                layout: L::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
                access: vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            })
        );
    }

    #[test]
    fn test_color_stage_for_depth_layout_is_rejected() {
        let info = BarrierInfo::new(
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::AccessFlags::empty(),
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            vk::AccessFlags::empty(),
        );
        assert!(matches!(
            validate_barrier(L::UNDEFINED, L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL, &info),
            Err(BarrierMismatch::Stage { side: BarrierSide::Destination, .. })
        ));
    }

    #[test]
    fn test_access_on_top_of_pipe_is_rejected() {
        let info = BarrierInfo::new(
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        );
        assert!(matches!(
            validate_barrier(L::COLOR_ATTACHMENT_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL, &info),
            Err(BarrierMismatch::AccessOnNoOpStage { side: BarrierSide::Source, .. })
        ));
    }

    #[test]
    fn test_transition_to_undefined_is_rejected() {
        let info = BarrierInfo::recommended(L::COLOR_ATTACHMENT_OPTIMAL, L::GENERAL);
        assert_eq!(
            validate_barrier(L::COLOR_ATTACHMENT_OPTIMAL, L::UNDEFINED, &info),
            Err(BarrierMismatch::UndefinedTarget)
        );
    }

    #[test]
    fn test_vertex_read_variant_adds_vertex_stage() {
        let info = BarrierInfo::recommended_for_vertex_read(
            L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            L::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
        );
        assert!(info.dst_stage.contains(vk::PipelineStageFlags::VERTEX_SHADER));
        assert_eq!(
            validate_barrier(
                L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
                L::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
                &info
            ),
            Ok(())
        );
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "invalid barrier")]
    fn test_tracker_panics_on_mismatched_masks_in_debug() {
        let mut tracker = LayoutTracker::new(L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
        let wrong = BarrierInfo::new(
            vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        );
        tracker.transition(L::DEPTH_STENCIL_READ_ONLY_OPTIMAL, wrong);
    }

    #[test]
    fn test_aspect_for_format() {
        assert_eq!(aspect_for_format(vk::Format::D32_SFLOAT), vk::ImageAspectFlags::DEPTH);
        assert_eq!(
            aspect_for_format(vk::Format::D24_UNORM_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
        assert_eq!(
            aspect_for_format(vk::Format::R16G16B16A16_SFLOAT),
            vk::ImageAspectFlags::COLOR
        );
    }
}
