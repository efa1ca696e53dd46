//! Dynamic rendering attachment configuration.
//!
//! Passes describe their render targets with [`ColorAttachment`] and
//! [`DepthAttachment`], collect them in a [`RenderingConfig`], and hand the
//! built [`RenderingInfoBundle`] to
//! [`CommandBuffer::begin_rendering`](crate::command::CommandBuffer::begin_rendering).
//!
//! ```no_run
//! # use umbra_rhi::command::CommandBuffer;
//! # use umbra_rhi::image::Image;
//! # use umbra_rhi::rendering::{ColorAttachment, RenderingConfig};
//! # fn example(cmd: &CommandBuffer, target: &Image) {
//! let rendering = RenderingConfig::from_extent(target.extent())
//!     .with_color_attachment(ColorAttachment::new(target.view()).with_clear_color([0.0; 4]))
//!     .build();
//! cmd.begin_rendering(&rendering);
//! // draw
//! cmd.end_rendering();
//! # }
//! ```

use ash::vk;

use crate::image::Image;

/// A colour target.
#[derive(Clone, Copy, Debug)]
pub struct ColorAttachment {
    pub image_view: vk::ImageView,
    pub layout: vk::ImageLayout,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub clear_color: [f32; 4],
}

impl ColorAttachment {
    /// Loads existing contents and stores the result.
    pub fn new(image_view: vk::ImageView) -> Self {
        Self {
            image_view,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            load_op: vk::AttachmentLoadOp::LOAD,
            store_op: vk::AttachmentStoreOp::STORE,
            clear_color: [0.0; 4],
        }
    }

    pub fn from_image(image: &Image) -> Self {
        Self::new(image.view())
    }

    /// Clears to `color` on load.
    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.load_op = vk::AttachmentLoadOp::CLEAR;
        self.clear_color = color;
        self
    }

    /// Contents before rendering are irrelevant.
    pub fn dont_care(mut self) -> Self {
        self.load_op = vk::AttachmentLoadOp::DONT_CARE;
        self
    }

    pub fn to_rendering_attachment_info(&self) -> vk::RenderingAttachmentInfo<'static> {
        vk::RenderingAttachmentInfo::default()
            .image_view(self.image_view)
            .image_layout(self.layout)
            .load_op(self.load_op)
            .store_op(self.store_op)
            .clear_value(vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: self.clear_color,
                },
            })
    }
}

/// A depth target.
#[derive(Clone, Copy, Debug)]
pub struct DepthAttachment {
    pub image_view: vk::ImageView,
    pub layout: vk::ImageLayout,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub clear_depth: f32,
}

impl DepthAttachment {
    /// Clears to the far plane and stores, for passes that write depth.
    pub fn cleared(image_view: vk::ImageView) -> Self {
        Self {
            image_view,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            clear_depth: 1.0,
        }
    }

    /// Loads existing depth for testing only. The image stays in a read-only
    /// layout so it can be sampled in the same pass.
    pub fn read_only(image_view: vk::ImageView) -> Self {
        Self {
            image_view,
            layout: vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
            load_op: vk::AttachmentLoadOp::LOAD,
            store_op: vk::AttachmentStoreOp::STORE,
            clear_depth: 1.0,
        }
    }

    /// Clears and discards. For depth that nothing reads afterwards.
    pub fn transient(image_view: vk::ImageView) -> Self {
        Self {
            store_op: vk::AttachmentStoreOp::DONT_CARE,
            ..Self::cleared(image_view)
        }
    }

    pub fn to_rendering_attachment_info(&self) -> vk::RenderingAttachmentInfo<'static> {
        vk::RenderingAttachmentInfo::default()
            .image_view(self.image_view)
            .image_layout(self.layout)
            .load_op(self.load_op)
            .store_op(self.store_op)
            .clear_value(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: self.clear_depth,
                    stencil: 0,
                },
            })
    }
}

/// Attachments and render area for one `vkCmdBeginRendering`.
#[derive(Clone, Debug)]
pub struct RenderingConfig {
    pub color_attachments: Vec<ColorAttachment>,
    pub depth_attachment: Option<DepthAttachment>,
    pub render_area: vk::Rect2D,
}

impl RenderingConfig {
    pub fn from_extent(extent: vk::Extent2D) -> Self {
        Self {
            color_attachments: Vec::new(),
            depth_attachment: None,
            render_area: vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            },
        }
    }

    pub fn with_color_attachment(mut self, attachment: ColorAttachment) -> Self {
        self.color_attachments.push(attachment);
        self
    }

    pub fn with_color_attachments(
        mut self,
        attachments: impl IntoIterator<Item = ColorAttachment>,
    ) -> Self {
        self.color_attachments.extend(attachments);
        self
    }

    pub fn with_depth_attachment(mut self, attachment: DepthAttachment) -> Self {
        self.depth_attachment = Some(attachment);
        self
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.render_area.extent
    }

    /// Converts into Vulkan structures that live as long as the bundle.
    pub fn build(&self) -> RenderingInfoBundle {
        RenderingInfoBundle {
            color_attachments: self
                .color_attachments
                .iter()
                .map(ColorAttachment::to_rendering_attachment_info)
                .collect(),
            depth_attachment: self
                .depth_attachment
                .as_ref()
                .map(DepthAttachment::to_rendering_attachment_info),
            render_area: self.render_area,
        }
    }
}

/// Owns the attachment infos a `vk::RenderingInfo` points at.
pub struct RenderingInfoBundle {
    color_attachments: Vec<vk::RenderingAttachmentInfo<'static>>,
    depth_attachment: Option<vk::RenderingAttachmentInfo<'static>>,
    render_area: vk::Rect2D,
}

impl RenderingInfoBundle {
    pub fn info(&self) -> vk::RenderingInfo<'_> {
        let mut info = vk::RenderingInfo::default()
            .render_area(self.render_area)
            .layer_count(1)
            .color_attachments(&self.color_attachments);

        if let Some(ref depth) = self.depth_attachment {
            info = info.depth_attachment(depth);
        }

        info
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.render_area.extent
    }

    #[inline]
    pub fn color_attachment_count(&self) -> usize {
        self.color_attachments.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_attachment_defaults_to_load_store() {
        let info = ColorAttachment::new(vk::ImageView::null()).to_rendering_attachment_info();
        assert_eq!(info.load_op, vk::AttachmentLoadOp::LOAD);
        assert_eq!(info.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(info.image_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
    }

    #[test]
    fn test_clear_color_sets_load_op() {
        let attachment =
            ColorAttachment::new(vk::ImageView::null()).with_clear_color([1.0, 0.5, 0.0, 1.0]);
        let info = attachment.to_rendering_attachment_info();
        assert_eq!(info.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(unsafe { info.clear_value.color.float32 }, [1.0, 0.5, 0.0, 1.0]);
    }

    #[test]
    fn test_read_only_depth_uses_read_only_layout() {
        let depth = DepthAttachment::read_only(vk::ImageView::null());
        assert_eq!(depth.layout, vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL);
        assert_eq!(depth.load_op, vk::AttachmentLoadOp::LOAD);
    }

    #[test]
    fn test_bundle_info_counts_attachments() {
        let bundle = RenderingConfig::from_extent(vk::Extent2D { width: 64, height: 32 })
            .with_color_attachments([
                ColorAttachment::new(vk::ImageView::null()),
                ColorAttachment::new(vk::ImageView::null()),
            ])
            .with_depth_attachment(DepthAttachment::cleared(vk::ImageView::null()))
            .build();
        let info = bundle.info();
        assert_eq!(info.color_attachment_count, 2);
        assert!(!info.p_depth_attachment.is_null());
        assert_eq!(info.render_area.extent.width, 64);
    }
}
