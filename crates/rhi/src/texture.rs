//! Sampled textures uploaded through a staging buffer.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::buffer::{Buffer, BufferUsage};
use crate::command::submit_one_time;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::image::{Image, ImageDesc};
use crate::sampler::Sampler;

/// Colour encoding of uploaded texels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextureEncoding {
    /// Albedo and other colour data.
    Srgb,
    /// Normal maps, specular masks and other linear data.
    Linear,
}

impl TextureEncoding {
    pub fn format(self) -> vk::Format {
        match self {
            TextureEncoding::Srgb => vk::Format::R8G8B8A8_SRGB,
            TextureEncoding::Linear => vk::Format::R8G8B8A8_UNORM,
        }
    }
}

/// Checks that `pixels` holds exactly `width * height` RGBA8 texels.
pub fn check_rgba8_len(width: u32, height: u32, pixels: &[u8]) -> RhiResult<()> {
    let expected = width as u64 * height as u64 * 4;
    if width == 0 || height == 0 || pixels.len() as u64 != expected {
        return Err(RhiError::InvalidHandle(format!(
            "texture {width}x{height} needs {expected} bytes, got {}",
            pixels.len()
        )));
    }
    Ok(())
}

/// Uploads RGBA8 pixels and returns an image in `SHADER_READ_ONLY_OPTIMAL`
/// with a repeating anisotropic sampler attached.
///
/// Blocks until the copy completes.
pub fn upload_rgba8(
    device: &Arc<Device>,
    name: &str,
    width: u32,
    height: u32,
    pixels: &[u8],
    encoding: TextureEncoding,
) -> RhiResult<Image> {
    check_rgba8_len(width, height, pixels)?;

    let staging = Buffer::new_with_data(device.clone(), BufferUsage::Staging, pixels)?;
    let extent = vk::Extent2D { width, height };
    let mut image = Image::new(
        device.clone(),
        &ImageDesc {
            name,
            extent,
            format: encoding.format(),
            usage: vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
        },
    )?;

    submit_one_time(device, |cmd| {
        image.transition_to(cmd, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        let region = vk::BufferImageCopy::default()
            .image_subresource(
                vk::ImageSubresourceLayers::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .layer_count(1),
            )
            .image_extent(vk::Extent3D {
                width,
                height,
                depth: 1,
            });
        cmd.copy_buffer_to_image(
            staging.handle(),
            image.handle(),
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[region],
        );
        image.transition_to(cmd, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    })?;

    image.set_sampler(Sampler::linear_repeat(device.clone())?);
    debug!("Uploaded texture '{}' ({}x{}, {:?})", name, width, height, encoding);
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_rgba8_len() {
        assert!(check_rgba8_len(2, 2, &[0; 16]).is_ok());
        assert!(check_rgba8_len(2, 2, &[0; 12]).is_err());
        assert!(check_rgba8_len(0, 4, &[]).is_err());
    }

    #[test]
    fn test_encoding_formats() {
        assert_eq!(TextureEncoding::Srgb.format(), vk::Format::R8G8B8A8_SRGB);
        assert_eq!(TextureEncoding::Linear.format(), vk::Format::R8G8B8A8_UNORM);
    }
}
