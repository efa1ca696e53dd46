//! RGBA8 texture decoding.

use std::path::Path;

use glam::Vec4;
use tracing::debug;

use crate::error::{ResourceError, ResourceResult};

/// Decoded texture pixels, tightly packed RGBA8 rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl TextureData {
    /// Decodes any format the `image` crate was built with into RGBA8.
    pub fn load(path: &Path) -> ResourceResult<Self> {
        if !path.exists() {
            return Err(ResourceError::FileNotFound(path.to_path_buf()));
        }

        let rgba = image::open(path)?.to_rgba8();
        let (width, height) = rgba.dimensions();
        debug!("Decoded texture {:?} ({}x{})", path, width, height);

        Ok(Self {
            width,
            height,
            pixels: rgba.into_raw(),
        })
    }

    /// A 1x1 texture.
    pub fn solid(rgba: [u8; 4]) -> Self {
        Self {
            width: 1,
            height: 1,
            pixels: rgba.to_vec(),
        }
    }

    /// A 1x1 texture from a linear `[0, 1]` colour.
    pub fn from_color(color: Vec4) -> Self {
        let c = (color.clamp(Vec4::ZERO, Vec4::ONE) * 255.0).round();
        Self::solid([c.x as u8, c.y as u8, c.z as u8, c.w as u8])
    }

    /// Tangent-space +Z, used when a mesh has no normal map.
    pub fn flat_normal() -> Self {
        Self::solid([128, 128, 255, 255])
    }

    pub fn texel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solid() {
        let tex = TextureData::solid([1, 2, 3, 4]);
        assert_eq!((tex.width, tex.height), (1, 1));
        assert_eq!(tex.pixels, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_from_color_clamps() {
        let tex = TextureData::from_color(Vec4::new(1.5, 0.0, 0.5, -1.0));
        assert_eq!(tex.pixels, vec![255, 0, 128, 0]);
    }

    #[test]
    fn test_missing_file() {
        let result = TextureData::load(Path::new("does/not/exist.png"));
        assert!(matches!(result, Err(ResourceError::FileNotFound(_))));
    }
}
