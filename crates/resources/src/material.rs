//! Material definitions.

use std::path::PathBuf;

use glam::Vec4;

/// Texture references for one mesh.
///
/// Each map is optional; a missing map is replaced at upload time by a
/// 1x1 texture (the base colour for albedo, a flat normal, full specular).
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    /// Albedo texture path (sRGB)
    pub albedo: Option<PathBuf>,
    /// Tangent-space normal map path (linear)
    pub normal: Option<PathBuf>,
    /// Specular mask path (linear, red channel)
    pub specular: Option<PathBuf>,
    /// Colour multiplied with the albedo sample; alpha drives blending for
    /// transparent meshes.
    pub base_color: Vec4,
}

impl Material {
    /// Untextured material with a flat colour.
    pub fn colored(base_color: Vec4) -> Self {
        Self {
            base_color,
            ..Self::default()
        }
    }

    pub fn with_albedo(mut self, path: impl Into<PathBuf>) -> Self {
        self.albedo = Some(path.into());
        self
    }

    pub fn with_normal(mut self, path: impl Into<PathBuf>) -> Self {
        self.normal = Some(path.into());
        self
    }

    pub fn with_specular(mut self, path: impl Into<PathBuf>) -> Self {
        self.specular = Some(path.into());
        self
    }

    /// True if the base colour alone would require blending.
    pub fn is_translucent(&self) -> bool {
        self.base_color.w < 1.0
    }
}

impl Default for Material {
    fn default() -> Self {
        Self {
            albedo: None,
            normal: None,
            specular: None,
            base_color: Vec4::ONE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_opaque_white() {
        let material = Material::default();
        assert_eq!(material.base_color, Vec4::ONE);
        assert!(!material.is_translucent());
        assert!(material.albedo.is_none());
    }

    #[test]
    fn test_builder_paths() {
        let material = Material::colored(Vec4::new(0.2, 0.4, 0.8, 0.5))
            .with_albedo("textures/glass.png")
            .with_specular("textures/glass_spec.png");
        assert!(material.is_translucent());
        assert_eq!(material.albedo, Some(PathBuf::from("textures/glass.png")));
        assert!(material.normal.is_none());
    }
}
