//! Uniform block definitions shared with the GLSL passes.
//!
//! All blocks are `std140` on the shader side. Every member here is a `Mat4`,
//! a `Vec4` or a nested block made of those, so `#[repr(C)]` produces the
//! same offsets without manual padding.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};

use umbra_core::{PostConfig, VolumetricConfig};
use umbra_scene::{Camera, LightUniform};

/// Camera matrices. Set 0, binding 0 of the depth prepass, geometry and
/// forward passes.
///
/// # Memory Layout
///
/// - Offset 0: view
/// - Offset 64: projection
/// - Offset 128: view-projection
/// - Offset 192: camera position (w unused)
/// - Total size: 208 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct CameraUniform {
    pub view: Mat4,
    pub projection: Mat4,
    pub view_projection: Mat4,
    pub position: Vec4,
}

impl CameraUniform {
    pub fn from_camera(camera: &Camera) -> Self {
        let view = camera.view_matrix();
        let projection = camera.projection_matrix();
        Self {
            view,
            projection,
            view_projection: projection * view,
            position: camera.position.extend(1.0),
        }
    }
}

/// Inputs of the deferred lighting resolve.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct LightingUniform {
    pub light: LightUniform,
    /// xyz: camera position
    pub camera_position: Vec4,
    /// x: shadow texel size, y: depth bias, z: PCF radius in texels
    pub shadow_params: Vec4,
}

impl LightingUniform {
    pub fn new(camera: &Camera, light: LightUniform, shadow_map_size: u32) -> Self {
        Self {
            light,
            camera_position: camera.position.extend(1.0),
            shadow_params: Vec4::new(1.0 / shadow_map_size.max(1) as f32, 0.0015, 1.0, 0.0),
        }
    }
}

/// Ray-march parameters for light scattering.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct VolumetricUniform {
    /// Clip space back to world space, for depth reconstruction
    pub inv_view_projection: Mat4,
    pub light: LightUniform,
    pub camera_position: Vec4,
    /// x: sample count (0 disables), y: anisotropy g, z: density, w: max distance
    pub params: Vec4,
}

impl VolumetricUniform {
    pub fn new(camera: &Camera, light: LightUniform, config: &VolumetricConfig) -> Self {
        let samples = if config.enabled { config.samples } else { 0 };
        Self {
            inv_view_projection: camera.view_projection_matrix().inverse(),
            light,
            camera_position: camera.position.extend(1.0),
            params: Vec4::new(
                samples as f32,
                config.scattering.clamp(-0.99, 0.99),
                config.density.max(0.0),
                camera.far(),
            ),
        }
    }

    /// Sample count the shader will use.
    pub fn samples(&self) -> u32 {
        self.params.x as u32
    }
}

/// Camera and light for transparent geometry.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ForwardUniform {
    pub camera: CameraUniform,
    pub light: LightUniform,
}

/// Tone-mapping parameters.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct PostUniform {
    /// x: exposure, y: 1 / gamma
    pub params: Vec4,
}

impl PostUniform {
    pub fn new(config: &PostConfig) -> Self {
        let gamma = if config.gamma > 0.0 { config.gamma } else { 2.2 };
        Self {
            params: Vec4::new(config.exposure.max(0.0), 1.0 / gamma, 0.0, 0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use glam::Vec3;

    #[test]
    fn test_std140_sizes() {
        assert_eq!(size_of::<CameraUniform>(), 208);
        assert_eq!(size_of::<LightingUniform>(), 96 + 32);
        assert_eq!(size_of::<VolumetricUniform>(), 64 + 96 + 32);
        assert_eq!(size_of::<ForwardUniform>(), 208 + 96);
        assert_eq!(size_of::<PostUniform>(), 16);
        for size in [
            size_of::<CameraUniform>(),
            size_of::<LightingUniform>(),
            size_of::<VolumetricUniform>(),
            size_of::<ForwardUniform>(),
        ] {
            assert_eq!(size % 16, 0);
        }
    }

    #[test]
    fn test_camera_uniform_matches_camera() {
        let mut camera = Camera::new();
        camera.position = Vec3::new(1.0, 2.0, 3.0);
        let ubo = CameraUniform::from_camera(&camera);
        assert_eq!(ubo.view_projection, camera.view_projection_matrix());
        assert_eq!(ubo.position, Vec4::new(1.0, 2.0, 3.0, 1.0));
    }

    #[test]
    fn test_volumetric_disabled_means_zero_samples() {
        let camera = Camera::new();
        let config = VolumetricConfig {
            enabled: false,
            ..VolumetricConfig::default()
        };
        let ubo = VolumetricUniform::new(&camera, LightUniform::default(), &config);
        assert_eq!(ubo.samples(), 0);

        let ubo =
            VolumetricUniform::new(&camera, LightUniform::default(), &VolumetricConfig::default());
        assert_eq!(ubo.samples(), 32);
    }

    #[test]
    fn test_volumetric_inverse_reconstructs_world_point() {
        let camera = Camera::new();
        let ubo =
            VolumetricUniform::new(&camera, LightUniform::default(), &VolumetricConfig::default());
        let world = Vec3::new(0.5, -0.25, -4.0);
        let clip = camera.view_projection_matrix() * world.extend(1.0);
        let back = ubo.inv_view_projection * clip;
        let back = back.truncate() / back.w;
        assert_relative_eq!(back.x, world.x, epsilon = 1e-3);
        assert_relative_eq!(back.y, world.y, epsilon = 1e-3);
        assert_relative_eq!(back.z, world.z, epsilon = 1e-3);
    }

    #[test]
    fn test_post_uniform_inverts_gamma() {
        let ubo = PostUniform::new(&PostConfig {
            exposure: 1.5,
            gamma: 2.0,
        });
        assert_relative_eq!(ubo.params.x, 1.5);
        assert_relative_eq!(ubo.params.y, 0.5);

        let ubo = PostUniform::new(&PostConfig {
            exposure: 1.0,
            gamma: 0.0,
        });
        assert_relative_eq!(ubo.params.y, 1.0 / 2.2);
    }
}
