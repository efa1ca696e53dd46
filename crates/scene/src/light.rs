//! Directional light with a scene-fitted shadow frustum.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

use crate::bounds::Aabb;

/// Smallest light-space extent on any axis, keeps the projection invertible
/// for flat or empty scenes.
const MIN_EXTENT: f32 = 1e-3;

/// Light data as laid out in the lighting and volumetric uniform blocks.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct LightUniform {
    /// World to shadow-map clip space
    pub view_proj: Mat4,
    /// xyz: direction the light travels, w: intensity
    pub direction: Vec4,
    /// rgb: colour, a: ambient factor
    pub color: Vec4,
}

/// A sun-like light.
///
/// `direction` is the direction light travels, from the light towards the
/// scene. The view and projection are only valid after
/// [`fit_to_bounds`](Self::fit_to_bounds).
#[derive(Clone, Debug)]
pub struct DirectionalLight {
    direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    /// Fraction of the colour applied to unlit surfaces
    pub ambient: f32,
    view: Mat4,
    projection: Mat4,
    near: f32,
    far: f32,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self::new(Vec3::new(-0.4, -1.0, -0.3), Vec3::ONE, 3.0)
    }
}

impl DirectionalLight {
    /// `direction` need not be normalized; a zero vector points straight down.
    pub fn new(direction: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            direction: normalize_direction(direction),
            color,
            intensity,
            ambient: 0.08,
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            near: 0.0,
            far: 1.0,
        }
    }

    pub fn direction(&self) -> Vec3 {
        self.direction
    }

    /// Changes the direction. Takes effect at the next fit.
    pub fn set_direction(&mut self, direction: Vec3) {
        self.direction = normalize_direction(direction);
    }

    /// Fits an orthographic shadow frustum tightly around `bounds`.
    ///
    /// The eight box corners are moved into light space; the projection's
    /// left/right/bottom/top come from their x/y range and near/far from
    /// their depth range, with no extra margin. The eye sits on the line
    /// through the box centre, one bounding radius back along the light.
    pub fn fit_to_bounds(&mut self, bounds: &Aabb) {
        let bounds = if bounds.is_empty() {
            Aabb::new(Vec3::splat(-1.0), Vec3::ONE)
        } else {
            *bounds
        };

        let center = bounds.center();
        let eye = center - self.direction * bounds.radius().max(MIN_EXTENT);
        let up = if self.direction.y.abs() > 0.99 {
            Vec3::Z
        } else {
            Vec3::Y
        };
        let view = Mat4::look_to_rh(eye, self.direction, up);

        let light_space = Aabb::from_points(bounds.corners().map(|c| view.transform_point3(c)));
        let (left, right) = widen(light_space.min.x, light_space.max.x);
        let (bottom, top) = widen(light_space.min.y, light_space.max.y);
        // Right-handed view space looks down -Z.
        let (near, far) = widen(-light_space.max.z, -light_space.min.z);

        // Top and bottom swapped: same Y-down clip convention as the camera.
        self.projection = Mat4::orthographic_rh(left, right, top, bottom, near, far);
        self.view = view;
        self.near = near;
        self.far = far;
    }

    #[inline]
    pub fn view(&self) -> Mat4 {
        self.view
    }

    #[inline]
    pub fn projection(&self) -> Mat4 {
        self.projection
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }

    /// Light-space distance to the near plane.
    pub fn near(&self) -> f32 {
        self.near
    }

    /// Light-space distance to the far plane.
    pub fn far(&self) -> f32 {
        self.far
    }

    /// The forward axis encoded in the view matrix.
    pub fn view_forward(&self) -> Vec3 {
        -self.view.row(2).truncate()
    }

    pub fn uniform(&self) -> LightUniform {
        LightUniform {
            view_proj: self.view_projection(),
            direction: self.direction.extend(self.intensity),
            color: self.color.extend(self.ambient),
        }
    }
}

fn normalize_direction(direction: Vec3) -> Vec3 {
    direction.try_normalize().unwrap_or(Vec3::NEG_Y)
}

fn widen(min: f32, max: f32) -> (f32, f32) {
    if max - min < MIN_EXTENT {
        let mid = (min + max) * 0.5;
        (mid - MIN_EXTENT * 0.5, mid + MIN_EXTENT * 0.5)
    } else {
        (min, max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn cube_bounds() -> Aabb {
        Aabb::new(Vec3::splat(-10.0), Vec3::splat(10.0))
    }

    #[test]
    fn test_uniform_layout() {
        assert_eq!(size_of::<LightUniform>(), 96);
    }

    #[test]
    fn test_fit_depth_span_matches_projected_corners() {
        let direction = Vec3::new(-1.0, -1.0, -1.0).normalize();
        let mut light = DirectionalLight::new(direction, Vec3::ONE, 1.0);
        let bounds = cube_bounds();
        light.fit_to_bounds(&bounds);

        let projected = bounds.corners().map(|c| c.dot(direction));
        let min = projected.iter().copied().fold(f32::INFINITY, f32::min);
        let max = projected.iter().copied().fold(f32::NEG_INFINITY, f32::max);

        assert_relative_eq!(light.far() - light.near(), max - min, epsilon = 1e-3);
        assert_relative_eq!(max - min, 20.0 * 3.0_f32.sqrt(), epsilon = 1e-3);
    }

    #[test]
    fn test_fit_view_forward_is_light_direction() {
        let direction = Vec3::new(-1.0, -1.0, -1.0).normalize();
        let mut light = DirectionalLight::new(Vec3::new(-1.0, -1.0, -1.0), Vec3::ONE, 1.0);
        light.fit_to_bounds(&cube_bounds());

        let forward = light.view_forward();
        assert_relative_eq!(forward.x, direction.x, epsilon = 1e-5);
        assert_relative_eq!(forward.y, direction.y, epsilon = 1e-5);
        assert_relative_eq!(forward.z, direction.z, epsilon = 1e-5);
    }

    #[test]
    fn test_fit_has_zero_slack() {
        let mut light = DirectionalLight::new(Vec3::new(-1.0, -1.0, -1.0), Vec3::ONE, 1.0);
        light.fit_to_bounds(&cube_bounds());

        let clip: Vec<Vec3> = cube_bounds()
            .corners()
            .iter()
            .map(|&c| light.view_projection().project_point3(c))
            .collect();
        let depth_min = clip.iter().map(|p| p.z).fold(f32::INFINITY, f32::min);
        let depth_max = clip.iter().map(|p| p.z).fold(f32::NEG_INFINITY, f32::max);
        assert_relative_eq!(depth_min, 0.0, epsilon = 1e-4);
        assert_relative_eq!(depth_max, 1.0, epsilon = 1e-4);
        for p in &clip {
            assert!(p.x.abs() <= 1.0 + 1e-4);
            assert!(p.y.abs() <= 1.0 + 1e-4);
        }
    }

    #[test]
    fn test_vertical_light_uses_fallback_up() {
        let mut light = DirectionalLight::new(Vec3::NEG_Y, Vec3::ONE, 1.0);
        light.fit_to_bounds(&cube_bounds());
        assert!(!light.view().is_nan());
        assert_relative_eq!(light.far() - light.near(), 20.0, epsilon = 1e-4);
    }

    #[test]
    fn test_empty_bounds_still_invertible() {
        let mut light = DirectionalLight::default();
        light.fit_to_bounds(&Aabb::empty());
        assert!(light.view_projection().determinant().abs() > 0.0);
    }

    #[test]
    fn test_zero_direction_points_down() {
        let light = DirectionalLight::new(Vec3::ZERO, Vec3::ONE, 1.0);
        assert_eq!(light.direction(), Vec3::NEG_Y);
    }
}
