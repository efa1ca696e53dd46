//! Camera for the main view.
//!
//! The renderer treats a camera as an opaque pair of matrices plus a
//! world-space origin; how the camera moves is up to the application.

use glam::{Mat4, Quat, Vec3};

/// A perspective camera.
#[derive(Clone, Debug)]
pub struct Camera {
    /// Camera position in world space
    pub position: Vec3,
    pub rotation: Quat,
    /// Vertical field of view in radians
    pub fov_y: f32,
    aspect: f32,
    near: f32,
    far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 5.0),
            rotation: Quat::IDENTITY,
            fov_y: 45.0_f32.to_radians(),
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 200.0,
        }
    }
}

impl Camera {
    /// Create a new camera with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Update the aspect ratio, e.g. after the swapchain was resized.
    pub fn set_aspect(&mut self, aspect: f32) {
        self.aspect = aspect;
    }

    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    pub fn near(&self) -> f32 {
        self.near
    }

    /// Also bounds how far the volumetric march reaches.
    pub fn far(&self) -> f32 {
        self.far
    }

    /// Get the view matrix.
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.forward(), Vec3::Y)
    }

    /// Get the projection matrix (with Vulkan Y-flip).
    pub fn projection_matrix(&self) -> Mat4 {
        let mut proj = Mat4::perspective_rh(self.fov_y, self.aspect, self.near, self.far);
        // Flip Y for Vulkan coordinate system
        proj.y_axis.y *= -1.0;
        proj
    }

    /// Get the view-projection matrix.
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Get the forward direction vector.
    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }

    /// Get the right direction vector.
    pub fn right(&self) -> Vec3 {
        self.rotation * Vec3::X
    }

    /// Look at a target position, keeping the horizon level.
    pub fn look_at(&mut self, target: Vec3) {
        let forward = (target - self.position).normalize_or_zero();
        if forward == Vec3::ZERO {
            return;
        }
        let yaw = forward.x.atan2(-forward.z);
        let pitch = forward.y.clamp(-1.0, 1.0).asin();
        self.rotation = Quat::from_rotation_y(-yaw) * Quat::from_rotation_x(pitch);
    }

    /// Places the camera on a circle of `radius` around `target`, `height`
    /// above it, at angle `azimuth` (radians), looking at the target.
    pub fn orbit(&mut self, target: Vec3, radius: f32, height: f32, azimuth: f32) {
        self.position = target + Vec3::new(azimuth.sin() * radius, height, azimuth.cos() * radius);
        self.look_at(target);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_looks_down_negative_z() {
        let camera = Camera::default();
        assert_eq!(camera.forward(), Vec3::NEG_Z);
        let view = camera.view_matrix();
        let origin = view.transform_point3(Vec3::ZERO);
        assert_relative_eq!(origin.z, -5.0, epsilon = 1e-5);
    }

    #[test]
    fn test_projection_flips_y() {
        let camera = Camera::default();
        let clip = camera.projection_matrix() * Vec3::new(0.0, 1.0, -10.0).extend(1.0);
        assert!(clip.y < 0.0);
    }

    #[test]
    fn test_look_at_points_forward() {
        let mut camera = Camera::new();
        camera.position = Vec3::new(10.0, 5.0, 10.0);
        camera.look_at(Vec3::ZERO);
        let expected = (-camera.position).normalize();
        let forward = camera.forward();
        assert_relative_eq!(forward.x, expected.x, epsilon = 1e-5);
        assert_relative_eq!(forward.y, expected.y, epsilon = 1e-5);
        assert_relative_eq!(forward.z, expected.z, epsilon = 1e-5);
        assert_relative_eq!(camera.right().y, 0.0, epsilon = 1e-5);
    }

    #[test]
    fn test_orbit_keeps_radius() {
        let mut camera = Camera::new();
        let target = Vec3::new(1.0, 0.0, -2.0);
        camera.orbit(target, 12.0, 4.0, 1.3);
        let offset = camera.position - target;
        assert_relative_eq!(offset.y, 4.0, epsilon = 1e-5);
        assert_relative_eq!(offset.x.hypot(offset.z), 12.0, epsilon = 1e-4);
    }

    #[test]
    fn test_set_aspect() {
        let mut camera = Camera::new();
        camera.set_aspect(2.0);
        assert_eq!(camera.aspect(), 2.0);
        let proj = camera.projection_matrix();
        assert_relative_eq!(proj.x_axis.x * 2.0, -proj.y_axis.y, epsilon = 1e-5);
    }
}
