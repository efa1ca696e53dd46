//! Axis-aligned bounding boxes.

use glam::{Mat4, Vec3};

/// World-space axis-aligned box.
///
/// [`Aabb::empty`] is inverted (`min > max`) so that it is the identity for
/// [`Aabb::union`] and [`Aabb::grow`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::empty()
    }
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn empty() -> Self {
        Self {
            min: Vec3::splat(f32::INFINITY),
            max: Vec3::splat(f32::NEG_INFINITY),
        }
    }

    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Self {
        points.into_iter().fold(Self::empty(), |acc, p| acc.grow(p))
    }

    pub fn is_empty(&self) -> bool {
        self.min.cmpgt(self.max).any()
    }

    pub fn grow(self, point: Vec3) -> Self {
        Self {
            min: self.min.min(point),
            max: self.max.max(point),
        }
    }

    pub fn union(self, other: Aabb) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// The eight corners, bit `i` of the index choosing `max` on axis `i`.
    pub fn corners(&self) -> [Vec3; 8] {
        std::array::from_fn(|i| {
            Vec3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            )
        })
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Size along each axis.
    pub fn extent(&self) -> Vec3 {
        self.max - self.min
    }

    /// Radius of the bounding sphere around [`center`](Self::center).
    pub fn radius(&self) -> f32 {
        self.extent().length() * 0.5
    }

    /// Bounds of this box after an affine transform.
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        if self.is_empty() {
            return *self;
        }
        Self::from_points(self.corners().map(|c| matrix.transform_point3(c)))
    }
}

impl From<(Vec3, Vec3)> for Aabb {
    fn from((min, max): (Vec3, Vec3)) -> Self {
        Self { min, max }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::vec3;

    #[test]
    fn test_empty_is_union_identity() {
        let a = Aabb::new(vec3(-1.0, 0.0, 2.0), vec3(1.0, 3.0, 4.0));
        assert!(Aabb::empty().is_empty());
        assert_eq!(Aabb::empty().union(a), a);
        assert_eq!(a.union(Aabb::empty()), a);
    }

    #[test]
    fn test_from_points() {
        let b = Aabb::from_points([vec3(1.0, -2.0, 0.0), vec3(-1.0, 5.0, 3.0)]);
        assert_eq!(b.min, vec3(-1.0, -2.0, 0.0));
        assert_eq!(b.max, vec3(1.0, 5.0, 3.0));
        assert_eq!(b.center(), vec3(0.0, 1.5, 1.5));
        assert_eq!(b.extent(), vec3(2.0, 7.0, 3.0));
    }

    #[test]
    fn test_corners_are_distinct_extremes() {
        let b = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        let corners = b.corners();
        assert_eq!(corners[0], Vec3::splat(-1.0));
        assert_eq!(corners[7], Vec3::splat(1.0));
        for (i, a) in corners.iter().enumerate() {
            for other in &corners[i + 1..] {
                assert_ne!(a, other);
            }
        }
    }

    #[test]
    fn test_transformed_rotation_grows_box() {
        let b = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        let rotated = b.transformed(&Mat4::from_rotation_y(std::f32::consts::FRAC_PI_4));
        let half = 2.0_f32.sqrt();
        assert!((rotated.max.x - half).abs() < 1e-5);
        assert!((rotated.max.y - 1.0).abs() < 1e-5);
    }
}
