//! Raw mesh and model records handed to the renderer.

use glam::{Mat4, Vec2, Vec3};

use crate::error::{ResourceError, ResourceResult};
use crate::material::Material;

/// One imported vertex.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vertex {
    pub position: Vec3,
    pub color: Vec3,
    pub uv: Vec2,
    pub normal: Vec3,
    pub tangent: Vec3,
    pub bitangent: Vec3,
}

impl Vertex {
    /// Vertex with a zero tangent frame; see [`MeshData::compute_tangents`].
    pub fn new(position: Vec3, normal: Vec3, uv: Vec2) -> Self {
        Self {
            position,
            color: Vec3::ONE,
            uv,
            normal,
            ..Self::default()
        }
    }
}

/// A mesh as delivered by the import collaborator.
#[derive(Debug, Clone)]
pub struct MeshData {
    pub name: String,
    pub vertices: Vec<Vertex>,
    /// Triangle list indices
    pub indices: Vec<u32>,
    pub material: Material,
    /// Local-to-world transform
    pub transform: Mat4,
    /// Drawn in the forward pass with alpha blending instead of the G-buffer
    pub transparent: bool,
}

impl MeshData {
    pub fn new(name: impl Into<String>, vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        Self {
            name: name.into(),
            vertices,
            indices,
            material: Material::default(),
            transform: Mat4::IDENTITY,
            transparent: false,
        }
    }

    pub fn with_material(mut self, material: Material) -> Self {
        self.material = material;
        self
    }

    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_transparent(mut self, transparent: bool) -> Self {
        self.transparent = transparent;
        self
    }

    /// Checks that the record describes a drawable triangle list.
    pub fn validate(&self) -> ResourceResult<()> {
        let invalid = |message: String| ResourceError::InvalidMesh {
            name: self.name.clone(),
            message,
        };

        if self.vertices.is_empty() || self.indices.is_empty() {
            return Err(invalid("no geometry".to_string()));
        }
        if self.indices.len() % 3 != 0 {
            return Err(invalid(format!(
                "{} indices is not a triangle list",
                self.indices.len()
            )));
        }
        if let Some(&bad) = self
            .indices
            .iter()
            .find(|&&i| i as usize >= self.vertices.len())
        {
            return Err(invalid(format!(
                "index {bad} out of range for {} vertices",
                self.vertices.len()
            )));
        }
        Ok(())
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// World-space bounds of the transformed vertices.
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        self.vertices
            .iter()
            .map(|v| self.transform.transform_point3(v.position))
            .fold(None, |acc, p| match acc {
                None => Some((p, p)),
                Some((min, max)) => Some((min.min(p), max.max(p))),
            })
    }

    /// Derives per-vertex tangents and bitangents from positions and UVs.
    ///
    /// Triangle contributions are accumulated, then each tangent is
    /// orthogonalised against the vertex normal. Degenerate UV mappings
    /// fall back to an arbitrary frame perpendicular to the normal.
    pub fn compute_tangents(&mut self) {
        let mut tangents = vec![Vec3::ZERO; self.vertices.len()];
        let mut bitangents = vec![Vec3::ZERO; self.vertices.len()];

        for tri in self.indices.chunks_exact(3) {
            let [i0, i1, i2] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
            let (v0, v1, v2) = (&self.vertices[i0], &self.vertices[i1], &self.vertices[i2]);

            let e1 = v1.position - v0.position;
            let e2 = v2.position - v0.position;
            let d1 = v1.uv - v0.uv;
            let d2 = v2.uv - v0.uv;

            let det = d1.x * d2.y - d2.x * d1.y;
            if det.abs() < f32::EPSILON {
                continue;
            }
            let r = 1.0 / det;
            let t = (e1 * d2.y - e2 * d1.y) * r;
            let b = (e2 * d1.x - e1 * d2.x) * r;

            for i in [i0, i1, i2] {
                tangents[i] += t;
                bitangents[i] += b;
            }
        }

        for (i, vertex) in self.vertices.iter_mut().enumerate() {
            let n = vertex.normal.normalize_or_zero();
            let t = (tangents[i] - n * n.dot(tangents[i])).normalize_or_zero();
            let t = if t == Vec3::ZERO { n.any_orthonormal_vector() } else { t };
            let mut b = n.cross(t);
            if b.dot(bitangents[i]) < 0.0 {
                b = -b;
            }
            vertex.tangent = t;
            vertex.bitangent = b;
        }
    }
}

/// A model: the list of mesh records from one import.
#[derive(Debug, Clone, Default)]
pub struct ModelData {
    pub name: String,
    pub meshes: Vec<MeshData>,
}

impl ModelData {
    pub fn new(name: impl Into<String>, meshes: Vec<MeshData>) -> Self {
        Self {
            name: name.into(),
            meshes,
        }
    }

    /// Validates every mesh and rejects empty models.
    pub fn validate(&self) -> ResourceResult<()> {
        if self.meshes.is_empty() {
            return Err(ResourceError::NoMeshes(self.name.clone()));
        }
        self.meshes.iter().try_for_each(MeshData::validate)
    }

    /// Union of all mesh bounds, in world space.
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        self.meshes
            .iter()
            .filter_map(MeshData::bounds)
            .reduce(|(amin, amax), (bmin, bmax)| (amin.min(bmin), amax.max(bmax)))
    }

    pub fn transparent_count(&self) -> usize {
        self.meshes.iter().filter(|m| m.transparent).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::vec3;

    fn triangle() -> MeshData {
        MeshData::new(
            "tri",
            vec![
                Vertex::new(vec3(0.0, 0.0, 0.0), Vec3::Z, Vec2::new(0.0, 0.0)),
                Vertex::new(vec3(1.0, 0.0, 0.0), Vec3::Z, Vec2::new(1.0, 0.0)),
                Vertex::new(vec3(0.0, 1.0, 0.0), Vec3::Z, Vec2::new(0.0, 1.0)),
            ],
            vec![0, 1, 2],
        )
    }

    #[test]
    fn test_validate_accepts_triangle() {
        assert!(triangle().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_out_of_range_index() {
        let mut mesh = triangle();
        mesh.indices = vec![0, 1, 3];
        assert!(matches!(
            mesh.validate(),
            Err(ResourceError::InvalidMesh { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_partial_triangle() {
        let mut mesh = triangle();
        mesh.indices.push(0);
        assert!(mesh.validate().is_err());
    }

    #[test]
    fn test_bounds_apply_transform() {
        let mesh = triangle().with_transform(Mat4::from_translation(vec3(5.0, 0.0, -2.0)));
        let (min, max) = mesh.bounds().unwrap();
        assert_eq!(min, vec3(5.0, 0.0, -2.0));
        assert_eq!(max, vec3(6.0, 1.0, -2.0));
    }

    #[test]
    fn test_model_bounds_union() {
        let a = triangle();
        let b = triangle().with_transform(Mat4::from_translation(vec3(-3.0, -3.0, 4.0)));
        let model = ModelData::new("pair", vec![a, b]);
        let (min, max) = model.bounds().unwrap();
        assert_eq!(min, vec3(-3.0, -3.0, 0.0));
        assert_eq!(max, vec3(1.0, 1.0, 4.0));
    }

    #[test]
    fn test_empty_model() {
        let model = ModelData::new("empty", Vec::new());
        assert!(model.bounds().is_none());
        assert!(matches!(model.validate(), Err(ResourceError::NoMeshes(_))));
    }

    #[test]
    fn test_tangents_follow_uv_axes() {
        let mut mesh = triangle();
        mesh.compute_tangents();
        for v in &mesh.vertices {
            assert!((v.tangent - Vec3::X).length() < 1e-5);
            assert!((v.bitangent - Vec3::Y).length() < 1e-5);
        }
    }
}
