//! Built-in procedural meshes and the demo scene.
//!
//! These stand in for a model importer: they produce the same
//! [`ModelData`] records an importer would.

use glam::{Mat4, Quat, Vec2, Vec3, Vec4, vec3};

use crate::material::Material;
use crate::model::{MeshData, ModelData, Vertex};

/// Appends one quad facing `normal`, spanned by `u` and `v` (`u x v == normal`).
fn push_face(
    vertices: &mut Vec<Vertex>,
    indices: &mut Vec<u32>,
    center: Vec3,
    normal: Vec3,
    (u, v): (Vec3, Vec3),
    uv_scale: Vec2,
    color: Vec3,
) {
    let base = vertices.len() as u32;
    let corners = [
        (-u - v, Vec2::new(0.0, 1.0)),
        (u - v, Vec2::new(1.0, 1.0)),
        (u + v, Vec2::new(1.0, 0.0)),
        (-u + v, Vec2::new(0.0, 0.0)),
    ];
    for (offset, uv) in corners {
        vertices.push(Vertex {
            color,
            ..Vertex::new(center + offset, normal, uv * uv_scale)
        });
    }
    indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
}

/// Axis-aligned cube centred on the origin.
pub fn cube(name: &str, size: f32, color: Vec3) -> MeshData {
    let h = size * 0.5;
    let faces = [
        (Vec3::X, (Vec3::NEG_Z, Vec3::Y)),
        (Vec3::NEG_X, (Vec3::Z, Vec3::Y)),
        (Vec3::Y, (Vec3::X, Vec3::NEG_Z)),
        (Vec3::NEG_Y, (Vec3::X, Vec3::Z)),
        (Vec3::Z, (Vec3::X, Vec3::Y)),
        (Vec3::NEG_Z, (Vec3::NEG_X, Vec3::Y)),
    ];

    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (normal, (u, v)) in faces {
        push_face(
            &mut vertices,
            &mut indices,
            normal * h,
            normal,
            (u * h, v * h),
            Vec2::ONE,
            color,
        );
    }

    let mut mesh = MeshData::new(name, vertices, indices);
    mesh.compute_tangents();
    mesh
}

/// Horizontal plane at y = 0 facing +Y, with UVs repeating `uv_repeat` times.
pub fn plane(name: &str, size: f32, uv_repeat: f32, color: Vec3) -> MeshData {
    let h = size * 0.5;
    let mut vertices = Vec::with_capacity(4);
    let mut indices = Vec::with_capacity(6);
    push_face(
        &mut vertices,
        &mut indices,
        Vec3::ZERO,
        Vec3::Y,
        (Vec3::X * h, Vec3::NEG_Z * h),
        Vec2::splat(uv_repeat),
        color,
    );

    let mut mesh = MeshData::new(name, vertices, indices);
    mesh.compute_tangents();
    mesh
}

/// Vertical quad in the XY plane facing +Z.
pub fn quad(name: &str, width: f32, height: f32, color: Vec3) -> MeshData {
    let mut vertices = Vec::with_capacity(4);
    let mut indices = Vec::with_capacity(6);
    push_face(
        &mut vertices,
        &mut indices,
        Vec3::ZERO,
        Vec3::Z,
        (Vec3::X * width * 0.5, Vec3::Y * height * 0.5),
        Vec2::ONE,
        color,
    );

    let mut mesh = MeshData::new(name, vertices, indices);
    mesh.compute_tangents();
    mesh
}

/// Ground plane, a ring of pillars with a central block, and two glass panes.
pub fn demo_scene() -> Vec<ModelData> {
    let ground = ModelData::new(
        "ground",
        vec![
            plane("ground", 40.0, 8.0, Vec3::splat(0.8))
                .with_material(Material::colored(Vec4::new(0.55, 0.55, 0.5, 1.0))),
        ],
    );

    let palette = [
        vec3(0.8, 0.25, 0.2),
        vec3(0.25, 0.7, 0.3),
        vec3(0.2, 0.35, 0.85),
        vec3(0.9, 0.75, 0.2),
    ];
    let mut blocks: Vec<MeshData> = (0..8)
        .map(|i| {
            let angle = i as f32 * std::f32::consts::TAU / 8.0;
            let height = 2.0 + (i % 3) as f32 * 1.5;
            let position = vec3(angle.cos() * 9.0, height * 0.5, angle.sin() * 9.0);
            let color = palette[i % palette.len()];
            cube(&format!("pillar_{i}"), 1.0, Vec3::ONE)
                .with_transform(Mat4::from_scale_rotation_translation(
                    vec3(1.2, height, 1.2),
                    Quat::from_rotation_y(angle),
                    position,
                ))
                .with_material(Material::colored(color.extend(1.0)))
        })
        .collect();
    blocks.push(
        cube("centre", 3.0, Vec3::ONE)
            .with_transform(Mat4::from_translation(vec3(0.0, 1.5, 0.0)))
            .with_material(Material::colored(Vec4::new(0.85, 0.85, 0.9, 1.0))),
    );
    let blocks = ModelData::new("blocks", blocks);

    let glass = ModelData::new(
        "glass",
        vec![
            quad("pane_red", 4.0, 3.0, Vec3::ONE)
                .with_transform(Mat4::from_translation(vec3(-3.0, 1.5, 5.0)))
                .with_material(Material::colored(Vec4::new(0.9, 0.2, 0.2, 0.35)))
                .with_transparent(true),
            quad("pane_blue", 4.0, 3.0, Vec3::ONE)
                .with_transform(Mat4::from_rotation_translation(
                    Quat::from_rotation_y(std::f32::consts::FRAC_PI_2),
                    vec3(5.0, 1.5, -2.0),
                ))
                .with_material(Material::colored(Vec4::new(0.2, 0.4, 0.9, 0.35)))
                .with_transparent(true),
        ],
    );

    vec![ground, blocks, glass]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face_normal(mesh: &MeshData, tri: usize) -> Vec3 {
        let i = &mesh.indices[tri * 3..tri * 3 + 3];
        let p = |k: usize| mesh.vertices[i[k] as usize].position;
        (p(1) - p(0)).cross(p(2) - p(0)).normalize()
    }

    #[test]
    fn test_cube_counts() {
        let mesh = cube("c", 2.0, Vec3::ONE);
        assert_eq!(mesh.vertices.len(), 24);
        assert_eq!(mesh.indices.len(), 36);
        assert!(mesh.validate().is_ok());
    }

    #[test]
    fn test_cube_winding_faces_outward() {
        let mesh = cube("c", 2.0, Vec3::ONE);
        for tri in 0..mesh.triangle_count() {
            let n = face_normal(&mesh, tri);
            let stored = mesh.vertices[mesh.indices[tri * 3] as usize].normal;
            assert!((n - stored).length() < 1e-5);
        }
    }

    #[test]
    fn test_plane_is_flat_and_up() {
        let mesh = plane("p", 10.0, 4.0, Vec3::ONE);
        let (min, max) = mesh.bounds().unwrap();
        assert_eq!(min, vec3(-5.0, 0.0, -5.0));
        assert_eq!(max, vec3(5.0, 0.0, 5.0));
        assert!((face_normal(&mesh, 0) - Vec3::Y).length() < 1e-5);
    }

    #[test]
    fn test_tangent_frames_are_orthonormal() {
        let mesh = cube("c", 1.0, Vec3::ONE);
        for v in &mesh.vertices {
            assert!(v.tangent.dot(v.normal).abs() < 1e-5);
            assert!((v.tangent.length() - 1.0).abs() < 1e-5);
            assert!((v.bitangent.length() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_demo_scene_has_both_buckets() {
        let models = demo_scene();
        let transparent: usize = models.iter().map(ModelData::transparent_count).sum();
        let total: usize = models.iter().map(|m| m.meshes.len()).sum();
        assert_eq!(transparent, 2);
        assert!(total > transparent);
        for model in &models {
            assert!(model.validate().is_ok());
        }
    }
}
