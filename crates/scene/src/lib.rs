//! Scene representation and GPU-side geometry.
//!
//! This crate provides:
//! - Camera and transforms
//! - Bounding boxes and the scene-fitted directional light
//! - Scene → Model → Mesh, owning vertex/index buffers and material sets

pub mod bounds;
pub mod camera;
pub mod error;
pub mod light;
pub mod mesh;
pub mod model;
pub mod retire;
pub mod scene;
pub mod transform;

pub use bounds::Aabb;
pub use camera::Camera;
pub use error::{SceneError, SceneResult};
pub use light::{DirectionalLight, LightUniform};
pub use mesh::{MaterialBinding, Mesh, MeshPushConstants};
pub use model::Model;
pub use scene::{ModelId, Scene};
pub use transform::Transform;
