//! CPU-side asset collaborators.
//!
//! This crate supplies what the renderer consumes but never parses itself:
//! - Raw mesh records (vertices, indices, material, transform, transparency)
//! - Material texture references
//! - RGBA8 texture decoding
//! - Built-in procedural models and the demo scene

pub mod error;
pub mod material;
pub mod model;
pub mod primitives;
pub mod texture;

pub use error::{ResourceError, ResourceResult};
pub use material::Material;
pub use model::{MeshData, ModelData, Vertex};
pub use primitives::demo_scene;
pub use texture::TextureData;
