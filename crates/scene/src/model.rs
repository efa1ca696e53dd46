//! Models: a strict owner of meshes and their descriptor pool.

use std::sync::Arc;

use tracing::info;
use umbra_resources::ModelData;
use umbra_rhi::MAX_FRAMES_IN_FLIGHT;
use umbra_rhi::descriptor::{DescriptorPool, DescriptorPoolBuilder, DescriptorSetLayout};
use umbra_rhi::device::Device;

use crate::bounds::Aabb;
use crate::error::SceneResult;
use crate::mesh::Mesh;
use crate::transform::Transform;

pub struct Model {
    name: String,
    meshes: Vec<Mesh>,
    transform: Transform,
    bounds: Aabb,
    casts_shadows: bool,
    // Declared last: the meshes' sets are allocated from it.
    _pool: DescriptorPool,
}

impl Model {
    /// Uploads every mesh of `data`.
    ///
    /// The pool is sized for exactly one material set per mesh per frame
    /// slot.
    pub fn upload(
        device: &Arc<Device>,
        data: &ModelData,
        material_layout: &DescriptorSetLayout,
        transform: Transform,
    ) -> SceneResult<Self> {
        data.validate()?;

        let sets = (data.meshes.len() * MAX_FRAMES_IN_FLIGHT) as u32;
        let pool = DescriptorPoolBuilder::new()
            .add_layout(material_layout.bindings(), sets)
            .create(device.clone(), sets)?;

        let placement = transform.matrix();
        let meshes = data
            .meshes
            .iter()
            .map(|mesh| Mesh::upload(device, mesh, material_layout, &pool, placement))
            .collect::<SceneResult<Vec<_>>>()?;

        let bounds = meshes
            .iter()
            .fold(Aabb::empty(), |acc, mesh| acc.union(mesh.bounds()));

        info!(
            "Uploaded model '{}' ({} meshes, {} transparent)",
            data.name,
            meshes.len(),
            data.transparent_count()
        );

        Ok(Self {
            name: data.name.clone(),
            meshes,
            transform,
            bounds,
            casts_shadows: true,
            _pool: pool,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// World-space bounds of all meshes.
    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    pub fn set_transform(&mut self, transform: Transform) {
        self.transform = transform;
        let placement = transform.matrix();
        self.bounds = Aabb::empty();
        for mesh in &mut self.meshes {
            mesh.set_placement(placement);
            self.bounds = self.bounds.union(mesh.bounds());
        }
    }

    pub fn casts_shadows(&self) -> bool {
        self.casts_shadows
    }

    pub fn set_casts_shadows(&mut self, casts_shadows: bool) {
        self.casts_shadows = casts_shadows;
    }

    pub fn meshes(&self) -> &[Mesh] {
        &self.meshes
    }

    pub fn opaque_meshes(&self) -> impl Iterator<Item = &Mesh> {
        self.meshes.iter().filter(|m| !m.is_transparent())
    }

    pub fn transparent_meshes(&self) -> impl Iterator<Item = &Mesh> {
        self.meshes.iter().filter(|m| m.is_transparent())
    }
}
