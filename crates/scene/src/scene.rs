//! The scene: models, aggregate bounds and the directional light.

use std::collections::BTreeMap;
use std::sync::Arc;

use glam::Vec3;
use tracing::{debug, info};
use umbra_resources::ModelData;
use umbra_rhi::command::CommandBuffer;
use umbra_rhi::descriptor::DescriptorSetLayout;
use umbra_rhi::device::Device;
use umbra_rhi::vk;

use crate::bounds::Aabb;
use crate::error::{SceneError, SceneResult};
use crate::light::DirectionalLight;
use crate::mesh::{MaterialBinding, Mesh, material_layout};
use crate::model::Model;
use crate::retire::RetireQueue;
use crate::transform::Transform;

/// Handle returned by [`Scene::add_model`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModelId(u32);

/// Indices of `centers` ordered farthest-first from `eye`.
pub fn back_to_front(eye: Vec3, centers: &[Vec3]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..centers.len()).collect();
    order.sort_by(|&a, &b| {
        let da = centers[a].distance_squared(eye);
        let db = centers[b].distance_squared(eye);
        db.total_cmp(&da)
    });
    order
}

pub struct Scene {
    models: BTreeMap<ModelId, Model>,
    retired: RetireQueue<Model>,
    next_id: u32,
    bounds: Aabb,
    bounds_dirty: bool,
    light: DirectionalLight,
    material_layout: DescriptorSetLayout,
    device: Arc<Device>,
}

impl Scene {
    pub fn new(device: Arc<Device>) -> SceneResult<Self> {
        let material_layout = material_layout(device.clone())?;
        Ok(Self {
            models: BTreeMap::new(),
            retired: RetireQueue::new(),
            next_id: 0,
            bounds: Aabb::empty(),
            bounds_dirty: false,
            light: DirectionalLight::default(),
            material_layout,
            device,
        })
    }

    /// Layout of the per-mesh material set, shared by every pipeline that
    /// samples materials.
    pub fn material_layout(&self) -> &DescriptorSetLayout {
        &self.material_layout
    }

    pub fn add_model(&mut self, data: &ModelData) -> SceneResult<ModelId> {
        self.add_model_with(data, Transform::default())
    }

    pub fn add_model_with(
        &mut self,
        data: &ModelData,
        transform: Transform,
    ) -> SceneResult<ModelId> {
        let model = Model::upload(&self.device, data, &self.material_layout, transform)?;
        let id = ModelId(self.next_id);
        self.next_id += 1;
        self.models.insert(id, model);
        self.bounds_dirty = true;
        info!("Added model {:?} '{}'", id, data.name);
        Ok(id)
    }

    /// Removes a model. Its GPU resources are released once no frame in
    /// flight can still reference them.
    pub fn remove_model(&mut self, id: ModelId) -> SceneResult<()> {
        let model = self
            .models
            .remove(&id)
            .ok_or(SceneError::UnknownModel(id))?;
        info!("Removed model {:?} '{}'", id, model.name());
        self.retired.push(model);
        self.bounds_dirty = true;
        Ok(())
    }

    pub fn model(&self, id: ModelId) -> Option<&Model> {
        self.models.get(&id)
    }

    pub fn set_model_transform(&mut self, id: ModelId, transform: Transform) -> SceneResult<()> {
        let model = self
            .models
            .get_mut(&id)
            .ok_or(SceneError::UnknownModel(id))?;
        model.set_transform(transform);
        self.bounds_dirty = true;
        Ok(())
    }

    pub fn set_casts_shadows(&mut self, id: ModelId, casts_shadows: bool) -> SceneResult<()> {
        self.models
            .get_mut(&id)
            .ok_or(SceneError::UnknownModel(id))?
            .set_casts_shadows(casts_shadows);
        Ok(())
    }

    /// Per-frame bookkeeping, called after the frame's fence wait: frees
    /// retired models, refreshes bounds and refits the shadow frustum.
    pub fn update(&mut self) {
        let freed = self.retired.tick();
        if freed > 0 {
            debug!("Freed {} retired model(s)", freed);
        }
        if self.bounds_dirty {
            self.bounds = self
                .models
                .values()
                .fold(Aabb::empty(), |acc, model| acc.union(model.bounds()));
            self.bounds_dirty = false;
        }
        self.light.fit_to_bounds(&self.bounds);
    }

    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    pub fn light(&self) -> &DirectionalLight {
        &self.light
    }

    pub fn light_mut(&mut self) -> &mut DirectionalLight {
        &mut self.light
    }

    pub fn model_count(&self) -> usize {
        self.models.len()
    }

    pub fn models(&self) -> impl Iterator<Item = (ModelId, &Model)> {
        self.models.iter().map(|(&id, model)| (id, model))
    }

    /// Opaque meshes with their material set at `set_index`. Returns the
    /// number of draws recorded.
    pub fn draw_opaque(
        &self,
        cmd: &CommandBuffer,
        layout: vk::PipelineLayout,
        set_index: u32,
        slot: usize,
    ) -> u32 {
        let material = MaterialBinding::Bind { set_index, slot };
        self.draw_all(
            cmd,
            layout,
            material,
            self.models.values().flat_map(Model::opaque_meshes),
        )
    }

    /// Opaque meshes, depth only.
    pub fn draw_opaque_depth(&self, cmd: &CommandBuffer, layout: vk::PipelineLayout) -> u32 {
        self.draw_all(
            cmd,
            layout,
            MaterialBinding::Skip,
            self.models.values().flat_map(Model::opaque_meshes),
        )
    }

    /// Opaque meshes of models that cast shadows, depth only.
    pub fn draw_shadow_casters(&self, cmd: &CommandBuffer, layout: vk::PipelineLayout) -> u32 {
        self.draw_all(
            cmd,
            layout,
            MaterialBinding::Skip,
            self.models
                .values()
                .filter(|m| m.casts_shadows())
                .flat_map(Model::opaque_meshes),
        )
    }

    /// Transparent meshes sorted back to front from `eye`.
    pub fn draw_transparent(
        &self,
        cmd: &CommandBuffer,
        layout: vk::PipelineLayout,
        set_index: u32,
        slot: usize,
        eye: Vec3,
    ) -> u32 {
        let meshes: Vec<&Mesh> = self
            .models
            .values()
            .flat_map(Model::transparent_meshes)
            .collect();
        let centers: Vec<Vec3> = meshes.iter().map(|m| m.world_center()).collect();
        let material = MaterialBinding::Bind { set_index, slot };
        self.draw_all(
            cmd,
            layout,
            material,
            back_to_front(eye, &centers).into_iter().map(|i| meshes[i]),
        )
    }

    fn draw_all<'a>(
        &self,
        cmd: &CommandBuffer,
        layout: vk::PipelineLayout,
        material: MaterialBinding,
        meshes: impl Iterator<Item = &'a Mesh>,
    ) -> u32 {
        let mut draws = 0;
        for mesh in meshes {
            mesh.draw(cmd, layout, material);
            draws += 1;
        }
        draws
    }

    /// Releases retired models immediately. The device must be idle.
    pub fn flush_retired(&mut self) {
        self.retired.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::vec3;

    #[test]
    fn test_back_to_front_orders_by_distance() {
        let centers = [vec3(0.0, 0.0, -1.0), vec3(0.0, 0.0, -10.0), vec3(0.0, 0.0, -5.0)];
        assert_eq!(back_to_front(Vec3::ZERO, &centers), vec![1, 2, 0]);
    }

    #[test]
    fn test_back_to_front_empty() {
        assert!(back_to_front(Vec3::ZERO, &[]).is_empty());
    }

    #[test]
    fn test_model_ids_order() {
        assert!(ModelId(0) < ModelId(1));
    }
}
