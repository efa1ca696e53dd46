//! GPU meshes: vertex and index buffers plus a material descriptor set.

use std::path::Path;
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};
use tracing::debug;
use umbra_resources::{MeshData, TextureData};
use umbra_rhi::buffer::{Buffer, BufferUsage};
use umbra_rhi::command::CommandBuffer;
use umbra_rhi::descriptor::{DescriptorPool, DescriptorSet, DescriptorSetLayout, WriteTarget};
use umbra_rhi::device::Device;
use umbra_rhi::image::Image;
use umbra_rhi::texture::{TextureEncoding, upload_rgba8};
use umbra_rhi::vertex::Vertex;
use umbra_rhi::vk;

use crate::bounds::Aabb;
use crate::error::SceneResult;

/// Material texture bindings, in binding order.
pub const MATERIAL_BINDINGS: [&str; 3] = ["albedo", "normal", "specular"];

/// Stages that read [`MeshPushConstants`].
pub const MESH_PUSH_STAGES: vk::ShaderStageFlags = vk::ShaderStageFlags::from_raw(
    vk::ShaderStageFlags::VERTEX.as_raw() | vk::ShaderStageFlags::FRAGMENT.as_raw(),
);

/// Per-draw data pushed before every mesh draw.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct MeshPushConstants {
    pub model: Mat4,
    pub base_color: Vec4,
}

impl MeshPushConstants {
    /// The range every mesh pipeline declares.
    pub fn range() -> vk::PushConstantRange {
        vk::PushConstantRange {
            stage_flags: MESH_PUSH_STAGES,
            offset: 0,
            size: size_of::<Self>() as u32,
        }
    }
}

/// Layout of the per-mesh material set: three combined image samplers read
/// by the fragment stage.
pub fn material_layout(device: Arc<Device>) -> SceneResult<DescriptorSetLayout> {
    let mut builder = DescriptorSetLayout::builder();
    for binding in 0..MATERIAL_BINDINGS.len() as u32 {
        builder = builder.add_binding(
            binding,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            vk::ShaderStageFlags::FRAGMENT,
            1,
        );
    }
    Ok(builder.create(device)?)
}

/// How a draw treats the material set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MaterialBinding {
    /// Depth-only pipelines declare no material set.
    Skip,
    /// Bind the set for frame `slot` at `set_index`.
    Bind { set_index: u32, slot: usize },
}

fn to_gpu_vertex(v: &umbra_resources::Vertex) -> Vertex {
    Vertex {
        position: v.position,
        color: v.color,
        uv: v.uv,
        normal: v.normal,
        tangent: v.tangent,
        bitangent: v.bitangent,
    }
}

fn load_texture(
    device: &Arc<Device>,
    name: &str,
    path: Option<&Path>,
    fallback: TextureData,
    encoding: TextureEncoding,
) -> SceneResult<Image> {
    let texture = match path {
        Some(path) => TextureData::load(path)?,
        None => fallback,
    };
    Ok(upload_rgba8(
        device,
        name,
        texture.width,
        texture.height,
        &texture.pixels,
        encoding,
    )?)
}

/// One drawable mesh.
pub struct Mesh {
    name: String,
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    index_count: u32,
    /// Imported local-to-world transform
    local: Mat4,
    /// Model placement applied on top of `local`
    world: Mat4,
    object_bounds: Aabb,
    world_bounds: Aabb,
    base_color: Vec4,
    transparent: bool,
    material_set: DescriptorSet,
    _textures: [Image; 3],
}

impl Mesh {
    /// Uploads buffers and textures and writes the material set for every
    /// frame slot. `placement` is the owning model's transform.
    pub fn upload(
        device: &Arc<Device>,
        data: &MeshData,
        layout: &DescriptorSetLayout,
        pool: &DescriptorPool,
        placement: Mat4,
    ) -> SceneResult<Self> {
        data.validate()?;

        let vertices: Vec<Vertex> = data.vertices.iter().map(to_gpu_vertex).collect();
        let vertex_buffer = Buffer::new_with_data(
            device.clone(),
            BufferUsage::Vertex,
            bytemuck::cast_slice(&vertices),
        )?;
        let index_buffer = Buffer::new_with_data(
            device.clone(),
            BufferUsage::Index,
            bytemuck::cast_slice(&data.indices),
        )?;

        let material = &data.material;
        let textures = [
            load_texture(
                device,
                &format!("{}.albedo", data.name),
                material.albedo.as_deref(),
                TextureData::solid([255, 255, 255, 255]),
                TextureEncoding::Srgb,
            )?,
            load_texture(
                device,
                &format!("{}.normal", data.name),
                material.normal.as_deref(),
                TextureData::flat_normal(),
                TextureEncoding::Linear,
            )?,
            load_texture(
                device,
                &format!("{}.specular", data.name),
                material.specular.as_deref(),
                TextureData::solid([128, 128, 128, 255]),
                TextureEncoding::Linear,
            )?,
        ];

        let mut material_set = DescriptorSet::new(device.clone(), layout, pool)?;
        for (binding, texture) in textures.iter().enumerate() {
            material_set.add_image_write(
                WriteTarget::All,
                binding as u32,
                texture.descriptor_info(vk::Sampler::null()),
            )?;
        }
        material_set.update_all()?;

        let object_bounds = Aabb::from_points(data.vertices.iter().map(|v| v.position));
        let world = placement * data.transform;

        debug!(
            "Uploaded mesh '{}': {} vertices, {} triangles{}",
            data.name,
            vertices.len(),
            data.triangle_count(),
            if data.transparent { " (transparent)" } else { "" }
        );

        Ok(Self {
            name: data.name.clone(),
            vertex_buffer,
            index_buffer,
            index_count: data.indices.len() as u32,
            local: data.transform,
            world,
            object_bounds,
            world_bounds: object_bounds.transformed(&world),
            base_color: material.base_color,
            transparent: data.transparent,
            material_set,
            _textures: textures,
        })
    }

    /// Pushes the transform, binds buffers (and the material set, if asked)
    /// and issues one indexed draw.
    pub fn draw(&self, cmd: &CommandBuffer, layout: vk::PipelineLayout, material: MaterialBinding) {
        cmd.push_constants(layout, MESH_PUSH_STAGES, &self.push_constants());
        cmd.bind_vertex_buffer(self.vertex_buffer.handle());
        cmd.bind_index_buffer(self.index_buffer.handle());
        if let MaterialBinding::Bind { set_index, slot } = material {
            self.material_set.bind(cmd, layout, set_index, slot);
        }
        cmd.draw_indexed(self.index_count);
    }

    pub fn push_constants(&self) -> MeshPushConstants {
        MeshPushConstants {
            model: self.world,
            base_color: self.base_color,
        }
    }

    /// Re-applies the owning model's placement.
    pub(crate) fn set_placement(&mut self, placement: Mat4) {
        self.world = placement * self.local;
        self.world_bounds = self.object_bounds.transformed(&self.world);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bounds(&self) -> Aabb {
        self.world_bounds
    }

    pub fn world_center(&self) -> Vec3 {
        self.world_bounds.center()
    }

    pub fn is_transparent(&self) -> bool {
        self.transparent
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_constants_fit_guaranteed_limit() {
        // 128 bytes is the minimum maxPushConstantsSize.
        assert_eq!(size_of::<MeshPushConstants>(), 80);
        assert!(MeshPushConstants::range().size <= 128);
    }

    #[test]
    fn test_push_stages() {
        assert!(MESH_PUSH_STAGES.contains(vk::ShaderStageFlags::VERTEX));
        assert!(MESH_PUSH_STAGES.contains(vk::ShaderStageFlags::FRAGMENT));
    }

    #[test]
    fn test_vertex_conversion_keeps_every_attribute() {
        let v = umbra_resources::Vertex {
            position: Vec3::new(1.0, 2.0, 3.0),
            color: Vec3::new(0.1, 0.2, 0.3),
            uv: glam::Vec2::new(0.5, 0.25),
            normal: Vec3::Y,
            tangent: Vec3::X,
            bitangent: Vec3::Z,
        };
        let gpu = to_gpu_vertex(&v);
        assert_eq!(gpu.position, v.position);
        assert_eq!(gpu.color, v.color);
        assert_eq!(gpu.uv, v.uv);
        assert_eq!(gpu.normal, v.normal);
        assert_eq!(gpu.tangent, v.tangent);
        assert_eq!(gpu.bitangent, v.bitangent);
    }
}
