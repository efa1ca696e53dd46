//! GPU vertex format and its input descriptions.

use std::mem::offset_of;

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

/// Interleaved mesh vertex.
///
/// `#[repr(C)]` with only 4-byte-aligned fields, so the layout has no
/// padding and matches the shader inputs at locations 0..=5.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub color: Vec3,
    pub uv: Vec2,
    pub normal: Vec3,
    pub tangent: Vec3,
    pub bitangent: Vec3,
}

impl Vertex {
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 6] {
        [
            attribute(0, vk::Format::R32G32B32_SFLOAT, offset_of!(Vertex, position)),
            attribute(1, vk::Format::R32G32B32_SFLOAT, offset_of!(Vertex, color)),
            attribute(2, vk::Format::R32G32_SFLOAT, offset_of!(Vertex, uv)),
            attribute(3, vk::Format::R32G32B32_SFLOAT, offset_of!(Vertex, normal)),
            attribute(4, vk::Format::R32G32B32_SFLOAT, offset_of!(Vertex, tangent)),
            attribute(5, vk::Format::R32G32B32_SFLOAT, offset_of!(Vertex, bitangent)),
        ]
    }

    /// Only location 0, for depth-only pipelines reading the same buffers.
    pub fn position_attribute() -> [vk::VertexInputAttributeDescription; 1] {
        [attribute(
            0,
            vk::Format::R32G32B32_SFLOAT,
            offset_of!(Vertex, position),
        )]
    }
}

fn attribute(
    location: u32,
    format: vk::Format,
    offset: usize,
) -> vk::VertexInputAttributeDescription {
    vk::VertexInputAttributeDescription {
        binding: 0,
        location,
        format,
        offset: offset as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_size_has_no_padding() {
        assert_eq!(size_of::<Vertex>(), 68);
    }

    #[test]
    fn test_binding_stride() {
        let binding = Vertex::binding_description();
        assert_eq!(binding.stride, 68);
        assert_eq!(binding.input_rate, vk::VertexInputRate::VERTEX);
    }

    #[test]
    fn test_attribute_offsets_are_sequential() {
        let attrs = Vertex::attribute_descriptions();
        let offsets: Vec<u32> = attrs.iter().map(|a| a.offset).collect();
        assert_eq!(offsets, vec![0, 12, 24, 32, 44, 56]);
        for (i, attr) in attrs.iter().enumerate() {
            assert_eq!(attr.location, i as u32);
        }
        assert_eq!(attrs[2].format, vk::Format::R32G32_SFLOAT);
    }
}
