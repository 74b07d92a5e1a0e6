//! The single vertex format shared by bones, floor and axes.
//!
//! All shapes live in one vertex/index buffer pair; which model matrix a
//! draw uses comes from its push constant, never from the vertex.

use std::mem::{offset_of, size_of};

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

/// Shader locations 0, 1 and 2; 32 bytes, tightly packed.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    /// Linear RGB, multiplied by the floor texture on textured draws.
    pub color: Vec3,
    pub tex_coord: Vec2,
}

/// Pipeline vertex input for [`Vertex`] on binding 0.
#[derive(Clone, Copy, Debug)]
pub struct VertexInput {
    pub binding: vk::VertexInputBindingDescription,
    pub attributes: [vk::VertexInputAttributeDescription; 3],
}

const fn attribute(
    location: u32,
    format: vk::Format,
    offset: usize,
) -> vk::VertexInputAttributeDescription {
    vk::VertexInputAttributeDescription {
        location,
        binding: 0,
        format,
        offset: offset as u32,
    }
}

impl Vertex {
    pub const STRIDE: u32 = size_of::<Self>() as u32;

    pub const fn textured(position: Vec3, color: Vec3, tex_coord: Vec2) -> Self {
        Self {
            position,
            color,
            tex_coord,
        }
    }

    /// Untextured vertex; its UV stays at the origin.
    pub const fn colored(position: Vec3, color: Vec3) -> Self {
        Self::textured(position, color, Vec2::ZERO)
    }

    pub const fn input() -> VertexInput {
        VertexInput {
            binding: vk::VertexInputBindingDescription {
                binding: 0,
                stride: Self::STRIDE,
                input_rate: vk::VertexInputRate::VERTEX,
            },
            attributes: [
                attribute(0, vk::Format::R32G32B32_SFLOAT, offset_of!(Vertex, position)),
                attribute(1, vk::Format::R32G32B32_SFLOAT, offset_of!(Vertex, color)),
                attribute(2, vk::Format::R32G32_SFLOAT, offset_of!(Vertex, tex_coord)),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stride_matches_shader_layout() {
        assert_eq!(Vertex::STRIDE, 32);
        let input = Vertex::input();
        assert_eq!(input.binding.stride, 32);
        assert_eq!(input.binding.input_rate, vk::VertexInputRate::VERTEX);
    }

    #[test]
    fn test_attribute_offsets() {
        let offsets: Vec<(u32, u32)> = Vertex::input()
            .attributes
            .iter()
            .map(|a| (a.location, a.offset))
            .collect();
        assert_eq!(offsets, [(0, 0), (1, 12), (2, 24)]);
        assert_eq!(
            Vertex::input().attributes[2].format,
            vk::Format::R32G32_SFLOAT
        );
    }

    #[test]
    fn test_colored_vertex_has_no_uv() {
        let v = Vertex::colored(Vec3::ONE, Vec3::X);
        assert_eq!(v.tex_coord, Vec2::ZERO);
        assert_eq!(bytemuck::bytes_of(&v).len(), 32);
    }
}
