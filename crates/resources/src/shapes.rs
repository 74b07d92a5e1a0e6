//! Procedural shapes drawn by the viewer.
//!
//! Each shape owns its vertices and indices relative to its own first
//! vertex; [`GeometryBuilder`](crate::GeometryBuilder) rebases them when
//! packing everything into one buffer pair.

use glam::{Vec2, Vec3};
use mocap_animation::Skeleton;
use mocap_rhi::vertex::Vertex;

/// Root marker color.
pub const ROOT_COLOR: Vec3 = Vec3::new(1.0, 0.0, 0.0);

/// Edge length of the root marker cube.
pub const ROOT_CUBE_SIZE: f32 = 2.0;

const BONE_HEAD_COLOR: Vec3 = Vec3::new(0.95, 0.95, 0.95);
const BONE_RING_COLOR: Vec3 = Vec3::new(0.55, 0.6, 0.75);
const BONE_TAIL_COLOR: Vec3 = Vec3::new(0.25, 0.3, 0.45);

/// Where along the bone its widest point sits, as a fraction of its length.
const BONE_RING_AT: f32 = 0.8;
/// Half-width of the bone's widest point, as a fraction of its length.
const BONE_RING_RADIUS: f32 = 0.08;

/// An indexed triangle list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Shape {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl Shape {
    /// Append `other`, rebasing its indices past this shape's vertices.
    pub fn append(&mut self, other: Shape) {
        let base = self.vertices.len() as u32;
        self.vertices.extend(other.vertices);
        self.indices.extend(other.indices.into_iter().map(|i| i + base));
    }
}

/// Axis-aligned box of uniform color.
pub fn single_color_cube(size: Vec3, center: Vec3, color: Vec3) -> Shape {
    let half = size * 0.5;
    let corners = [
        Vec3::new(-1.0, -1.0, -1.0),
        Vec3::new(1.0, -1.0, -1.0),
        Vec3::new(1.0, 1.0, -1.0),
        Vec3::new(-1.0, 1.0, -1.0),
        Vec3::new(-1.0, -1.0, 1.0),
        Vec3::new(1.0, -1.0, 1.0),
        Vec3::new(1.0, 1.0, 1.0),
        Vec3::new(-1.0, 1.0, 1.0),
    ];
    let vertices = corners
        .iter()
        .map(|&c| Vertex::colored(center + c * half, color))
        .collect();

    // Counter-clockwise when seen from outside.
    #[rustfmt::skip]
    let indices = vec![
        0, 3, 2, 2, 1, 0, // -Z
        4, 5, 6, 6, 7, 4, // +Z
        0, 1, 5, 5, 4, 0, // -Y
        3, 7, 6, 6, 2, 3, // +Y
        0, 4, 7, 7, 3, 0, // -X
        1, 2, 6, 6, 5, 1, // +X
    ];

    Shape { vertices, indices }
}

/// Elongated octahedron from the origin to `(length, 0, 0)`.
///
/// The bone's tail sits on the joint and its head on the parent once the
/// evaluator's alignment rotation is applied.
pub fn octahedron_bone(length: f32) -> Shape {
    let ring_x = length * BONE_RING_AT;
    let r = length * BONE_RING_RADIUS;

    let vertices = vec![
        Vertex::colored(Vec3::ZERO, BONE_TAIL_COLOR),
        Vertex::colored(Vec3::new(length, 0.0, 0.0), BONE_HEAD_COLOR),
        Vertex::colored(Vec3::new(ring_x, r, 0.0), BONE_RING_COLOR),
        Vertex::colored(Vec3::new(ring_x, 0.0, r), BONE_RING_COLOR),
        Vertex::colored(Vec3::new(ring_x, -r, 0.0), BONE_RING_COLOR),
        Vertex::colored(Vec3::new(ring_x, 0.0, -r), BONE_RING_COLOR),
    ];

    let mut indices = Vec::with_capacity(24);
    for i in 0..4u32 {
        let a = 2 + i;
        let b = 2 + (i + 1) % 4;
        indices.extend_from_slice(&[0, b, a]);
        indices.extend_from_slice(&[1, a, b]);
    }

    Shape { vertices, indices }
}

/// Flat rectangle on the Z = 0 plane, centered at the origin.
///
/// Texture coordinates run from 0 to `divisions` so a repeating grid-cell
/// texture draws one cell per division.
pub fn grid_floor(width: f32, depth: f32, divisions: [u32; 2], color: Vec3) -> Shape {
    let (hx, hy) = (width * 0.5, depth * 0.5);
    let (u, v) = (divisions[0].max(1) as f32, divisions[1].max(1) as f32);

    let vertices = vec![
        Vertex::textured(Vec3::new(-hx, -hy, 0.0), color, Vec2::new(0.0, 0.0)),
        Vertex::textured(Vec3::new(hx, -hy, 0.0), color, Vec2::new(u, 0.0)),
        Vertex::textured(Vec3::new(hx, hy, 0.0), color, Vec2::new(u, v)),
        Vertex::textured(Vec3::new(-hx, hy, 0.0), color, Vec2::new(0.0, v)),
    ];
    let indices = vec![0, 1, 2, 2, 3, 0];

    Shape { vertices, indices }
}

/// Red, green and blue bars along +X, +Y and +Z.
pub fn direction_axes(size: f32) -> Shape {
    let thickness = size / 8.0;
    let along = size / 2.0 + thickness / 2.0;

    let mut shape = single_color_cube(
        Vec3::new(size, thickness, thickness),
        Vec3::new(along, 0.0, 0.0),
        Vec3::new(1.0, 0.0, 0.0),
    );
    shape.append(single_color_cube(
        Vec3::new(thickness, size, thickness),
        Vec3::new(0.0, along, 0.0),
        Vec3::new(0.0, 1.0, 0.0),
    ));
    shape.append(single_color_cube(
        Vec3::new(thickness, thickness, size),
        Vec3::new(0.0, 0.0, along),
        Vec3::new(0.0, 0.0, 1.0),
    ));
    shape
}

/// One shape per joint: a red cube for the root, a bone for every other joint.
///
/// The bone length equals the joint's rest offset length, so after the
/// evaluator's transform the bone spans joint to parent exactly.
pub fn bone_shapes(skeleton: &Skeleton) -> Vec<Shape> {
    skeleton
        .joints()
        .iter()
        .map(|joint| {
            if joint.id.is_root() {
                single_color_cube(Vec3::splat(ROOT_CUBE_SIZE), Vec3::ZERO, ROOT_COLOR)
            } else {
                octahedron_bone(joint.rest_offset.length())
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mocap_animation::{Joint, JointId};

    fn assert_indices_in_range(shape: &Shape) {
        let n = shape.vertices.len() as u32;
        assert!(shape.indices.iter().all(|&i| i < n));
        assert_eq!(shape.indices.len() % 3, 0);
    }

    #[test]
    fn test_cube_bounds() {
        let cube = single_color_cube(Vec3::new(2.0, 4.0, 6.0), Vec3::new(1.0, 0.0, 0.0), ROOT_COLOR);
        assert_eq!(cube.vertices.len(), 8);
        assert_eq!(cube.indices.len(), 36);
        assert_indices_in_range(&cube);

        let min = cube.vertices.iter().fold(Vec3::MAX, |m, v| m.min(v.position));
        let max = cube.vertices.iter().fold(Vec3::MIN, |m, v| m.max(v.position));
        assert_eq!(min, Vec3::new(0.0, -2.0, -3.0));
        assert_eq!(max, Vec3::new(2.0, 2.0, 3.0));
        assert!(cube.vertices.iter().all(|v| v.color == ROOT_COLOR));
    }

    #[test]
    fn test_bone_spans_length_along_x() {
        let bone = octahedron_bone(10.0);
        assert_eq!(bone.indices.len(), 24);
        assert_indices_in_range(&bone);
        let max_x = bone.vertices.iter().map(|v| v.position.x).fold(f32::MIN, f32::max);
        let min_x = bone.vertices.iter().map(|v| v.position.x).fold(f32::MAX, f32::min);
        assert_eq!(min_x, 0.0);
        assert_eq!(max_x, 10.0);
    }

    #[test]
    fn test_floor_uv_repeats_per_division() {
        let floor = grid_floor(1000.0, 500.0, [10, 5], Vec3::ONE);
        assert_indices_in_range(&floor);
        assert!(floor.vertices.iter().all(|v| v.position.z == 0.0));
        let max_uv = floor.vertices.iter().fold(Vec2::ZERO, |m, v| m.max(v.tex_coord));
        assert_eq!(max_uv, Vec2::new(10.0, 5.0));
    }

    #[test]
    fn test_axes_layout() {
        let axes = direction_axes(40.0);
        assert_eq!(axes.vertices.len(), 24);
        assert_eq!(axes.indices.len(), 108);
        assert_indices_in_range(&axes);

        let red_max_x = axes
            .vertices
            .iter()
            .filter(|v| v.color == Vec3::new(1.0, 0.0, 0.0))
            .map(|v| v.position.x)
            .fold(f32::MIN, f32::max);
        assert_eq!(red_max_x, 40.0 + 2.5);
    }

    #[test]
    fn test_bone_shapes_per_joint() {
        let skeleton = Skeleton::new(vec![
            Joint::new(0, "root", Vec3::ZERO, vec![], false),
            Joint::new(1, "a", Vec3::new(0.0, 3.0, 4.0), vec![JointId::ROOT], true),
        ])
        .unwrap();
        let shapes = bone_shapes(&skeleton);
        assert_eq!(shapes.len(), 2);
        assert!(shapes[0].vertices.iter().all(|v| v.color == ROOT_COLOR));
        let reach = shapes[1].vertices.iter().map(|v| v.position.x).fold(0.0, f32::max);
        assert_eq!(reach, 5.0);
    }
}
