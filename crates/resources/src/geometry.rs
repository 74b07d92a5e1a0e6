//! Packing of every drawable object into one shared vertex/index buffer.

use glam::Vec3;
use mocap_animation::{MAX_JOINTS, Skeleton};
use mocap_rhi::vertex::Vertex;

use crate::error::{ResourceError, ResourceResult};
use crate::shapes::{self, Shape};

/// Model matrix slot used by the floor.
pub const FLOOR_SLOT: usize = MAX_JOINTS;
/// Model matrix slot used by the debug axes.
pub const AXES_SLOT: usize = MAX_JOINTS + 1;
/// Length of the per-frame model matrix array.
pub const MODEL_SLOT_COUNT: usize = MAX_JOINTS + 2;

/// The portion of the shared buffers belonging to one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawRange {
    /// Index into the per-frame model matrix array.
    pub model_slot: u32,
    /// First vertex of the object; already folded into its indices.
    pub base_vertex: u32,
    pub first_index: u32,
    pub index_count: u32,
    /// Sample the floor texture when shading this object.
    pub textured: bool,
}

/// Packed geometry ready for upload.
#[derive(Debug, Clone, Default)]
pub struct SceneGeometry {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub draws: Vec<DrawRange>,
}

/// Accumulates shapes and assigns each its base offsets.
#[derive(Debug, Default)]
pub struct GeometryBuilder {
    geometry: SceneGeometry,
}

impl GeometryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a shape drawn with the matrix in `model_slot`.
    ///
    /// # Errors
    /// Returns [`ResourceError::SlotOutOfRange`] if the slot does not fit
    /// the model matrix array.
    pub fn push(&mut self, model_slot: usize, shape: Shape, textured: bool) -> ResourceResult<&DrawRange> {
        if model_slot >= MODEL_SLOT_COUNT {
            return Err(ResourceError::SlotOutOfRange {
                slot: model_slot,
                capacity: MODEL_SLOT_COUNT,
            });
        }

        let geometry = &mut self.geometry;
        let base_vertex = geometry.vertices.len() as u32;
        let first_index = geometry.indices.len() as u32;
        let index_count = shape.indices.len() as u32;

        geometry.vertices.extend(shape.vertices);
        geometry
            .indices
            .extend(shape.indices.into_iter().map(|i| i + base_vertex));
        geometry.draws.push(DrawRange {
            model_slot: model_slot as u32,
            base_vertex,
            first_index,
            index_count,
            textured,
        });

        Ok(&geometry.draws[geometry.draws.len() - 1])
    }

    pub fn finish(self) -> SceneGeometry {
        tracing::debug!(
            "Scene geometry: {} objects, {} vertices, {} indices",
            self.geometry.draws.len(),
            self.geometry.vertices.len(),
            self.geometry.indices.len()
        );
        self.geometry
    }
}

/// Floor and axes settings for [`build_scene`].
#[derive(Debug, Clone, PartialEq)]
pub struct SceneLayout {
    pub floor_size: [f32; 2],
    pub floor_divisions: [u32; 2],
    pub floor_color: Vec3,
    pub axes_size: f32,
}

/// Bones for every joint, then the floor, then the debug axes.
pub fn build_scene(skeleton: &Skeleton, layout: &SceneLayout) -> ResourceResult<SceneGeometry> {
    let mut builder = GeometryBuilder::new();

    for (slot, shape) in shapes::bone_shapes(skeleton).into_iter().enumerate() {
        builder.push(slot, shape, false)?;
    }
    builder.push(
        FLOOR_SLOT,
        shapes::grid_floor(
            layout.floor_size[0],
            layout.floor_size[1],
            layout.floor_divisions,
            layout.floor_color,
        ),
        true,
    )?;
    builder.push(AXES_SLOT, shapes::direction_axes(layout.axes_size), false)?;

    Ok(builder.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mocap_animation::{Joint, JointId};

    fn layout() -> SceneLayout {
        SceneLayout {
            floor_size: [100.0, 100.0],
            floor_divisions: [4, 4],
            floor_color: Vec3::new(0.2, 0.9, 0.2),
            axes_size: 40.0,
        }
    }

    #[test]
    fn test_indices_are_rebased() {
        let mut builder = GeometryBuilder::new();
        builder.push(0, shapes::octahedron_bone(1.0), false).unwrap();
        let second = *builder.push(1, shapes::octahedron_bone(2.0), false).unwrap();
        let geometry = builder.finish();

        assert_eq!(second.base_vertex, 6);
        assert_eq!(second.first_index, 24);
        assert_eq!(second.index_count, 24);
        let range = second.first_index as usize..(second.first_index + second.index_count) as usize;
        assert!(geometry.indices[range].iter().all(|&i| (6..12).contains(&i)));
    }

    #[test]
    fn test_rejects_slot_past_capacity() {
        let mut builder = GeometryBuilder::new();
        assert!(matches!(
            builder.push(MODEL_SLOT_COUNT, shapes::octahedron_bone(1.0), false),
            Err(ResourceError::SlotOutOfRange { .. })
        ));
    }

    #[test]
    fn test_scene_layout() {
        let skeleton = Skeleton::new(vec![
            Joint::new(0, "root", Vec3::ZERO, vec![], false),
            Joint::new(1, "a", Vec3::Y, vec![JointId::ROOT], false),
            Joint::new(2, "b", Vec3::Y, vec![JointId(0), JointId(1)], true),
        ])
        .unwrap();
        let geometry = build_scene(&skeleton, &layout()).unwrap();

        assert_eq!(geometry.draws.len(), 5);
        let slots: Vec<u32> = geometry.draws.iter().map(|d| d.model_slot).collect();
        assert_eq!(slots, vec![0, 1, 2, FLOOR_SLOT as u32, AXES_SLOT as u32]);
        assert!(geometry.draws[3].textured);
        assert!(!geometry.draws[4].textured);

        let total: u32 = geometry.draws.iter().map(|d| d.index_count).sum();
        assert_eq!(total as usize, geometry.indices.len());
        let n = geometry.vertices.len() as u32;
        assert!(geometry.indices.iter().all(|&i| i < n));
    }
}
