//! Per-frame uniform buffers.
//!
//! Binary layout consumed by `skeleton.vert`:
//!
//! ```text
//! binding 0  ModelUbo  mat4 models[MODEL_SLOT_COUNT]   (joints, floor, axes)
//! binding 1  SceneUbo  mat4 view; mat4 proj;
//! ```
//!
//! Each frame slot owns its own pair of host-visible buffers, so writing slot
//! `i` never touches memory the GPU may be reading for the other slot.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use tracing::debug;

use mocap_resources::{AXES_SLOT, FLOOR_SLOT, MODEL_SLOT_COUNT};
use mocap_rhi::buffer::{Buffer, BufferUsage};
use mocap_rhi::device::Device;

use crate::error::{RendererError, RendererResult};

/// Size of the model matrix array in bytes.
pub const MODEL_UBO_SIZE: usize = std::mem::size_of::<Mat4>() * MODEL_SLOT_COUNT;

/// Camera matrices.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct SceneUbo {
    pub view: Mat4,
    pub proj: Mat4,
}

impl SceneUbo {
    pub const SIZE: usize = std::mem::size_of::<Self>();
}

/// Static parts of the model matrix array.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ModelLayout {
    /// Uniform scale from capture units to world units.
    pub global_scale: f32,
    /// Hidden axes get a zero matrix and collapse to nothing.
    pub show_axes: bool,
}

/// Fill `out` with the model matrix for every slot.
///
/// Joint `j` goes to slot `j`; unused joint slots and the floor get the bare
/// scale; the axes get the scale or zero when hidden.
///
/// # Errors
///
/// Returns [`RendererError::TooManyJoints`] if `joints` reaches into the
/// floor slot.
pub fn compose_model_matrices(
    joints: &[Mat4],
    layout: ModelLayout,
    out: &mut [Mat4; MODEL_SLOT_COUNT],
) -> RendererResult<()> {
    if joints.len() > FLOOR_SLOT {
        return Err(RendererError::TooManyJoints {
            joints: joints.len(),
            capacity: FLOOR_SLOT,
        });
    }

    let scale = Mat4::from_scale(Vec3::splat(layout.global_scale));
    out.fill(scale);
    for (slot, joint) in out.iter_mut().zip(joints) {
        *slot = scale * *joint;
    }
    out[AXES_SLOT] = if layout.show_axes { scale } else { Mat4::ZERO };
    Ok(())
}

struct SlotBuffers {
    models: Buffer,
    scene: Buffer,
}

/// Owns every slot's uniform buffers and the CPU-side staging array.
pub struct UniformUpdater {
    slots: Vec<SlotBuffers>,
    layout: ModelLayout,
    models: Box<[Mat4; MODEL_SLOT_COUNT]>,
}

impl UniformUpdater {
    /// Creates `slot_count` mapped buffer pairs.
    pub fn new(device: Arc<Device>, slot_count: usize, layout: ModelLayout) -> RendererResult<Self> {
        let slots = (0..slot_count)
            .map(|_| -> RendererResult<SlotBuffers> {
                Ok(SlotBuffers {
                    models: Buffer::new(device.clone(), BufferUsage::Uniform, MODEL_UBO_SIZE as u64)?,
                    scene: Buffer::new(device.clone(), BufferUsage::Uniform, SceneUbo::SIZE as u64)?,
                })
            })
            .collect::<RendererResult<Vec<_>>>()?;

        debug!(
            "Uniform buffers: {} slots x ({} + {} bytes)",
            slot_count,
            MODEL_UBO_SIZE,
            SceneUbo::SIZE
        );

        Ok(Self {
            slots,
            layout,
            models: Box::new([Mat4::IDENTITY; MODEL_SLOT_COUNT]),
        })
    }

    pub fn layout(&self) -> ModelLayout {
        self.layout
    }

    pub fn set_show_axes(&mut self, show: bool) {
        self.layout.show_axes = show;
    }

    /// Model buffer of `slot` for descriptor writes.
    pub fn model_buffer(&self, slot: usize) -> Option<&Buffer> {
        self.slots.get(slot).map(|s| &s.models)
    }

    pub fn scene_buffer(&self, slot: usize) -> Option<&Buffer> {
        self.slots.get(slot).map(|s| &s.scene)
    }

    /// Writes this frame's matrices into `slot`'s buffers.
    ///
    /// The caller must have waited on the slot's in-flight fence.
    pub fn write(&mut self, slot: usize, joints: &[Mat4], scene: &SceneUbo) -> RendererResult<()> {
        compose_model_matrices(joints, self.layout, &mut self.models)?;

        let buffers = self
            .slots
            .get(slot)
            .ok_or(RendererError::InvalidSlot(slot))?;
        buffers
            .models
            .write(0, bytemuck::cast_slice(self.models.as_slice()))?;
        buffers.scene.write_pod(scene)?;
        Ok(())
    }
}
