//! Resource loading and scene geometry.
//!
//! This crate handles the CPU side of the viewer's assets:
//! - BVH motion loading into a validated [`AnimationClip`](mocap_animation::AnimationClip)
//! - Procedural shapes (bones, root marker, floor, debug axes)
//! - Packing of all shapes into one shared vertex/index buffer
//! - Floor texture images

pub mod bvh;
mod error;
pub mod geometry;
pub mod shapes;
pub mod texture;

pub use error::{ResourceError, ResourceResult};
pub use geometry::{
    AXES_SLOT, DrawRange, FLOOR_SLOT, GeometryBuilder, MODEL_SLOT_COUNT, SceneGeometry,
    SceneLayout, build_scene,
};
pub use shapes::{Shape, bone_shapes};
