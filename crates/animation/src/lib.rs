//! Skeletal animation for motion-capture clips.
//!
//! - [`Skeleton`]: validated joint hierarchy (index-based forest)
//! - [`MotionTable`]: per-frame Euler/translation samples
//! - [`AnimationClip`]: a skeleton and motion table known to agree
//! - [`Evaluator`]: time → one world matrix per joint
//!
//! # Example
//! ```
//! use glam::Vec3;
//! use mocap_animation::{AnimationClip, Evaluator, Joint, JointId, MotionSample, MotionTable, Skeleton};
//!
//! let skeleton = Skeleton::new(vec![
//!     Joint::new(0, "hips", Vec3::ZERO, vec![], false),
//!     Joint::new(1, "spine", Vec3::new(0.0, 2.0, 0.0), vec![JointId::ROOT], true),
//! ])?;
//! let motion = MotionTable::new(vec![vec![MotionSample::default(); 2]], 1.0 / 30.0)?;
//! let evaluator = Evaluator::new(AnimationClip::new(skeleton, motion)?);
//!
//! let matrices = evaluator.evaluate(0.5);
//! assert_eq!(matrices.len(), 2);
//! # Ok::<(), mocap_animation::AnimationError>(())
//! ```

mod error;
mod evaluator;
mod info;
mod motion;
mod skeleton;

pub use error::{AnimationError, AnimationResult};
pub use evaluator::{Evaluator, FramePosition, basis_correction, bone_alignment, euler_zxy};
pub use info::{MotionInfo, SkeletonInfo};
pub use motion::{AnimationClip, MotionSample, MotionTable};
pub use skeleton::{Joint, JointId, MAX_JOINTS, Skeleton};
