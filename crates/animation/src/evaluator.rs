//! Skeletal transform evaluation.
//!
//! [`Evaluator::evaluate`] turns a time value into one world-space matrix per
//! joint. Each matrix places a unit bone primitive that extends along +X so
//! that it sits at the joint and points back at the joint's parent.
//!
//! # Composition
//!
//! For joint `j` with ancestors `a0 (root), a1, ..., ak`:
//!
//! ```text
//! M_j = B
//!     * T(root translation) * R(a0)
//!     * T(offset a1)        * R(a1)
//!     * ...
//!     * T(offset ak)        * R(ak)
//!     * T(offset j)            (root: T(root translation))
//!     * A(offset j)
//! ```
//!
//! `B` converts the capture's Y-up basis to the renderer's Z-up basis, `R` is
//! the sampled Euler rotation applied Z, then X, then Y, and `A` aligns the
//! bone's +X axis with the direction back to the parent.
//!
//! # Sampling
//!
//! Only the floor frame is sampled. The fractional blend toward the next
//! frame is computed and exposed through [`FramePosition`] but not applied,
//! so low capture rates show visible stepping.

use std::f32::consts::{FRAC_PI_2, PI};

use glam::{Mat4, Vec3};

use crate::error::{AnimationError, AnimationResult};
use crate::motion::{AnimationClip, MotionSample};
use crate::skeleton::JointId;

/// Offsets and cross products shorter than this count as zero.
const DEGENERATE_EPSILON: f32 = 1e-6;

/// Reference axis the bone primitive is modelled along.
const BONE_AXIS: Vec3 = Vec3::X;

/// Where a time value lands inside the motion table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FramePosition {
    /// Frame that is sampled.
    pub index: usize,
    /// Progress toward the following frame in `[0, 1)`. Not applied.
    pub blend: f32,
}

/// Produces joint transforms from a validated clip.
#[derive(Debug, Clone)]
pub struct Evaluator {
    clip: AnimationClip,
}

impl Evaluator {
    pub fn new(clip: AnimationClip) -> Self {
        Self { clip }
    }

    pub fn clip(&self) -> &AnimationClip {
        &self.clip
    }

    /// Number of matrices [`Evaluator::evaluate`] produces.
    pub fn joint_count(&self) -> usize {
        self.clip.skeleton().len()
    }

    /// Map `time` (seconds) onto a frame of the loop.
    ///
    /// The clip repeats every `frame_duration × frame_count`; negative and
    /// non-finite times map to the first frame.
    pub fn sample_position(&self, time: f32) -> FramePosition {
        let motion = self.clip.motion();
        let frame_duration = motion.frame_duration();
        let last = motion.frame_count() - 1;

        let time = if time.is_finite() && time > 0.0 { time } else { 0.0 };
        // Wraps on the full fd × count, not (count - 1) × fd, so the last frame gets its own slot.
        let time_in_loop = time.rem_euclid(motion.loop_duration());

        // The clamp only absorbs float rounding just below the loop end.
        let index = ((time_in_loop / frame_duration).floor() as usize).min(last);
        let blend = ((time_in_loop - index as f32 * frame_duration) / frame_duration)
            .clamp(0.0, 1.0 - f32::EPSILON);

        FramePosition { index, blend }
    }

    /// Compute one world matrix per joint for `time`.
    pub fn evaluate(&self, time: f32) -> Vec<Mat4> {
        let mut out = vec![Mat4::IDENTITY; self.joint_count()];
        self.write_joints(time, &mut out);
        out
    }

    /// Allocation-free variant of [`Evaluator::evaluate`].
    ///
    /// Writes the first `joint_count()` entries of `out`; any further entries
    /// are left untouched.
    ///
    /// # Errors
    /// [`AnimationError::OutputTooShort`] if `out` has fewer entries than
    /// [`Evaluator::joint_count`]; `out` is not modified.
    pub fn evaluate_into(&self, time: f32, out: &mut [Mat4]) -> AnimationResult<()> {
        let joints = self.joint_count();
        if out.len() < joints {
            return Err(AnimationError::OutputTooShort {
                len: out.len(),
                joints,
            });
        }
        self.write_joints(time, out);
        Ok(())
    }

    /// Fills `out` up to its length or the joint count, whichever is shorter.
    fn write_joints(&self, time: f32, out: &mut [Mat4]) {
        let position = self.sample_position(time);
        let skeleton = self.clip.skeleton();
        let samples = self
            .clip
            .motion()
            .frame(position.index)
            .unwrap_or_default();
        let root_translation = samples
            .first()
            .map_or(Vec3::ZERO, |sample| sample.translation);

        for (joint, slot) in skeleton.joints().iter().zip(out.iter_mut()) {
            let mut transform = basis_correction();

            for &ancestor in &joint.parents {
                let offset = if ancestor.is_root() {
                    root_translation
                } else {
                    skeleton
                        .joint(ancestor)
                        .map_or(Vec3::ZERO, |parent| parent.rest_offset)
                };
                transform *= Mat4::from_translation(offset) * joint_rotation(samples, ancestor);
            }

            let own_offset = if joint.id.is_root() {
                root_translation
            } else {
                joint.rest_offset
            };
            transform *= Mat4::from_translation(own_offset);
            transform *= bone_alignment(joint.rest_offset);

            *slot = transform;
        }
    }
}

/// Y-up to Z-up: +90° about X.
pub fn basis_correction() -> Mat4 {
    Mat4::from_rotation_x(FRAC_PI_2)
}

/// Euler rotation in degrees, applied Z, then X, then Y.
pub fn euler_zxy(degrees: Vec3) -> Mat4 {
    Mat4::from_rotation_z(degrees.z.to_radians())
        * Mat4::from_rotation_x(degrees.x.to_radians())
        * Mat4::from_rotation_y(degrees.y.to_radians())
}

fn joint_rotation(samples: &[MotionSample], id: JointId) -> Mat4 {
    samples
        .get(id.index())
        .map_or(Mat4::IDENTITY, |sample| euler_zxy(sample.rotation))
}

/// Rotation taking the bone axis to the direction opposite `rest_offset`.
///
/// A zero-length offset yields identity. When the offset is parallel to the
/// bone axis there is no cross-product axis, so a half turn about Y is used
/// instead; when it is anti-parallel the bone already points the right way.
pub fn bone_alignment(rest_offset: Vec3) -> Mat4 {
    let length = rest_offset.length();
    if length < DEGENERATE_EPSILON {
        return Mat4::IDENTITY;
    }
    let direction = rest_offset / length;

    let axis = direction.cross(BONE_AXIS);
    let axis_length = axis.length();
    if axis_length > DEGENERATE_EPSILON {
        let angle = PI - direction.dot(BONE_AXIS).clamp(-1.0, 1.0).acos();
        Mat4::from_axis_angle(axis / axis_length, angle)
    } else if direction.x > 0.0 {
        Mat4::from_rotation_y(PI)
    } else {
        Mat4::IDENTITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::MotionTable;
    use crate::skeleton::{Joint, Skeleton};

    const EPS: f32 = 1e-5;

    fn approx_vec(a: Vec3, b: Vec3) -> bool {
        (a - b).abs().max_element() < EPS
    }

    fn clip(frames: usize, frame_duration: f32) -> AnimationClip {
        let skeleton = Skeleton::new(vec![
            Joint::new(0, "root", Vec3::ZERO, vec![], false),
            Joint::new(1, "arm", Vec3::new(0.0, 2.0, 0.0), vec![JointId::ROOT], true),
        ])
        .unwrap();
        let table =
            MotionTable::new(vec![vec![MotionSample::default(); 2]; frames], frame_duration)
                .unwrap();
        AnimationClip::new(skeleton, table).unwrap()
    }

    #[test]
    fn test_sample_position_floor_frame() {
        let evaluator = Evaluator::new(clip(4, 0.5));
        assert_eq!(evaluator.sample_position(0.0).index, 0);
        assert_eq!(evaluator.sample_position(0.5).index, 1);
        let p = evaluator.sample_position(1.25);
        assert_eq!(p.index, 2);
        assert!((p.blend - 0.5).abs() < EPS);
    }

    #[test]
    fn test_sample_position_wraps() {
        let evaluator = Evaluator::new(clip(4, 0.5));
        assert_eq!(evaluator.sample_position(2.0).index, 0);
        assert_eq!(evaluator.sample_position(3.75).index, 3);
    }

    #[test]
    fn test_sample_position_never_past_last_frame() {
        let evaluator = Evaluator::new(clip(3, 1.0 / 30.0));
        let mut t = 0.0;
        while t < 10.0 {
            let p = evaluator.sample_position(t);
            assert!(p.index < 3);
            assert!((0.0..1.0).contains(&p.blend));
            t += 0.0037;
        }
    }

    #[test]
    fn test_negative_and_nan_time_map_to_first_frame() {
        let evaluator = Evaluator::new(clip(4, 0.5));
        assert_eq!(evaluator.sample_position(-3.0).index, 0);
        assert_eq!(evaluator.sample_position(f32::NAN).index, 0);
        assert_eq!(evaluator.sample_position(f32::INFINITY).index, 0);
    }

    #[test]
    fn test_single_frame_clip() {
        let evaluator = Evaluator::new(clip(1, 0.1));
        for t in [0.0, 0.05, 0.1, 7.3] {
            assert_eq!(evaluator.sample_position(t).index, 0);
        }
    }

    #[test]
    fn test_alignment_points_bone_back_at_parent() {
        for offset in [
            Vec3::new(0.0, 2.0, 0.0),
            Vec3::new(0.0, 0.0, -3.0),
            Vec3::new(1.0, 1.0, 1.0),
            Vec3::new(-4.0, 0.0, 0.0),
            Vec3::new(4.0, 0.0, 0.0),
        ] {
            let rotated = bone_alignment(offset).transform_vector3(BONE_AXIS);
            assert!(
                approx_vec(rotated, -offset.normalize()),
                "offset {offset:?} mapped X to {rotated:?}"
            );
        }
    }

    #[test]
    fn test_alignment_degenerate_offset_is_identity() {
        assert_eq!(bone_alignment(Vec3::ZERO), Mat4::IDENTITY);
        assert_eq!(bone_alignment(Vec3::splat(1e-9)), Mat4::IDENTITY);
    }

    #[test]
    fn test_euler_order_is_z_then_x_then_y() {
        let angles = Vec3::new(30.0, 45.0, 60.0);
        let expected = Mat4::from_rotation_z(60f32.to_radians())
            * Mat4::from_rotation_x(30f32.to_radians())
            * Mat4::from_rotation_y(45f32.to_radians());
        assert!(euler_zxy(angles).abs_diff_eq(expected, EPS));
    }

    #[test]
    fn test_evaluate_into_leaves_extra_slots() {
        let evaluator = Evaluator::new(clip(2, 0.1));
        let sentinel = Mat4::from_scale(Vec3::splat(7.0));
        let mut out = [sentinel; 4];
        evaluator.evaluate_into(0.0, &mut out).unwrap();
        assert_eq!(out[2], sentinel);
        assert_eq!(out[3], sentinel);
        assert_ne!(out[0], sentinel);
    }

    #[test]
    fn test_evaluate_into_rejects_short_buffer() {
        let evaluator = Evaluator::new(clip(2, 0.1));
        let sentinel = Mat4::from_scale(Vec3::splat(7.0));
        let mut out = [sentinel; 1];
        assert_eq!(
            evaluator.evaluate_into(0.0, &mut out),
            Err(AnimationError::OutputTooShort { len: 1, joints: 2 })
        );
        assert_eq!(out[0], sentinel);

        assert!(evaluator.evaluate_into(0.0, &mut []).is_err());
    }
}
